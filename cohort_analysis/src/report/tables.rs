use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::helper_functions::dataframe_to_csv;
use crate::models::{CohortSummary, Comparison, TestOutcome};
use crate::stats::format_p_value;

/// Text shown wherever a p-value would go.
pub fn outcome_label(outcome: &TestOutcome) -> String {
    match outcome {
        TestOutcome::Computed(r) => format_p_value(r.p_value),
        TestOutcome::Degenerate { .. } => "not computed (degenerate table)".to_string(),
        TestOutcome::Skipped { .. } => "not computed (insufficient data)".to_string(),
    }
}

/// One CSV row per cohort of a comparison.
#[derive(Debug, Serialize)]
struct ComparisonRow<'a> {
    comparison: &'a str,
    test: String,
    status: &'static str,
    cohort: Option<&'a str>,
    n: Option<usize>,
    events: Option<usize>,
    excluded_at_median: usize,
    statistic: Option<f64>,
    dof: Option<usize>,
    p_value: Option<f64>,
    p_label: String,
    hazard_ratio: Option<f64>,
    ci_lower: Option<f64>,
    ci_upper: Option<f64>,
    reason: Option<&'a str>,
}

fn make_row<'a>(cmp: &'a Comparison, cohort: Option<&'a CohortSummary>) -> ComparisonRow<'a> {
    let (result, reason) = match &cmp.outcome {
        TestOutcome::Computed(r) => (Some(r), None),
        TestOutcome::Degenerate { reason } | TestOutcome::Skipped { reason } => (None, Some(reason.as_str())),
    };
    let hazard = result.and_then(|r| r.hazard);

    ComparisonRow {
        comparison: &cmp.name,
        test: cmp.test.to_string(),
        status: cmp.outcome.status(),
        cohort: cohort.map(|c| c.name.as_str()),
        n: cohort.map(|c| c.n),
        events: cohort.and_then(|c| c.events),
        excluded_at_median: cmp.excluded_at_median,
        statistic: result.map(|r| r.statistic),
        dof: result.map(|r| r.dof),
        p_value: result.map(|r| r.p_value),
        p_label: outcome_label(&cmp.outcome),
        hazard_ratio: hazard.map(|h| h.ratio),
        ci_lower: hazard.map(|h| h.ci_lower),
        ci_upper: hazard.map(|h| h.ci_upper),
        reason,
    }
}

fn rows_for(cmp: &Comparison) -> Vec<ComparisonRow<'_>> {
    if cmp.cohorts.is_empty() {
        vec![make_row(cmp, None)]
    } else {
        cmp.cohorts.iter().map(|c| make_row(cmp, Some(c))).collect()
    }
}

/// Writes `comparisons.csv` and `comparisons.json` into `dir`.
pub fn write_comparisons(dir: &Path, comparisons: &[Comparison]) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;

    let csv_path = dir.join("comparisons.csv");
    let mut writer = csv::Writer::from_path(&csv_path)?;
    for cmp in comparisons {
        for row in rows_for(cmp) {
            writer.serialize(row)?;
        }
    }
    writer.flush()?;

    let json_path = dir.join("comparisons.json");
    serde_json::to_writer_pretty(File::create(&json_path)?, comparisons)?;

    info!(
        "Saved {} comparisons to {} and {}",
        comparisons.len(),
        csv_path.display(),
        json_path.display()
    );
    Ok((csv_path, json_path))
}

/// Writes one table "sheet" as `<dir>/<name>.csv`.
pub fn write_sheet(dir: &Path, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.csv"));
    dataframe_to_csv(df, &path)?;
    Ok(path)
}

/// Two-column `key,value` sheet.
pub fn key_value_sheet(entries: &[(String, String)]) -> PolarsResult<DataFrame> {
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    let values: Vec<&str> = entries.iter().map(|(_, v)| v.as_str()).collect();
    df!["key" => keys, "value" => values]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HazardRatio, TestKind, TestResult};

    fn computed() -> Comparison {
        Comparison {
            name: "CLC".into(),
            test: TestKind::LogRank,
            cohorts: vec![
                CohortSummary { name: "Expressed CLC".into(), n: 7, events: Some(3) },
                CohortSummary { name: "Not expressed CLC".into(), n: 3, events: Some(1) },
            ],
            excluded_at_median: 0,
            outcome: TestOutcome::Computed(TestResult {
                statistic: 4.2,
                dof: 1,
                p_value: 0.0404,
                hazard: None,
            }),
        }
    }

    #[test]
    fn degenerate_and_skipped_render_as_text() {
        let degenerate = TestOutcome::Degenerate { reason: "row `x` is empty".into() };
        assert_eq!(outcome_label(&degenerate), "not computed (degenerate table)");
        let skipped = TestOutcome::Skipped { reason: "n < 2".into() };
        assert!(!outcome_label(&skipped).contains("p ="));
    }

    #[test]
    fn one_row_per_cohort() {
        let cmp = computed();
        let rows = rows_for(&cmp);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].p_label, "p = 0.040");

        let skipped = Comparison::skipped("IL5RA", TestKind::LogRank, "column `IL5RA` not found (gene)");
        let rows = rows_for(&skipped);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].p_value, None);
        assert_eq!(rows[0].status, "skipped");
    }

    #[test]
    fn writes_csv_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut cox = computed();
        cox.test = TestKind::CoxPh;
        cox.outcome = TestOutcome::Computed(TestResult {
            statistic: 2.1,
            dof: 1,
            p_value: 0.0002,
            hazard: Some(HazardRatio { ratio: 1.8, ci_lower: 1.1, ci_upper: 2.9 }),
        });
        let (csv_path, json_path) = write_comparisons(dir.path(), &[computed(), cox]).unwrap();

        let text = fs::read_to_string(csv_path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.contains("p < 0.001"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json[0]["outcome"]["status"], "computed");
        assert_eq!(json[1]["outcome"]["hazard"]["ratio"], 1.8);
    }
}
