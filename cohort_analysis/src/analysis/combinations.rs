//! Detailed per-gene report.
//!
//! Patients are grouped by the exact subset of configured genes they express
//! (`CLC_EPX`, `PRG2`, `None`, ...). Produces the raw, count, continuous and
//! log sheets plus the survival figure of the groups.

use std::fs;
use std::path::Path;

use chrono::Utc;
use polars::prelude::*;
use tracing::{info, warn};

use crate::analysis::{plot_survival, skip_or_fail};
use crate::classifier::{expression_profile, NONE_LABEL};
use crate::cohorts::combination_groups;
use crate::comparator::{compare_status, compare_survival, cox_within_cohort, subtype_table};
use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::Result;
use crate::models::{Comparison, Pam50Subtype, Sample, TestKind};
use crate::report::tables::{key_value_sheet, outcome_label, write_comparisons, write_sheet};
use crate::summary::{cohort_counts, crosstab_column_percent, crosstab_counts, status_counts, subtype_counts};

const METHODOLOGY: &str = "Expression > 0 counts as expressed. Patients are grouped by the set of \
configured genes they express. Survival by multivariate log-rank across groups; status by \
chi-square (Yates for 2x2); Cox PH (Efron ties) of expression inside each group.";

// ─── Raw sheets ──────────────────────────────────────────────────────────────

/// Sample id, the `extra` columns and one column per gene, for samples where
/// `cells` yields a value per extra column and every gene has a value.
fn raw_sheet<F>(
    dataset: &ExpressionDataset,
    genes: &[String],
    extra: &[(&str, DataType)],
    cells: F,
) -> PolarsResult<DataFrame>
where
    F: Fn(&Sample) -> Option<Vec<AnyValue<'static>>>,
{
    let rows: Vec<(&Sample, Vec<AnyValue<'static>>)> = dataset
        .samples()
        .iter()
        .filter(|s| genes.iter().all(|g| s.expression(g).is_some()))
        .filter_map(|s| cells(s).map(|values| (s, values)))
        .collect();

    let mut columns = vec![Column::new(
        "sample".into(),
        rows.iter().map(|(s, _)| s.id.as_str()).collect::<Vec<_>>(),
    )];
    for (k, (name, dtype)) in extra.iter().enumerate() {
        let values: Vec<AnyValue> = rows
            .iter()
            .map(|(_, values)| values.get(k).cloned().unwrap_or(AnyValue::Null))
            .collect();
        columns.push(Series::from_any_values_and_dtype((*name).into(), &values, dtype, false)?.into());
    }
    for gene in genes {
        let values: Vec<Option<f64>> = rows.iter().map(|(s, _)| s.expression(gene)).collect();
        columns.push(Column::new(gene.as_str().into(), values));
    }
    DataFrame::new(columns)
}

fn subtype_raw(dataset: &ExpressionDataset, genes: &[String]) -> PolarsResult<DataFrame> {
    raw_sheet(dataset, genes, &[("subtype", DataType::String)], |s| {
        s.subtype
            .map(|st| vec![AnyValue::StringOwned(st.label().into())])
    })
}

fn survival_raw(dataset: &ExpressionDataset, genes: &[String]) -> PolarsResult<DataFrame> {
    raw_sheet(
        dataset,
        genes,
        &[("time", DataType::Float64), ("event", DataType::Int32)],
        |s| {
            s.survival
                .map(|r| vec![AnyValue::Float64(r.time), AnyValue::Int32(i32::from(r.event))])
        },
    )
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Writes the detailed report into `<out>/report` and returns every
/// comparison it ran.
pub fn run_combination_report(
    dataset: &ExpressionDataset,
    config: &AnalysisConfig,
    input: &Path,
    out_dir: &Path,
) -> Result<Vec<Comparison>> {
    let out_dir = out_dir.join("report");
    fs::create_dir_all(&out_dir)?;

    let genes: Vec<String> = config
        .genes
        .iter()
        .filter(|g| dataset.has_gene(g))
        .cloned()
        .collect();
    let missing: Vec<String> = config
        .genes
        .iter()
        .filter(|g| !dataset.has_gene(g))
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!("Genes not found in the dataset: {}", missing.join(", "));
    }

    // ── Log sheet ───────────────────────────────────────────────────────────
    let mut log = key_value_sheet(&[
        ("date".into(), Utc::now().to_rfc3339()),
        ("input".into(), input.display().to_string()),
        ("genes_requested".into(), config.genes.join(", ")),
        ("genes_found".into(), genes.join(", ")),
        ("genes_missing".into(), missing.join(", ")),
        ("patients".into(), dataset.len().to_string()),
        ("methodology".into(), METHODOLOGY.to_string()),
    ])?;
    write_sheet(&out_dir, "log", &mut log)?;

    let mut comparisons = Vec::new();
    let set = match combination_groups(dataset, &genes) {
        Ok(set) if !genes.is_empty() => set,
        Ok(_) => {
            warn!("No configured gene is present, report limited to the log sheet");
            return Ok(comparisons);
        }
        Err(e) => {
            comparisons.push(skip_or_fail("combinations", TestKind::MultivariateLogRank, e)?);
            write_comparisons(&out_dir, &comparisons)?;
            return Ok(comparisons);
        }
    };
    info!("{} combination groups over {} genes", set.cohorts.len(), genes.len());

    // ── Raw sheets ──────────────────────────────────────────────────────────
    if dataset.require_subtype().is_ok() {
        write_sheet(&out_dir, "raw_subtype", &mut subtype_raw(dataset, &genes)?)?;
    }
    if dataset.require_survival().is_ok() {
        write_sheet(&out_dir, "raw_survival", &mut survival_raw(dataset, &genes)?)?;
    }

    // ── Count sheets ────────────────────────────────────────────────────────
    write_sheet(&out_dir, "counts_groups", &mut cohort_counts(&set, dataset.len())?)?;
    if dataset.require_subtype().is_ok() {
        // every subtype here; Normal is only left out of the chi-square tests
        write_sheet(&out_dir, "counts_pam50", &mut subtype_counts(dataset, &Pam50Subtype::ALL)?)?;
        let table = subtype_table(dataset, &set, &Pam50Subtype::ALL);
        write_sheet(&out_dir, "crosstab_pam50", &mut crosstab_counts(&table)?)?;
        write_sheet(&out_dir, "crosstab_pam50_percent", &mut crosstab_column_percent(&table)?)?;
    }
    if dataset.require_survival().is_ok() {
        write_sheet(&out_dir, "counts_status", &mut status_counts(dataset)?)?;
    }
    let status = compare_status(dataset, &set);
    if let Some(table) = &status.table {
        let mut sheet = crosstab_counts(table)?;
        let label = outcome_label(&status.comparison.outcome);
        sheet.with_column(Column::new("chi_square".into(), vec![label; table.rows.len()]))?;
        write_sheet(&out_dir, "crosstab_status", &mut sheet)?;
    }
    comparisons.push(status.comparison);

    // ── Survival across groups ──────────────────────────────────────────────
    let survival = compare_survival(dataset, &set, config);
    plot_survival(
        dataset,
        &set,
        &survival,
        config,
        &out_dir.join("combinations_km.png"),
        "Overall survival by expressed genes",
    );
    comparisons.push(survival);

    // ── Continuous: Cox inside each group ───────────────────────────────────
    let mut cox = Vec::new();
    for cohort in set.cohorts.iter().filter(|c| c.name != NONE_LABEL) {
        let Some(first) = dataset.members(cohort).into_iter().next() else {
            continue;
        };
        for gene in expression_profile(first, &genes).0 {
            cox.push(cox_within_cohort(dataset, cohort, gene, config));
        }
    }
    if !cox.is_empty() {
        write_comparisons(&out_dir.join("cox"), &cox)?;
    }
    comparisons.extend(cox);

    write_comparisons(&out_dir, &comparisons)?;
    Ok(comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::expression_table::tests::sample;
    use crate::helper_functions::read_csv;
    use crate::models::{Pam50Subtype, TestOutcome};
    use approx::assert_abs_diff_eq;

    fn dataset() -> ExpressionDataset {
        let subtypes = [Pam50Subtype::LumA, Pam50Subtype::Basal, Pam50Subtype::LumB, Pam50Subtype::Her2];
        let samples = (0..24)
            .map(|i| {
                let clc = if i % 2 == 0 { 0.5 + (i % 7) as f64 } else { 0.0 };
                let epx = if i % 3 == 0 { 1.0 } else { 0.0 };
                sample(
                    &format!("TCGA-{i:02}"),
                    &[("CLC", clc), ("EPX", epx)],
                    Some((3.0 + i as f64, i % 4 != 1)),
                    Some(subtypes[i % 4]),
                )
            })
            .collect();
        ExpressionDataset::new(samples, vec!["CLC".into(), "EPX".into()], true, true)
    }

    #[test]
    fn writes_every_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            genes: vec!["CLC".into(), "EPX".into(), "IL5RA".into()],
            ..AnalysisConfig::default()
        };
        let comparisons = run_combination_report(&dataset(), &config, Path::new("combined.csv"), dir.path()).unwrap();

        let report = dir.path().join("report");
        for sheet in [
            "log",
            "raw_subtype",
            "raw_survival",
            "counts_groups",
            "counts_pam50",
            "counts_status",
            "crosstab_pam50",
            "crosstab_pam50_percent",
            "crosstab_status",
        ] {
            assert!(report.join(format!("{sheet}.csv")).exists(), "{sheet} missing");
        }
        assert!(report.join("comparisons.csv").exists());

        let log = fs::read_to_string(report.join("log.csv")).unwrap();
        assert!(log.contains("genes_missing,IL5RA"));

        let multivariate = comparisons
            .iter()
            .find(|c| c.test == TestKind::MultivariateLogRank)
            .unwrap();
        assert_eq!(multivariate.cohorts.len(), 4);
        assert!(matches!(multivariate.outcome, TestOutcome::Computed(_)));

        // one Cox fit per gene of each non-None group: CLC, EPX, CLC_EPX x2
        let cox: Vec<_> = comparisons.iter().filter(|c| c.test == TestKind::CoxPh).collect();
        assert_eq!(cox.len(), 4);
        assert!(cox.iter().any(|c| c.name == "CLC_EPX / EPX"));
    }

    #[test]
    fn survival_raw_keeps_complete_rows() {
        let samples = vec![
            sample("A", &[("CLC", 1.0)], Some((3.0, true)), None),
            sample("B", &[], Some((4.0, false)), None),
            sample("C", &[("CLC", 0.0)], None, None),
        ];
        let ds = ExpressionDataset::new(samples, vec!["CLC".into()], true, false);
        let raw = survival_raw(&ds, &["CLC".into()]).unwrap();
        assert_eq!(raw.height(), 1);
        assert_eq!(raw.get_column_names_str(), vec!["sample", "time", "event", "CLC"]);
    }

    #[test]
    fn pam50_sheets_cover_normal() {
        let subtypes = [Pam50Subtype::LumA, Pam50Subtype::LumA, Pam50Subtype::Basal, Pam50Subtype::Normal, Pam50Subtype::Normal];
        let samples = subtypes
            .iter()
            .enumerate()
            .map(|(i, st)| {
                let clc = if i % 2 == 0 { 1.0 } else { 0.0 };
                sample(&format!("S{i}"), &[("CLC", clc)], Some((2.0 + i as f64, i % 2 == 0)), Some(*st))
            })
            .collect();
        let ds = ExpressionDataset::new(samples, vec!["CLC".into()], true, true);
        let config = AnalysisConfig {
            genes: vec!["CLC".into()],
            ..AnalysisConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        run_combination_report(&ds, &config, Path::new("combined.csv"), dir.path()).unwrap();

        let report = dir.path().join("report");
        let counts = read_csv(&report.join("counts_pam50.csv")).unwrap();
        assert_eq!(counts.height(), 5);
        let percent: f64 = counts.column("percent").unwrap().f64().unwrap().into_no_null_iter().sum();
        assert_abs_diff_eq!(percent, 100.0, epsilon = 1e-9);

        let crosstab = read_csv(&report.join("crosstab_pam50.csv")).unwrap();
        assert!(crosstab.get_column_names_str().contains(&"Normal"));
    }

    #[test]
    fn raw_sheets_keep_headers_when_empty() {
        let samples = vec![sample("A", &[("CLC", 1.0)], None, None)];
        let ds = ExpressionDataset::new(samples, vec!["CLC".into()], false, false);
        let genes = vec!["CLC".to_string()];

        let survival = survival_raw(&ds, &genes).unwrap();
        assert_eq!(survival.height(), 0);
        assert_eq!(survival.get_column_names_str(), vec!["sample", "time", "event", "CLC"]);
        assert_eq!(survival.column("event").unwrap().dtype(), &DataType::Int32);

        let subtype = subtype_raw(&ds, &genes).unwrap();
        assert_eq!(subtype.height(), 0);
        assert_eq!(subtype.get_column_names_str(), vec!["sample", "subtype", "CLC"]);
    }
}
