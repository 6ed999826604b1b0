use std::fs;
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::{plot_survival, skip_or_fail, slug};
use crate::cohorts::{aggregate_expression, median_split, MedianSplit};
use crate::comparator::compare_survival;
use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::Result;
use crate::models::{Comparison, TestKind};
use crate::report::tables::{write_comparisons, write_sheet};

const EXCLUDED_LABEL: &str = "Excluded";

/// Per-sample aggregate, group and median of one split.
fn assignments(dataset: &ExpressionDataset, split: &MedianSplit) -> PolarsResult<DataFrame> {
    let mut ids = Vec::with_capacity(dataset.len());
    let mut sums = Vec::with_capacity(dataset.len());
    let mut groups = Vec::with_capacity(dataset.len());
    for sample in dataset.samples() {
        let group = split
            .set
            .cohorts
            .iter()
            .find(|c| c.contains(&sample.id))
            .map(|c| c.name.as_str())
            .unwrap_or(EXCLUDED_LABEL);
        ids.push(sample.id.as_str());
        sums.push(aggregate_expression(sample, &split.genes_used));
        groups.push(group);
    }
    let medians = vec![split.median; ids.len()];

    df![
        "sample" => ids,
        "aggregate_expression" => sums,
        "median" => medians,
        "group" => groups,
    ]
}

/// High vs Low aggregate expression per configured panel.
pub fn run_median_split_analysis(
    dataset: &ExpressionDataset,
    config: &AnalysisConfig,
    out_dir: &Path,
) -> Result<Vec<Comparison>> {
    let out_dir = out_dir.join("median_split");
    fs::create_dir_all(&out_dir)?;
    let mut comparisons = Vec::new();

    for panel in &config.panels {
        info!("Median split on panel {} ({:?})", panel.name, panel.tie_policy);
        let split = match median_split(dataset, panel) {
            Ok(split) => split,
            Err(e) => {
                comparisons.push(skip_or_fail(&panel.name, TestKind::LogRank, e)?);
                continue;
            }
        };
        info!(
            "Panel {}: median {:.4}, High {}, Low {}, excluded {}",
            panel.name,
            split.median,
            split.set.cohort(crate::cohorts::HIGH_LABEL).map_or(0, |c| c.len()),
            split.set.cohort(crate::cohorts::LOW_LABEL).map_or(0, |c| c.len()),
            split.excluded()
        );

        let comparison = compare_survival(dataset, &split.set, config);
        plot_survival(
            dataset,
            &split.set,
            &comparison,
            config,
            &out_dir.join(format!("{}_km.png", slug(&panel.name))),
            &format!("Aggregate expression of {}", split.genes_used.join(", ")),
        );

        let mut sheet = assignments(dataset, &split)?;
        write_sheet(&out_dir, &format!("{}_groups", slug(&panel.name)), &mut sheet)?;
        comparisons.push(comparison);
    }

    write_comparisons(&out_dir, &comparisons)?;
    Ok(comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenePanel, TiePolicy};
    use crate::data_handling::expression_table::tests::sample;

    #[test]
    fn reports_exclusions_and_writes_groups() {
        let values = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 5.0];
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, v)| sample(&format!("S{i}"), &[("IL33", *v)], Some((1.0 + i as f64, i % 2 == 1)), None))
            .collect();
        let ds = ExpressionDataset::new(samples, vec!["IL33".into()], true, false);
        let config = AnalysisConfig {
            panels: vec![GenePanel {
                name: "IL33_TSLP".into(),
                genes: vec!["IL33".into(), "TSLP".into()],
                tie_policy: TiePolicy::Strict,
            }],
            ..AnalysisConfig::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let comparisons = run_median_split_analysis(&ds, &config, dir.path()).unwrap();
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].excluded_at_median, 3);
        assert_eq!(comparisons[0].cohorts.len(), 2);

        let groups = crate::helper_functions::read_csv(&dir.path().join("median_split/IL33_TSLP_groups.csv")).unwrap();
        let excluded = groups
            .column("group")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .filter(|g| *g == Some(EXCLUDED_LABEL))
            .count();
        assert_eq!(excluded, 3);
    }
}
