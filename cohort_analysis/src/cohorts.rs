//! Cohort construction from the immutable dataset snapshot.
//!
//! Every builder returns a fresh [`CohortSet`]; nothing is written back into
//! the samples.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::classifier::{all_expressed, canonical_group_name, combination_label, gene_expressed, validate_genes};
use crate::config::{GenePanel, TiePolicy};
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::{AnalysisError, Result};
use crate::models::{Cohort, CohortSet, Sample};

pub const HIGH_LABEL: &str = "High";
pub const LOW_LABEL: &str = "Low";

pub fn expressed_label(gene: &str) -> String {
    format!("Expressed {gene}")
}

pub fn not_expressed_label(gene: &str) -> String {
    format!("Not expressed {gene}")
}

// ─── Presence ────────────────────────────────────────────────────────────────

/// `Expressed G` / `Not expressed G` over every sample.
pub fn presence_split(dataset: &ExpressionDataset, gene: &str) -> Result<CohortSet> {
    validate_genes(dataset, &[gene.to_string()])?;

    let mut expressed = Cohort::new(expressed_label(gene));
    let mut not_expressed = Cohort::new(not_expressed_label(gene));
    for sample in dataset.samples() {
        if gene_expressed(sample, gene) {
            expressed.sample_ids.push(sample.id.clone());
        } else {
            not_expressed.sample_ids.push(sample.id.clone());
        }
    }
    debug!(
        "{gene}: {} expressed, {} not expressed",
        expressed.len(),
        not_expressed.len()
    );

    Ok(CohortSet::new(gene, vec![expressed, not_expressed], Vec::new()))
}

/// Samples expressing every gene vs everyone else.
pub fn all_expressed_split(
    dataset: &ExpressionDataset,
    genes: &[String],
    others_label: &str,
) -> Result<CohortSet> {
    validate_genes(dataset, genes)?;

    let name = canonical_group_name(genes);
    let mut group = Cohort::new(name.clone());
    let mut others = Cohort::new(others_label);
    for sample in dataset.samples() {
        if all_expressed(sample, genes) {
            group.sample_ids.push(sample.id.clone());
        } else {
            others.sample_ids.push(sample.id.clone());
        }
    }

    Ok(CohortSet::new(name, vec![group, others], Vec::new()))
}

/// One cohort per combination label (expressed subset or `None`).
pub fn combination_groups(dataset: &ExpressionDataset, genes: &[String]) -> Result<CohortSet> {
    validate_genes(dataset, genes)?;

    let mut groups: BTreeMap<String, Cohort> = BTreeMap::new();
    for sample in dataset.samples() {
        let label = combination_label(sample, genes);
        groups
            .entry(label.clone())
            .or_insert_with(|| Cohort::new(label))
            .sample_ids
            .push(sample.id.clone());
    }

    Ok(CohortSet::new(
        canonical_group_name(genes),
        groups.into_values().collect(),
        Vec::new(),
    ))
}

// ─── Median split ────────────────────────────────────────────────────────────

/// Sum over `genes`; null cells contribute 0.
pub fn aggregate_expression(sample: &Sample, genes: &[String]) -> f64 {
    genes
        .iter()
        .map(|g| sample.expression(g).unwrap_or(0.0))
        .sum()
}

/// Mean of the two middle values for even n. `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[derive(Debug, Clone)]
pub struct MedianSplit {
    pub median: f64,
    /// Genes that actually entered the sum.
    pub genes_used: Vec<String>,
    pub set: CohortSet,
}

impl MedianSplit {
    /// Samples sitting exactly on the median (strict policy only).
    pub fn excluded(&self) -> usize {
        self.set.excluded.len()
    }
}

/// Splits every sample of the dataset at the median of its aggregate
/// expression over the panel genes.
pub fn median_split(dataset: &ExpressionDataset, panel: &GenePanel) -> Result<MedianSplit> {
    let mut genes_used: Vec<String> = Vec::new();
    for gene in &panel.genes {
        if genes_used.contains(gene) {
            continue;
        }
        if dataset.has_gene(gene) {
            genes_used.push(gene.clone());
        } else {
            warn!("Panel `{}`: gene {gene} not in dataset, left out of the sum", panel.name);
        }
    }
    if genes_used.is_empty() {
        return Err(AnalysisError::missing_column(
            panel.genes.join(", "),
            format!("panel {}", panel.name),
        ));
    }

    let scores: Vec<(&Sample, f64)> = dataset
        .samples()
        .iter()
        .map(|s| (s, aggregate_expression(s, &genes_used)))
        .collect();
    let values: Vec<f64> = scores.iter().map(|(_, v)| *v).collect();
    let median = median(&values)
        .ok_or_else(|| AnalysisError::insufficient_data(format!("panel {}: no samples", panel.name)))?;

    let mut high = Cohort::new(HIGH_LABEL);
    let mut low = Cohort::new(LOW_LABEL);
    let mut excluded = Vec::new();
    for (sample, value) in scores {
        let id = sample.id.clone();
        match panel.tie_policy {
            TiePolicy::Strict if value > median => high.sample_ids.push(id),
            TiePolicy::Strict if value < median => low.sample_ids.push(id),
            TiePolicy::Strict => excluded.push(id),
            TiePolicy::Inclusive if value >= median => high.sample_ids.push(id),
            TiePolicy::Inclusive => low.sample_ids.push(id),
        }
    }

    if !excluded.is_empty() {
        warn!(
            "Panel `{}`: {} samples equal to the median ({median}) excluded",
            panel.name,
            excluded.len()
        );
    }

    Ok(MedianSplit {
        median,
        genes_used,
        set: CohortSet::new(panel.name.clone(), vec![high, low], excluded),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::expression_table::tests::sample;
    use approx::assert_abs_diff_eq;

    fn scenario() -> ExpressionDataset {
        let values = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 5.0];
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, v)| sample(&format!("S{i}"), &[("CLC", *v)], Some((i as f64, i % 2 == 0)), None))
            .collect();
        ExpressionDataset::new(samples, vec!["CLC".into()], true, false)
    }

    fn panel(policy: TiePolicy) -> GenePanel {
        GenePanel {
            name: "CLC_panel".into(),
            genes: vec!["CLC".into(), "IL5".into()],
            tie_policy: policy,
        }
    }

    #[test]
    fn presence_is_a_partition() {
        let ds = scenario();
        let set = presence_split(&ds, "CLC").unwrap();
        assert_eq!(set.cohort("Expressed CLC").unwrap().len(), 7);
        assert_eq!(set.cohort("Not expressed CLC").unwrap().len(), 3);
        assert_eq!(set.assigned(), ds.len());
        for s in ds.samples() {
            let hits = set.cohorts.iter().filter(|c| c.contains(&s.id)).count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn presence_of_unknown_gene_fails() {
        assert!(matches!(
            presence_split(&scenario(), "EPX"),
            Err(AnalysisError::MissingColumn { .. })
        ));
    }

    #[test]
    fn strict_median_excludes_ties() {
        let ds = scenario();
        let split = median_split(&ds, &panel(TiePolicy::Strict)).unwrap();
        assert_abs_diff_eq!(split.median, 1.0);
        assert_eq!(split.set.cohort(HIGH_LABEL).unwrap().len(), 4);
        assert_eq!(split.set.cohort(LOW_LABEL).unwrap().len(), 3);
        assert_eq!(split.excluded(), 3);
        assert_eq!(split.set.assigned() + split.excluded(), ds.len());
        assert_eq!(split.genes_used, vec!["CLC".to_string()]);
    }

    #[test]
    fn inclusive_median_puts_ties_high() {
        let ds = scenario();
        let split = median_split(&ds, &panel(TiePolicy::Inclusive)).unwrap();
        assert_eq!(split.set.cohort(HIGH_LABEL).unwrap().len(), 7);
        assert_eq!(split.set.cohort(LOW_LABEL).unwrap().len(), 3);
        assert_eq!(split.excluded(), 0);
        assert_eq!(split.set.assigned(), ds.len());
    }

    #[test]
    fn panel_without_known_genes_fails() {
        let mut p = panel(TiePolicy::Strict);
        p.genes = vec!["TSLP".into()];
        assert!(matches!(
            median_split(&scenario(), &p),
            Err(AnalysisError::MissingColumn { .. })
        ));
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn aggregate_counts_null_as_zero() {
        let s = sample("A", &[("IL33", 1.5)], None, None);
        let genes = vec!["IL33".to_string(), "TSLP".to_string()];
        assert_abs_diff_eq!(aggregate_expression(&s, &genes), 1.5);
    }

    #[test]
    fn all_expressed_against_others() {
        let samples = vec![
            sample("A", &[("CLC", 1.0), ("EPX", 1.0)], None, None),
            sample("B", &[("CLC", 1.0), ("EPX", 0.0)], None, None),
            sample("C", &[("CLC", 0.0)], None, None),
        ];
        let ds = ExpressionDataset::new(samples, vec!["CLC".into(), "EPX".into()], false, false);
        let set = all_expressed_split(&ds, &["EPX".into(), "CLC".into()], "Others").unwrap();
        assert_eq!(set.dimension, "CLC_EPX");
        assert_eq!(set.cohort("CLC_EPX").unwrap().sample_ids, vec!["A"]);
        assert_eq!(set.cohort("Others").unwrap().len(), 2);

        let combos = combination_groups(&ds, &["CLC".into(), "EPX".into()]).unwrap();
        assert_eq!(combos.labels(), vec!["CLC", "CLC_EPX", "None"]);
    }
}
