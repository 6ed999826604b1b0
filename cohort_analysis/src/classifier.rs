//! Expression-status rules.
//!
//! A gene is expressed in a sample iff its value is strictly positive. Null
//! cells are not expressed.

use std::collections::BTreeSet;

use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::{AnalysisError, Result};
use crate::models::Sample;

/// Label used when no gene of a combination is expressed.
pub const NONE_LABEL: &str = "None";

pub fn is_expressed(value: f64) -> bool {
    value > 0.0
}

pub fn gene_expressed(sample: &Sample, gene: &str) -> bool {
    sample.expression(gene).is_some_and(is_expressed)
}

/// Expressed subset of `genes` in input order, and its size.
pub fn expression_profile<'g>(sample: &Sample, genes: &'g [String]) -> (Vec<&'g str>, usize) {
    let expressed: Vec<&str> = genes
        .iter()
        .map(String::as_str)
        .filter(|g| gene_expressed(sample, g))
        .collect();
    let n = expressed.len();
    (expressed, n)
}

pub fn all_expressed(sample: &Sample, genes: &[String]) -> bool {
    genes.iter().all(|g| gene_expressed(sample, g))
}

/// Sorted, deduplicated, `_`-joined.
pub fn canonical_group_name<S: AsRef<str>>(genes: &[S]) -> String {
    genes
        .iter()
        .map(|g| g.as_ref())
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join("_")
}

/// Canonical name of the expressed subset, `None` when empty.
pub fn combination_label(sample: &Sample, genes: &[String]) -> String {
    let (expressed, n) = expression_profile(sample, genes);
    if n == 0 {
        NONE_LABEL.to_string()
    } else {
        canonical_group_name(&expressed)
    }
}

/// Fails on the first gene that is not a column of the dataset.
pub fn validate_genes(dataset: &ExpressionDataset, genes: &[String]) -> Result<()> {
    match genes.iter().find(|g| !dataset.has_gene(g)) {
        Some(missing) => Err(AnalysisError::missing_column(missing, "gene")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::expression_table::tests::sample;

    fn genes(list: &[&str]) -> Vec<String> {
        list.iter().map(|g| g.to_string()).collect()
    }

    #[test]
    fn zero_is_not_expressed() {
        assert!(!is_expressed(0.0));
        assert!(!is_expressed(-0.5));
        assert!(is_expressed(1e-12));
    }

    #[test]
    fn null_cell_is_not_expressed() {
        let s = sample("S1", &[("CLC", 2.0)], None, None);
        assert!(gene_expressed(&s, "CLC"));
        assert!(!gene_expressed(&s, "EPX"));
    }

    #[test]
    fn profile_and_and_group() {
        let s = sample("S1", &[("CLC", 2.0), ("EPX", 0.0), ("PRG2", 0.3)], None, None);
        let panel = genes(&["PRG2", "EPX", "CLC"]);
        let (expressed, n) = expression_profile(&s, &panel);
        assert_eq!(expressed, vec!["PRG2", "CLC"]);
        assert_eq!(n, 2);
        assert!(!all_expressed(&s, &panel));
        assert!(all_expressed(&s, &genes(&["CLC", "PRG2"])));
    }

    #[test]
    fn canonical_name_is_order_free() {
        assert_eq!(
            canonical_group_name(&["PRG2", "CLC", "EPX"]),
            canonical_group_name(&["EPX", "PRG2", "CLC", "CLC"])
        );
        assert_eq!(canonical_group_name(&["PRG2", "CLC"]), "CLC_PRG2");
    }

    #[test]
    fn combination_label_defaults_to_none() {
        let panel = genes(&["CLC", "EPX"]);
        let s = sample("S1", &[("CLC", 0.0)], None, None);
        assert_eq!(combination_label(&s, &panel), NONE_LABEL);
        let s = sample("S2", &[("EPX", 1.0), ("CLC", 3.0)], None, None);
        assert_eq!(combination_label(&s, &panel), "CLC_EPX");
    }

    #[test]
    fn validation_names_missing_gene() {
        let ds = ExpressionDataset::new(vec![], genes(&["CLC"]), true, true);
        let err = validate_genes(&ds, &genes(&["CLC", "IL5RA"])).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingColumn { ref column, .. } if column == "IL5RA"));
    }
}
