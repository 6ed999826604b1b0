use std::fs;
use std::path::Path;

use tracing::info;

use crate::analysis::{skip_or_fail, survival_and_subtypes};
use crate::cohorts::{all_expressed_split, presence_split};
use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::Result;
use crate::models::{Comparison, TestKind};
use crate::report::tables::write_comparisons;

/// Expressed vs not expressed, per configured gene and for the AND-group of
/// all of them against everyone else.
pub fn run_presence_analysis(
    dataset: &ExpressionDataset,
    config: &AnalysisConfig,
    out_dir: &Path,
) -> Result<Vec<Comparison>> {
    let out_dir = out_dir.join("presence");
    fs::create_dir_all(&out_dir)?;
    let mut comparisons = Vec::new();

    // ── 1) One gene at a time ───────────────────────────────────────────────
    for gene in &config.genes {
        info!("Presence split on {gene}");
        match presence_split(dataset, gene) {
            Ok(set) => comparisons.extend(survival_and_subtypes(dataset, &set, config, &out_dir, gene)),
            Err(e) => comparisons.push(skip_or_fail(gene, TestKind::LogRank, e)?),
        }
    }

    // ── 2) All genes together vs Others ─────────────────────────────────────
    if config.genes.len() > 1 {
        match all_expressed_split(dataset, &config.genes, &config.others_label) {
            Ok(set) => {
                let stem = format!("all_{}", set.dimension);
                comparisons.extend(survival_and_subtypes(dataset, &set, config, &out_dir, &stem));
            }
            Err(e) => {
                let name = crate::classifier::canonical_group_name(&config.genes);
                comparisons.push(skip_or_fail(&name, TestKind::LogRank, e)?);
            }
        }
    }

    write_comparisons(&out_dir, &comparisons)?;
    Ok(comparisons)
}
