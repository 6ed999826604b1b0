use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::Result;
use crate::models::Pam50Subtype;
use crate::report::plots::plot_count_bars;
use crate::report::tables::write_sheet;
use crate::stats::wilson::wilson_margin;
use crate::summary::subtype_counts;

/// Counts of the four clinical subtypes. Percentages and error bars are
/// relative to every classified sample, `Normal` included.
pub fn run_subtype_summary(dataset: &ExpressionDataset, confidence: f64, out_dir: &Path) -> Result<()> {
    dataset.require_subtype()?;
    let out_dir = out_dir.join("subtypes");
    fs::create_dir_all(&out_dir)?;

    let subtypes = Pam50Subtype::CLINICAL;
    let mut frame = subtype_counts(dataset, &subtypes)?;
    let path = write_sheet(&out_dir, "subtype_counts", &mut frame)?;
    info!("Saved subtype counts to {}", path.display());

    let classified = dataset.samples().iter().filter(|s| s.subtype.is_some()).count();
    let counts: Vec<usize> = frame
        .column("count")?
        .u32()?
        .into_no_null_iter()
        .map(|c| c as usize)
        .collect();
    let margins = counts
        .iter()
        .map(|&k| wilson_margin(k, classified, confidence).map(|m| m * classified as f64))
        .collect::<Result<Vec<f64>>>()?;
    let categories: Vec<String> = subtypes.iter().map(|s| s.label().to_string()).collect();

    let png = out_dir.join("subtype_counts.png");
    if let Err(e) = plot_count_bars(
        &png,
        &format!("PAM50 subtypes (n={classified})"),
        &categories,
        &counts,
        &margins,
        "Patients",
    ) {
        error!("Failed to draw {}: {e}", png.display());
    }
    Ok(())
}
