use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use polars::prelude::*;
use tracing::{error, info, warn};

use crate::data_handling::tcga_barcodes::{sample_type_code, sample_type_description};
use crate::error::Result;
use crate::report::plots::plot_count_bars;
use crate::report::tables::write_sheet;
use crate::stats::wilson::wilson_margin;

/// Counts per sample-type code, sorted by code.
pub fn sample_type_counts(barcodes: &[&str]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for barcode in barcodes {
        *counts.entry(sample_type_code(barcode)).or_insert(0) += 1;
    }
    counts
}

/// Tabulates the TCGA sample types of the barcodes in the first column of
/// `df`.
pub fn run_sample_types(df: &DataFrame, confidence: f64, out_dir: &Path) -> Result<()> {
    let out_dir = out_dir.join("sample_types");
    fs::create_dir_all(&out_dir)?;

    let Some(first) = df.get_columns().first() else {
        warn!("Input table has no columns, no sample types to count");
        return Ok(());
    };
    let ids = first.cast(&DataType::String)?;
    let barcodes: Vec<&str> = ids.str()?.into_iter().flatten().collect();
    let total = barcodes.len();
    if total == 0 {
        warn!("No barcodes in column `{}`", first.name());
        return Ok(());
    }
    let counts = sample_type_counts(&barcodes);
    info!("{total} barcodes, {} sample types", counts.len());

    let codes: Vec<&str> = counts.keys().map(String::as_str).collect();
    let descriptions: Vec<&str> = codes.iter().map(|c| sample_type_description(c)).collect();
    let values: Vec<usize> = counts.values().copied().collect();
    let percents: Vec<f64> = values.iter().map(|&c| 100.0 * c as f64 / total as f64).collect();
    let margins = values
        .iter()
        .map(|&k| wilson_margin(k, total, confidence).map(|m| m * total as f64))
        .collect::<Result<Vec<f64>>>()?;

    let mut frame = df![
        "code" => &codes,
        "description" => &descriptions,
        "count" => values.iter().map(|&c| c as u32).collect::<Vec<_>>(),
        "percent" => &percents,
        "error_margin" => &margins,
    ]?;
    let path = write_sheet(&out_dir, "sample_types", &mut frame)?;
    info!("Saved sample-type counts to {}", path.display());

    let categories: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    let png = out_dir.join("sample_types.png");
    if let Err(e) = plot_count_bars(
        &png,
        &format!("TCGA sample types (n={total})"),
        &categories,
        &values,
        &margins,
        "Samples",
    ) {
        error!("Failed to draw {}: {e}", png.display());
    }
    Ok(())
}
