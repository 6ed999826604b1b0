use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::ExpressionDataset;
use crate::error::Result;
use crate::models::Pam50Subtype;
use crate::report::plots::plot_stacked_bars;
use crate::report::tables::write_sheet;
use crate::summary::subtype_expression_frequency;

/// Share of patients expressing each configured gene within each clinical
/// subtype. Genes absent from the dataset are left out.
pub fn run_subtype_expression(dataset: &ExpressionDataset, config: &AnalysisConfig, out_dir: &Path) -> Result<()> {
    dataset.require_subtype()?;
    let out_dir = out_dir.join("subtype_expression");
    fs::create_dir_all(&out_dir)?;

    let genes: Vec<String> = config
        .genes
        .iter()
        .filter(|g| dataset.has_gene(g))
        .cloned()
        .collect();
    let subtypes = Pam50Subtype::CLINICAL;
    let mut frame = subtype_expression_frequency(dataset, &subtypes, &genes)?;
    let path = write_sheet(&out_dir, "subtype_expression", &mut frame)?;
    info!("Saved subtype expression frequencies to {}", path.display());

    // frame rows are subtype-major, gene-minor
    let percents: Vec<f64> = frame.column("percent")?.f64()?.into_no_null_iter().collect();
    let segments: Vec<(String, Vec<f64>)> = genes
        .iter()
        .enumerate()
        .map(|(g, gene)| {
            let heights = (0..subtypes.len()).map(|s| percents[s * genes.len() + g]).collect();
            (gene.clone(), heights)
        })
        .collect();
    let categories: Vec<String> = subtypes.iter().map(|s| s.label().to_string()).collect();

    let png = out_dir.join("subtype_expression.png");
    if let Err(e) = plot_stacked_bars(
        &png,
        "Patients expressing each gene by PAM50 subtype",
        &categories,
        &segments,
        "Patients expressing (%)",
        None,
    ) {
        error!("Failed to draw {}: {e}", png.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::expression_table::tests::sample;
    use crate::helper_functions::read_csv;
    use Pam50Subtype::*;

    #[test]
    fn percentages_per_subtype_and_gene() {
        let samples = vec![
            sample("A", &[("CLC", 1.0), ("EPX", 0.0)], None, Some(LumA)),
            sample("B", &[("CLC", 0.0), ("EPX", 2.0)], None, Some(LumA)),
            sample("C", &[("CLC", 3.0), ("EPX", 1.0)], None, Some(Basal)),
            sample("D", &[("CLC", 3.0), ("EPX", 1.0)], None, Some(Normal)),
        ];
        let ds = ExpressionDataset::new(samples, vec!["CLC".into(), "EPX".into()], false, true);
        let config = AnalysisConfig {
            genes: vec!["CLC".into(), "EPX".into(), "PRG2".into()],
            ..AnalysisConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        run_subtype_expression(&ds, &config, dir.path()).unwrap();

        let df = read_csv(&dir.path().join("subtype_expression/subtype_expression.csv")).unwrap();
        // 4 clinical subtypes x 2 present genes, Normal left out
        assert_eq!(df.height(), 8);
        let percent: Vec<f64> = df.column("percent").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(&percent[..2], &[50.0, 50.0]);
        assert_eq!(&percent[6..], &[100.0, 100.0]);
    }

    #[test]
    fn needs_subtypes() {
        let ds = ExpressionDataset::new(vec![sample("A", &[("CLC", 1.0)], None, None)], vec!["CLC".into()], false, false);
        let dir = tempfile::tempdir().unwrap();
        assert!(run_subtype_expression(&ds, &AnalysisConfig::default(), dir.path()).is_err());
    }
}
