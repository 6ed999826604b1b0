use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::combinations::run_combination_report;
use crate::analysis::median_split::run_median_split_analysis;
use crate::analysis::presence::run_presence_analysis;
use crate::analysis::sample_types::run_sample_types;
use crate::analysis::subtype_expression::run_subtype_expression;
use crate::analysis::subtype_summary::run_subtype_summary;
use crate::config::AnalysisConfig;
use crate::data_handling::expression_table::{ExpressionDataset, ExpressionTable};
use crate::data_handling::tcga_merge::TcgaRawTables;
use crate::helper_functions::resolve_path;
use crate::models::Dataset;

mod analysis;
mod classifier;
mod cohorts;
mod comparator;
mod config;
mod data_handling;
mod error;
mod helper_functions;
mod models;
mod report;
mod stats;
mod summary;

#[derive(Parser)]
#[command(name = "cohort_analysis", version, about = "Survival and subtype cohort analyses of TCGA expression tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct Common {
    /// Merged expression table (CSV, TSV, TXT or XLSX)
    #[arg(long)]
    input: Option<PathBuf>,
    /// JSON configuration overriding the defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Join the raw expression, clinical and phenotype TSV files
    Merge {
        #[arg(long)]
        expression: PathBuf,
        #[arg(long)]
        clinical: PathBuf,
        #[arg(long)]
        phenotype: PathBuf,
        #[arg(long, default_value = "TCGA-BRCA")]
        database: String,
        #[arg(long, default_value = "data")]
        output: PathBuf,
    },
    /// Expressed vs not expressed, per gene and for all genes together
    Presence(Common),
    /// High vs Low aggregate expression of each gene panel
    MedianSplit(Common),
    /// Detailed report over the combination groups of the configured genes
    Report(Common),
    /// Share of patients expressing each gene per PAM50 subtype
    SubtypeExpression(Common),
    /// PAM50 subtype counts
    Subtypes(Common),
    /// TCGA sample-type counts from the barcodes
    SampleTypes(Common),
}

/// Input table, configuration and output directory of one analysis run.
struct RunContext {
    input: PathBuf,
    config: AnalysisConfig,
    out_dir: PathBuf,
}

impl RunContext {
    /// `None` when no input was given: there is nothing to analyse.
    fn resolve(common: &Common) -> anyhow::Result<Option<Self>> {
        let Some(input) = common.input.as_deref().map(resolve_path) else {
            warn!("No --input given, nothing to analyse");
            return Ok(None);
        };
        let config_path = common.config.as_deref().map(resolve_path);
        let mut config = AnalysisConfig::load(config_path.as_deref())
            .with_context(|| "failed to load the configuration")?;
        if let Some(dir) = &common.output_dir {
            config.output_dir = Some(resolve_path(dir));
        }
        let out_dir = config.resolve_output_dir(&input);
        let written = config.write_json(&out_dir)?;
        info!("Effective configuration written to {}", written.display());

        Ok(Some(Self { input, config, out_dir }))
    }

    fn table(&self) -> anyhow::Result<polars::prelude::DataFrame> {
        info!("Loading {}", self.input.display());
        let table = ExpressionTable {
            path: self.input.clone(),
            excel_sheet: self.config.excel_sheet.clone(),
        };
        table
            .load()
            .with_context(|| format!("failed to read {}", self.input.display()))
    }

    fn dataset(&self, genes: &[String]) -> anyhow::Result<ExpressionDataset> {
        let df = self.table()?;
        let dataset = ExpressionDataset::from_frame(&df, &self.config, genes)?;
        info!(
            "{} samples, {} of {} genes found",
            dataset.len(),
            dataset.genes().len(),
            genes.len()
        );
        if !dataset.missing_genes().is_empty() {
            warn!("Genes not in {}: {}", self.input.display(), dataset.missing_genes().join(", "));
        }
        Ok(dataset)
    }
}

fn panel_genes(config: &AnalysisConfig) -> Vec<String> {
    let mut genes: Vec<String> = Vec::new();
    for gene in config.panels.iter().flat_map(|p| &p.genes) {
        if !genes.contains(gene) {
            genes.push(gene.clone());
        }
    }
    genes
}

fn merge(expression: &Path, clinical: &Path, phenotype: &Path, database: &str, output: &Path) -> anyhow::Result<()> {
    let tables = TcgaRawTables {
        expression_path: resolve_path(expression),
        clinical_path: resolve_path(clinical),
        phenotype_path: resolve_path(phenotype),
    };
    let path = tables.write_combined(&resolve_path(output), database)?;
    info!("Combined table ready at {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting cohort analysis");

    let common = match &cli.command {
        Command::Merge {
            expression,
            clinical,
            phenotype,
            database,
            output,
        } => return merge(expression, clinical, phenotype, database, output),
        Command::Presence(c)
        | Command::MedianSplit(c)
        | Command::Report(c)
        | Command::SubtypeExpression(c)
        | Command::Subtypes(c)
        | Command::SampleTypes(c) => c,
    };
    let Some(ctx) = RunContext::resolve(common)? else {
        return Ok(());
    };

    match &cli.command {
        Command::Presence(_) => {
            let dataset = ctx.dataset(&ctx.config.genes)?;
            let comparisons = run_presence_analysis(&dataset, &ctx.config, &ctx.out_dir)?;
            info!("Presence analysis done: {} comparisons", comparisons.len());
        }
        Command::MedianSplit(_) => {
            let dataset = ctx.dataset(&panel_genes(&ctx.config))?;
            let comparisons = run_median_split_analysis(&dataset, &ctx.config, &ctx.out_dir)?;
            info!("Median-split analysis done: {} comparisons", comparisons.len());
        }
        Command::Report(_) => {
            let dataset = ctx.dataset(&ctx.config.genes)?;
            let comparisons = run_combination_report(&dataset, &ctx.config, &ctx.input, &ctx.out_dir)?;
            info!("Report done: {} comparisons", comparisons.len());
        }
        Command::SubtypeExpression(_) => {
            let dataset = ctx.dataset(&ctx.config.genes)?;
            run_subtype_expression(&dataset, &ctx.config, &ctx.out_dir)?;
        }
        Command::Subtypes(_) => {
            let dataset = ctx.dataset(&[])?;
            run_subtype_summary(&dataset, ctx.config.confidence_level, &ctx.out_dir)?;
        }
        Command::SampleTypes(_) => {
            let df = ctx.table()?;
            run_sample_types(&df, ctx.config.confidence_level, &ctx.out_dir)?;
        }
        Command::Merge { .. } => {}
    }

    info!("Results in {}", ctx.out_dir.display());
    Ok(())
}
