// src/data_handling/tcga_merge.rs
// -----------------------------------------------------------------------------
// Joins the three raw TCGA downloads into one samples × (clinical, survival,
// genes) table. The expression matrix comes genes × samples and is turned
// around before the join.
// -----------------------------------------------------------------------------

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{error, info, warn};

use crate::helper_functions::{dataframe_to_csv, read_delimited};
use crate::models::{polars_err, Dataset};

const SAMPLE_COLUMN: &str = "sample";
const PATIENT_COLUMN: &str = "_PATIENT";

/// Three TSV files of one TCGA cohort.
pub struct TcgaRawTables {
    pub expression_path: PathBuf, // genes × samples, first column gene id
    pub clinical_path: PathBuf,   // first column sample id
    pub phenotype_path: PathBuf,  // survival/phenotype, first column sample id
}

impl Dataset for TcgaRawTables {
    fn load(&self) -> PolarsResult<DataFrame> {
        info!("Reading clinical data from {}", self.clinical_path.display());
        let clinical = with_sample_key(read_delimited(&self.clinical_path, b'\t')?)?;

        info!("Reading phenotype data from {}", self.phenotype_path.display());
        let mut phenotype = with_sample_key(read_delimited(&self.phenotype_path, b'\t')?)?;
        if phenotype.get_column_index(PATIENT_COLUMN).is_some() {
            phenotype = phenotype.drop(PATIENT_COLUMN)?;
            info!("Dropped duplicate `{PATIENT_COLUMN}` column from the phenotype table");
        }

        info!("Reading expression matrix from {}", self.expression_path.display());
        let matrix = read_delimited(&self.expression_path, b'\t')?;
        let expression = transpose_expression(&matrix)?;

        // Merge clinical with phenotype, then with expression
        let clinical_full = match clinical.join(
            &phenotype,
            [SAMPLE_COLUMN],
            [SAMPLE_COLUMN],
            JoinArgs::from(JoinType::Inner),
            None,
        ) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to join clinical and phenotype tables: {}", e);
                return Err(e);
            }
        };

        let merged = clinical_full.join(
            &expression,
            [SAMPLE_COLUMN],
            [SAMPLE_COLUMN],
            JoinArgs::from(JoinType::Inner),
            None,
        )?;

        if merged.height() == 0 {
            warn!("Merged table is empty; sample ids do not match between the three files");
        } else {
            info!("Merged table: {} samples x {} columns", merged.height(), merged.width());
        }
        Ok(merged)
    }
}

impl TcgaRawTables {
    /// Loads, merges and writes `<out>/<database>/<database>_combined_raw_data.csv`.
    pub fn write_combined(&self, out_dir: &Path, database: &str) -> PolarsResult<PathBuf> {
        if database.trim().is_empty() {
            return Err(polars_err("database name must not be empty".into()));
        }
        let mut merged = self.load()?;
        let path = out_dir
            .join(database)
            .join(format!("{database}_combined_raw_data.csv"));
        dataframe_to_csv(&mut merged, &path)?;
        info!("Saved combined data to {}", path.display());
        Ok(path)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Renames the first column to `sample` and casts it to String.
fn with_sample_key(mut df: DataFrame) -> PolarsResult<DataFrame> {
    let first = df
        .get_column_names()
        .first()
        .map(|c| c.to_string())
        .ok_or_else(|| polars_err("table has no columns".into()))?;
    if first != SAMPLE_COLUMN {
        df.rename(&first, PlSmallStr::from(SAMPLE_COLUMN))?;
    }
    let key = df.column(SAMPLE_COLUMN)?.cast(&DataType::String)?;
    df.with_column(key)?;
    Ok(df)
}

/// genes × samples → samples × genes. Repeated gene ids keep their first row.
pub fn transpose_expression(matrix: &DataFrame) -> PolarsResult<DataFrame> {
    let names = matrix.get_column_names_owned();
    let (gene_col, sample_cols) = names
        .split_first()
        .ok_or_else(|| polars_err("expression matrix has no columns".into()))?;

    let gene_ids = matrix.column(gene_col)?.cast(&DataType::String)?;
    let mut seen = HashSet::new();
    let mut rows: Vec<(usize, String)> = Vec::new();
    let mut duplicates = 0usize;
    for (i, gene) in gene_ids.str()?.into_iter().enumerate() {
        let Some(gene) = gene else { continue };
        if seen.insert(gene.to_string()) {
            rows.push((i, gene.to_string()));
        } else {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        warn!("{duplicates} repeated gene ids in the expression matrix, kept first occurrence");
    }

    let values: Vec<Vec<Option<f64>>> = sample_cols
        .iter()
        .map(|c| {
            let s = matrix.column(c)?.cast(&DataType::Float64)?;
            Ok(s.f64()?.into_iter().collect())
        })
        .collect::<PolarsResult<_>>()?;

    let mut columns: Vec<Column> = Vec::with_capacity(rows.len() + 1);
    let sample_ids: Vec<String> = sample_cols.iter().map(|s| s.to_string()).collect();
    columns.push(Column::new(PlSmallStr::from(SAMPLE_COLUMN), sample_ids));
    for (row, gene) in rows {
        let per_sample: Vec<Option<f64>> = values.iter().map(|col| col[row]).collect();
        columns.push(Column::new(PlSmallStr::from(gene.as_str()), per_sample));
    }

    DataFrame::new(columns)
}
