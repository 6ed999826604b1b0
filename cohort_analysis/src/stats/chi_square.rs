//! Chi-square test of independence on a cohort × category table.

use ndarray::{Array2, Axis};
use tracing::warn;

use crate::error::{AnalysisError, Result};
use crate::models::TestResult;
use crate::stats::chi_square_sf;

#[derive(Debug, Clone, PartialEq)]
pub struct ContingencyTable {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub counts: Array2<u64>,
}

impl ContingencyTable {
    /// Counts `(row, column)` pairs. Pairs naming an unknown row or column
    /// are ignored; rows and columns keep the given order.
    pub fn from_pairs<'a, I>(rows: Vec<String>, columns: Vec<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut counts = Array2::<u64>::zeros((rows.len(), columns.len()));
        for (r, c) in pairs {
            let ri = rows.iter().position(|x| x == r);
            let ci = columns.iter().position(|x| x == c);
            if let (Some(ri), Some(ci)) = (ri, ci) {
                counts[[ri, ci]] += 1;
            }
        }
        Self { rows, columns, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.sum_axis(Axis(1)).to_vec()
    }

    pub fn column_totals(&self) -> Vec<u64> {
        self.counts.sum_axis(Axis(0)).to_vec()
    }
}

/// Pearson chi-square of independence; Yates-corrected when dof = 1.
pub fn chi_square_independence(table: &ContingencyTable) -> Result<TestResult> {
    let (n_rows, n_cols) = table.counts.dim();
    if n_rows < 2 || n_cols < 2 {
        return degenerate(format!("{n_rows}x{n_cols} table"));
    }

    let row_totals = table.row_totals();
    let col_totals = table.column_totals();
    if let Some(i) = row_totals.iter().position(|&t| t == 0) {
        return degenerate(format!("row `{}` is empty", table.rows[i]));
    }
    if let Some(j) = col_totals.iter().position(|&t| t == 0) {
        return degenerate(format!("column `{}` is empty", table.columns[j]));
    }

    let total = table.total() as f64;
    let dof = (n_rows - 1) * (n_cols - 1);
    let yates = dof == 1;

    let mut statistic = 0.0;
    for ((i, j), &obs) in table.counts.indexed_iter() {
        let expected = row_totals[i] as f64 * col_totals[j] as f64 / total;
        let mut diff = (obs as f64 - expected).abs();
        if yates {
            diff -= diff.min(0.5);
        }
        statistic += diff * diff / expected;
    }

    Ok(TestResult {
        statistic,
        dof,
        p_value: chi_square_sf(statistic, dof)?,
        hazard: None,
    })
}

fn degenerate(reason: String) -> Result<TestResult> {
    warn!("Chi-square not computed: {reason}");
    Err(AnalysisError::degenerate(reason))
}
