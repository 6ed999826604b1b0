//! Statistical tests behind the comparisons.

use ndarray::{Array1, Array2};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::{AnalysisError, Result};

pub mod chi_square;
pub mod cox;
pub mod kaplan_meier;
pub mod logrank;
pub mod wilson;

/// `p < 0.001` below a thousandth, `p = x.xxx` otherwise.
pub fn format_p_value(p: f64) -> String {
    if p < 0.001 {
        "p < 0.001".to_string()
    } else {
        format!("p = {p:.3}")
    }
}

/// Upper tail of the chi-square distribution.
pub fn chi_square_sf(statistic: f64, dof: usize) -> Result<f64> {
    let dist = ChiSquared::new(dof as f64)
        .map_err(|e| AnalysisError::numerical(format!("chi-square({dof}): {e}")))?;
    Ok(dist.sf(statistic.max(0.0)))
}

pub(crate) fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| AnalysisError::numerical(e.to_string()))
}

/// Two-sided z quantile for a confidence level, e.g. 1.96 for 0.95.
pub fn z_for_confidence(confidence: f64) -> Result<f64> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(AnalysisError::numerical(format!(
            "confidence level {confidence} outside (0, 1)"
        )));
    }
    Ok(standard_normal()?.inverse_cdf(1.0 - (1.0 - confidence) / 2.0))
}

/// Gaussian elimination with partial pivoting.
pub(crate) fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(AnalysisError::numerical("matrix dimensions mismatch"));
    }

    let mut a = a.clone();
    let mut b = b.clone();

    for i in 0..n {
        let pivot = (i..n)
            .max_by(|&r, &s| a[[r, i]].abs().total_cmp(&a[[s, i]].abs()))
            .unwrap_or(i);
        if a[[pivot, i]].abs() < 1e-12 {
            return Err(AnalysisError::numerical("singular variance matrix"));
        }
        if pivot != i {
            for j in 0..n {
                a.swap([i, j], [pivot, j]);
            }
            b.swap(i, pivot);
        }
        for k in i + 1..n {
            let factor = a[[k, i]] / a[[i, i]];
            for j in i..n {
                a[[k, j]] -= factor * a[[i, j]];
            }
            b[k] -= factor * b[i];
        }
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut acc = b[i];
        for j in i + 1..n {
            acc -= a[[i, j]] * x[j];
        }
        x[i] = acc / a[[i, i]];
    }
    Ok(x)
}
