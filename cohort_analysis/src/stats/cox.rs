//! Univariate Cox proportional hazards with Efron tie handling.

use statrs::distribution::ContinuousCDF;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::models::{HazardRatio, SurvivalRecord, TestResult};
use crate::stats::{standard_normal, z_for_confidence};

#[derive(Debug, Clone, Copy)]
pub struct CoxOptions {
    pub min_samples: usize,
    pub min_events: usize,
    pub confidence: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for CoxOptions {
    fn default() -> Self {
        Self {
            min_samples: 11,
            min_events: 2,
            confidence: 0.95,
            max_iterations: 50,
            tolerance: 1e-9,
        }
    }
}

/// Beyond this |β| the fit is treated as diverging (monotone likelihood).
const MAX_ABS_BETA: f64 = 40.0;
const MAX_HALVINGS: usize = 30;

/// Log partial likelihood with its first and (negated) second derivative.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Derivatives {
    pub loglik: f64,
    pub score: f64,
    pub information: f64,
}

/// Efron approximation evaluated at `beta`. `x` should be centred.
pub(crate) fn efron_derivatives(x: &[f64], records: &[SurvivalRecord], beta: f64) -> Derivatives {
    // shift keeps exp() finite; it cancels in score/information
    let shift = x
        .iter()
        .map(|&xi| beta * xi)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut event_times: Vec<f64> = records.iter().filter(|r| r.event).map(|r| r.time).collect();
    event_times.sort_by(|a, b| a.total_cmp(b));
    event_times.dedup();

    let mut loglik = 0.0;
    let mut score = 0.0;
    let mut information = 0.0;

    for &t in &event_times {
        let (mut s0, mut s1, mut s2) = (0.0, 0.0, 0.0);
        let (mut d0, mut d1, mut d2) = (0.0, 0.0, 0.0);
        let mut d = 0usize;
        let mut x_events = 0.0;

        for (xi, r) in x.iter().zip(records) {
            if r.time < t {
                continue;
            }
            let w = (beta * xi - shift).exp();
            s0 += w;
            s1 += w * xi;
            s2 += w * xi * xi;
            if r.event && r.time == t {
                d += 1;
                d0 += w;
                d1 += w * xi;
                d2 += w * xi * xi;
                x_events += xi;
            }
        }

        loglik += beta * x_events;
        score += x_events;
        for l in 0..d {
            let f = l as f64 / d as f64;
            let a0 = s0 - f * d0;
            let a1 = s1 - f * d1;
            let a2 = s2 - f * d2;
            let mean = a1 / a0;
            loglik -= a0.ln() + shift;
            score -= mean;
            information += a2 / a0 - mean * mean;
        }
    }

    Derivatives {
        loglik,
        score,
        information,
    }
}

/// Fits `h(t|x) = h0(t) exp(βx)` and reports HR = exp(β) with its CI and the
/// Wald p-value.
pub fn cox_univariate(x: &[f64], records: &[SurvivalRecord], opts: &CoxOptions) -> Result<TestResult> {
    if x.len() != records.len() {
        return Err(AnalysisError::numerical(format!(
            "covariate length {} != survival length {}",
            x.len(),
            records.len()
        )));
    }
    let n = x.len();
    let events = records.iter().filter(|r| r.event).count();
    if n < opts.min_samples {
        return Err(AnalysisError::insufficient_data(format!(
            "{n} complete rows, need at least {}",
            opts.min_samples
        )));
    }
    if events < opts.min_events {
        return Err(AnalysisError::insufficient_data(format!(
            "{events} events, need at least {}",
            opts.min_events
        )));
    }

    let mean = x.iter().sum::<f64>() / n as f64;
    let centred: Vec<f64> = x.iter().map(|v| v - mean).collect();
    if centred.iter().all(|v| v.abs() < 1e-12) {
        return Err(AnalysisError::numerical("covariate is constant"));
    }

    // Newton–Raphson with step halving, starting at β = 0
    let mut beta = 0.0;
    let mut current = efron_derivatives(&centred, records, beta);
    let mut converged = false;

    for iteration in 0..opts.max_iterations {
        if current.information <= 0.0 || !current.information.is_finite() {
            return Err(AnalysisError::numerical("non-positive information"));
        }
        let mut step = current.score / current.information;
        let mut candidate = efron_derivatives(&centred, records, beta + step);
        let mut halvings = 0;
        while !(candidate.loglik.is_finite() && candidate.loglik >= current.loglik - 1e-12) {
            if halvings == MAX_HALVINGS {
                return Err(AnalysisError::numerical("step halving failed"));
            }
            step /= 2.0;
            candidate = efron_derivatives(&centred, records, beta + step);
            halvings += 1;
        }

        beta += step;
        let delta = (candidate.loglik - current.loglik).abs();
        current = candidate;
        debug!("Cox iteration {iteration}: beta={beta:.6}, loglik={:.6}", current.loglik);

        if beta.abs() > MAX_ABS_BETA {
            return Err(AnalysisError::numerical(format!(
                "coefficient diverges (|beta| > {MAX_ABS_BETA})"
            )));
        }
        if delta < opts.tolerance * (1.0 + current.loglik.abs()) && step.abs() < 1e-6 {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(AnalysisError::numerical(format!(
            "Newton-Raphson did not converge in {} iterations",
            opts.max_iterations
        )));
    }
    if current.information <= 0.0 {
        return Err(AnalysisError::numerical("non-positive information at the estimate"));
    }

    let se = 1.0 / current.information.sqrt();
    let z = beta / se;
    let p_value = 2.0 * standard_normal()?.sf(z.abs());
    let zq = z_for_confidence(opts.confidence)?;

    Ok(TestResult {
        statistic: z,
        dof: 1,
        p_value,
        hazard: Some(HazardRatio {
            ratio: beta.exp(),
            ci_lower: (beta - zq * se).exp(),
            ci_upper: (beta + zq * se).exp(),
        }),
    })
}
