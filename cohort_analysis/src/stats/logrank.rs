//! Log-rank tests for two or more groups.

use ndarray::{Array1, Array2};

use crate::error::{AnalysisError, Result};
use crate::models::{SurvivalRecord, TestResult};
use crate::stats::{chi_square_sf, solve_linear_system};

/// Two-group log-rank test. Each group needs at least `min_group_size`
/// records.
pub fn log_rank(
    group_a: &[SurvivalRecord],
    group_b: &[SurvivalRecord],
    min_group_size: usize,
) -> Result<TestResult> {
    for (label, group) in [("first", group_a), ("second", group_b)] {
        if group.len() < min_group_size {
            return Err(AnalysisError::insufficient_data(format!(
                "{label} group has {} samples with survival, need {min_group_size}",
                group.len()
            )));
        }
    }
    multivariate_log_rank(&[group_a, group_b])
}

/// K-group log-rank: `(O−E)ᵀ V⁻¹ (O−E)` over the first K−1 groups, chi-square
/// with K−1 degrees of freedom.
pub fn multivariate_log_rank(groups: &[&[SurvivalRecord]]) -> Result<TestResult> {
    let k = groups.len();
    if k < 2 {
        return Err(AnalysisError::insufficient_data(format!(
            "log-rank needs at least two groups, got {k}"
        )));
    }

    // Distinct event times
    let mut event_times: Vec<f64> = groups
        .iter()
        .flat_map(|g| g.iter().filter(|r| r.event).map(|r| r.time))
        .collect();
    event_times.sort_by(|a, b| a.total_cmp(b));
    event_times.dedup();
    if event_times.is_empty() {
        return Err(AnalysisError::insufficient_data("no events in any group"));
    }

    let mut observed = Array1::<f64>::zeros(k);
    let mut expected = Array1::<f64>::zeros(k);
    let mut variance = Array2::<f64>::zeros((k, k));

    let mut at_risk = vec![0.0f64; k];
    let mut deaths = vec![0.0f64; k];
    for &t in &event_times {
        for (g, group) in groups.iter().enumerate() {
            at_risk[g] = group.iter().filter(|r| r.time >= t).count() as f64;
            deaths[g] = group.iter().filter(|r| r.event && r.time == t).count() as f64;
        }
        let n: f64 = at_risk.iter().sum();
        let d: f64 = deaths.iter().sum();
        if n <= 0.0 {
            continue;
        }
        let scale = if n > 1.0 { d * (n - d) / (n - 1.0) } else { 0.0 };

        for i in 0..k {
            let pi = at_risk[i] / n;
            observed[i] += deaths[i];
            expected[i] += d * pi;
            variance[[i, i]] += scale * pi * (1.0 - pi);
            for j in (i + 1)..k {
                let cov = -scale * pi * (at_risk[j] / n);
                variance[[i, j]] += cov;
                variance[[j, i]] += cov;
            }
        }
    }

    let dof = k - 1;
    let diff = (&observed - &expected).slice_move(ndarray::s![..dof]);
    let v = variance.slice(ndarray::s![..dof, ..dof]).to_owned();
    let solved = solve_linear_system(&v, &diff)?;
    let statistic = diff.dot(&solved).max(0.0);

    Ok(TestResult {
        statistic,
        dof,
        p_value: chi_square_sf(statistic, dof)?,
        hazard: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn records(data: &[(f64, bool)]) -> Vec<SurvivalRecord> {
        data.iter()
            .map(|&(time, event)| SurvivalRecord { time, event })
            .collect()
    }

    #[test]
    fn identical_groups_are_not_different() {
        let g = records(&[(5.0, true), (8.0, false), (12.0, true), (20.0, true), (30.0, false)]);
        let result = log_rank(&g, &g.clone(), 2).unwrap();
        assert!(result.p_value > 0.5);
        assert_abs_diff_eq!(result.statistic, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn symmetric_under_swap() {
        let a = records(&[(1.0, true), (2.0, true), (3.0, false), (4.0, true)]);
        let b = records(&[(1.5, true), (2.5, false), (3.5, true), (4.5, false), (6.0, true)]);
        let ab = log_rank(&a, &b, 2).unwrap();
        let ba = log_rank(&b, &a, 2).unwrap();
        assert_abs_diff_eq!(ab.statistic, ba.statistic, epsilon = 1e-10);
        assert_abs_diff_eq!(ab.p_value, ba.p_value, epsilon = 1e-10);
        assert_eq!(ab.dof, 1);
    }

    #[test]
    fn matches_hand_computed_statistic() {
        // t=1: n=(2,2) d=(1,0); t=2: n=(1,2) d=(0,1)
        let a = records(&[(1.0, true), (3.0, false)]);
        let b = records(&[(2.0, true), (4.0, false)]);
        // O−E = (1 − 0.5) + (0 − 1/3) = 1/6
        // V = 0.25 + 2/9 = 17/36
        let result = log_rank(&a, &b, 2).unwrap();
        assert_abs_diff_eq!(result.statistic, (1.0f64 / 36.0) / (17.0 / 36.0), epsilon = 1e-12);
    }

    #[test]
    fn separated_groups_are_significant() {
        let early: Vec<_> = (1..=15).map(|t| SurvivalRecord { time: t as f64, event: true }).collect();
        let late: Vec<_> = (40..=55).map(|t| SurvivalRecord { time: t as f64, event: t % 3 == 0 }).collect();
        let result = log_rank(&early, &late, 2).unwrap();
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn small_group_is_insufficient() {
        let a = records(&[(1.0, true)]);
        let b = records(&[(2.0, true), (3.0, false)]);
        assert!(matches!(
            log_rank(&a, &b, 2),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }

    #[test]
    fn three_groups_use_two_dof() {
        let a = records(&[(1.0, true), (2.0, true), (3.0, true)]);
        let b = records(&[(2.0, false), (5.0, true), (7.0, true)]);
        let c = records(&[(9.0, true), (11.0, false), (12.0, true)]);
        let result = multivariate_log_rank(&[&a, &b, &c]).unwrap();
        assert_eq!(result.dof, 2);
        assert_abs_diff_eq!(result.statistic, 11.155588, epsilon = 1e-5);
        assert_abs_diff_eq!(result.p_value, 0.0037809, epsilon = 1e-6);
    }
}
