//! Kaplan–Meier estimator with Greenwood log(−log) confidence bands.

use crate::error::Result;
use crate::models::SurvivalRecord;
use crate::stats::z_for_confidence;

/// Step function evaluated at every distinct observed time.
#[derive(Debug, Clone, Default)]
pub struct KaplanMeierCurve {
    pub times: Vec<f64>,
    pub survival: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub at_risk: Vec<usize>,
    pub events: Vec<usize>,
    pub censored: Vec<usize>,
}

impl KaplanMeierCurve {
    /// First time the curve reaches 0.5 or below.
    pub fn median_survival(&self) -> Option<f64> {
        self.times
            .iter()
            .zip(&self.survival)
            .find(|(_, s)| **s <= 0.5)
            .map(|(&t, _)| t)
    }

    /// Times at which at least one record was censored.
    pub fn censor_times(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times
            .iter()
            .zip(&self.survival)
            .zip(&self.censored)
            .filter(|(_, c)| **c > 0)
            .map(|((&t, &s), _)| (t, s))
    }
}

pub fn kaplan_meier(records: &[SurvivalRecord], confidence: f64) -> Result<KaplanMeierCurve> {
    let z = z_for_confidence(confidence)?;
    let mut data: Vec<SurvivalRecord> = records.to_vec();
    data.sort_by(|a, b| a.time.total_cmp(&b.time));

    let n = data.len();
    let mut curve = KaplanMeierCurve::default();
    let mut s = 1.0f64;
    let mut greenwood = 0.0f64;

    let mut i = 0;
    while i < n {
        let t = data[i].time;
        let at_risk = n - i;
        let mut d = 0usize;
        let mut c = 0usize;
        let mut j = i;
        while j < n && data[j].time == t {
            if data[j].event {
                d += 1;
            } else {
                c += 1;
            }
            j += 1;
        }

        if d > 0 {
            s *= 1.0 - d as f64 / at_risk as f64;
            if at_risk > d {
                greenwood += d as f64 / (at_risk as f64 * (at_risk - d) as f64);
            } else {
                greenwood = f64::INFINITY;
            }
        }
        let (lo, hi) = log_log_band(s, greenwood, z);

        curve.times.push(t);
        curve.survival.push(s);
        curve.lower.push(lo);
        curve.upper.push(hi);
        curve.at_risk.push(at_risk);
        curve.events.push(d);
        curve.censored.push(c);
        i = j;
    }

    Ok(curve)
}

fn log_log_band(s: f64, greenwood: f64, z: f64) -> (f64, f64) {
    if s >= 1.0 {
        return (1.0, 1.0);
    }
    if s <= 0.0 || !greenwood.is_finite() {
        return (0.0, 0.0);
    }
    let log_s = s.ln();
    let sd = (greenwood / (log_s * log_s)).sqrt();
    (s.powf((z * sd).exp()), s.powf((-z * sd).exp()))
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
    fn product_limit_values() {
        let r = records(&[(1.0, true), (2.0, false), (2.0, true), (3.0, true), (5.0, false)]);
        let km = kaplan_meier(&r, 0.95).unwrap();
        assert_eq!(km.times, vec![1.0, 2.0, 3.0, 5.0]);
        assert_abs_diff_eq!(km.survival[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(km.survival[1], 0.8 * 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(km.survival[2], 0.8 * 0.75 * 0.5, epsilon = 1e-12);
        assert_eq!(km.at_risk, vec![5, 4, 2, 1]);
        assert_eq!(km.median_survival(), Some(3.0));
        for w in km.survival.windows(2) {
            assert!(w[1] <= w[0]);
        }
    }

    #[test]
    fn bands_enclose_estimate() {
        let r = records(&[(1.0, true), (2.0, true), (4.0, false), (6.0, true), (7.0, false), (9.0, true)]);
        let km = kaplan_meier(&r, 0.95).unwrap();
        for ((s, lo), hi) in km.survival.iter().zip(&km.lower).zip(&km.upper) {
            assert!(*lo <= *s + 1e-12 && *s <= *hi + 1e-12);
            assert!((0.0..=1.0).contains(lo) && (0.0..=1.0).contains(hi));
        }
        // last event empties the risk set
        assert_eq!(*km.survival.last().unwrap(), 0.0);
        assert_eq!(km.censor_times().count(), 2);
    }

    #[test]
    fn empty_input_gives_empty_curve() {
        let km = kaplan_meier(&[], 0.95).unwrap();
        assert!(km.times.is_empty());
        assert_eq!(km.median_survival(), None);
    }
}
