use crate::error::Result;
use crate::stats::z_for_confidence;

/// Lower error-bar length `p − lower` of the Wilson score interval for
/// `k / n`. Zero for `n = 0` and `k = 0`; never negative.
pub fn wilson_margin(k: usize, n: usize, confidence: f64) -> Result<f64> {
    let z = z_for_confidence(confidence)?;
    if n == 0 || k == 0 {
        return Ok(0.0);
    }
    let n_f = n as f64;
    let p = k.min(n) as f64 / n_f;
    let z2 = z * z;

    let denom = 1.0 + z2 / n_f;
    let center = (p + z2 / (2.0 * n_f)) / denom;
    let half = z * (p * (1.0 - p) / n_f + z2 / (4.0 * n_f * n_f)).sqrt() / denom;
    Ok((p - (center - half)).max(0.0))
}
