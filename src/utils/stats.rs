//! Volume statistics
//!
//! Magnitude, intensity range and correlation helpers shared by the
//! reconstructor and the denoiser.

use num_complex::Complex64;

use super::simd_ops::{dot_product_f64, norm_squared_f64, subtract_scalar_f64, sum_f64};

/// Element-wise magnitude of a complex volume
pub fn magnitude(data: &[Complex64]) -> Vec<f64> {
    data.iter().map(|c| c.norm()).collect()
}

/// Largest value, or `None` for an empty slice or one containing NaN
pub fn max_value(data: &[f64]) -> Option<f64> {
    let mut max = f64::NEG_INFINITY;
    for &v in data {
        if v.is_nan() {
            return None;
        }
        if v > max {
            max = v;
        }
    }
    if data.is_empty() { None } else { Some(max) }
}

/// Mean and population standard deviation (`numpy.std` with ddof = 0)
pub fn mean_std(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let n = data.len() as f64;
    let mean = sum_f64(data) / n;
    let mut centred = data.to_vec();
    subtract_scalar_f64(&mut centred, mean);
    (mean, (norm_squared_f64(&centred) / n).sqrt())
}

/// Pearson correlation coefficient of two equally sized vectors
///
/// Two-pass (mean-centred) like `numpy.corrcoef`. When either vector is
/// constant the coefficient is undefined; identical inputs then count as
/// perfectly correlated (1) and anything else as uncorrelated (0).
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }

    let n = a.len() as f64;
    let mut ac = a.to_vec();
    let mut bc = b.to_vec();
    subtract_scalar_f64(&mut ac, sum_f64(a) / n);
    subtract_scalar_f64(&mut bc, sum_f64(b) / n);

    let cov = dot_product_f64(&ac, &bc);
    let denom = (norm_squared_f64(&ac) * norm_squared_f64(&bc)).sqrt();

    if denom == 0.0 || !denom.is_finite() {
        return if a == b { 1.0 } else { 0.0 };
    }
    (cov / denom).clamp(-1.0, 1.0)
}
