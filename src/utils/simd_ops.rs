//! SIMD-accelerated reductions
//!
//! Reductions that run once per POCS iteration or once per BM4D group. When
//! the `simd` feature is enabled these use 256-bit lanes (f64x4); otherwise
//! scalar fallbacks are compiled.

#[cfg(feature = "simd")]
use wide::f64x4;

/// SIMD lane width (4 for f64x4)
#[cfg(feature = "simd")]
pub const SIMD_WIDTH: usize = 4;

#[cfg(not(feature = "simd"))]
pub const SIMD_WIDTH: usize = 1;

#[cfg(feature = "simd")]
#[inline(always)]
fn load(a: &[f64], idx: usize) -> f64x4 {
    f64x4::from([a[idx], a[idx + 1], a[idx + 2], a[idx + 3]])
}

// ============================================================================
// Dot Product Operations
// ============================================================================

/// Compute dot product: sum(a[i] * b[i])
#[cfg(feature = "simd")]
#[inline]
pub fn dot_product_f64(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    let chunks = n / SIMD_WIDTH;

    let mut sum = f64x4::ZERO;
    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        sum += load(a, idx) * load(b, idx);
    }

    let mut result = sum.reduce_add();
    for i in chunks * SIMD_WIDTH..n {
        result += a[i] * b[i];
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn dot_product_f64(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&ai, &bi)| ai * bi).sum()
}

/// Compute squared norm: sum(a[i]^2)
#[inline]
pub fn norm_squared_f64(a: &[f64]) -> f64 {
    dot_product_f64(a, a)
}

// ============================================================================
// Sum Operations
// ============================================================================

/// Sum of all elements
#[cfg(feature = "simd")]
#[inline]
pub fn sum_f64(a: &[f64]) -> f64 {
    let n = a.len();
    let chunks = n / SIMD_WIDTH;

    let mut sum = f64x4::ZERO;
    for i in 0..chunks {
        sum += load(a, i * SIMD_WIDTH);
    }

    let mut result = sum.reduce_add();
    for &v in &a[chunks * SIMD_WIDTH..] {
        result += v;
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn sum_f64(a: &[f64]) -> f64 {
    a.iter().sum()
}

/// Subtract a constant in place: a[i] -= c
#[inline]
pub fn subtract_scalar_f64(a: &mut [f64], c: f64) {
    for val in a.iter_mut() {
        *val -= c;
    }
}

/// Scale array in place: a[i] = alpha * a[i]
#[inline]
pub fn scale_f64(a: &mut [f64], alpha: f64) {
    for val in a.iter_mut() {
        *val *= alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product_with_remainder() {
        let a: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..11).map(|i| 2.0 - i as f64 * 0.5).collect();
        let expected: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        assert!((dot_product_f64(&a, &b) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_sum_and_norm() {
        let a: Vec<f64> = (1..=7).map(|i| i as f64).collect();
        assert!((sum_f64(&a) - 28.0).abs() < 1e-12);
        assert!((norm_squared_f64(&a) - 140.0).abs() < 1e-12);
        assert_eq!(sum_f64(&[]), 0.0);
    }

    #[test]
    fn test_in_place_ops() {
        let mut a = vec![1.0, 2.0, 3.0];
        subtract_scalar_f64(&mut a, 2.0);
        scale_f64(&mut a, 3.0);
        assert_eq!(a, vec![-3.0, 0.0, 3.0]);
    }
}
