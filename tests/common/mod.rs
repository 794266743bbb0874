//! Common test utilities for kspace-recon integration tests

#![allow(dead_code)]

use kspace_recon::Axes3;
use num_complex::Complex64;

/// Root-mean-square error
pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum_sq / a.len() as f64).sqrt()
}

/// RMSE normalised by the range of the reference
pub fn nrmse(a: &[f64], reference: &[f64]) -> f64 {
    let min = reference.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = reference.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range == 0.0 {
        return 0.0;
    }
    rmse(a, reference) / range
}

/// Pearson correlation coefficient (one-pass, independent of the crate's)
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let (mut sa, mut sb, mut sab, mut sa2, mut sb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        sa += x;
        sb += y;
        sab += x * y;
        sa2 += x * x;
        sb2 += y * y;
    }
    let denominator = ((n * sa2 - sa * sa) * (n * sb2 - sb * sb)).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sab - sa * sb) / denominator
}

/// Smooth ellipsoid on a dim background with a slowly varying phase
///
/// Magnitude lies in [0.1, 1.1]; the phase is a linear ramp of at most
/// about half a radian across the volume.
pub fn phantom(dims: Axes3<usize>) -> (Vec<f64>, Vec<Complex64>) {
    let mut magnitude = Vec::with_capacity(dims.len());
    let mut complex = Vec::with_capacity(dims.len());
    for sl in 0..dims.slice {
        for ph in 0..dims.phase {
            for rd in 0..dims.readout {
                let x = (rd as f64 + 0.5) / dims.readout as f64 - 0.5;
                let y = (ph as f64 + 0.5) / dims.phase as f64 - 0.5;
                let z = (sl as f64 + 0.5) / dims.slice as f64 - 0.5;
                let r2 = (x / 0.35).powi(2) + (y / 0.3).powi(2) + (z / 0.4).powi(2);
                let m = 0.1 + (-2.0 * r2).exp();
                let theta = 0.4 * x - 0.3 * y + 0.2 * z;
                magnitude.push(m);
                complex.push(Complex64::from_polar(m, theta));
            }
        }
    }
    (magnitude, complex)
}

/// Centred Cartesian k-space coordinates, one row per voxel
pub fn cartesian_coords(dims: Axes3<usize>) -> Vec<[f64; 3]> {
    let mut coords = Vec::with_capacity(dims.len());
    for sl in 0..dims.slice {
        for ph in 0..dims.phase {
            for rd in 0..dims.readout {
                coords.push([
                    rd as f64 - (dims.readout / 2) as f64,
                    ph as f64 - (dims.phase / 2) as f64,
                    sl as f64 - (dims.slice / 2) as f64,
                ]);
            }
        }
    }
    coords
}

/// Zero every sample at or beyond `cutoffs` on any axis
pub fn truncate(k_space: &[Complex64], dims: Axes3<usize>, cutoffs: Axes3<usize>) -> Vec<Complex64> {
    let mut out = k_space.to_vec();
    for sl in 0..dims.slice {
        for ph in 0..dims.phase {
            for rd in 0..dims.readout {
                if rd >= cutoffs.readout || ph >= cutoffs.phase || sl >= cutoffs.slice {
                    out[dims.index(rd, ph, sl)] = Complex64::new(0.0, 0.0);
                }
            }
        }
    }
    out
}

/// Deterministic, roughly Gaussian noise (sum of 12 uniforms)
pub fn gaussian_noise(n: usize, seed: u64, sigma: f64) -> Vec<f64> {
    let mut state = seed;
    let mut next = || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|_| ((0..12).map(|_| next()).sum::<f64>() - 6.0) * sigma)
        .collect()
}

/// Result of comparing an algorithm output with ground truth
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub rmse: f64,
    pub nrmse: f64,
    pub correlation: f64,
}

impl TestResult {
    pub fn new(name: &str, output: &[f64], ground_truth: &[f64]) -> Self {
        TestResult {
            name: name.to_string(),
            rmse: rmse(output, ground_truth),
            nrmse: nrmse(output, ground_truth),
            correlation: correlation(output, ground_truth),
        }
    }

    pub fn print(&self) {
        println!(
            "{:<15} RMSE={:.6}  NRMSE={:.4}  r={:.4}",
            self.name, self.rmse, self.nrmse, self.correlation
        );
    }
}
