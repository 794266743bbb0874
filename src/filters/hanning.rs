//! Hanning edge filter
//!
//! Truncates k-space beyond a cutoff on each axis and replaces the hard edge
//! with a half-Hanning roll-off. Used to build the initial magnitude estimate
//! for partial-Fourier reconstruction.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};

/// Symmetric Hanning window of `m` points (`numpy.hanning`)
pub fn hanning_window(m: usize) -> Vec<f64> {
    match m {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (m - 1) as f64;
            (0..m)
                .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / denom).cos())
                .collect()
        }
    }
}

/// Falling half of a `2 * ramp_len` point Hanning window
///
/// Weights decrease strictly from just below 1 to 0.
pub fn half_hanning_window(ramp_len: usize) -> Vec<f64> {
    let window = hanning_window(2 * ramp_len);
    window[ramp_len..].to_vec()
}

/// Apply the Hanning edge filter
///
/// Every sample whose index on any axis is at or beyond that axis' cutoff is
/// zeroed. Then, on each axis whose cutoff is below the full extent, the slab
/// at index `cutoff - ramp_len + 1 + i` is scaled by `w[i]` for
/// `i in 0..ramp_len`, with `w` from [`half_hanning_window`]. The ramp ends at
/// the cutoff; an axis whose cutoff equals its extent keeps its edge.
///
/// # Arguments
/// * `k_space` - k-space data (dims.len())
/// * `dims` - Volume dimensions
/// * `cutoffs` - First discarded index per axis (<= extent)
/// * `ramp_len` - Number of roll-off weights
///
/// # Returns
/// Filtered copy of the k-space
pub fn hanning_filter(
    k_space: &[Complex64],
    dims: Axes3<usize>,
    cutoffs: Axes3<usize>,
    ramp_len: usize,
) -> ReconResult<Vec<Complex64>> {
    dims.validate()?;
    check_len("k-space", k_space.len(), dims.len())?;
    if ramp_len == 0 {
        return Err(ReconError::InvalidParameter("ramp length must be at least 1".to_string()));
    }
    if cutoffs.readout > dims.readout || cutoffs.phase > dims.phase || cutoffs.slice > dims.slice {
        return Err(ReconError::ShapeMismatch(format!(
            "cutoffs {:?} exceed volume extent {:?} (rd, ph, sl)",
            cutoffs.to_rd_ph_sl(),
            dims.to_rd_ph_sl()
        )));
    }

    let zero = Complex64::new(0.0, 0.0);
    let mut out = k_space.to_vec();

    // Hard truncation
    for sl in 0..dims.slice {
        for ph in 0..dims.phase {
            for rd in 0..dims.readout {
                if rd >= cutoffs.readout || ph >= cutoffs.phase || sl >= cutoffs.slice {
                    out[dims.index(rd, ph, sl)] = zero;
                }
            }
        }
    }

    let ramp = half_hanning_window(ramp_len);
    let ramp_index = |cutoff: usize, extent: usize, i: usize| -> Option<usize> {
        let idx = cutoff as isize - ramp_len as isize + 1 + i as isize;
        (idx >= 0 && (idx as usize) < extent).then_some(idx as usize)
    };

    if cutoffs.readout < dims.readout {
        for (i, &w) in ramp.iter().enumerate() {
            let Some(rd) = ramp_index(cutoffs.readout, dims.readout, i) else { continue };
            for sl in 0..dims.slice {
                for ph in 0..dims.phase {
                    out[dims.index(rd, ph, sl)] *= w;
                }
            }
        }
    }
    if cutoffs.phase < dims.phase {
        for (i, &w) in ramp.iter().enumerate() {
            let Some(ph) = ramp_index(cutoffs.phase, dims.phase, i) else { continue };
            for sl in 0..dims.slice {
                for rd in 0..dims.readout {
                    out[dims.index(rd, ph, sl)] *= w;
                }
            }
        }
    }
    if cutoffs.slice < dims.slice {
        for (i, &w) in ramp.iter().enumerate() {
            let Some(sl) = ramp_index(cutoffs.slice, dims.slice, i) else { continue };
            for ph in 0..dims.phase {
                for rd in 0..dims.readout {
                    out[dims.index(rd, ph, sl)] *= w;
                }
            }
        }
    }

    Ok(out)
}
