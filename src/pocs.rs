//! Partial-Fourier reconstruction by Projection Onto Convex Sets (POCS)
//!
//! Recovers a full-resolution magnitude image from k-space that is only
//! sampled up to a fraction of each axis. A low-resolution phase estimate
//! from the symmetrically sampled centre is held fixed while the image is
//! alternately projected onto "has this phase" and "agrees with the acquired
//! k-space" until consecutive estimates stop changing.
//!
//! Reference:
//! Haacke, E.M., Lindskog, E.D., Lin, W. (1991). "A fast, iterative,
//! partial-Fourier technique capable of local phase recovery."
//! Journal of Magnetic Resonance, 92(1):126-145.

use num_complex::Complex64;

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};
use crate::fft::Fft3dWorkspace;
use crate::filters::hanning_filter;
use crate::utils::{magnitude, pearson_correlation};

/// POCS iteration parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PocsParams {
    /// Roll-off length of the Hanning edge filter used for the initial estimate (default 2)
    pub ramp_len: usize,
    /// Stop once `1 - correlation` between consecutive estimates drops to this (default 1e-6)
    pub threshold: f64,
    /// Iteration cap (default 100)
    pub max_iterations: usize,
}

impl Default for PocsParams {
    fn default() -> Self {
        Self {
            ramp_len: 2,
            threshold: 1e-6,
            max_iterations: 100,
        }
    }
}

impl PocsParams {
    pub fn validate(&self) -> ReconResult<()> {
        if self.ramp_len == 0 {
            return Err(ReconError::InvalidParameter("ramp_len must be > 0".to_string()));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ReconError::InvalidParameter(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Reconstruction state machine
///
/// `Initializing -> Iterating -> {Converged | MaxIterationsReached}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PocsState {
    Initializing,
    Iterating,
    Converged,
    MaxIterationsReached,
}

/// Output of a POCS reconstruction
#[derive(Debug, Clone)]
pub struct PocsResult {
    /// Reconstructed magnitude image (full grid)
    pub image: Vec<f64>,
    /// Terminal state: `Converged` or `MaxIterationsReached`
    pub status: PocsState,
    /// Value of the iteration counter when the loop stopped
    pub iterations: usize,
    /// `1 - correlation` of the last two estimates
    pub convergence: f64,
    /// `1 - correlation` between the result and the zero-filled reconstruction
    pub reference_convergence: f64,
}

impl PocsResult {
    pub fn converged(&self) -> bool {
        self.status == PocsState::Converged
    }
}

/// Sampling extents derived from the partial-Fourier factors
///
/// Returns `(mm, m)` where `mm = round(n * f)` is the first index past the
/// acquired data and `m = round(n * f - n / 2)` is the half-width of the
/// symmetrically sampled centre, both clamped to the grid.
///
/// Halves round away from zero (`f64::round`): n = 20, f = 0.625 gives
/// mm = 13, where truncation or round-half-to-even would give 12.
pub fn partial_fourier_extents(
    dims: Axes3<usize>,
    factors: Axes3<f64>,
) -> ReconResult<(Axes3<usize>, Axes3<usize>)> {
    for (name, f) in [("readout", factors.readout), ("phase", factors.phase), ("slice", factors.slice)] {
        if !(f > 0.0 && f <= 1.0) {
            return Err(ReconError::InvalidParameter(format!(
                "partial-Fourier factor on {} axis must be in (0, 1], got {}",
                name, f
            )));
        }
    }

    let mm = dims.zip_with(factors, |n, f| {
        ((n as f64 * f).round().max(0.0) as usize).min(n)
    });
    let m = dims.zip_with(factors, |n, f| {
        let half_width = (n as f64 * f - n as f64 / 2.0).round().max(0.0) as usize;
        half_width.min(n / 2)
    });
    Ok((mm, m))
}

/// Zero-filled copy keeping only the centred box of half-width `half_width`
fn center_kspace(k_space: &[Complex64], dims: Axes3<usize>, half_width: Axes3<usize>) -> Vec<Complex64> {
    let start = dims.zip_with(half_width, |n, m| n / 2 - m);
    let end = dims.zip_with(half_width, |n, m| n / 2 + m);

    let mut out = vec![Complex64::new(0.0, 0.0); k_space.len()];
    for sl in start.slice..end.slice {
        for ph in start.phase..end.phase {
            let from = dims.index(start.readout, ph, sl);
            let to = dims.index(end.readout, ph, sl);
            out[from..to].copy_from_slice(&k_space[from..to]);
        }
    }
    out
}

/// Unit-magnitude phase of an image; voxels with zero magnitude get phase 1
fn unit_phase(image: &[Complex64]) -> Vec<Complex64> {
    image
        .iter()
        .map(|&c| {
            let mag = c.norm();
            if mag > 0.0 && mag.is_finite() {
                c / mag
            } else {
                Complex64::new(1.0, 0.0)
            }
        })
        .collect()
}

/// One transition of the reconstruction state machine
///
/// `iterations` counts completed update passes; `convergence` is the latest
/// `1 - correlation` and is ignored while initializing. A NaN convergence
/// never passes the threshold, so the cap always terminates the loop.
fn next_state(
    state: PocsState,
    convergence: f64,
    iterations: usize,
    params: &PocsParams,
) -> PocsState {
    match state {
        PocsState::Initializing => PocsState::Iterating,
        PocsState::Iterating if convergence <= params.threshold => PocsState::Converged,
        PocsState::Iterating if iterations >= params.max_iterations => PocsState::MaxIterationsReached,
        other => other,
    }
}

/// Restore acquired samples in the low-index corner `[0:mm]` (storage order)
fn enforce_data_consistency(
    k_new: &mut [Complex64],
    k_acquired: &[Complex64],
    dims: Axes3<usize>,
    mm: Axes3<usize>,
) {
    for sl in 0..mm.slice {
        for ph in 0..mm.phase {
            let from = dims.index(0, ph, sl);
            let to = from + mm.readout;
            k_new[from..to].copy_from_slice(&k_acquired[from..to]);
        }
    }
}

/// POCS partial-Fourier reconstruction
///
/// # Arguments
/// * `k_space` - Acquired k-space on the full grid, zero-filled where not sampled
/// * `dims` - Full grid dimensions
/// * `factors` - Sampled fraction of each axis, in (0, 1]
/// * `params` - Iteration parameters
///
/// # Returns
/// Reconstructed magnitude image with its terminal state
pub fn pocs_reconstruct(
    k_space: &[Complex64],
    dims: Axes3<usize>,
    factors: Axes3<f64>,
    params: &PocsParams,
) -> ReconResult<PocsResult> {
    pocs_reconstruct_with_progress(k_space, dims, factors, params, |_, _| {})
}

/// POCS reconstruction with progress callback
///
/// The callback receives `(iteration, 1 - correlation)` after every pass,
/// so a run stopped by the cap reports `max_iterations + 1` passes.
pub fn pocs_reconstruct_with_progress<F>(
    k_space: &[Complex64],
    dims: Axes3<usize>,
    factors: Axes3<f64>,
    params: &PocsParams,
    mut progress_callback: F,
) -> ReconResult<PocsResult>
where
    F: FnMut(usize, f64),
{
    dims.validate()?;
    check_len("k-space", k_space.len(), dims.len())?;
    params.validate()?;

    let (mm, m) = partial_fourier_extents(dims, factors)?;
    let mut ws = Fft3dWorkspace::new(dims)?;

    // Zero-filled reconstruction, used only for the final diagnostic
    let mut buf = k_space.to_vec();
    ws.inverse_inplace(&mut buf);
    let img_ref = magnitude(&buf);

    // Low-resolution phase from the symmetric centre
    let mut buf = center_kspace(k_space, dims, m);
    ws.inverse_inplace(&mut buf);
    let phase = unit_phase(&buf);

    // Initial magnitude from the Hanning-tapered acquisition
    let mut buf = hanning_filter(k_space, dims, mm, params.ramp_len)?;
    ws.inverse_inplace(&mut buf);
    let mut previous = magnitude(&buf);

    let mut iterations = 0;
    let mut convergence = f64::INFINITY;
    let mut current = previous.clone();
    let mut state = next_state(PocsState::Initializing, convergence, iterations, params);

    while state == PocsState::Iterating {
        for ((b, &mag), &ph) in buf.iter_mut().zip(previous.iter()).zip(phase.iter()) {
            *b = ph * mag;
        }
        ws.forward_inplace(&mut buf);
        enforce_data_consistency(&mut buf, k_space, dims, mm);
        ws.inverse_inplace(&mut buf);
        current = magnitude(&buf);

        convergence = 1.0 - pearson_correlation(&previous, &current);
        progress_callback(iterations, convergence);

        state = next_state(state, convergence, iterations, params);
        if state == PocsState::Iterating {
            std::mem::swap(&mut previous, &mut current);
            iterations += 1;
        }
    }

    let reference_convergence = 1.0 - pearson_correlation(&img_ref, &current);

    Ok(PocsResult {
        image: current,
        status: state,
        iterations,
        convergence,
        reference_convergence,
    })
}
