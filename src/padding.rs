//! Zero-padding resampler for k-space
//!
//! Places a k-space volume at the centre of a new grid. Axes that grow are
//! zero-filled around the data, axes that shrink are cropped symmetrically.
//! Padding k-space interpolates the image; cropping lowers its resolution.

use num_complex::Complex64;

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};

/// Copy window for one axis: (source start, destination start, length)
fn axis_window(source: usize, target: usize) -> (usize, usize, usize) {
    let offset = (target as isize - source as isize).div_euclid(2);
    if offset >= 0 {
        (0, offset as usize, source.min(target))
    } else {
        ((-offset) as usize, 0, target)
    }
}

/// Resize k-space to `target` dimensions, keeping it centred
///
/// For each axis `offset = floor((target - source) / 2)`. A non-negative
/// offset places the whole source at `offset`; a negative one crops the
/// source starting at `-offset`. Axes are handled independently so growing
/// and shrinking can be mixed in one call.
///
/// # Arguments
/// * `k_space` - Input k-space (dims.len())
/// * `dims` - Input dimensions
/// * `target` - Output dimensions
///
/// # Returns
/// Zero-initialised k-space of `target.len()` samples holding the centred data
pub fn zero_pad(
    k_space: &[Complex64],
    dims: Axes3<usize>,
    target: Axes3<usize>,
) -> ReconResult<Vec<Complex64>> {
    dims.validate()?;
    check_len("k-space", k_space.len(), dims.len())?;
    target.validate().map_err(|_| {
        ReconError::InvalidParameter(format!(
            "target size must be positive on every axis, got {:?}",
            target.to_rd_ph_sl()
        ))
    })?;

    let (src_rd, dst_rd, len_rd) = axis_window(dims.readout, target.readout);
    let (src_ph, dst_ph, len_ph) = axis_window(dims.phase, target.phase);
    let (src_sl, dst_sl, len_sl) = axis_window(dims.slice, target.slice);

    let mut out = vec![Complex64::new(0.0, 0.0); target.len()];

    for sl in 0..len_sl {
        for ph in 0..len_ph {
            let src = dims.index(src_rd, src_ph + ph, src_sl + sl);
            let dst = target.index(dst_rd, dst_ph + ph, dst_sl + sl);
            out[dst..dst + len_rd].copy_from_slice(&k_space[src..src + len_rd]);
        }
    }

    Ok(out)
}
