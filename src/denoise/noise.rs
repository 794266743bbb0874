//! Background noise estimation
//!
//! Heuristic: after rescaling to 0-100, the 5x5x5 block with the lowest mean
//! is assumed to contain only background, and four times its standard
//! deviation is taken as the noise level. Nothing checks that this block is
//! really background; a dark anatomical region gives an underestimate.

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};
use crate::utils::{max_value, mean_std, scale_f64};

/// Edge length of the cubic blocks used for noise estimation
pub const NOISE_BLOCK_SIZE: usize = 5;

/// Intensity the image maximum is mapped to before estimation and filtering
pub const PERCENT_SCALE: f64 = 100.0;

/// Rescale an image so its maximum becomes 100
///
/// # Returns
/// `(rescaled, reference)` with `reference = max(image)`. When the maximum
/// is not a positive number the image is returned unchanged with a
/// reference of 0.
pub fn rescale_to_percent(image: &[f64]) -> (Vec<f64>, f64) {
    match max_value(image) {
        Some(reference) if reference > 0.0 && reference.is_finite() => {
            let mut rescaled = image.to_vec();
            scale_f64(&mut rescaled, PERCENT_SCALE / reference);
            (rescaled, reference)
        }
        _ => (image.to_vec(), 0.0),
    }
}

/// Estimate the noise standard deviation of a magnitude image
///
/// The image is rescaled to 0-100 and split into non-overlapping 5x5x5
/// blocks; voxels that do not fill a complete block are dropped. The result
/// is 4x the population standard deviation of the block with the smallest
/// mean (first one in storage order on ties), in rescaled units.
///
/// # Arguments
/// * `image` - Magnitude image (dims.len())
/// * `dims` - Volume dimensions
pub fn estimate_noise_std(image: &[f64], dims: Axes3<usize>) -> ReconResult<f64> {
    dims.validate()?;
    check_len("image", image.len(), dims.len())?;

    let n_blocks = dims.map(|n| n / NOISE_BLOCK_SIZE);
    if n_blocks.is_empty() {
        return Err(ReconError::VolumeTooSmall(format!(
            "noise estimation needs at least {b}x{b}x{b} voxels, got {:?} (rd, ph, sl)",
            dims.to_rd_ph_sl(),
            b = NOISE_BLOCK_SIZE
        )));
    }

    let (rescaled, _) = rescale_to_percent(image);
    let b = NOISE_BLOCK_SIZE;
    let mut block = Vec::with_capacity(b * b * b);
    let mut best: Option<(f64, f64)> = None;

    for bsl in 0..n_blocks.slice {
        for bph in 0..n_blocks.phase {
            for brd in 0..n_blocks.readout {
                block.clear();
                for sl in bsl * b..(bsl + 1) * b {
                    for ph in bph * b..(bph + 1) * b {
                        let start = dims.index(brd * b, ph, sl);
                        block.extend_from_slice(&rescaled[start..start + b]);
                    }
                }

                let (mean, std) = mean_std(&block);
                if best.map_or(true, |(best_mean, _)| mean < best_mean) {
                    best = Some((mean, std));
                }
            }
        }
    }

    Ok(best.map_or(0.0, |(_, std)| 4.0 * std))
}
