//! Adaptive denoising of magnitude volumes
//!
//! - Noise estimation from the darkest 5x5x5 block
//! - BM4D collaborative filtering on the image rescaled to 0-100

pub mod bm4d;
pub mod noise;

pub use bm4d::{bm4d, bm4d_with_progress, Bm4dParams, Bm4dStages};
pub use noise::{estimate_noise_std, rescale_to_percent, NOISE_BLOCK_SIZE, PERCENT_SCALE};

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};
use crate::utils::scale_f64;

/// Result of [`denoise`]
#[derive(Debug, Clone)]
pub struct DenoiseOutput {
    /// Denoised image in the input's intensity units
    pub image: Vec<f64>,
    /// Noise level used, in 0-100 rescaled units (estimated when the caller
    /// passed 0)
    pub noise_std: f64,
}

/// Denoise a magnitude image
///
/// The image is rescaled so its maximum is 100, filtered with BM4D at the
/// fixed noise level `params.sigma` and scaled back. `noise_std` only
/// selects whether estimation runs: 0 estimates it from the image, any
/// positive value is passed through to the output. It does not change the
/// filter strength.
///
/// # Arguments
/// * `image` - Magnitude image (dims.len())
/// * `dims` - Volume dimensions
/// * `noise_std` - Known noise level, or 0 to estimate it
/// * `params` - BM4D parameters
pub fn denoise(
    image: &[f64],
    dims: Axes3<usize>,
    noise_std: f64,
    params: &Bm4dParams,
) -> ReconResult<DenoiseOutput> {
    dims.validate()?;
    check_len("image", image.len(), dims.len())?;
    params.validate()?;
    if !(noise_std >= 0.0 && noise_std.is_finite()) {
        return Err(ReconError::InvalidParameter(format!(
            "noise std must be finite and >= 0, got {}",
            noise_std
        )));
    }

    let noise_std = if noise_std == 0.0 {
        estimate_noise_std(image, dims)?
    } else {
        noise_std
    };

    let (rescaled, reference) = rescale_to_percent(image);
    if reference == 0.0 {
        return Ok(DenoiseOutput { image: image.to_vec(), noise_std });
    }

    let mut image = bm4d(&rescaled, dims, params)?;
    scale_f64(&mut image, reference / PERCENT_SCALE);

    Ok(DenoiseOutput { image, noise_std })
}

/// [`denoise`] with default BM4D parameters
pub fn denoise_default(image: &[f64], dims: Axes3<usize>, noise_std: f64) -> ReconResult<DenoiseOutput> {
    denoise(image, dims, noise_std, &Bm4dParams::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(dims: Axes3<usize>) -> Vec<f64> {
        (0..dims.len())
            .map(|i| {
                let rd = i % dims.readout;
                let base = if rd < dims.readout / 2 { 10.0 } else { 60.0 };
                base + ((i * 7919) % 17) as f64 * 0.5
            })
            .collect()
    }

    #[test]
    fn test_estimates_when_std_is_zero() {
        let dims = Axes3::new(10, 10, 5);
        let image = textured(dims);
        let out = denoise_default(&image, dims, 0.0).unwrap();
        let expected = estimate_noise_std(&image, dims).unwrap();
        assert_eq!(out.noise_std, expected);
        assert!(out.noise_std > 0.0);
    }

    #[test]
    fn test_caller_std_is_passed_through() {
        let dims = Axes3::new(10, 10, 5);
        let image = textured(dims);
        let out = denoise_default(&image, dims, 3.5).unwrap();
        assert_eq!(out.noise_std, 3.5);
        assert_eq!(out.image.len(), dims.len());
    }

    #[test]
    fn test_output_scales_with_input() {
        let dims = Axes3::new(10, 10, 5);
        let image = textured(dims);
        // Power-of-two factor keeps the rescaled inputs bit-identical
        let scaled: Vec<f64> = image.iter().map(|v| v * 256.0).collect();

        let a = denoise_default(&image, dims, 1.0).unwrap();
        let b = denoise_default(&scaled, dims, 1.0).unwrap();
        for (x, y) in a.image.iter().zip(&b.image) {
            assert!((x * 256.0 - y).abs() < 1e-9 * y.abs().max(1.0));
        }
    }

    #[test]
    fn test_all_zero_image() {
        let dims = Axes3::new(5, 5, 5);
        let image = vec![0.0; dims.len()];
        let out = denoise_default(&image, dims, 0.0).unwrap();
        assert_eq!(out.image, image);
        assert_eq!(out.noise_std, 0.0);
    }

    #[test]
    fn test_errors() {
        let dims = Axes3::new(4, 4, 4);
        let image = vec![1.0; dims.len()];
        assert!(matches!(
            denoise_default(&image, dims, 0.0),
            Err(ReconError::VolumeTooSmall(_))
        ));
        assert!(matches!(
            denoise_default(&image, dims, -1.0),
            Err(ReconError::InvalidParameter(_))
        ));
        assert!(matches!(
            denoise_default(&image[1..], dims, 1.0),
            Err(ReconError::ShapeMismatch(_))
        ));
    }
}
