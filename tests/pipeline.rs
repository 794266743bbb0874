//! End-to-end reconstruction tests on a synthetic phantom
//!
//! Each test runs several modules in the order an acquisition would use them:
//! k-space -> filters / padding / POCS -> image -> denoise -> export.

mod common;

use common::*;
use kspace_recon::denoise::{denoise_default, estimate_noise_std};
use kspace_recon::fft::{forward, inverse};
use kspace_recon::filters::{cosbell_filter, hanning_filter};
use kspace_recon::nifti_io::{export_affine, export_volume, load_nifti, save_nifti_gz, ExportGeometry};
use kspace_recon::padding::zero_pad;
use kspace_recon::pocs::{pocs_reconstruct, pocs_reconstruct_with_progress, PocsParams, PocsState};
use kspace_recon::utils::magnitude;
use kspace_recon::{Axes3, ReconError};

#[test]
fn test_cosbell_order_zero_is_lossless() {
    let dims = Axes3::new(16, 12, 8);
    let (truth, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();

    let filtered = cosbell_filter(&cartesian_coords(dims), &k_space, dims, Axes3::splat(0.0)).unwrap();
    let recon = magnitude(&inverse(&filtered, dims).unwrap());

    let result = TestResult::new("cosbell(0)", &recon, &truth);
    result.print();
    assert!(result.rmse < 1e-10, "RMSE too high: {}", result.rmse);
}

#[test]
fn test_cosbell_smooths_image() {
    let dims = Axes3::new(16, 16, 8);
    let (truth, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();

    let filtered = cosbell_filter(&cartesian_coords(dims), &k_space, dims, Axes3::splat(1.0)).unwrap();
    let recon = magnitude(&inverse(&filtered, dims).unwrap());

    // Apodization blurs but keeps the overall structure
    let result = TestResult::new("cosbell(1)", &recon, &truth);
    result.print();
    assert!(result.correlation > 0.9, "correlation too low: {}", result.correlation);
    assert!(result.rmse > 1e-6);
}

#[test]
fn test_zero_pad_interpolates_image() {
    let dims = Axes3::new(12, 12, 8);
    let target = Axes3::new(24, 24, 16);
    let (_, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();

    let padded = zero_pad(&k_space, dims, target).unwrap();
    assert_eq!(padded.len(), target.len());

    // Energy is preserved by padding; the larger grid spreads it over more voxels
    let energy_in: f64 = k_space.iter().map(|c| c.norm_sqr()).sum();
    let energy_out: f64 = padded.iter().map(|c| c.norm_sqr()).sum();
    assert!((energy_in - energy_out).abs() < 1e-9 * energy_in);

    let upsampled = inverse(&padded, target).unwrap();
    assert!(upsampled.iter().all(|c| c.re.is_finite() && c.im.is_finite()));

    // Cropping the padded spectrum back recovers the original image
    let cropped = zero_pad(&padded, target, dims).unwrap();
    let recon = inverse(&cropped, dims).unwrap();
    for (a, b) in recon.iter().zip(&image) {
        assert!((a - b).norm() < 1e-10);
    }
}

#[test]
fn test_pocs_partial_fourier_beats_zero_filling() {
    let dims = Axes3::new(16, 16, 8);
    let (truth, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();

    let factors = Axes3::new(1.0, 0.625, 1.0);
    let acquired = truncate(&k_space, dims, Axes3::new(16, 10, 8));

    let zero_filled = magnitude(&inverse(&acquired, dims).unwrap());
    let mut calls = Vec::new();
    let result = pocs_reconstruct_with_progress(&acquired, dims, factors, &PocsParams::default(), |it, c| {
        calls.push((it, c))
    })
    .unwrap();

    let zf = TestResult::new("zero-filled", &zero_filled, &truth);
    let pocs = TestResult::new("POCS", &result.image, &truth);
    zf.print();
    pocs.print();

    assert!(pocs.rmse < zf.rmse, "POCS {} vs zero-filled {}", pocs.rmse, zf.rmse);
    assert!(pocs.correlation > 0.95);
    assert_eq!(calls.len(), result.iterations + 1);
    assert!(result.reference_convergence.is_finite());
    match result.status {
        PocsState::Converged => assert!(result.convergence <= 1e-6),
        PocsState::MaxIterationsReached => assert_eq!(result.iterations, 100),
        other => panic!("unexpected terminal state {:?}", other),
    }
}

#[test]
fn test_pocs_fully_sampled_reproduces_image() {
    let dims = Axes3::new(12, 10, 6);
    let (truth, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();

    let result = pocs_reconstruct(&k_space, dims, Axes3::splat(1.0), &PocsParams::default()).unwrap();
    assert!(result.converged());
    assert!(result.iterations <= 1);
    assert!(rmse(&result.image, &truth) < 1e-9);
}

#[test]
fn test_hanning_initial_estimate_is_smooth() {
    let dims = Axes3::new(16, 16, 8);
    let (truth, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();

    let cut = Axes3::new(16, 12, 8);
    let hard = magnitude(&inverse(&truncate(&k_space, dims, cut), dims).unwrap());
    let tapered = magnitude(&inverse(&hanning_filter(&k_space, dims, cut, 2).unwrap(), dims).unwrap());

    assert!(correlation(&tapered, &truth) > 0.9);
    assert!(correlation(&hard, &truth) > 0.9);
}

#[test]
fn test_denoise_reduces_noise_on_reconstruction() {
    let dims = Axes3::new(20, 20, 10);
    let (truth, _) = phantom(dims);
    let noise = gaussian_noise(dims.len(), 42, 0.05);
    let noisy: Vec<f64> = truth.iter().zip(&noise).map(|(t, n)| t + n).collect();

    let sigma = estimate_noise_std(&noisy, dims).unwrap();
    assert!(sigma > 0.0);

    let out = denoise_default(&noisy, dims, 0.0).unwrap();
    assert_eq!(out.noise_std, sigma);

    let before = TestResult::new("noisy", &noisy, &truth);
    let after = TestResult::new("BM4D", &out.image, &truth);
    before.print();
    after.print();
    assert!(after.rmse < before.rmse, "denoised {} vs noisy {}", after.rmse, before.rmse);
}

#[test]
fn test_export_reconstruction_to_nifti() {
    let dims = Axes3::new(12, 10, 6);
    let (_, image) = phantom(dims);
    let k_space = forward(&image, dims).unwrap();
    let recon = magnitude(&inverse(&k_space, dims).unwrap());

    let geometry = ExportGeometry {
        axes_orientation: [1, 0, 2],
        n_points: dims,
        fov_cm: [8.0, 12.0, 3.0],
        dfov_mm: [0.0, 0.0, 0.0],
    };
    let (data, nifti_dims) = export_volume(&recon, dims, &geometry).unwrap();
    assert_eq!(nifti_dims, (6, 12, 10));
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!((max - 1.0).abs() < 1e-12);

    let affine = export_affine(&geometry).unwrap();
    let bytes = save_nifti_gz(&data, nifti_dims, geometry.voxel_size(), &affine).unwrap();
    let loaded = load_nifti(&bytes).unwrap();
    assert_eq!(loaded.dims, nifti_dims);
    // NIfTI axes are (z, y, x): slice 6 over 3 cm, readout 12 over 12 cm, phase 10 over 8 cm
    assert!((loaded.voxel_size.0 - 5.0).abs() < 1e-5);
    assert!((loaded.voxel_size.1 - 10.0).abs() < 1e-5);
    assert!((loaded.voxel_size.2 - 8.0).abs() < 1e-5);
}

#[test]
fn test_shape_errors_propagate() {
    let dims = Axes3::new(8, 8, 4);
    let short = vec![num_complex::Complex64::new(0.0, 0.0); dims.len() - 1];
    assert!(matches!(inverse(&short, dims), Err(ReconError::ShapeMismatch(_))));
    assert!(matches!(
        pocs_reconstruct(&short, dims, Axes3::splat(1.0), &PocsParams::default()),
        Err(ReconError::ShapeMismatch(_))
    ));
    assert!(matches!(
        zero_pad(&short, dims, dims),
        Err(ReconError::ShapeMismatch(_))
    ));
}
