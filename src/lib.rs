//! kspace-recon: MRI k-space reconstruction core
//!
//! Turns acquired k-space volumes into image volumes.
//!
//! # Modules
//! - `axes`: Named (readout, phase, slice) triples and the flat storage layout
//! - `fft`: Centred 3D FFT using rustfft
//! - `padding`: Centred zero padding / cropping of k-space
//! - `filters`: Cosbell and Hanning apodization
//! - `denoise`: Noise estimation and BM4D filtering
//! - `pocs`: Partial-Fourier reconstruction by projection onto convex sets
//! - `utils`: Volume statistics and SIMD reductions
//! - `nifti_io`: NIfTI read/write and scanner-space export
//!
//! Volumes are flat buffers with readout varying fastest; see [`axes`].

// Core modules
pub mod axes;
pub mod error;
pub mod fft;

// Algorithm modules
pub mod padding;
pub mod filters;
pub mod denoise;
pub mod pocs;
pub mod utils;

// I/O modules
pub mod nifti_io;

pub use axes::Axes3;
pub use error::{ReconError, ReconResult};
