//! Centred 3D FFT using rustfft
//!
//! k-space is stored with the zero frequency at the array centre, so every
//! transform is wrapped in shifts the same way numpy code does it:
//!
//! - forward: `fftshift(fftn(ifftshift(image)))`
//! - inverse: `ifftshift(ifftn(fftshift(k_space)))`
//!
//! Volumes are flat buffers with readout varying fastest (see [`crate::axes`]).

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

use crate::axes::Axes3;
use crate::error::{check_len, ReconResult};

/// FFT workspace that caches plans and scratch buffers for one volume shape
pub struct Fft3dWorkspace {
    dims: Axes3<usize>,
    // Forward FFT plans
    fft_rd: Arc<dyn Fft<f64>>,
    fft_ph: Arc<dyn Fft<f64>>,
    fft_sl: Arc<dyn Fft<f64>>,
    // Inverse FFT plans
    ifft_rd: Arc<dyn Fft<f64>>,
    ifft_ph: Arc<dyn Fft<f64>>,
    ifft_sl: Arc<dyn Fft<f64>>,
    // Scratch buffers
    scratch_rd: Vec<Complex64>,
    scratch_ph: Vec<Complex64>,
    scratch_sl: Vec<Complex64>,
    buffer_ph: Vec<Complex64>,
    buffer_sl: Vec<Complex64>,
    shift_buf: Vec<Complex64>,
}

impl Fft3dWorkspace {
    /// Create a new FFT workspace for the given dimensions
    pub fn new(dims: Axes3<usize>) -> ReconResult<Self> {
        dims.validate()?;
        let mut planner = FftPlanner::new();

        let fft_rd = planner.plan_fft(dims.readout, FftDirection::Forward);
        let fft_ph = planner.plan_fft(dims.phase, FftDirection::Forward);
        let fft_sl = planner.plan_fft(dims.slice, FftDirection::Forward);

        let ifft_rd = planner.plan_fft(dims.readout, FftDirection::Inverse);
        let ifft_ph = planner.plan_fft(dims.phase, FftDirection::Inverse);
        let ifft_sl = planner.plan_fft(dims.slice, FftDirection::Inverse);

        let zero = Complex64::new(0.0, 0.0);
        let scratch_rd = vec![zero; fft_rd.get_inplace_scratch_len().max(ifft_rd.get_inplace_scratch_len())];
        let scratch_ph = vec![zero; fft_ph.get_inplace_scratch_len().max(ifft_ph.get_inplace_scratch_len())];
        let scratch_sl = vec![zero; fft_sl.get_inplace_scratch_len().max(ifft_sl.get_inplace_scratch_len())];

        Ok(Self {
            dims,
            fft_rd, fft_ph, fft_sl,
            ifft_rd, ifft_ph, ifft_sl,
            scratch_rd, scratch_ph, scratch_sl,
            buffer_ph: vec![zero; dims.phase],
            buffer_sl: vec![zero; dims.slice],
            shift_buf: vec![zero; dims.len()],
        })
    }

    /// In-place forward 3D FFT (uncentred, like `numpy.fft.fftn`)
    pub fn fft3d(&mut self, data: &mut [Complex64]) {
        let Self { dims, fft_rd, fft_ph, fft_sl, scratch_rd, scratch_ph, scratch_sl, buffer_ph, buffer_sl, .. } = self;
        transform_axes(
            data, *dims,
            &**fft_rd, &**fft_ph, &**fft_sl,
            scratch_rd, scratch_ph, scratch_sl,
            buffer_ph, buffer_sl,
        );
    }

    /// In-place inverse 3D FFT with 1/N normalisation (like `numpy.fft.ifftn`)
    pub fn ifft3d(&mut self, data: &mut [Complex64]) {
        let n_total = self.dims.len() as f64;
        let Self { dims, ifft_rd, ifft_ph, ifft_sl, scratch_rd, scratch_ph, scratch_sl, buffer_ph, buffer_sl, .. } = self;
        transform_axes(
            data, *dims,
            &**ifft_rd, &**ifft_ph, &**ifft_sl,
            scratch_rd, scratch_ph, scratch_sl,
            buffer_ph, buffer_sl,
        );

        for val in data.iter_mut() {
            *val /= n_total;
        }
    }

    /// Centred forward transform, image -> k-space, in place
    pub fn forward_inplace(&mut self, data: &mut [Complex64]) {
        let dims = self.dims;
        let mut buf = std::mem::take(&mut self.shift_buf);
        circshift_into(data, &mut buf, dims, ifftshift_amount(dims));
        self.fft3d(&mut buf);
        circshift_into(&buf, data, dims, fftshift_amount(dims));
        self.shift_buf = buf;
    }

    /// Centred inverse transform, k-space -> image, in place
    pub fn inverse_inplace(&mut self, data: &mut [Complex64]) {
        let dims = self.dims;
        let mut buf = std::mem::take(&mut self.shift_buf);
        circshift_into(data, &mut buf, dims, fftshift_amount(dims));
        self.ifft3d(&mut buf);
        circshift_into(&buf, data, dims, ifftshift_amount(dims));
        self.shift_buf = buf;
    }
}

/// Run one 1D transform along each of the three axes
#[allow(clippy::too_many_arguments)]
fn transform_axes(
    data: &mut [Complex64],
    dims: Axes3<usize>,
    plan_rd: &dyn Fft<f64>,
    plan_ph: &dyn Fft<f64>,
    plan_sl: &dyn Fft<f64>,
    scratch_rd: &mut [Complex64],
    scratch_ph: &mut [Complex64],
    scratch_sl: &mut [Complex64],
    buffer_ph: &mut [Complex64],
    buffer_sl: &mut [Complex64],
) {
    let (n_rd, n_ph, n_sl) = (dims.readout, dims.phase, dims.slice);

    // Readout lines are contiguous
    for sl in 0..n_sl {
        for ph in 0..n_ph {
            let start = dims.index(0, ph, sl);
            plan_rd.process_with_scratch(&mut data[start..start + n_rd], scratch_rd);
        }
    }

    // Phase lines (stride n_rd)
    for sl in 0..n_sl {
        for rd in 0..n_rd {
            for ph in 0..n_ph {
                buffer_ph[ph] = data[dims.index(rd, ph, sl)];
            }
            plan_ph.process_with_scratch(buffer_ph, scratch_ph);
            for ph in 0..n_ph {
                data[dims.index(rd, ph, sl)] = buffer_ph[ph];
            }
        }
    }

    // Slice lines (stride n_rd*n_ph)
    for ph in 0..n_ph {
        for rd in 0..n_rd {
            for sl in 0..n_sl {
                buffer_sl[sl] = data[dims.index(rd, ph, sl)];
            }
            plan_sl.process_with_scratch(buffer_sl, scratch_sl);
            for sl in 0..n_sl {
                data[dims.index(rd, ph, sl)] = buffer_sl[sl];
            }
        }
    }
}

/// Centred forward transform: image -> k-space
///
/// Matches `fftshift(fftn(ifftshift(image)))`.
pub fn forward(image: &[Complex64], dims: Axes3<usize>) -> ReconResult<Vec<Complex64>> {
    dims.validate()?;
    check_len("image", image.len(), dims.len())?;
    let mut ws = Fft3dWorkspace::new(dims)?;
    let mut out = image.to_vec();
    ws.forward_inplace(&mut out);
    Ok(out)
}

/// Centred inverse transform: k-space -> image
///
/// Matches `ifftshift(ifftn(fftshift(k_space)))`.
pub fn inverse(k_space: &[Complex64], dims: Axes3<usize>) -> ReconResult<Vec<Complex64>> {
    dims.validate()?;
    check_len("k-space", k_space.len(), dims.len())?;
    let mut ws = Fft3dWorkspace::new(dims)?;
    let mut out = k_space.to_vec();
    ws.inverse_inplace(&mut out);
    Ok(out)
}

fn fftshift_amount(dims: Axes3<usize>) -> Axes3<usize> {
    dims.map(|n| n / 2)
}

fn ifftshift_amount(dims: Axes3<usize>) -> Axes3<usize> {
    dims.map(|n| n.div_ceil(2))
}

/// Circularly shift `src` by `shift` voxels per axis into `dst`
fn circshift_into<T: Copy>(src: &[T], dst: &mut [T], dims: Axes3<usize>, shift: Axes3<usize>) {
    for sl in 0..dims.slice {
        let ssl = (sl + shift.slice) % dims.slice;
        for ph in 0..dims.phase {
            let sph = (ph + shift.phase) % dims.phase;
            for rd in 0..dims.readout {
                let srd = (rd + shift.readout) % dims.readout;
                dst[dims.index(srd, sph, ssl)] = src[dims.index(rd, ph, sl)];
            }
        }
    }
}

/// 3D FFT shift: move the zero-frequency sample to the centre
///
/// Matches `numpy.fft.fftshift` for odd and even extents.
pub fn fftshift<T: Copy>(data: &[T], dims: Axes3<usize>) -> Vec<T> {
    let mut out = data.to_vec();
    circshift_into(data, &mut out, dims, fftshift_amount(dims));
    out
}

/// 3D inverse FFT shift: undo [`fftshift`]
///
/// Matches `numpy.fft.ifftshift`.
pub fn ifftshift<T: Copy>(data: &[T], dims: Axes3<usize>) -> Vec<T> {
    let mut out = data.to_vec();
    circshift_into(data, &mut out, dims, ifftshift_amount(dims));
    out
}
