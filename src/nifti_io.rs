//! NIfTI-1 volume I/O and scanner-space export
//!
//! Reconstructed images are stored in encoding order (readout, phase,
//! slice). Export maps them onto scanner axes, flips every axis, normalises
//! by the maximum and builds the feet-first-supine (FFS) affine, after which
//! the volume can be written as .nii or .nii.gz.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};
use crate::utils::max_value;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;

/// NIfTI volume loaded into memory
pub struct NiftiData {
    /// Voxel values, first NIfTI axis varying fastest
    pub data: Vec<f64>,
    /// Dimensions (ni, nj, nk); 4D files keep their first volume
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
    pub scl_slope: f64,
    pub scl_inter: f64,
}

// ============================================================================
// Export geometry
// ============================================================================

/// Acquisition geometry needed to place an image in scanner space
///
/// `fov_cm` and `dfov_mm` are indexed by scanner axis (x, y, z);
/// `axes_orientation[e]` is the scanner axis carrying encoding axis `e`
/// (0 = readout, 1 = phase, 2 = slice).
#[derive(Debug, Clone, PartialEq)]
pub struct ExportGeometry {
    pub axes_orientation: [usize; 3],
    pub n_points: Axes3<usize>,
    pub fov_cm: [f64; 3],
    pub dfov_mm: [f64; 3],
}

impl ExportGeometry {
    pub fn validate(&self) -> ReconResult<()> {
        let mut seen = [false; 3];
        for &axis in &self.axes_orientation {
            if axis > 2 || seen[axis] {
                return Err(ReconError::InvalidParameter(format!(
                    "axes_orientation must be a permutation of [0, 1, 2], got {:?}",
                    self.axes_orientation
                )));
            }
            seen[axis] = true;
        }
        self.n_points.validate()
    }

    /// Point counts per scanner axis (x, y, z)
    pub fn n_xyz(&self) -> [usize; 3] {
        let n_enc = self.n_points.to_rd_ph_sl();
        let mut n_xyz = [0; 3];
        for (e, &axis) in self.axes_orientation.iter().enumerate() {
            n_xyz[axis] = n_enc[e];
        }
        n_xyz
    }

    /// Voxel size in mm per scanner axis (x, y, z)
    pub fn resolution_mm(&self) -> [f64; 3] {
        let n_xyz = self.n_xyz();
        [0, 1, 2].map(|a| self.fov_cm[a] / n_xyz[a] as f64 * 10.0)
    }

    /// Voxel size in NIfTI axis order (z, y, x) as written by [`export_volume`]
    pub fn voxel_size(&self) -> (f64, f64, f64) {
        let res = self.resolution_mm();
        (res[2], res[1], res[0])
    }
}

/// Reorder an encoding-order image into the exported NIfTI layout
///
/// NIfTI axes are (z, y, x) of the scanner frame, every axis is reversed,
/// values are divided by the image maximum and made non-negative. An image
/// whose maximum is not positive is only made non-negative.
///
/// # Returns
/// `(data, (nz, ny, nx))` with the first NIfTI axis varying fastest
pub fn export_volume(
    image: &[f64],
    dims: Axes3<usize>,
    geometry: &ExportGeometry,
) -> ReconResult<(Vec<f64>, (usize, usize, usize))> {
    geometry.validate()?;
    if dims != geometry.n_points {
        return Err(ReconError::ShapeMismatch(format!(
            "image dims {:?} do not match geometry n_points {:?} (rd, ph, sl)",
            dims.to_rd_ph_sl(),
            geometry.n_points.to_rd_ph_sl()
        )));
    }
    check_len("image", image.len(), dims.len())?;

    let scale = match max_value(image) {
        Some(max) if max > 0.0 && max.is_finite() => 1.0 / max,
        _ => 1.0,
    };

    let [nx, ny, nz] = geometry.n_xyz();
    let orient = geometry.axes_orientation;
    let mut data = Vec::with_capacity(image.len());
    for k in 0..nx {
        for j in 0..ny {
            for i in 0..nz {
                let xyz = [nx - 1 - k, ny - 1 - j, nz - 1 - i];
                let idx = dims.index(xyz[orient[0]], xyz[orient[1]], xyz[orient[2]]);
                data.push((image[idx] * scale).abs());
            }
        }
    }

    Ok((data, (nz, ny, nx)))
}

/// FFS affine for a volume laid out by [`export_volume`]
pub fn export_affine(geometry: &ExportGeometry) -> ReconResult<[f64; 16]> {
    geometry.validate()?;
    let res = geometry.resolution_mm();
    let dfov = geometry.dfov_mm;
    Ok([
        res[2], 0.0, 0.0, dfov[2],
        0.0, res[1], 0.0, -dfov[1],
        0.0, 0.0, res[0], dfov[0],
        0.0, 0.0, 0.0, 1.0,
    ])
}

/// Export an image and write it to `path` (.nii or .nii.gz)
pub fn export_nifti_to_file(
    path: &Path,
    image: &[f64],
    dims: Axes3<usize>,
    geometry: &ExportGeometry,
) -> ReconResult<()> {
    let (data, nifti_dims) = export_volume(image, dims, geometry)?;
    let affine = export_affine(geometry)?;
    save_nifti_to_file(path, &data, nifti_dims, geometry.voxel_size(), &affine)
}

// ============================================================================
// Reading
// ============================================================================

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Short header summary for error messages
fn header_summary(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("File too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Load a NIfTI volume from bytes (.nii or .nii.gz, detected from content)
pub fn load_nifti(bytes: &[u8]) -> ReconResult<NiftiData> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = match GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed) {
                Ok(_) => header_summary(&decompressed),
                Err(_) => "could not decompress".to_string(),
            };
            ReconError::Nifti(format!("Failed to read gzipped NIfTI: {} ({})", e, info))
        })?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes)).map_err(|e| {
            ReconError::Nifti(format!("Failed to read NIfTI: {} ({})", e, header_summary(bytes)))
        })?
    };

    let header = obj.header();
    if header.dim[0] < 3 {
        return Err(ReconError::Nifti(format!(
            "Expected at least a 3D volume, got {}D",
            header.dim[0]
        )));
    }

    let voxel_size = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    let scl_slope = if header.scl_slope == 0.0 { 1.0 } else { header.scl_slope as f64 };
    let scl_inter = header.scl_inter as f64;
    let affine = header_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| ReconError::Nifti(format!("Failed to convert volume: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(ReconError::Nifti(format!(
            "Expected at least a 3D array, got {}D",
            shape.len()
        )));
    }
    let (ni, nj, nk) = (shape[0], shape[1], shape[2]);

    let mut data = Vec::with_capacity(ni * nj * nk);
    for k in 0..nk {
        for j in 0..nj {
            for i in 0..ni {
                let v = if shape.len() == 3 { array[[i, j, k]] } else { array[[i, j, k, 0]] };
                data.push(v);
            }
        }
    }

    Ok(NiftiData {
        data,
        dims: (ni, nj, nk),
        voxel_size,
        affine,
        scl_slope,
        scl_inter,
    })
}

/// Read a NIfTI file from disk
pub fn read_nifti_file(path: &Path) -> ReconResult<NiftiData> {
    let bytes = std::fs::read(path)?;
    load_nifti(&bytes)
}

/// Affine from the sform rows, or a voxel-size diagonal without sform
fn header_affine(header: &NiftiHeader) -> [f64; 16] {
    if header.sform_code > 0 {
        let (x, y, z) = (&header.srow_x, &header.srow_y, &header.srow_z);
        [
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        let p = &header.pixdim;
        [
            p[1] as f64, 0.0, 0.0, 0.0,
            0.0, p[2] as f64, 0.0, 0.0,
            0.0, 0.0, p[3] as f64, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

// ============================================================================
// Writing
// ============================================================================

fn put<const N: usize>(header: &mut [u8], offset: usize, bytes: [u8; N]) {
    header[offset..offset + N].copy_from_slice(&bytes);
}

/// Encode a float32 single-file NIfTI-1 volume
pub fn save_nifti(
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> ReconResult<Vec<u8>> {
    let (ni, nj, nk) = dims;
    check_len("NIfTI data", data.len(), ni * nj * nk)?;

    let dim_i16 = |n: usize| {
        i16::try_from(n)
            .map_err(|_| ReconError::Nifti(format!("Dimension {} does not fit a NIfTI-1 header", n)))
    };
    let dim: [i16; 8] = [3, dim_i16(ni)?, dim_i16(nj)?, dim_i16(nk)?, 1, 1, 1, 1];

    let mut header = [0u8; HEADER_SIZE];
    put(&mut header, 0, (HEADER_SIZE as i32).to_le_bytes());
    for (i, &d) in dim.iter().enumerate() {
        put(&mut header, 40 + i * 2, d.to_le_bytes());
    }
    // FLOAT32, 32 bits per voxel
    put(&mut header, 70, 16i16.to_le_bytes());
    put(&mut header, 72, 32i16.to_le_bytes());

    let (vi, vj, vk) = voxel_size;
    let pixdim: [f32; 8] = [1.0, vi as f32, vj as f32, vk as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        put(&mut header, 76 + i * 4, p.to_le_bytes());
    }

    put(&mut header, 108, (VOX_OFFSET as f32).to_le_bytes());
    put(&mut header, 112, 1.0f32.to_le_bytes());
    put(&mut header, 116, 0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat), rows at 280 / 296 / 312
    put(&mut header, 254, 1i16.to_le_bytes());
    for (i, &a) in affine[..12].iter().enumerate() {
        put(&mut header, 280 + i * 4, (a as f32).to_le_bytes());
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(VOX_OFFSET + data.len() * 4);
    buffer.extend_from_slice(&header);
    // Empty extension block
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in data {
        buffer.extend_from_slice(&(val as f32).to_le_bytes());
    }
    Ok(buffer)
}

/// Encode a gzipped NIfTI-1 volume (.nii.gz)
pub fn save_nifti_gz(
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> ReconResult<Vec<u8>> {
    let uncompressed = save_nifti(data, dims, voxel_size, affine)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&uncompressed)?;
    Ok(encoder.finish()?)
}

/// Write a volume to disk, gzip compressed when the path ends in .nii.gz
pub fn save_nifti_to_file(
    path: &Path,
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> ReconResult<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        save_nifti_gz(data, dims, voxel_size, affine)?
    } else {
        save_nifti(data, dims, voxel_size, affine)?
    };
    std::fs::write(path, bytes)?;
    Ok(())
}
