//! BM4D collaborative filtering for 3D magnitude volumes
//!
//! Two-stage block-matching filter:
//! 1. Hard thresholding: similar blocks are stacked into a 4D group,
//!    transformed (3D DCT per block, Haar across the group), thresholded at
//!    `lambda_ht * sigma` and aggregated into a basic estimate.
//! 2. Wiener filtering: groups are re-matched on the basic estimate and the
//!    noisy coefficients are shrunk by the empirical Wiener gain.
//!
//! Assumes additive white noise of standard deviation `sigma` in the
//! volume's own units.
//!
//! Reference: Maggioni M, et al. "Nonlocal transform-domain filter for
//! volumetric data denoising and reconstruction." IEEE TIP 22.1 (2013).

use rayon::prelude::*;

use crate::axes::Axes3;
use crate::error::{check_len, ReconError, ReconResult};

/// Which filtering stages to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bm4dStages {
    /// Hard thresholding only (basic estimate)
    HardThresholding,
    /// Hard thresholding followed by Wiener filtering
    #[default]
    All,
}

impl Bm4dStages {
    fn count(self) -> usize {
        match self {
            Bm4dStages::HardThresholding => 1,
            Bm4dStages::All => 2,
        }
    }
}

/// Parameters for BM4D
#[derive(Debug, Clone, Copy)]
pub struct Bm4dParams {
    /// Noise standard deviation in volume units
    pub sigma: f64,
    pub stages: Bm4dStages,
    /// Block edge length (clamped to the volume on short axes)
    pub block_size: usize,
    /// Stride between reference blocks
    pub step: usize,
    /// Half-width of the cubic search window
    pub search_radius: usize,
    /// Matching threshold for stage 1, in units of sigma^2
    pub tau_match_ht: f64,
    /// Matching threshold for stage 2, in units of sigma^2
    pub tau_match_wiener: f64,
    pub max_group_ht: usize,
    pub max_group_wiener: usize,
    /// Hard threshold multiplier
    pub lambda_ht: f64,
}

impl Default for Bm4dParams {
    fn default() -> Self {
        Self {
            sigma: 5.0,
            stages: Bm4dStages::All,
            block_size: 4,
            step: 3,
            search_radius: 5,
            tau_match_ht: 3.0,
            tau_match_wiener: 1.0,
            max_group_ht: 16,
            max_group_wiener: 32,
            lambda_ht: 2.7,
        }
    }
}

impl Bm4dParams {
    /// Default parameters with a given noise level
    pub fn with_sigma(sigma: f64) -> Self {
        Self { sigma, ..Default::default() }
    }

    pub fn validate(&self) -> ReconResult<()> {
        if !(self.sigma >= 0.0 && self.sigma.is_finite()) {
            return Err(ReconError::InvalidParameter(format!(
                "sigma must be finite and >= 0, got {}",
                self.sigma
            )));
        }
        if self.block_size == 0 || self.step == 0 {
            return Err(ReconError::InvalidParameter(
                "block_size and step must be >= 1".to_string(),
            ));
        }
        if self.max_group_ht == 0 || self.max_group_wiener == 0 {
            return Err(ReconError::InvalidParameter(
                "maximum group sizes must be >= 1".to_string(),
            ));
        }
        for (name, v) in [
            ("tau_match_ht", self.tau_match_ht),
            ("tau_match_wiener", self.tau_match_wiener),
            ("lambda_ht", self.lambda_ht),
        ] {
            if !(v >= 0.0 && v.is_finite()) {
                return Err(ReconError::InvalidParameter(format!(
                    "{} must be finite and >= 0, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

/// BM4D denoising
///
/// # Arguments
/// * `noisy` - Noisy volume (dims.len())
/// * `dims` - Volume dimensions
/// * `params` - Filter parameters
///
/// # Returns
/// Denoised volume. A sigma of zero returns the input unchanged.
pub fn bm4d(noisy: &[f64], dims: Axes3<usize>, params: &Bm4dParams) -> ReconResult<Vec<f64>> {
    bm4d_with_progress(noisy, dims, params, |_, _| {})
}

/// BM4D denoising with a progress callback
///
/// `progress_callback(stage, total_stages)` is called after each completed
/// stage.
pub fn bm4d_with_progress<F>(
    noisy: &[f64],
    dims: Axes3<usize>,
    params: &Bm4dParams,
    mut progress_callback: F,
) -> ReconResult<Vec<f64>>
where
    F: FnMut(usize, usize),
{
    dims.validate()?;
    check_len("noisy volume", noisy.len(), dims.len())?;
    params.validate()?;

    let total = params.stages.count();
    if params.sigma == 0.0 {
        progress_callback(total, total);
        return Ok(noisy.to_vec());
    }

    let block = dims.map(|n| params.block_size.min(n));
    let transform = BlockTransform::new(block);
    let refs = reference_grid(dims, block, params.step);
    let sigma2 = params.sigma * params.sigma;

    let basic_stage = Stage {
        kind: StageKind::HardThreshold { threshold: params.lambda_ht * params.sigma },
        max_group: largest_power_of_two(params.max_group_ht),
        max_distance: params.tau_match_ht * sigma2,
        sigma2,
    };
    let basic = run_stage(noisy, noisy, dims, block, &transform, &refs, params, &basic_stage);
    progress_callback(1, total);

    if params.stages == Bm4dStages::HardThresholding {
        return Ok(basic);
    }

    let wiener_stage = Stage {
        kind: StageKind::Wiener,
        max_group: largest_power_of_two(params.max_group_wiener),
        max_distance: params.tau_match_wiener * sigma2,
        sigma2,
    };
    let final_estimate = run_stage(noisy, &basic, dims, block, &transform, &refs, params, &wiener_stage);
    progress_callback(2, total);

    Ok(final_estimate)
}

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum StageKind {
    HardThreshold { threshold: f64 },
    Wiener,
}

struct Stage {
    kind: StageKind,
    max_group: usize,
    /// Mean squared distance below which a block joins the group
    max_distance: f64,
    sigma2: f64,
}

/// Filtered blocks of one group with their aggregation weight
struct GroupEstimate {
    positions: Vec<Axes3<usize>>,
    blocks: Vec<f64>,
    weight: f64,
}

/// Run one stage: match on `pilot`, filter `noisy`, aggregate
#[allow(clippy::too_many_arguments)]
fn run_stage(
    noisy: &[f64],
    pilot: &[f64],
    dims: Axes3<usize>,
    block: Axes3<usize>,
    transform: &BlockTransform,
    refs: &[Axes3<usize>],
    params: &Bm4dParams,
    stage: &Stage,
) -> Vec<f64> {
    let estimates: Vec<GroupEstimate> = refs
        .par_iter()
        .map(|&reference| {
            let positions = match_blocks(
                pilot,
                dims,
                block,
                reference,
                params.search_radius,
                stage.max_group,
                stage.max_distance,
            );
            filter_group(noisy, pilot, dims, block, transform, positions, stage)
        })
        .collect();

    aggregate(noisy, dims, block, &estimates)
}

fn filter_group(
    noisy: &[f64],
    pilot: &[f64],
    dims: Axes3<usize>,
    block: Axes3<usize>,
    transform: &BlockTransform,
    positions: Vec<Axes3<usize>>,
    stage: &Stage,
) -> GroupEstimate {
    let block_len = block.len();
    let k = positions.len();
    let mut line = Vec::new();

    let mut group = vec![0.0; k * block_len];
    for (chunk, &pos) in group.chunks_exact_mut(block_len).zip(&positions) {
        extract_block(noisy, dims, block, pos, chunk);
        transform.forward(chunk, &mut line);
    }
    haar_along_group(&mut group, block_len, k, false);

    let weight = match stage.kind {
        StageKind::HardThreshold { threshold } => {
            let mut nonzero = 0usize;
            for c in group.iter_mut() {
                if c.abs() < threshold {
                    *c = 0.0;
                } else {
                    nonzero += 1;
                }
            }
            1.0 / nonzero.max(1) as f64
        }
        StageKind::Wiener => {
            let mut basic = vec![0.0; k * block_len];
            for (chunk, &pos) in basic.chunks_exact_mut(block_len).zip(&positions) {
                extract_block(pilot, dims, block, pos, chunk);
                transform.forward(chunk, &mut line);
            }
            haar_along_group(&mut basic, block_len, k, false);

            let mut sum_w2 = 0.0;
            for (c, &b) in group.iter_mut().zip(&basic) {
                let b2 = b * b;
                let w = b2 / (b2 + stage.sigma2);
                *c *= w;
                sum_w2 += w * w;
            }
            if sum_w2 > 0.0 {
                1.0 / (stage.sigma2 * sum_w2)
            } else {
                1.0
            }
        }
    };

    haar_along_group(&mut group, block_len, k, true);
    for chunk in group.chunks_exact_mut(block_len) {
        transform.inverse(chunk, &mut line);
    }

    GroupEstimate { positions, blocks: group, weight }
}

/// Weighted average of all group estimates; uncovered voxels keep `fallback`
fn aggregate(
    fallback: &[f64],
    dims: Axes3<usize>,
    block: Axes3<usize>,
    estimates: &[GroupEstimate],
) -> Vec<f64> {
    let mut numerator = vec![0.0; dims.len()];
    let mut denominator = vec![0.0; dims.len()];
    let block_len = block.len();

    for estimate in estimates {
        for (chunk, &pos) in estimate.blocks.chunks_exact(block_len).zip(&estimate.positions) {
            for sl in 0..block.slice {
                for ph in 0..block.phase {
                    let src = block.index(0, ph, sl);
                    let dst = dims.index(pos.readout, pos.phase + ph, pos.slice + sl);
                    for rd in 0..block.readout {
                        numerator[dst + rd] += estimate.weight * chunk[src + rd];
                        denominator[dst + rd] += estimate.weight;
                    }
                }
            }
        }
    }

    numerator
        .iter()
        .zip(&denominator)
        .zip(fallback)
        .map(|((&num, &den), &orig)| if den > 0.0 { num / den } else { orig })
        .collect()
}

// ============================================================================
// Block matching
// ============================================================================

/// Reference block corners along one axis: 0, step, 2*step, ... and the last
/// valid corner
fn axis_positions(n: usize, block: usize, step: usize) -> Vec<usize> {
    let last = n - block;
    let mut positions: Vec<usize> = (0..=last).step_by(step).collect();
    if positions.last() != Some(&last) {
        positions.push(last);
    }
    positions
}

fn reference_grid(dims: Axes3<usize>, block: Axes3<usize>, step: usize) -> Vec<Axes3<usize>> {
    let rd = axis_positions(dims.readout, block.readout, step);
    let ph = axis_positions(dims.phase, block.phase, step);
    let sl = axis_positions(dims.slice, block.slice, step);

    let mut refs = Vec::with_capacity(rd.len() * ph.len() * sl.len());
    for &s in &sl {
        for &p in &ph {
            for &r in &rd {
                refs.push(Axes3::new(r, p, s));
            }
        }
    }
    refs
}

fn extract_block(volume: &[f64], dims: Axes3<usize>, block: Axes3<usize>, pos: Axes3<usize>, out: &mut [f64]) {
    for sl in 0..block.slice {
        for ph in 0..block.phase {
            let src = dims.index(pos.readout, pos.phase + ph, pos.slice + sl);
            let dst = block.index(0, ph, sl);
            out[dst..dst + block.readout].copy_from_slice(&volume[src..src + block.readout]);
        }
    }
}

/// Sum of squared differences, abandoned once it exceeds `limit`
fn block_distance(
    volume: &[f64],
    dims: Axes3<usize>,
    block: Axes3<usize>,
    reference: &[f64],
    pos: Axes3<usize>,
    limit: f64,
) -> Option<f64> {
    let mut ssd = 0.0;
    for sl in 0..block.slice {
        for ph in 0..block.phase {
            let src = dims.index(pos.readout, pos.phase + ph, pos.slice + sl);
            let r = block.index(0, ph, sl);
            for (a, b) in volume[src..src + block.readout]
                .iter()
                .zip(&reference[r..r + block.readout])
            {
                ssd += (a - b) * (a - b);
            }
        }
        if ssd > limit {
            return None;
        }
    }
    Some(ssd)
}

/// Find blocks similar to the one at `reference`
///
/// The reference block itself always comes first. The result is truncated
/// to the largest power of two not exceeding the number of matches.
fn match_blocks(
    volume: &[f64],
    dims: Axes3<usize>,
    block: Axes3<usize>,
    reference: Axes3<usize>,
    radius: usize,
    max_group: usize,
    max_distance: f64,
) -> Vec<Axes3<usize>> {
    let mut ref_block = vec![0.0; block.len()];
    extract_block(volume, dims, block, reference, &mut ref_block);
    let limit = max_distance * block.len() as f64;

    let window = |start: usize, n: usize, b: usize| {
        (start.saturating_sub(radius), (start + radius).min(n - b))
    };
    let (rd0, rd1) = window(reference.readout, dims.readout, block.readout);
    let (ph0, ph1) = window(reference.phase, dims.phase, block.phase);
    let (sl0, sl1) = window(reference.slice, dims.slice, block.slice);

    let mut candidates: Vec<(f64, Axes3<usize>)> = Vec::new();
    for sl in sl0..=sl1 {
        for ph in ph0..=ph1 {
            for rd in rd0..=rd1 {
                let pos = Axes3::new(rd, ph, sl);
                if pos == reference {
                    continue;
                }
                if let Some(d) = block_distance(volume, dims, block, &ref_block, pos, limit) {
                    if d <= limit {
                        candidates.push((d, pos));
                    }
                }
            }
        }
    }

    // Stable sort keeps scan order among equal distances
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    let count = largest_power_of_two((candidates.len() + 1).min(max_group));
    let mut group = Vec::with_capacity(count);
    group.push(reference);
    group.extend(candidates.into_iter().take(count - 1).map(|(_, pos)| pos));
    group
}

/// Largest power of two <= n (n >= 1)
fn largest_power_of_two(n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    1 << (usize::BITS - 1 - n.leading_zeros())
}

// ============================================================================
// Transforms
// ============================================================================

/// Separable orthonormal DCT-II over a (possibly anisotropic) block
struct BlockTransform {
    block: Axes3<usize>,
    dct_rd: Vec<f64>,
    dct_ph: Vec<f64>,
    dct_sl: Vec<f64>,
}

impl BlockTransform {
    fn new(block: Axes3<usize>) -> Self {
        Self {
            block,
            dct_rd: dct_matrix(block.readout),
            dct_ph: dct_matrix(block.phase),
            dct_sl: dct_matrix(block.slice),
        }
    }

    fn forward(&self, data: &mut [f64], line: &mut Vec<f64>) {
        self.apply(data, line, false);
    }

    fn inverse(&self, data: &mut [f64], line: &mut Vec<f64>) {
        self.apply(data, line, true);
    }

    fn apply(&self, data: &mut [f64], line: &mut Vec<f64>, transpose: bool) {
        let b = self.block;
        let stride_ph = b.readout;
        let stride_sl = b.readout * b.phase;

        for sl in 0..b.slice {
            for ph in 0..b.phase {
                apply_line(data, b.index(0, ph, sl), 1, b.readout, &self.dct_rd, transpose, line);
            }
        }
        for sl in 0..b.slice {
            for rd in 0..b.readout {
                apply_line(data, b.index(rd, 0, sl), stride_ph, b.phase, &self.dct_ph, transpose, line);
            }
        }
        for ph in 0..b.phase {
            for rd in 0..b.readout {
                apply_line(data, b.index(rd, ph, 0), stride_sl, b.slice, &self.dct_sl, transpose, line);
            }
        }
    }
}

/// Orthonormal DCT-II matrix, row k = basis function k
fn dct_matrix(n: usize) -> Vec<f64> {
    let nf = n as f64;
    let mut m = vec![0.0; n * n];
    for k in 0..n {
        let alpha = if k == 0 { (1.0 / nf).sqrt() } else { (2.0 / nf).sqrt() };
        for j in 0..n {
            m[k * n + j] =
                alpha * (std::f64::consts::PI * (2 * j + 1) as f64 * k as f64 / (2.0 * nf)).cos();
        }
    }
    m
}

/// Multiply one strided line by `mat` (or its transpose)
fn apply_line(
    data: &mut [f64],
    start: usize,
    stride: usize,
    n: usize,
    mat: &[f64],
    transpose: bool,
    line: &mut Vec<f64>,
) {
    if n <= 1 {
        return;
    }
    line.clear();
    line.extend((0..n).map(|i| data[start + i * stride]));
    for k in 0..n {
        let mut acc = 0.0;
        for j in 0..n {
            let coeff = if transpose { mat[j * n + k] } else { mat[k * n + j] };
            acc += coeff * line[j];
        }
        data[start + k * stride] = acc;
    }
}

/// Orthonormal Haar transform across the group dimension
///
/// `group` holds `k` blocks of `block_len` coefficients back to back; `k`
/// must be a power of two.
fn haar_along_group(group: &mut [f64], block_len: usize, k: usize, inverse: bool) {
    if k <= 1 {
        return;
    }
    let mut column = vec![0.0; k];
    let mut tmp = vec![0.0; k];
    for c in 0..block_len {
        for (i, v) in column.iter_mut().enumerate() {
            *v = group[i * block_len + c];
        }
        if inverse {
            haar_inverse(&mut column, &mut tmp);
        } else {
            haar_forward(&mut column, &mut tmp);
        }
        for (i, &v) in column.iter().enumerate() {
            group[i * block_len + c] = v;
        }
    }
}

fn haar_forward(data: &mut [f64], tmp: &mut [f64]) {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let mut len = data.len();
    while len > 1 {
        let half = len / 2;
        for i in 0..half {
            tmp[i] = (data[2 * i] + data[2 * i + 1]) * s;
            tmp[half + i] = (data[2 * i] - data[2 * i + 1]) * s;
        }
        data[..len].copy_from_slice(&tmp[..len]);
        len = half;
    }
}

fn haar_inverse(data: &mut [f64], tmp: &mut [f64]) {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let n = data.len();
    let mut len = 2;
    while len <= n {
        let half = len / 2;
        for i in 0..half {
            tmp[2 * i] = (data[i] + data[half + i]) * s;
            tmp[2 * i + 1] = (data[i] - data[half + i]) * s;
        }
        data[..len].copy_from_slice(&tmp[..len]);
        len *= 2;
    }
}
