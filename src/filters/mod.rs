//! k-space apodization filters
//!
//! - Cosbell: power-cosine window driven by the sampled k-space coordinates
//! - Hanning edge: hard truncation with a half-Hanning roll-off before the cutoff

pub mod cosbell;
pub mod hanning;

pub use cosbell::{cosbell_filter, cosbell_filter_inplace};
pub use hanning::{half_hanning_window, hanning_filter, hanning_window};
