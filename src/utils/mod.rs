//! Utility functions shared across the pipeline
//!
//! - Volume statistics (magnitude, mean/std, Pearson correlation)
//! - SIMD-accelerated reductions (optional, with `simd` feature)

pub mod stats;
pub mod simd_ops;

pub use stats::*;
pub use simd_ops::*;
