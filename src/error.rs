use thiserror::Error;

/// Errors raised by the reconstruction core.
///
/// Shape and parameter checks run before any output buffer is touched, so an
/// `Err` never leaves a half-written result behind.
#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Volume too small: {0}")]
    VolumeTooSmall(String),

    #[error("NIfTI error: {0}")]
    Nifti(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReconResult<T> = Result<T, ReconError>;

/// Check that a flat buffer holds exactly `expected` samples.
pub(crate) fn check_len(what: &str, actual: usize, expected: usize) -> ReconResult<()> {
    if actual != expected {
        return Err(ReconError::ShapeMismatch(format!(
            "{} has {} samples, expected {}",
            what, actual, expected
        )));
    }
    Ok(())
}
