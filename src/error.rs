//! Error types for element configuration and evaluation.

use thiserror::Error;

/// Result type alias using the crate Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or evaluating an element.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid element configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid material properties.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// Query issued before the reference configuration was captured.
    #[error("element not initialized: {0} requires setup_initial")]
    NotInitialized(&'static str),

    /// Inverted or collapsed element.
    #[error("degenerate geometry: det(J0) = {det} at ({x}, {y}, {z})")]
    DegenerateGeometry { det: f64, x: f64, y: f64, z: f64 },

    /// NaN or infinity in a computed quantity.
    #[error("numerical failure: non-finite values in {0}")]
    NumericalFailure(&'static str),

    /// Caller supplied a buffer or vector of the wrong size.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration file errors.
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Fails with `NumericalFailure` if any value is NaN or infinite.
pub(crate) fn ensure_finite<'a>(
    values: impl IntoIterator<Item = &'a f64>,
    what: &'static str,
) -> Result<()> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::NumericalFailure(what))
    }
}
