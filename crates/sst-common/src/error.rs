//! Error types for shared SST types.

use thiserror::Error;

/// Result type alias using SstError.
pub type SstResult<T> = Result<T, SstError>;

/// Validation and parse errors for grids, time ranges and geometries.
#[derive(Debug, Error)]
pub enum SstError {
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid month: {0} (expected 1-12)")]
    InvalidMonth(u32),

    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl SstError {
    /// Create an InvalidRange error.
    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}
