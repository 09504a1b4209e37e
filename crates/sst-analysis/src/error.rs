//! Error types for SST analysis.

use thiserror::Error;

/// Errors that can occur while building or running an analysis.
///
/// Several variants describe conditions the pipeline recovers from locally
/// (an unavailable source becomes an empty series, a degenerate raster or a
/// missing climatology month passes through unchanged). They still exist as
/// values so that callers driving the components directly can see them.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A source has no rasters for the requested range.
    #[error("source '{collection}' has no rasters in {range}")]
    SourceUnavailable { collection: String, range: String },

    /// A transient failure reading from a raster source.
    #[error("failed to fetch '{collection}': {message}")]
    SourceFetchFailure { collection: String, message: String },

    /// A monthly or climatological bucket had no contributing rasters.
    #[error("no rasters contributed to {0}")]
    EmptyAggregationInput(String),

    /// No climatology entry exists for the requested month of year.
    #[error("no climatology reference for month {0}")]
    MissingClimatologyReference(u32),

    /// Band arithmetic was attempted on a raster without bands.
    #[error("raster at {0} has no bands")]
    DegenerateRaster(String),

    /// Rasters being combined do not share a grid.
    #[error("grid mismatch: expected {expected}, got {actual}")]
    GridMismatch { expected: String, actual: String },

    /// A named band is absent from a raster that has other bands.
    #[error("band '{0}' not found")]
    BandNotFound(String),

    /// Band data does not match the grid size.
    #[error("band '{band}' has {actual} values, grid expects {expected}")]
    ShapeMismatch {
        band: String,
        expected: usize,
        actual: usize,
    },

    /// Configuration error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Output sink error.
    #[error("output sink error: {0}")]
    Sink(String),

    /// The run was abandoned.
    #[error("analysis cancelled")]
    Cancelled,

    /// A blocking analysis task panicked or was dropped.
    #[error("analysis task failed: {0}")]
    Task(String),

    /// Error from a shared type (grid, time range, geometry).
    #[error(transparent)]
    Common(#[from] sst_common::SstError),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster document (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AnalysisError {
    /// Create a SourceUnavailable error.
    pub fn source_unavailable(collection: impl Into<String>, range: impl ToString) -> Self {
        Self::SourceUnavailable {
            collection: collection.into(),
            range: range.to_string(),
        }
    }

    /// Create a SourceFetchFailure error.
    pub fn fetch_failure(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFetchFailure {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create a GridMismatch error.
    pub fn grid_mismatch(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        Self::GridMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a Sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceFetchFailure { .. } | Self::Io(_))
    }
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Task(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AnalysisError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
