//! Raster source abstraction.
//!
//! The analysis never talks to storage directly; it asks a [`RasterSource`]
//! for every raster of a collection inside a date range.

mod filesystem;
mod memory;

pub use filesystem::FilesystemRasterSource;
pub use memory::InMemoryRasterSource;

use async_trait::async_trait;
use sst_common::DateRange;

use crate::error::Result;
use crate::types::RasterSeries;

/// Trait for fetching raster time series.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Fetch every raster of `collection` whose timestamp lies in
    /// `[range.start, range.end)`.
    ///
    /// An empty series is a valid answer, not an error. Transient I/O
    /// problems should surface as `SourceFetchFailure` so callers can retry.
    async fn fetch(&self, collection: &str, range: &DateRange) -> Result<RasterSeries>;

    /// Short name used in log output.
    fn name(&self) -> &str {
        "raster-source"
    }
}
