//! Monthly SST climatology, anomaly and bleaching heat-stress analysis
//!
//! This crate turns one or more gridded sea-surface-temperature sources into
//! monthly means, a twelve-month climatology, monthly anomalies and a
//! two-class heat-stress classification against a bleaching threshold.
//!
//! # Architecture
//!
//! ```text
//! RasterSource (xN)
//!      │
//!      ▼
//! ScaledRasterSeries      per-source scale + offset
//!      │
//!      ▼
//! merge_series            later source wins over its coverage
//!      │
//!      ▼
//! TemporalAggregator ───► monthly means ───► climatology
//!      │                        │                 │
//!      │                        ▼                 │
//!      │                  AnomalyEngine ◄─────────┘
//!      │                        │
//!      ▼                        ▼
//! SeriesSampler           threshold / classify
//!      │                        │
//!      └──────────► OutputSink ◄┘
//! ```
//!
//! No-data is `NaN` throughout. A month with no input rasters becomes a
//! degenerate (band-less) raster that stays in the series so that monthly
//! slots and climatology months always line up.
//!
//! # Example
//!
//! ```ignore
//! use sst_analysis::{AbortFlag, FilesystemRasterSource, JsonDirectorySink, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_yaml_file("pipeline.yaml")?.with_env_overrides();
//! let pipeline = Pipeline::new(
//!     config,
//!     Arc::new(FilesystemRasterSource::new("data")),
//!     Arc::new(JsonDirectorySink::new("out")),
//! )?;
//! let output = pipeline.run(&AbortFlag::new()).await?;
//! ```

pub mod aggregate;
pub mod anomaly;
pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod sampler;
pub mod scale;
pub mod sink;
pub mod source;
pub mod threshold;
pub mod types;

// Re-export commonly used types at crate root
pub use aggregate::{pixel_mean, TemporalAggregator};
pub use anomaly::AnomalyEngine;
pub use cancel::AbortFlag;
pub use config::{OutputConfig, PipelineConfig, RetryPolicy, SourceConfig};
pub use document::RasterDocument;
pub use error::{AnalysisError, Result};
pub use merge::{merge_pair, merge_series};
pub use pipeline::{Pipeline, PipelineOutput, PipelineReport, SourceReport};
pub use sampler::{
    bucket_by_day_of_year, sample_at_point, sample_over_region, DayOfYearBucket, Reducer,
    SamplePoint,
};
pub use scale::{ScaleTransform, ScaledRasterSeries};
pub use sink::{ClassLabel, JsonDirectorySink, LayerDescriptor, MemorySink, OutputSink};
pub use source::{FilesystemRasterSource, InMemoryRasterSource, RasterSource};
pub use threshold::{
    add_threshold, classify, classify_series, maximum_monthly_mean, ClassifiedRaster, StressClass,
};
pub use types::{
    BandedRaster, ClimatologySet, Raster, RasterSeries, TimestampedRaster, ANOMALY_BAND,
    CLASS_BAND, SST_BAND, THRESHOLD_BAND,
};

// Shared types from sst-common
pub use sst_common::{BoundingBox, DateRange, GridSpec, MonthKey, Region};
