//! Output sinks for layers and charts.
//!
//! A sink receives finished rasters (whole series or single rasters) along
//! with a [`LayerDescriptor`] telling a renderer which band to draw and how,
//! and scalar sample series for charts.

mod json;
mod memory;

pub use json::JsonDirectorySink;
pub use memory::MemorySink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sampler::{DayOfYearBucket, SamplePoint};
use crate::threshold::StressClass;
use crate::types::{RasterSeries, TimestampedRaster, CLASS_BAND};

/// One entry of a categorical legend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLabel {
    pub code: u8,
    pub label: String,
}

/// Rendering hints attached to an output layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Layer name, also used as the output key.
    pub name: String,
    /// Band to display.
    pub band: String,
    /// Display range for continuous bands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<(f32, f32)>,
    /// Legend for categorical bands. Empty for continuous layers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassLabel>,
}

impl LayerDescriptor {
    /// A continuous layer shown over `[min, max]`.
    pub fn continuous(name: impl Into<String>, band: impl Into<String>, min: f32, max: f32) -> Self {
        Self {
            name: name.into(),
            band: band.into(),
            value_range: Some((min, max)),
            classes: Vec::new(),
        }
    }

    /// The two-class heat-stress layer.
    pub fn classification(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            band: CLASS_BAND.to_string(),
            value_range: Some((0.0, 1.0)),
            classes: StressClass::ALL
                .iter()
                .map(|c| ClassLabel {
                    code: c.code(),
                    label: c.label().to_string(),
                })
                .collect(),
        }
    }

    pub fn is_categorical(&self) -> bool {
        !self.classes.is_empty()
    }
}

/// Destination for analysis outputs.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Write every raster of a series as one layer.
    async fn write_series(&self, layer: &LayerDescriptor, series: &RasterSeries) -> Result<()>;

    /// Write a single raster as a layer.
    async fn write_raster(&self, layer: &LayerDescriptor, raster: &TimestampedRaster) -> Result<()>;

    /// Write a sampled time series for a chart.
    async fn write_samples(&self, chart: &str, samples: &[SamplePoint]) -> Result<()>;

    /// Write a day-of-year overlay for a chart.
    async fn write_seasonal(&self, chart: &str, buckets: &[DayOfYearBucket]) -> Result<()>;

    /// Sink name for logging.
    fn name(&self) -> &str {
        "output-sink"
    }
}
