//! In-memory output sink, used by tests and embedding callers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::sampler::{DayOfYearBucket, SamplePoint};
use crate::sink::{LayerDescriptor, OutputSink};
use crate::types::{RasterSeries, TimestampedRaster};

/// Keeps everything written to it, keyed by layer or chart name.
#[derive(Debug, Default)]
pub struct MemorySink {
    layers: RwLock<HashMap<String, (LayerDescriptor, RasterSeries)>>,
    charts: RwLock<HashMap<String, Vec<SamplePoint>>>,
    seasonal: RwLock<HashMap<String, Vec<DayOfYearBucket>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer written under `name`, with its descriptor.
    pub async fn layer(&self, name: &str) -> Option<(LayerDescriptor, RasterSeries)> {
        self.layers.read().await.get(name).cloned()
    }

    pub async fn layer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn samples(&self, chart: &str) -> Option<Vec<SamplePoint>> {
        self.charts.read().await.get(chart).cloned()
    }

    pub async fn seasonal(&self, chart: &str) -> Option<Vec<DayOfYearBucket>> {
        self.seasonal.read().await.get(chart).cloned()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write_series(&self, layer: &LayerDescriptor, series: &RasterSeries) -> Result<()> {
        debug!(layer = %layer.name, rasters = series.len(), "Storing layer in memory");
        self.layers
            .write()
            .await
            .insert(layer.name.clone(), (layer.clone(), series.clone()));
        Ok(())
    }

    async fn write_raster(&self, layer: &LayerDescriptor, raster: &TimestampedRaster) -> Result<()> {
        let series = RasterSeries::new(vec![raster.clone()]);
        self.write_series(layer, &series).await
    }

    async fn write_samples(&self, chart: &str, samples: &[SamplePoint]) -> Result<()> {
        self.charts
            .write()
            .await
            .insert(chart.to_string(), samples.to_vec());
        Ok(())
    }

    async fn write_seasonal(&self, chart: &str, buckets: &[DayOfYearBucket]) -> Result<()> {
        self.seasonal
            .write()
            .await
            .insert(chart.to_string(), buckets.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
