//! Output sink writing JSON files under a directory.
//!
//! Layout:
//! - `<root>/layers/<layer>/layer.json`: the [`LayerDescriptor`]
//! - `<root>/layers/<layer>/<YYYYMMDDTHHMMSSZ>.json`: one [`RasterDocument`] per raster
//! - `<root>/charts/<chart>.json`: sample series
//! - `<root>/charts/<chart>.seasonal.json`: day-of-year overlay

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::document::RasterDocument;
use crate::error::{AnalysisError, Result};
use crate::sampler::{DayOfYearBucket, SamplePoint};
use crate::sink::{LayerDescriptor, OutputSink};
use crate::types::{RasterSeries, TimestampedRaster};

/// Writes layers and charts as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    root: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a layer's files.
    pub fn layer_dir(&self, layer: &str) -> PathBuf {
        self.root.join("layers").join(sanitize(layer))
    }

    /// File holding a chart's samples.
    pub fn chart_path(&self, chart: &str) -> PathBuf {
        self.root.join("charts").join(format!("{}.json", sanitize(chart)))
    }

    fn seasonal_path(&self, chart: &str) -> PathBuf {
        self.root
            .join("charts")
            .join(format!("{}.seasonal.json", sanitize(chart)))
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AnalysisError::sink(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| AnalysisError::sink(format!("failed to write {}: {}", path.display(), e)))
    }

    async fn write_layer_entries(
        &self,
        layer: &LayerDescriptor,
        entries: &[TimestampedRaster],
    ) -> Result<()> {
        let dir = self.layer_dir(&layer.name);
        self.write_json(&dir.join("layer.json"), layer).await?;

        for entry in entries {
            let file = format!("{}.json", entry.timestamp.format("%Y%m%dT%H%M%SZ"));
            let doc = RasterDocument::from_raster(entry);
            self.write_json(&dir.join(file), &doc).await?;
        }

        info!(
            layer = %layer.name,
            rasters = entries.len(),
            path = %dir.display(),
            "Wrote layer"
        );
        Ok(())
    }
}

/// Keep names usable as a single path component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl OutputSink for JsonDirectorySink {
    async fn write_series(&self, layer: &LayerDescriptor, series: &RasterSeries) -> Result<()> {
        self.write_layer_entries(layer, series.entries()).await
    }

    async fn write_raster(&self, layer: &LayerDescriptor, raster: &TimestampedRaster) -> Result<()> {
        self.write_layer_entries(layer, std::slice::from_ref(raster)).await
    }

    async fn write_samples(&self, chart: &str, samples: &[SamplePoint]) -> Result<()> {
        let path = self.chart_path(chart);
        self.write_json(&path, samples).await?;
        debug!(chart = %chart, samples = samples.len(), path = %path.display(), "Wrote chart");
        Ok(())
    }

    async fn write_seasonal(&self, chart: &str, buckets: &[DayOfYearBucket]) -> Result<()> {
        let path = self.seasonal_path(chart);
        self.write_json(&path, buckets).await?;
        debug!(chart = %chart, days = buckets.len(), path = %path.display(), "Wrote seasonal chart");
        Ok(())
    }

    fn name(&self) -> &str {
        "json-directory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandedRaster, Raster, SST_BAND};
    use chrono::{TimeZone, Utc};
    use sst_common::GridSpec;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn raster(month: u32, value: f32) -> TimestampedRaster {
        let grid = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0);
        TimestampedRaster::new(
            Utc.with_ymd_and_hms(2020, month, 1, 0, 0, 0).unwrap(),
            BandedRaster::single(SST_BAND, Raster::new(grid, vec![value, f32::NAN]).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_series_round_trips_through_documents() {
        let dir = TempDir::new().unwrap();
        let sink = JsonDirectorySink::new(dir.path());
        let series = RasterSeries::new(vec![raster(1, 27.0), raster(2, 27.5)]);
        let layer = LayerDescriptor::continuous("monthly sst", SST_BAND, 20.0, 32.0);

        sink.write_series(&layer, &series).await.unwrap();

        let layer_dir = sink.layer_dir("monthly sst");
        assert!(layer_dir.ends_with("monthly_sst"));
        let descriptor: LayerDescriptor =
            serde_json::from_slice(&std::fs::read(layer_dir.join("layer.json")).unwrap()).unwrap();
        assert_eq!(descriptor, layer);

        let bytes = std::fs::read(layer_dir.join("20200201T000000Z.json")).unwrap();
        let doc: RasterDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.into_raster().unwrap(), raster(2, 27.5));
    }

    #[tokio::test]
    async fn test_samples_written_per_chart() {
        let dir = TempDir::new().unwrap();
        let sink = JsonDirectorySink::new(dir.path());
        let samples = vec![SamplePoint {
            timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            values: BTreeMap::from([(SST_BAND.to_string(), Some(26.5)), ("SST_Anomaly".to_string(), None)]),
        }];

        sink.write_samples("reef/point", &samples).await.unwrap();

        let path = sink.chart_path("reef/point");
        assert!(path.ends_with("reef_point.json"));
        let read: Vec<SamplePoint> = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(read, samples);
    }
}
