//! JSON raster documents.
//!
//! Layout shared by [`FilesystemRasterSource`](crate::source::FilesystemRasterSource)
//! and [`JsonDirectorySink`](crate::sink::JsonDirectorySink). No-data cells are
//! written as `null` since JSON has no `NaN`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sst_common::GridSpec;

use crate::error::{AnalysisError, Result};
use crate::types::{BandedRaster, Raster, TimestampedRaster};

/// A serialized timestamped raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterDocument {
    pub timestamp: DateTime<Utc>,
    pub grid: GridSpec,
    /// Sentinel value the producer used for missing cells, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<f32>,
    /// Band name to row-major values. An empty map is a degenerate raster.
    pub bands: BTreeMap<String, Vec<Option<f32>>>,
}

impl RasterDocument {
    /// Serialize form of a raster.
    pub fn from_raster(raster: &TimestampedRaster) -> Self {
        let bands = raster
            .raster
            .bands()
            .map(|(name, band)| {
                let values = band
                    .data()
                    .iter()
                    .map(|v| (!v.is_nan()).then_some(*v))
                    .collect();
                (name.to_string(), values)
            })
            .collect();

        Self {
            timestamp: raster.timestamp,
            grid: raster.grid().clone(),
            fill_value: None,
            bands,
        }
    }

    /// Decode into a raster, validating the grid and band lengths.
    pub fn into_raster(self) -> Result<TimestampedRaster> {
        self.grid.validate()?;

        let mut banded = BandedRaster::empty(self.grid.clone());
        for (name, values) in self.bands {
            if values.len() != self.grid.len() {
                return Err(AnalysisError::ShapeMismatch {
                    band: name,
                    expected: self.grid.len(),
                    actual: values.len(),
                });
            }
            let data = values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect();
            let raster = Raster::from_raw(self.grid.clone(), data, self.fill_value)?;
            banded = banded.with_band(name, raster)?;
        }

        Ok(TimestampedRaster::new(self.timestamp, banded))
    }
}
