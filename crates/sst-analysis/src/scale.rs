//! Per-source linear scaling of a raw raster series.
//!
//! Different sensor generations store SST with different packing (e.g.
//! hundredths of a degree, or Kelvin with an offset). Each source gets one
//! [`ScaleTransform`] that brings its value band into degrees Celsius so that
//! series can be merged.

use serde::{Deserialize, Serialize};
use sst_common::DateRange;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::source::RasterSource;
use crate::types::{RasterSeries, TimestampedRaster};

/// Linear transform `output = input * multiplier + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScaleTransform")]
pub struct ScaleTransform {
    multiplier: f32,
    offset: f32,
}

#[derive(Deserialize)]
struct RawScaleTransform {
    multiplier: f32,
    #[serde(default)]
    offset: f32,
}

impl TryFrom<RawScaleTransform> for ScaleTransform {
    type Error = AnalysisError;

    fn try_from(raw: RawScaleTransform) -> Result<Self> {
        ScaleTransform::new(raw.multiplier, raw.offset)
    }
}

impl ScaleTransform {
    /// Create a transform. A zero or non-finite multiplier would hide every
    /// scaled value and is rejected up front.
    pub fn new(multiplier: f32, offset: f32) -> Result<Self> {
        if !multiplier.is_finite() || multiplier == 0.0 {
            return Err(AnalysisError::invalid_config(format!(
                "scale multiplier must be finite and non-zero, got {}",
                multiplier
            )));
        }
        if !offset.is_finite() {
            return Err(AnalysisError::invalid_config(format!(
                "scale offset must be finite, got {}",
                offset
            )));
        }
        Ok(Self { multiplier, offset })
    }

    /// The identity transform (x1, +0).
    pub fn identity() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
        }
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Apply to a single value.
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        value * self.multiplier + self.offset
    }

    pub fn is_identity(&self) -> bool {
        self.multiplier == 1.0 && self.offset == 0.0
    }
}

impl Default for ScaleTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// A raster series whose value band has been scaled into common units.
#[derive(Debug, Clone)]
pub struct ScaledRasterSeries {
    band: String,
    transform: ScaleTransform,
    series: RasterSeries,
}

impl ScaledRasterSeries {
    /// Scale the `band` of every raster in `raw`.
    ///
    /// Other bands and the no-data mask are carried over unchanged. Rasters
    /// that do not have `band` pass through as they are.
    pub fn new(raw: &RasterSeries, band: impl Into<String>, transform: ScaleTransform) -> Result<Self> {
        let band = band.into();
        let mut entries = Vec::with_capacity(raw.len());

        for entry in raw {
            let raster = match entry.raster.band(&band) {
                Some(values) if !transform.is_identity() => {
                    let scaled = values.map(|v| transform.apply(v));
                    entry.raster.clone().with_band(band.as_str(), scaled)?
                }
                Some(_) => entry.raster.clone(),
                None => {
                    debug!(
                        band = %band,
                        timestamp = %entry.timestamp,
                        "Raster has no value band, passing through unscaled"
                    );
                    entry.raster.clone()
                }
            };
            entries.push(TimestampedRaster::new(entry.timestamp, raster));
        }

        let mut series = RasterSeries::new(entries);
        if let Some(coverage) = raw.coverage() {
            series = series.with_coverage(*coverage);
        }

        Ok(Self {
            band,
            transform,
            series,
        })
    }

    /// Fetch `collection` over `range` and scale it.
    ///
    /// Returns `SourceUnavailable` when the source has nothing in range;
    /// pipelines treat that as an empty contribution. The result declares no
    /// coverage: asking for a range is not a claim to own it.
    pub async fn fetch<S>(
        source: &S,
        collection: &str,
        range: &DateRange,
        band: impl Into<String>,
        transform: ScaleTransform,
    ) -> Result<Self>
    where
        S: RasterSource + ?Sized,
    {
        let raw = source.fetch(collection, range).await?;
        if raw.is_empty() {
            return Err(AnalysisError::source_unavailable(collection, range));
        }

        Self::new(&raw, band, transform)
    }

    /// Name of the value band.
    pub fn band(&self) -> &str {
        &self.band
    }

    pub fn transform(&self) -> ScaleTransform {
        self.transform
    }

    pub fn series(&self) -> &RasterSeries {
        &self.series
    }

    pub fn into_series(self) -> RasterSeries {
        self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandedRaster, Raster, SST_BAND};
    use chrono::{TimeZone, Utc};
    use sst_common::GridSpec;

    fn grid() -> GridSpec {
        GridSpec::new(3, 1, 0.0, 1.0, 1.0, 1.0)
    }

    fn raw_series(values: Vec<f32>) -> RasterSeries {
        let t = Utc.with_ymd_and_hms(2020, 1, 15, 0, 0, 0).unwrap();
        let raster = BandedRaster::single(SST_BAND, Raster::new(grid(), values).unwrap())
            .with_band("QUALITY", Raster::filled(grid(), 5.0))
            .unwrap();
        RasterSeries::new(vec![TimestampedRaster::new(t, raster)])
    }

    #[test]
    fn test_transform_rejects_zero_multiplier() {
        assert!(ScaleTransform::new(0.0, 1.0).is_err());
        assert!(ScaleTransform::new(f32::NAN, 1.0).is_err());
        assert!(ScaleTransform::new(1.0, f32::INFINITY).is_err());
        assert!(ScaleTransform::new(0.01, -273.15).is_ok());
    }

    #[test]
    fn test_scaling_is_exact() {
        let transform = ScaleTransform::new(2.0, -5.0).unwrap();
        let scaled = ScaledRasterSeries::new(&raw_series(vec![10.0, 15.5, 20.0]), SST_BAND, transform)
            .unwrap();
        let sst = scaled.series().get(0).unwrap().raster.band(SST_BAND).unwrap();
        assert_eq!(sst.data(), &[15.0, 26.0, 35.0]);
    }

    #[test]
    fn test_scaling_never_creates_data() {
        let transform = ScaleTransform::new(0.01, 10.0).unwrap();
        let scaled =
            ScaledRasterSeries::new(&raw_series(vec![1000.0, f32::NAN, 2000.0]), SST_BAND, transform)
                .unwrap();
        let sst = scaled.series().get(0).unwrap().raster.band(SST_BAND).unwrap();
        assert_eq!(sst.value(1), None);
        assert_eq!(sst.valid_count(), 2);
    }

    #[test]
    fn test_other_bands_untouched() {
        let transform = ScaleTransform::new(2.0, 1.0).unwrap();
        let scaled =
            ScaledRasterSeries::new(&raw_series(vec![1.0, 2.0, 3.0]), SST_BAND, transform).unwrap();
        let quality = scaled.series().get(0).unwrap().raster.band("QUALITY").unwrap();
        assert_eq!(quality.data(), &[5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_fetch_declares_no_coverage() {
        let mut source = crate::source::InMemoryRasterSource::new();
        for entry in &raw_series(vec![10.0, 11.0, 12.0]) {
            source.insert("oisst", entry.clone());
        }
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();

        let scaled = tokio_test::block_on(ScaledRasterSeries::fetch(
            &source,
            "oisst",
            &range,
            SST_BAND,
            ScaleTransform::identity(),
        ))
        .unwrap();
        assert_eq!(scaled.series().len(), 1);
        assert!(scaled.series().coverage().is_none());
    }

    #[test]
    fn test_transform_deserialize_validates() {
        let ok: ScaleTransform = serde_json::from_str(r#"{"multiplier": 0.01}"#).unwrap();
        assert_eq!(ok.offset(), 0.0);
        assert!(serde_json::from_str::<ScaleTransform>(r#"{"multiplier": 0.0, "offset": 1.0}"#).is_err());
    }
}
