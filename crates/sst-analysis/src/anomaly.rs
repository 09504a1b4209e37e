//! Monthly anomalies against the climatology.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::types::{ClimatologySet, RasterSeries, TimestampedRaster, ANOMALY_BAND, SST_BAND};

/// Computes `value - climatology[month]` for monthly rasters.
///
/// The climatology is always passed in explicitly; the engine itself only
/// holds band names, so one engine can be shared across threads.
#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    band: String,
    anomaly_band: String,
}

impl Default for AnomalyEngine {
    fn default() -> Self {
        Self::new(SST_BAND, ANOMALY_BAND)
    }
}

impl AnomalyEngine {
    /// Engine reading `band` and writing the difference to `anomaly_band`.
    pub fn new(band: impl Into<String>, anomaly_band: impl Into<String>) -> Self {
        Self {
            band: band.into(),
            anomaly_band: anomaly_band.into(),
        }
    }

    pub fn band(&self) -> &str {
        &self.band
    }

    pub fn anomaly_band(&self) -> &str {
        &self.anomaly_band
    }

    /// Anomaly of one monthly raster.
    ///
    /// The result carries every input band plus the anomaly band, and keeps
    /// the input timestamp. Two cases return the input unchanged instead:
    /// a degenerate raster (an empty month stays empty rather than turning
    /// into a zero anomaly), and a month of year missing from the
    /// climatology.
    pub fn anomaly(
        &self,
        monthly: &TimestampedRaster,
        climatology: &ClimatologySet,
    ) -> Result<TimestampedRaster> {
        if monthly.is_degenerate() {
            debug!(
                timestamp = %monthly.timestamp,
                "{}",
                AnalysisError::DegenerateRaster(monthly.timestamp.to_rfc3339())
            );
            return Ok(monthly.clone());
        }

        let month = monthly.month_key().month;
        let Some(reference) = climatology.get(month) else {
            debug!(
                timestamp = %monthly.timestamp,
                "{}",
                AnalysisError::MissingClimatologyReference(month)
            );
            return Ok(monthly.clone());
        };

        let values = monthly
            .raster
            .band(&self.band)
            .ok_or_else(|| AnalysisError::BandNotFound(self.band.clone()))?;

        let anomaly = values.zip_with(reference, |v, r| v - r)?;
        let raster = monthly
            .raster
            .clone()
            .with_band(self.anomaly_band.as_str(), anomaly)?;

        Ok(TimestampedRaster::new(monthly.timestamp, raster))
    }

    /// Anomalies for every raster of a monthly series, in order.
    pub fn anomalies(
        &self,
        monthly: &RasterSeries,
        climatology: &ClimatologySet,
    ) -> Result<RasterSeries> {
        let entries = monthly
            .entries()
            .par_iter()
            .map(|entry| self.anomaly(entry, climatology))
            .collect::<Result<Vec<_>>>()?;

        let series = RasterSeries::new(entries);
        Ok(match monthly.coverage() {
            Some(range) => series.with_coverage(*range),
            None => series,
        })
    }
}
