//! Monthly means and the monthly climatology.
//!
//! Both reductions use a no-data aware pixel mean: a cell contributes only
//! from rasters where it is valid, and stays no-data when no raster has a
//! value for it. Sums are accumulated in `f64`.
//!
//! Months are independent, so each one is reduced on the rayon pool.

use std::collections::BTreeMap;

use rayon::prelude::*;
use sst_common::{DateRange, GridSpec, MonthKey};
use tracing::{debug, info};

use crate::cancel::{checkpoint, AbortFlag};
use crate::error::{AnalysisError, Result};
use crate::types::{BandedRaster, ClimatologySet, Raster, RasterSeries, TimestampedRaster};

/// Reduces raster series to calendar-month statistics for one band.
#[derive(Debug, Clone)]
pub struct TemporalAggregator {
    band: String,
    grid: GridSpec,
    abort: Option<AbortFlag>,
}

impl TemporalAggregator {
    /// Aggregator for `band` on `grid`. Every input raster must share the grid.
    pub fn new(band: impl Into<String>, grid: GridSpec) -> Self {
        Self {
            band: band.into(),
            grid,
            abort: None,
        }
    }

    /// Stop between months once `flag` is raised.
    pub fn with_abort(mut self, flag: AbortFlag) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn band(&self) -> &str {
        &self.band
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// One raster per calendar month overlapping `period`.
    ///
    /// Each output holds the pixel mean of `band` over the rasters whose
    /// timestamp falls in that month (and inside `period`), stamped with
    /// the first instant of the month. A month without contributing rasters
    /// is emitted as a degenerate (band-less) raster rather than skipped, so
    /// the output always has exactly one entry per month.
    pub fn monthly_mean(&self, series: &RasterSeries, period: &DateRange) -> Result<RasterSeries> {
        let mut buckets: BTreeMap<MonthKey, Vec<&Raster>> = BTreeMap::new();

        for entry in series {
            if !period.contains(&entry.timestamp) {
                continue;
            }
            if entry.grid() != &self.grid {
                return Err(AnalysisError::grid_mismatch(&self.grid, entry.grid()));
            }
            if let Some(values) = entry.raster.band(&self.band) {
                buckets.entry(entry.month_key()).or_default().push(values);
            }
        }

        let months = period.months();
        let entries = months
            .par_iter()
            .map(|key| {
                checkpoint(self.abort.as_ref())?;

                let raster = match buckets.get(key) {
                    Some(contributors) if !contributors.is_empty() => {
                        BandedRaster::single(self.band.as_str(), pixel_mean(contributors, &self.grid))
                    }
                    _ => {
                        debug!(
                            month = %key,
                            band = %self.band,
                            "No rasters contributed to month, emitting empty slot"
                        );
                        BandedRaster::empty(self.grid.clone())
                    }
                };
                Ok(TimestampedRaster::new(key.start(), raster))
            })
            .collect::<Result<Vec<_>>>()?;

        let empty_months = entries.iter().filter(|e| e.is_degenerate()).count();
        info!(
            band = %self.band,
            months = entries.len(),
            empty_months,
            inputs = series.len(),
            "Computed monthly means"
        );

        Ok(RasterSeries::new(entries).with_coverage(*period))
    }

    /// Mean raster for each month of year across all years of `monthly`.
    ///
    /// Always returns twelve entries. Degenerate monthly rasters contribute
    /// nothing; a month of year with no contributors is entirely no-data.
    pub fn climatology(&self, monthly: &RasterSeries) -> Result<ClimatologySet> {
        for entry in monthly {
            if entry.grid() != &self.grid {
                return Err(AnalysisError::grid_mismatch(&self.grid, entry.grid()));
            }
        }

        let entries = (1..=12u32)
            .into_par_iter()
            .map(|month| {
                checkpoint(self.abort.as_ref())?;

                let contributors: Vec<&Raster> = monthly
                    .iter()
                    .filter(|e| e.month_key().month == month)
                    .filter_map(|e| e.raster.band(&self.band))
                    .collect();

                let raster = if contributors.is_empty() {
                    debug!(month, band = %self.band, "No monthly means for month of year");
                    Raster::no_data(self.grid.clone())
                } else {
                    pixel_mean(&contributors, &self.grid)
                };
                Ok((month, raster))
            })
            .collect::<Result<Vec<_>>>()?;

        let set = ClimatologySet::from_entries(entries)?;
        info!(band = %self.band, inputs = monthly.len(), "Computed monthly climatology");
        Ok(set)
    }
}

/// No-data aware pixel mean of rasters sharing `grid`.
pub fn pixel_mean(rasters: &[&Raster], grid: &GridSpec) -> Raster {
    let mut sums = vec![0.0f64; grid.len()];
    let mut counts = vec![0u32; grid.len()];

    for raster in rasters {
        for (i, &v) in raster.data().iter().enumerate() {
            if !v.is_nan() {
                sums[i] += v as f64;
                counts[i] += 1;
            }
        }
    }

    let data = sums
        .into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                f32::NAN
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect();

    Raster::from_parts(grid.clone(), data)
}
