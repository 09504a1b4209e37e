//! Core raster types.
//!
//! No-data is represented as `NaN`, the fill value used for every grid in
//! this workspace. Sentinel fill values declared by a source are converted
//! to `NaN` on ingest (see [`Raster::from_raw`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sst_common::{DateRange, GridSpec, MonthKey};

use crate::error::{AnalysisError, Result};

/// Sea-surface temperature band.
pub const SST_BAND: &str = "SST";
/// Constant bleaching-threshold band.
pub const THRESHOLD_BAND: &str = "Bleaching_Threshold";
/// Monthly anomaly band.
pub const ANOMALY_BAND: &str = "SST_Anomaly";
/// Heat-stress classification band (0 / 1 / no-data).
pub const CLASS_BAND: &str = "Bleaching_Class";

/// A single-band 2-D grid of values with a no-data mask.
#[derive(Debug, Clone)]
pub struct Raster {
    grid: GridSpec,
    /// Values in row-major order, top-to-bottom. `NaN` marks no-data.
    data: Vec<f32>,
}

impl Raster {
    /// Create a raster, checking the data length against the grid.
    pub fn new(grid: GridSpec, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(AnalysisError::ShapeMismatch {
                band: "<raster>".to_string(),
                expected: grid.len(),
                actual: data.len(),
            });
        }
        Ok(Self { grid, data })
    }

    /// Create a raster from source values, masking a sentinel fill value.
    pub fn from_raw(grid: GridSpec, mut data: Vec<f32>, fill_value: Option<f32>) -> Result<Self> {
        if let Some(fill) = fill_value.filter(|f| !f.is_nan()) {
            for v in data.iter_mut() {
                if *v == fill {
                    *v = f32::NAN;
                }
            }
        }
        Self::new(grid, data)
    }

    /// Build from data whose length is already known to match the grid.
    pub(crate) fn from_parts(grid: GridSpec, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), grid.len());
        Self { grid, data }
    }

    /// Raster with every cell set to `value`.
    pub fn filled(grid: GridSpec, value: f32) -> Self {
        let data = vec![value; grid.len()];
        Self { grid, data }
    }

    /// Raster with every cell no-data.
    pub fn no_data(grid: GridSpec) -> Self {
        Self::filled(grid, f32::NAN)
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Raw values, `NaN` where no-data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Valid value at a flat index.
    pub fn value(&self, index: usize) -> Option<f32> {
        self.data.get(index).copied().filter(|v| !v.is_nan())
    }

    /// Valid value at a grid cell.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.grid.nx || row >= self.grid.ny {
            return None;
        }
        self.value(self.grid.flat_index(col, row))
    }

    /// Check whether a cell holds data.
    pub fn is_valid(&self, index: usize) -> bool {
        self.value(index).is_some()
    }

    /// Number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Check whether every cell is no-data.
    pub fn is_all_no_data(&self) -> bool {
        self.data.iter().all(|v| v.is_nan())
    }

    /// Apply a function to every valid cell. No-data cells stay no-data.
    pub fn map<F>(&self, f: F) -> Raster
    where
        F: Fn(f32) -> f32,
    {
        let data = self
            .data
            .iter()
            .map(|&v| if v.is_nan() { f32::NAN } else { f(v) })
            .collect();
        Raster {
            grid: self.grid.clone(),
            data,
        }
    }

    /// Combine two rasters cell by cell. No-data in either input yields
    /// no-data.
    pub fn zip_with<F>(&self, other: &Raster, f: F) -> Result<Raster>
    where
        F: Fn(f32, f32) -> f32,
    {
        self.check_grid(other.grid())?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| {
                if a.is_nan() || b.is_nan() {
                    f32::NAN
                } else {
                    f(a, b)
                }
            })
            .collect();
        Ok(Raster {
            grid: self.grid.clone(),
            data,
        })
    }

    /// Constant raster sharing this raster's no-data mask.
    pub fn constant_like(&self, value: f32) -> Raster {
        self.map(|_| value)
    }

    /// Mean of all valid cells, or `None` when every cell is no-data.
    pub fn mean_of_valid(&self) -> Option<f64> {
        let (sum, count) = self
            .data
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0f64, 0usize), |(s, c), &v| (s + v as f64, c + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Fail unless `grid` equals this raster's grid.
    pub fn check_grid(&self, grid: &GridSpec) -> Result<()> {
        if &self.grid != grid {
            return Err(AnalysisError::grid_mismatch(&self.grid, grid));
        }
        Ok(())
    }
}

/// Rasters compare equal when their grids match and every cell either holds
/// the same value or is no-data in both.
impl PartialEq for Raster {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// A set of named bands on one grid.
///
/// A banded raster with no bands is degenerate: it still knows its grid but
/// holds no data anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct BandedRaster {
    grid: GridSpec,
    bands: BTreeMap<String, Raster>,
}

impl BandedRaster {
    /// A degenerate raster (no bands) on `grid`.
    pub fn empty(grid: GridSpec) -> Self {
        Self {
            grid,
            bands: BTreeMap::new(),
        }
    }

    /// A raster holding a single band.
    pub fn single(name: impl Into<String>, raster: Raster) -> Self {
        let grid = raster.grid().clone();
        let mut bands = BTreeMap::new();
        bands.insert(name.into(), raster);
        Self { grid, bands }
    }

    /// Add or replace a band. Other bands are carried over untouched.
    pub fn with_band(mut self, name: impl Into<String>, raster: Raster) -> Result<Self> {
        raster.check_grid(&self.grid)?;
        self.bands.insert(name.into(), raster);
        Ok(self)
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn band(&self, name: &str) -> Option<&Raster> {
        self.bands.get(name)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Raster)> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// True when the raster has no bands at all.
    pub fn is_degenerate(&self) -> bool {
        self.bands.is_empty()
    }

    /// A copy with band `from` stored under `to`. Unchanged when `from` is
    /// absent; an existing `to` band is replaced.
    pub fn rename_band(&self, from: &str, to: &str) -> BandedRaster {
        let mut renamed = self.clone();
        if from != to {
            if let Some(raster) = renamed.bands.remove(from) {
                renamed.bands.insert(to.to_string(), raster);
            }
        }
        renamed
    }

    /// A copy holding only the named band, if present.
    pub fn select(&self, name: &str) -> Option<BandedRaster> {
        self.band(name)
            .map(|raster| BandedRaster::single(name, raster.clone()))
    }
}

/// A banded raster with a representative timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedRaster {
    pub timestamp: DateTime<Utc>,
    pub raster: BandedRaster,
}

impl TimestampedRaster {
    pub fn new(timestamp: DateTime<Utc>, raster: BandedRaster) -> Self {
        Self { timestamp, raster }
    }

    /// Calendar month of the timestamp.
    pub fn month_key(&self) -> MonthKey {
        MonthKey::of(&self.timestamp)
    }

    pub fn is_degenerate(&self) -> bool {
        self.raster.is_degenerate()
    }

    pub fn grid(&self) -> &GridSpec {
        self.raster.grid()
    }
}

/// An ordered sequence of timestamped rasters.
///
/// Entries are kept sorted by timestamp (stable, so equal timestamps keep
/// insertion order). `coverage` is the range a source declares it owns;
/// merging uses it to let a newer source supersede an older one over the
/// whole handover period. A series without coverage only wins at equal
/// timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterSeries {
    entries: Vec<TimestampedRaster>,
    coverage: Option<DateRange>,
}

impl RasterSeries {
    /// Build a series, sorting entries by timestamp.
    pub fn new(mut entries: Vec<TimestampedRaster>) -> Self {
        entries.sort_by_key(|e| e.timestamp);
        Self {
            entries,
            coverage: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach the range this series covers.
    pub fn with_coverage(mut self, coverage: DateRange) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn coverage(&self) -> Option<&DateRange> {
        self.coverage.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimestampedRaster> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[TimestampedRaster] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TimestampedRaster> {
        self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TimestampedRaster> {
        self.entries.get(index)
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.entries.iter().map(|e| e.timestamp).collect()
    }

    /// Grid of the first raster, if any.
    pub fn grid(&self) -> Option<&GridSpec> {
        self.entries.first().map(|e| e.grid())
    }

    /// Entries whose timestamp falls in `range`. Coverage is narrowed to
    /// the overlap.
    pub fn filter_range(&self, range: &DateRange) -> RasterSeries {
        let entries = self
            .entries
            .iter()
            .filter(|e| range.contains(&e.timestamp))
            .cloned()
            .collect();
        RasterSeries {
            entries,
            coverage: self.coverage.and_then(|c| c.intersection(range)),
        }
    }
}

impl<'a> IntoIterator for &'a RasterSeries {
    type Item = &'a TimestampedRaster;
    type IntoIter = std::slice::Iter<'a, TimestampedRaster>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for RasterSeries {
    type Item = TimestampedRaster;
    type IntoIter = std::vec::IntoIter<TimestampedRaster>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<TimestampedRaster> for RasterSeries {
    fn from_iter<I: IntoIterator<Item = TimestampedRaster>>(iter: I) -> Self {
        RasterSeries::new(iter.into_iter().collect())
    }
}

/// Month-of-year (1-12) to climatological mean raster.
///
/// Sets produced by the aggregator always hold all twelve months; sets
/// assembled from external references may be partial.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimatologySet {
    entries: BTreeMap<u32, Raster>,
}

impl ClimatologySet {
    /// Build a set from (month, raster) pairs. Months must be 1-12 and all
    /// rasters must share a grid.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, Raster)>,
    {
        let mut map: BTreeMap<u32, Raster> = BTreeMap::new();
        for (month, raster) in entries {
            if !(1..=12).contains(&month) {
                return Err(sst_common::SstError::InvalidMonth(month).into());
            }
            if let Some(first) = map.values().next() {
                raster.check_grid(first.grid())?;
            }
            map.insert(month, raster);
        }
        Ok(Self { entries: map })
    }

    /// Reference raster for a month of year.
    pub fn get(&self, month: u32) -> Option<&Raster> {
        self.entries.get(&month)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every month 1-12 has an entry.
    pub fn is_complete(&self) -> bool {
        (1..=12).all(|m| self.entries.contains_key(&m))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Raster)> {
        self.entries.iter().map(|(m, r)| (*m, r))
    }
}
