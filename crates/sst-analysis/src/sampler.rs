//! Scalar time series extracted from raster series for charting.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sst_common::{GridSpec, Region};

use crate::types::{Raster, RasterSeries, TimestampedRaster};

/// Band values of one raster at one location or over one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub timestamp: DateTime<Utc>,
    /// `None` where the raster has no valid value (or no such band).
    pub values: BTreeMap<String, Option<f32>>,
}

impl SamplePoint {
    pub fn value(&self, band: &str) -> Option<f32> {
        self.values.get(band).copied().flatten()
    }
}

/// Spatial reduction applied over a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    #[default]
    Mean,
}

impl Reducer {
    fn reduce(&self, values: impl Iterator<Item = f32>) -> Option<f32> {
        match self {
            Reducer::Mean => {
                let (sum, count) = values.fold((0.0f64, 0usize), |(s, c), v| (s + v as f64, c + 1));
                (count > 0).then(|| (sum / count as f64) as f32)
            }
        }
    }
}

/// Samples of every year that fall on one day of year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOfYearBucket {
    /// Ordinal day, 1-366.
    pub day: u32,
    /// Year to band values.
    pub years: BTreeMap<i32, BTreeMap<String, Option<f32>>>,
}

/// Nearest-cell value of each band for every raster of `series`.
///
/// A location off the grid, a degenerate raster or a missing band all
/// sample as `None`.
pub fn sample_at_point(series: &RasterSeries, lon: f64, lat: f64, bands: &[&str]) -> Vec<SamplePoint> {
    series
        .iter()
        .map(|entry| {
            let cell = entry
                .grid()
                .coords_to_cell(lon, lat)
                .map(|(col, row)| entry.grid().flat_index(col, row));
            sample_cells(entry, bands, |values| {
                cell.and_then(|i| values.value(i))
            })
        })
        .collect()
}

/// Reduced value of each band over the cells whose centres lie in `region`.
///
/// A point region samples its nearest cell.
pub fn sample_over_region(
    series: &RasterSeries,
    region: &Region,
    reducer: Reducer,
    bands: &[&str],
) -> Vec<SamplePoint> {
    if let Region::Point { lon, lat } = region {
        return sample_at_point(series, *lon, *lat, bands);
    }

    let mut cached: Option<(GridSpec, Vec<usize>)> = None;

    series
        .iter()
        .map(|entry| {
            let stale = cached.as_ref().map_or(true, |(grid, _)| grid != entry.grid());
            if stale {
                cached = Some((entry.grid().clone(), cells_in_region(entry.grid(), region)));
            }
            let cells = cached
                .as_ref()
                .map(|(_, cells)| cells.as_slice())
                .unwrap_or_default();

            sample_cells(entry, bands, |values| {
                reducer.reduce(cells.iter().filter_map(|&i| values.value(i)))
            })
        })
        .collect()
}

fn sample_cells<F>(entry: &TimestampedRaster, bands: &[&str], sample: F) -> SamplePoint
where
    F: Fn(&Raster) -> Option<f32>,
{
    let values = bands
        .iter()
        .map(|&band| {
            let value = entry.raster.band(band).and_then(&sample);
            (band.to_string(), value)
        })
        .collect();

    SamplePoint {
        timestamp: entry.timestamp,
        values,
    }
}

/// Flat indices of the cells of `grid` covered by `region`.
///
/// Areal regions select cells by centre; a point selects its nearest cell.
pub(crate) fn cells_in_region(grid: &GridSpec, region: &Region) -> Vec<usize> {
    if let Region::Point { lon, lat } = region {
        return grid
            .coords_to_cell(*lon, *lat)
            .map(|(col, row)| vec![grid.flat_index(col, row)])
            .unwrap_or_default();
    }

    let bbox = region.bbox();
    let mut cells = Vec::new();
    for row in 0..grid.ny {
        for col in 0..grid.nx {
            let (lon, lat) = grid.cell_to_coords(col, row);
            if bbox.contains(lon, lat) && region.contains(lon, lat) {
                cells.push(grid.flat_index(col, row));
            }
        }
    }
    cells
}

/// Group samples by day of year, then by year.
///
/// Several samples on the same day of the same year are averaged band by
/// band over their valid values.
pub fn bucket_by_day_of_year(samples: &[SamplePoint]) -> Vec<DayOfYearBucket> {
    let mut grouped: BTreeMap<u32, BTreeMap<i32, Vec<&SamplePoint>>> = BTreeMap::new();
    for sample in samples {
        grouped
            .entry(sample.timestamp.ordinal())
            .or_default()
            .entry(sample.timestamp.year())
            .or_default()
            .push(sample);
    }

    grouped
        .into_iter()
        .map(|(day, by_year)| {
            let years = by_year
                .into_iter()
                .map(|(year, group)| (year, mean_values(&group)))
                .collect();
            DayOfYearBucket { day, years }
        })
        .collect()
}

fn mean_values(group: &[&SamplePoint]) -> BTreeMap<String, Option<f32>> {
    if let [single] = group {
        return single.values.clone();
    }

    let mut bands: BTreeMap<String, Vec<f32>> = BTreeMap::new();
    for sample in group {
        for (band, value) in &sample.values {
            let values = bands.entry(band.clone()).or_default();
            if let Some(v) = value {
                values.push(*v);
            }
        }
    }

    bands
        .into_iter()
        .map(|(band, values)| (band, Reducer::Mean.reduce(values.into_iter())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandedRaster, ANOMALY_BAND, SST_BAND};
    use chrono::TimeZone;
    use sst_common::BoundingBox;

    // 2x2 grid over lon 0..2, lat 0..2
    fn grid() -> GridSpec {
        GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0)
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn series() -> RasterSeries {
        let raster = BandedRaster::single(
            SST_BAND,
            Raster::new(grid(), vec![20.0, 22.0, f32::NAN, 26.0]).unwrap(),
        );
        RasterSeries::new(vec![
            TimestampedRaster::new(at(2020, 1, 1), raster),
            TimestampedRaster::new(at(2020, 2, 1), BandedRaster::empty(grid())),
        ])
    }

    #[test]
    fn test_sample_at_point() {
        let samples = sample_at_point(&series(), 1.5, 1.5, &[SST_BAND, ANOMALY_BAND]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value(SST_BAND), Some(22.0));
        assert_eq!(samples[0].values.get(ANOMALY_BAND), Some(&None));
        // degenerate month is a gap
        assert_eq!(samples[1].value(SST_BAND), None);
        assert_eq!(samples[1].timestamp, at(2020, 2, 1));
    }

    #[test]
    fn test_sample_off_grid_is_none() {
        let samples = sample_at_point(&series(), 10.0, 10.0, &[SST_BAND]);
        assert_eq!(samples[0].value(SST_BAND), None);
    }

    #[test]
    fn test_region_mean_skips_no_data() {
        let region = Region::Bbox(BoundingBox::new(0.0, 0.0, 2.0, 2.0));
        let samples = sample_over_region(&series(), &region, Reducer::Mean, &[SST_BAND]);
        let mean = samples[0].value(SST_BAND).unwrap();
        assert!((mean - 68.0 / 3.0).abs() < 1e-5);
        assert_eq!(samples[1].value(SST_BAND), None);
    }

    #[test]
    fn test_region_selects_cell_centres() {
        // bottom row only
        let region = Region::Polygon {
            ring: vec![(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)],
        };
        assert_eq!(cells_in_region(&grid(), &region), vec![2, 3]);
        let samples = sample_over_region(&series(), &region, Reducer::Mean, &[SST_BAND]);
        assert_eq!(samples[0].value(SST_BAND), Some(26.0));
    }

    #[test]
    fn test_point_region_uses_nearest_cell() {
        let region = Region::Point { lon: 0.2, lat: 1.9 };
        let samples = sample_over_region(&series(), &region, Reducer::Mean, &[SST_BAND]);
        assert_eq!(samples[0].value(SST_BAND), Some(20.0));
    }

    #[test]
    fn test_bucket_by_day_of_year() {
        let point = |t: DateTime<Utc>, v: Option<f32>| SamplePoint {
            timestamp: t,
            values: BTreeMap::from([(SST_BAND.to_string(), v)]),
        };
        let samples = vec![
            point(at(2019, 1, 1), Some(25.0)),
            point(at(2020, 1, 1), Some(27.0)),
            point(at(2020, 2, 1), None),
            point(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap(), Some(28.0)),
        ];

        let buckets = bucket_by_day_of_year(&samples);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].day, 1);
        assert_eq!(buckets[0].years[&2019][SST_BAND], Some(25.0));
        assert_eq!(buckets[0].years[&2020][SST_BAND], Some(27.5));
        assert_eq!(buckets[1].day, 32);
        assert_eq!(buckets[1].years[&2020][SST_BAND], None);
    }
}
