//! Bleaching threshold band and two-class heat-stress classification.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sst_common::{GridSpec, Region};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::sampler::cells_in_region;
use crate::types::{
    BandedRaster, ClimatologySet, Raster, RasterSeries, TimestampedRaster, CLASS_BAND,
    THRESHOLD_BAND,
};

/// Heat-stress class of a pixel relative to the bleaching threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressClass {
    /// Value at or below the threshold.
    BelowThreshold = 0,
    /// Value strictly above the threshold.
    AboveThreshold = 1,
}

impl StressClass {
    /// Both classes, in code order.
    pub const ALL: [StressClass; 2] = [StressClass::BelowThreshold, StressClass::AboveThreshold];

    /// Classify one value. Equal to the threshold counts as below.
    pub fn of(value: f32, threshold: f32) -> Self {
        if value > threshold {
            StressClass::AboveThreshold
        } else {
            StressClass::BelowThreshold
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            StressClass::BelowThreshold => "below threshold",
            StressClass::AboveThreshold => "above threshold",
        }
    }
}

impl std::fmt::Display for StressClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-pixel classes on a grid. `None` marks an unclassified (no-data) pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRaster {
    grid: GridSpec,
    classes: Vec<Option<StressClass>>,
}

impl ClassifiedRaster {
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn classes(&self) -> &[Option<StressClass>] {
        &self.classes
    }

    pub fn get(&self, index: usize) -> Option<StressClass> {
        self.classes.get(index).copied().flatten()
    }

    /// Number of pixels in `class`.
    pub fn count(&self, class: StressClass) -> usize {
        self.classes.iter().filter(|c| **c == Some(class)).count()
    }

    /// Number of unclassified pixels.
    pub fn unclassified(&self) -> usize {
        self.classes.iter().filter(|c| c.is_none()).count()
    }

    /// Class codes as a raster: 0, 1, or no-data.
    pub fn to_raster(&self) -> Raster {
        let data = self
            .classes
            .iter()
            .map(|c| c.map_or(f32::NAN, |c| c.code() as f32))
            .collect();
        Raster::from_parts(self.grid.clone(), data)
    }
}

/// Add a constant `Bleaching_Threshold` band sharing the no-data mask of
/// `reference_band`.
///
/// Degenerate rasters are returned unchanged: there is no data for the
/// threshold to mirror.
pub fn add_threshold(
    raster: &BandedRaster,
    threshold: f32,
    reference_band: &str,
) -> Result<BandedRaster> {
    if raster.is_degenerate() {
        return Ok(raster.clone());
    }
    let reference = raster
        .band(reference_band)
        .ok_or_else(|| AnalysisError::BandNotFound(reference_band.to_string()))?;
    raster
        .clone()
        .with_band(THRESHOLD_BAND, reference.constant_like(threshold))
}

/// Classify `band` of a raster against `threshold`.
///
/// A degenerate raster classifies as entirely unclassified.
pub fn classify(raster: &BandedRaster, threshold: f32, band: &str) -> Result<ClassifiedRaster> {
    if raster.is_degenerate() {
        return Ok(ClassifiedRaster {
            grid: raster.grid().clone(),
            classes: vec![None; raster.grid().len()],
        });
    }
    let values = raster
        .band(band)
        .ok_or_else(|| AnalysisError::BandNotFound(band.to_string()))?;

    let classes = values
        .data()
        .iter()
        .map(|&v| (!v.is_nan()).then(|| StressClass::of(v, threshold)))
        .collect();

    Ok(ClassifiedRaster {
        grid: raster.grid().clone(),
        classes,
    })
}

/// Threshold and class bands for every raster of a series.
///
/// Each non-degenerate output raster carries its input bands plus
/// `Bleaching_Threshold` and `Bleaching_Class`. Degenerate rasters pass
/// through.
pub fn classify_series(series: &RasterSeries, threshold: f32, band: &str) -> Result<RasterSeries> {
    let entries = series
        .entries()
        .par_iter()
        .map(|entry| {
            if entry.is_degenerate() {
                return Ok(entry.clone());
            }
            let classes = classify(&entry.raster, threshold, band)?;
            let raster = add_threshold(&entry.raster, threshold, band)?
                .with_band(CLASS_BAND, classes.to_raster())?;
            Ok(TimestampedRaster::new(entry.timestamp, raster))
        })
        .collect::<Result<Vec<_>>>()?;

    let result = RasterSeries::new(entries);
    Ok(match series.coverage() {
        Some(range) => result.with_coverage(*range),
        None => result,
    })
}

/// Maximum over months of the spatial mean of valid climatology pixels.
///
/// With a region, only cells whose centres fall inside it count (a point
/// region uses its nearest cell). Months with no valid cells in the region
/// are skipped; `None` when no month has any.
pub fn maximum_monthly_mean(climatology: &ClimatologySet, region: Option<&Region>) -> Option<f32> {
    let mut best: Option<(u32, f64)> = None;

    for (month, raster) in climatology.iter() {
        let mean = match region {
            None => raster.mean_of_valid(),
            Some(region) => {
                let (sum, count) = cells_in_region(raster.grid(), region)
                    .into_iter()
                    .filter_map(|i| raster.value(i))
                    .fold((0.0f64, 0usize), |(s, c), v| (s + v as f64, c + 1));
                (count > 0).then(|| sum / count as f64)
            }
        };

        if let Some(mean) = mean {
            if best.map_or(true, |(_, b)| mean > b) {
                best = Some((month, mean));
            }
        }
    }

    best.map(|(month, mean)| {
        debug!(month, threshold = mean, "Derived bleaching threshold from climatology");
        mean as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SST_BAND;
    use sst_common::BoundingBox;

    fn grid() -> GridSpec {
        GridSpec::new(4, 1, 0.0, 1.0, 1.0, 1.0)
    }

    fn sst(values: Vec<f32>) -> BandedRaster {
        BandedRaster::single(SST_BAND, Raster::new(grid(), values).unwrap())
    }

    #[test]
    fn test_equal_to_threshold_is_below() {
        let raster = sst(vec![29.0, 30.0, 31.0, f32::NAN]);
        let classes = classify(&raster, 30.0, SST_BAND).unwrap();
        assert_eq!(classes.get(0), Some(StressClass::BelowThreshold));
        assert_eq!(classes.get(1), Some(StressClass::BelowThreshold));
        assert_eq!(classes.get(2), Some(StressClass::AboveThreshold));
        assert_eq!(classes.get(3), None);
        assert_eq!(classes.unclassified(), 1);
    }

    #[test]
    fn test_above_derived_threshold() {
        let threshold = ((28.0f64 + 31.0 + 31.444) / 3.0) as f32;
        let raster = sst(vec![30.5, 30.148, 30.0, 30.149]);
        let classes = classify(&raster, threshold, SST_BAND).unwrap();
        assert_eq!(classes.get(0), Some(StressClass::AboveThreshold));
        assert_eq!(classes.get(2), Some(StressClass::BelowThreshold));
        assert_eq!(classes.get(3), Some(StressClass::AboveThreshold));
    }

    #[test]
    fn test_class_raster_codes() {
        let raster = sst(vec![29.0, 31.0, f32::NAN, 30.0]);
        let codes = classify(&raster, 30.0, SST_BAND).unwrap().to_raster();
        assert_eq!(codes.value(0), Some(0.0));
        assert_eq!(codes.value(1), Some(1.0));
        assert_eq!(codes.value(2), None);
        assert_eq!(codes.value(3), Some(0.0));
    }

    #[test]
    fn test_threshold_band_mirrors_mask() {
        let raster = sst(vec![29.0, f32::NAN, 31.0, 30.0]);
        let with_threshold = add_threshold(&raster, 30.148, SST_BAND).unwrap();
        let band = with_threshold.band(THRESHOLD_BAND).unwrap();
        assert_eq!(band.value(0), Some(30.148));
        assert_eq!(band.value(1), None);
        assert_eq!(band.valid_count(), 3);
        assert_eq!(with_threshold.band(SST_BAND), raster.band(SST_BAND));
    }

    #[test]
    fn test_degenerate_raster_passes_through() {
        let empty = BandedRaster::empty(grid());
        assert_eq!(add_threshold(&empty, 30.0, SST_BAND).unwrap(), empty);
        let classes = classify(&empty, 30.0, SST_BAND).unwrap();
        assert_eq!(classes.unclassified(), 4);
    }

    #[test]
    fn test_labels() {
        assert_eq!(StressClass::BelowThreshold.label(), "below threshold");
        assert_eq!(StressClass::AboveThreshold.to_string(), "above threshold");
        assert_eq!(StressClass::AboveThreshold.code(), 1);
    }

    #[test]
    fn test_maximum_monthly_mean() {
        let clim = ClimatologySet::from_entries(vec![
            (1, Raster::new(grid(), vec![26.0, 26.0, 26.0, 26.0]).unwrap()),
            (8, Raster::new(grid(), vec![30.0, 31.0, f32::NAN, 29.0]).unwrap()),
            (9, Raster::no_data(grid())),
        ])
        .unwrap();

        assert_eq!(maximum_monthly_mean(&clim, None), Some(30.0));

        let east = Region::Bbox(BoundingBox::new(1.0, 0.0, 4.0, 1.0));
        assert_eq!(maximum_monthly_mean(&clim, Some(&east)), Some(30.0));

        let west = Region::Point { lon: 0.5, lat: 0.5 };
        assert_eq!(maximum_monthly_mean(&clim, Some(&west)), Some(30.0));

        let empty = ClimatologySet::from_entries(vec![(1, Raster::no_data(grid()))]).unwrap();
        assert_eq!(maximum_monthly_mean(&empty, None), None);
    }
}
