//! Merging raster series from several sources into one timeline.
//!
//! Precedence is positional: a series later in the argument list supersedes
//! earlier ones. A series with a declared coverage range replaces every
//! earlier raster inside that range, which models a newer sensor generation
//! taking over from an older one. Without declared coverage the inputs are
//! unioned, and rasters at identical timestamps resolve to the later series.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sst_common::DateRange;
use tracing::debug;

use crate::types::{RasterSeries, TimestampedRaster};

/// Merge series in precedence order (last wins).
///
/// The result is sorted ascending by timestamp with one entry per
/// timestamp. Merging is a left fold, so `merge(&[merge(&[a, b]), c])`
/// equals `merge(&[a, b, c])`.
pub fn merge_series(series: &[RasterSeries]) -> RasterSeries {
    let mut merged: BTreeMap<DateTime<Utc>, TimestampedRaster> = BTreeMap::new();
    let mut coverage: Option<DateRange> = None;

    for (precedence, next) in series.iter().enumerate() {
        if let Some(range) = next.coverage() {
            let before = merged.len();
            merged.retain(|timestamp, _| !range.contains(timestamp));
            let superseded = before - merged.len();
            if superseded > 0 {
                debug!(
                    precedence,
                    superseded,
                    coverage = %range,
                    "Series supersedes earlier rasters in its coverage"
                );
            }
            coverage = Some(match coverage {
                Some(existing) => existing.hull(range),
                None => *range,
            });
        }

        for entry in next {
            merged.insert(entry.timestamp, entry.clone());
        }
    }

    let result = RasterSeries::new(merged.into_values().collect());
    match coverage {
        Some(range) => result.with_coverage(range),
        None => result,
    }
}

/// Two-series convenience wrapper around [`merge_series`].
pub fn merge_pair(older: &RasterSeries, newer: &RasterSeries) -> RasterSeries {
    merge_series(&[older.clone(), newer.clone()])
}
