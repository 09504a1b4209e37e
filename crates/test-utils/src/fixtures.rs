//! Common test fixtures for SST analysis tests.

use chrono::{DateTime, TimeZone, Utc};

/// Midnight UTC on a calendar day.
///
/// Panics on an invalid date; fixtures are expected to be well formed.
pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {}-{}-{}", year, month, day))
}

/// First instant of a month.
pub fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    utc(year, month, 1)
}

/// `[start of first year, start of year after last)` as a pair.
pub fn years(first: i32, last: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    (utc(first, 1, 1), utc(last + 1, 1, 1))
}

/// Grid definitions as `(nx, ny, min_lon, max_lat, dx, dy)`.
pub mod grid {
    /// Three cells in a row, 1 degree each, starting at 0E / 1N.
    pub const ROW_3: (usize, usize, f64, f64, f64, f64) = (3, 1, 0.0, 1.0, 1.0, 1.0);

    /// 4x4 grid over a reef area in the Coral Sea, 0.5 degree cells.
    pub const REEF_4X4: (usize, usize, f64, f64, f64, f64) = (4, 4, 146.0, -16.0, 0.5, 0.5);
}

/// Climatology fixtures.
pub mod climatology {
    /// August monthly means of three years for one pixel.
    pub const AUGUST_YEARS: [f32; 3] = [28.0, 31.0, 31.444];

    /// Their mean, the documented bleaching threshold.
    pub const AUGUST_MEAN: f32 = 30.148;

    /// An August observation above the threshold.
    pub const HOT_AUGUST: f32 = 30.5;
}
