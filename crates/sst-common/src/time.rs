//! Time handling for monthly raster aggregation.
//!
//! Rasters carry a single UTC instant. Aggregation works on calendar months,
//! so most of this module is about moving between instants, [`MonthKey`]s and
//! half-open [`DateRange`]s.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SstError, SstResult};

/// Parse an ISO 8601 timestamp.
///
/// Supports:
/// - RFC 3339: "2020-08-15T12:00:00Z"
/// - Naive datetime (UTC assumed): "2020-08-15T12:00:00"
/// - Date only: "2020-08-15"
pub fn parse_iso8601(s: &str) -> SstResult<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(SstError::InvalidTime(s.to_string()))
}

/// A calendar month, used as the join key between monthly means and the
/// climatology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMonthKey")]
pub struct MonthKey {
    pub year: i32,
    /// Month of year, 1-12.
    pub month: u32,
}

impl MonthKey {
    /// Create a month key, rejecting months outside 1-12.
    pub fn new(year: i32, month: u32) -> SstResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(SstError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    /// The month containing an instant.
    pub fn of(dt: &DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// First instant of the month (day 1, 00:00:00 UTC).
    ///
    /// Clamps to chrono's representable range for years outside it.
    pub fn start(&self) -> DateTime<Utc> {
        self.checked_start().unwrap_or(if self.year < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
    }

    /// First instant of the month, or `None` outside chrono's range.
    pub fn checked_start(&self) -> Option<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|ndt| Utc.from_utc_datetime(&ndt))
    }

    /// First instant of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Check whether an instant falls inside this month.
    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        Self::of(dt) == *self
    }
}

#[derive(Deserialize)]
struct RawMonthKey {
    year: i32,
    month: u32,
}

impl TryFrom<RawMonthKey> for MonthKey {
    type Error = SstError;

    fn try_from(raw: RawMonthKey) -> SstResult<Self> {
        Self::new(raw.year, raw.month)
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A half-open `[start, end)` interval of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range, failing when `end` is not after `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> SstResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Parse a "start/end" interval string (each side ISO 8601).
    pub fn parse(s: &str) -> SstResult<Self> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| SstError::invalid_range(format!("expected start/end, got '{}'", s)))?;
        Self::new(parse_iso8601(start)?, parse_iso8601(end)?)
    }

    /// Range spanning whole months, from the start of `first` to the end of `last`.
    pub fn months_inclusive(first: MonthKey, last: MonthKey) -> SstResult<Self> {
        Self::new(first.start(), last.end())
    }

    /// Check that the range is non-empty.
    pub fn validate(&self) -> SstResult<()> {
        if self.end <= self.start {
            return Err(SstError::invalid_range(format!(
                "end {} is not after start {}",
                self.end.to_rfc3339(),
                self.start.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Check whether an instant falls in `[start, end)`.
    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt < &self.end
    }

    /// Overlap of two ranges, if any.
    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end > start).then_some(DateRange { start, end })
    }

    /// Smallest range covering both.
    pub fn hull(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Every calendar month overlapping the range, in order.
    pub fn months(&self) -> Vec<MonthKey> {
        let mut months = Vec::new();
        let mut key = MonthKey::of(&self.start);
        while let Some(start) = key.checked_start() {
            if start >= self.end {
                break;
            }
            months.push(key);
            key = key.next();
        }
        months
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_iso8601_variants() {
        let dt = parse_iso8601("2020-08-15T12:00:00Z").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2020, 8, 15, 12));

        let dt = parse_iso8601("2020-08-15T06:30:00").unwrap();
        assert_eq!(dt.minute(), 30);

        let dt = parse_iso8601("2020-08-15").unwrap();
        assert_eq!(dt, ymd(2020, 8, 15));

        assert!(parse_iso8601("15/08/2020").is_err());
    }

    #[test]
    fn test_month_key_bounds() {
        assert!(MonthKey::new(2020, 0).is_err());
        assert!(MonthKey::new(2020, 13).is_err());

        let dec = MonthKey::new(2020, 12).unwrap();
        assert_eq!(dec.start(), ymd(2020, 12, 1));
        assert_eq!(dec.end(), ymd(2021, 1, 1));
        assert_eq!(dec.next(), MonthKey::new(2021, 1).unwrap());
        assert!(dec.contains(&ymd(2020, 12, 31)));
        assert!(!dec.contains(&ymd(2021, 1, 1)));
        assert_eq!(dec.to_string(), "2020-12");
    }

    #[test]
    fn test_month_key_deserialize_validates() {
        let key: MonthKey = serde_json::from_str(r#"{"year": 2020, "month": 8}"#).unwrap();
        assert_eq!(key, MonthKey::new(2020, 8).unwrap());
        assert!(serde_json::from_str::<MonthKey>(r#"{"year": 2020, "month": 13}"#).is_err());
        assert!(serde_json::from_str::<MonthKey>(r#"{"year": 2020, "month": 0}"#).is_err());
    }

    #[test]
    fn test_month_key_start_clamps_outside_chrono_range() {
        let beyond = MonthKey::new(DateTime::<Utc>::MAX_UTC.year() + 1, 1).unwrap();
        assert!(beyond.checked_start().is_none());
        assert_eq!(beyond.start(), DateTime::<Utc>::MAX_UTC);

        let before = MonthKey::new(DateTime::<Utc>::MIN_UTC.year() - 1, 12).unwrap();
        assert_eq!(before.start(), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_months_terminate_at_chrono_max() {
        let end = DateTime::<Utc>::MAX_UTC;
        let range = DateRange::new(end - chrono::Duration::days(40), end).unwrap();
        let months = range.months();
        assert_eq!(months.len(), 2);
        assert_eq!(months[1].month, 12);
        assert_eq!(months[1].year, end.year());
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::new(ymd(2020, 2, 1), ymd(2020, 1, 1)).is_err());
        assert!(DateRange::new(ymd(2020, 1, 1), ymd(2020, 1, 1)).is_err());
    }

    #[test]
    fn test_date_range_is_half_open() {
        let range = DateRange::new(ymd(2020, 1, 1), ymd(2020, 2, 1)).unwrap();
        assert!(range.contains(&ymd(2020, 1, 1)));
        assert!(range.contains(&ymd(2020, 1, 31)));
        assert!(!range.contains(&ymd(2020, 2, 1)));
    }

    #[test]
    fn test_date_range_months() {
        let range = DateRange::new(ymd(2019, 11, 15), ymd(2020, 2, 1)).unwrap();
        let months: Vec<String> = range.months().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2019-11", "2019-12", "2020-01"]);

        // A partial trailing month is included
        let range = DateRange::new(ymd(2020, 1, 1), ymd(2020, 3, 2)).unwrap();
        assert_eq!(range.months().len(), 3);
    }

    #[test]
    fn test_date_range_intersection_and_hull() {
        let a = DateRange::new(ymd(2020, 1, 1), ymd(2020, 7, 1)).unwrap();
        let b = DateRange::new(ymd(2020, 6, 1), ymd(2020, 8, 1)).unwrap();
        let c = DateRange::new(ymd(2021, 1, 1), ymd(2021, 2, 1)).unwrap();

        let overlap = a.intersection(&b).unwrap();
        assert_eq!(overlap.start, ymd(2020, 6, 1));
        assert_eq!(overlap.end, ymd(2020, 7, 1));
        assert!(a.intersection(&c).is_none());

        let hull = a.hull(&c);
        assert_eq!(hull.start, ymd(2020, 1, 1));
        assert_eq!(hull.end, ymd(2021, 2, 1));
    }

    #[test]
    fn test_date_range_parse() {
        let range = DateRange::parse("2020-01-01/2021-01-01").unwrap();
        assert_eq!(range.months().len(), 12);
        assert!(DateRange::parse("2020-01-01").is_err());
    }
}
