//! Common types shared across the SST climatology crates.

pub mod error;
pub mod grid;
pub mod region;
pub mod time;

pub use error::{SstError, SstResult};
pub use grid::GridSpec;
pub use region::{BoundingBox, Region};
pub use time::{parse_iso8601, DateRange, MonthKey};
