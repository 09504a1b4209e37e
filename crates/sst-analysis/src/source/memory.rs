//! In-memory raster source.

use std::collections::HashMap;

use async_trait::async_trait;
use sst_common::DateRange;

use crate::error::Result;
use crate::source::RasterSource;
use crate::types::{RasterSeries, TimestampedRaster};

/// A raster source backed by in-memory collections.
///
/// Useful for tests and for callers that already hold decoded rasters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRasterSource {
    collections: HashMap<String, Vec<TimestampedRaster>>,
}

impl InMemoryRasterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raster to a collection.
    pub fn insert(&mut self, collection: impl Into<String>, raster: TimestampedRaster) {
        self.collections
            .entry(collection.into())
            .or_default()
            .push(raster);
    }

    /// Builder-style variant of [`insert`](Self::insert) for a whole series.
    pub fn with_series(mut self, collection: impl Into<String>, series: RasterSeries) -> Self {
        let collection = collection.into();
        for raster in series {
            self.insert(collection.clone(), raster);
        }
        self
    }

    /// Names of the stored collections.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}

#[async_trait]
impl RasterSource for InMemoryRasterSource {
    async fn fetch(&self, collection: &str, range: &DateRange) -> Result<RasterSeries> {
        let entries = self
            .collections
            .get(collection)
            .map(|rasters| {
                rasters
                    .iter()
                    .filter(|r| range.contains(&r.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(RasterSeries::new(entries))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
