//! Raster source reading JSON raster documents from a directory tree.
//!
//! Layout: `<root>/<collection>/**/*.json`, one [`RasterDocument`] per file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sst_common::DateRange;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::RasterDocument;
use crate::error::{AnalysisError, Result};
use crate::source::RasterSource;
use crate::types::RasterSeries;

/// A raster source over a local directory of JSON documents.
#[derive(Debug, Clone)]
pub struct FilesystemRasterSource {
    root: PathBuf,
}

impl FilesystemRasterSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }
}

fn list_documents(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    paths.sort();
    paths
}

#[async_trait]
impl RasterSource for FilesystemRasterSource {
    async fn fetch(&self, collection: &str, range: &DateRange) -> Result<RasterSeries> {
        let dir = self.collection_dir(collection);
        if !dir.is_dir() {
            debug!(collection = %collection, path = %dir.display(), "Collection directory missing");
            return Ok(RasterSeries::empty());
        }

        let listing_dir = dir.clone();
        let paths = tokio::task::spawn_blocking(move || list_documents(&listing_dir))
            .await
            .map_err(|e| AnalysisError::fetch_failure(collection, e.to_string()))?;

        let mut entries = Vec::new();
        for path in &paths {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                AnalysisError::fetch_failure(collection, format!("{}: {}", path.display(), e))
            })?;
            let doc: RasterDocument = serde_json::from_slice(&bytes).map_err(|e| {
                AnalysisError::Serialization(format!("{}: {}", path.display(), e))
            })?;
            if !range.contains(&doc.timestamp) {
                continue;
            }
            entries.push(doc.into_raster()?);
        }

        info!(
            collection = %collection,
            files = paths.len(),
            matched = entries.len(),
            range = %range,
            "Fetched rasters from filesystem"
        );

        Ok(RasterSeries::new(entries))
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}
