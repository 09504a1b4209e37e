//! Writing raster documents for filesystem source tests.
//!
//! Documents are built with `serde_json::json!` rather than the analysis
//! types so this crate stays independent of them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

/// A raster document with a single band. `NaN` values are written as `null`.
pub fn raster_document(
    timestamp: DateTime<Utc>,
    grid: (usize, usize, f64, f64, f64, f64),
    band: &str,
    values: &[f32],
) -> Value {
    let (nx, ny, min_lon, max_lat, dx, dy) = grid;
    let values: Vec<Value> = values
        .iter()
        .map(|v| if v.is_nan() { Value::Null } else { json!(v) })
        .collect();

    json!({
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        "grid": {
            "nx": nx,
            "ny": ny,
            "min_lon": min_lon,
            "max_lat": max_lat,
            "dx": dx,
            "dy": dy,
        },
        "bands": { band: values },
    })
}

/// Write `document` to `<root>/<collection>/<name>.json`, creating
/// directories as needed.
pub fn write_document(root: &Path, collection: &str, name: &str, document: &Value) -> PathBuf {
    let dir = root.join(collection);
    std::fs::create_dir_all(&dir).expect("failed to create collection directory");
    let path = dir.join(format!("{}.json", name));
    let bytes = serde_json::to_vec_pretty(document).expect("failed to encode document");
    std::fs::write(&path, bytes).expect("failed to write document");
    path
}

/// A temporary directory for raster collections.
pub fn temp_data_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("failed to create temp dir")
}
