//! Study-area and sampling geometries.

use serde::{Deserialize, Serialize};

use crate::error::{SstError, SstResult};

/// A geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Width in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Check if a point lies inside the box (edges included).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Check if this bounding box intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lon < other.min_lon
            || self.min_lon > other.max_lon
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }
}

/// An opaque study-area or sampling geometry.
///
/// The pipeline never interprets the study area beyond passing it to the
/// sampler and the threshold derivation; regions are tested against grid
/// cell centres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    /// A single location.
    Point { lon: f64, lat: f64 },
    /// An axis-aligned box.
    Bbox(BoundingBox),
    /// A polygon ring of (lon, lat) vertices. Closing the ring is optional.
    Polygon { ring: Vec<(f64, f64)> },
}

impl Region {
    /// Check coordinates are finite and the shape is non-degenerate.
    pub fn validate(&self) -> SstResult<()> {
        match self {
            Region::Point { lon, lat } => {
                if !(lon.is_finite() && lat.is_finite()) {
                    return Err(SstError::invalid_geometry("point coordinates must be finite"));
                }
            }
            Region::Bbox(bbox) => {
                if !(bbox.width() > 0.0 && bbox.height() > 0.0) {
                    return Err(SstError::invalid_geometry(format!(
                        "bounding box must have positive extent: {:?}",
                        bbox
                    )));
                }
            }
            Region::Polygon { ring } => {
                if ring.iter().any(|(lon, lat)| !(lon.is_finite() && lat.is_finite())) {
                    return Err(SstError::invalid_geometry("polygon coordinates must be finite"));
                }
                let mut distinct = ring.clone();
                if distinct.len() > 1 && distinct.first() == distinct.last() {
                    distinct.pop();
                }
                if distinct.len() < 3 {
                    return Err(SstError::invalid_geometry(
                        "polygon must have at least 3 distinct vertices",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Bounding box of the geometry. A point yields a zero-size box.
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Region::Point { lon, lat } => BoundingBox::new(*lon, *lat, *lon, *lat),
            Region::Bbox(bbox) => *bbox,
            Region::Polygon { ring } => {
                let mut west = f64::MAX;
                let mut south = f64::MAX;
                let mut east = f64::MIN;
                let mut north = f64::MIN;

                for (lon, lat) in ring {
                    west = west.min(*lon);
                    east = east.max(*lon);
                    south = south.min(*lat);
                    north = north.max(*lat);
                }

                BoundingBox::new(west, south, east, north)
            }
        }
    }

    /// Check if a location lies inside the region.
    ///
    /// Points have no area and contain nothing; samplers treat them as a
    /// nearest-cell lookup instead.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        match self {
            Region::Point { .. } => false,
            Region::Bbox(bbox) => bbox.contains(lon, lat),
            Region::Polygon { ring } => polygon_contains(ring, lon, lat),
        }
    }
}

/// Ray casting point-in-polygon test.
fn polygon_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Region {
        Region::Polygon {
            ring: vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)],
        }
    }

    #[test]
    fn test_polygon_contains() {
        let region = triangle();
        assert!(region.contains(2.0, 2.0));
        assert!(!region.contains(8.0, 8.0));
        assert!(!region.contains(-1.0, 1.0));
    }

    #[test]
    fn test_bbox_region_contains() {
        let region = Region::Bbox(BoundingBox::new(145.0, -20.0, 150.0, -10.0));
        assert!(region.contains(147.0, -15.0));
        assert!(!region.contains(151.0, -15.0));
    }

    #[test]
    fn test_point_contains_nothing() {
        let region = Region::Point { lon: 1.0, lat: 1.0 };
        assert!(!region.contains(1.0, 1.0));
        assert_eq!(region.bbox().width(), 0.0);
    }

    #[test]
    fn test_polygon_bbox() {
        let bbox = triangle().bbox();
        assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_validate() {
        assert!(triangle().validate().is_ok());
        assert!(Region::Polygon {
            ring: vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]
        }
        .validate()
        .is_err());
        assert!(Region::Bbox(BoundingBox::new(1.0, 0.0, 0.0, 1.0))
            .validate()
            .is_err());
        assert!(Region::Point {
            lon: f64::NAN,
            lat: 0.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_region_serde_tagged() {
        let json = r#"{"type":"point","lon":146.5,"lat":-18.25}"#;
        let region: Region = serde_json::from_str(json).unwrap();
        assert_eq!(region, Region::Point { lon: 146.5, lat: -18.25 });

        let json = r#"{"type":"bbox","min_lon":145.0,"min_lat":-20.0,"max_lon":150.0,"max_lat":-10.0}"#;
        let region: Region = serde_json::from_str(json).unwrap();
        assert!(matches!(region, Region::Bbox(_)));
    }
}
