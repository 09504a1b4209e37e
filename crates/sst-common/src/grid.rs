//! Grid specification shared by every raster in a pipeline run.

use serde::{Deserialize, Serialize};

use crate::error::{SstError, SstResult};
use crate::region::BoundingBox;

/// Specification of a regular lon/lat grid.
///
/// Data is stored row-major with row 0 along the northern edge, the same
/// top-to-bottom layout used for rendered regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of columns (longitude direction)
    pub nx: usize,
    /// Number of rows (latitude direction)
    pub ny: usize,
    /// Western edge of the grid in degrees
    pub min_lon: f64,
    /// Northern edge of the grid in degrees
    pub max_lat: f64,
    /// Cell width in degrees
    pub dx: f64,
    /// Cell height in degrees
    pub dy: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(nx: usize, ny: usize, min_lon: f64, max_lat: f64, dx: f64, dy: f64) -> Self {
        Self {
            nx,
            ny,
            min_lon,
            max_lat,
            dx,
            dy,
        }
    }

    /// Grid of `nx` x `ny` cells covering a bounding box.
    pub fn from_bbox(bbox: &BoundingBox, nx: usize, ny: usize) -> SstResult<Self> {
        if nx == 0 || ny == 0 {
            return Err(SstError::invalid_grid("grid must have at least one cell"));
        }
        let grid = Self::new(
            nx,
            ny,
            bbox.min_lon,
            bbox.max_lat,
            bbox.width() / nx as f64,
            bbox.height() / ny as f64,
        );
        grid.validate()?;
        Ok(grid)
    }

    /// Check dimensions and resolution.
    pub fn validate(&self) -> SstResult<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(SstError::invalid_grid(format!(
                "dimensions must be non-zero, got {}x{}",
                self.nx, self.ny
            )));
        }
        if !(self.dx.is_finite() && self.dx > 0.0 && self.dy.is_finite() && self.dy > 0.0) {
            return Err(SstError::invalid_grid(format!(
                "resolution must be positive, got dx={} dy={}",
                self.dx, self.dy
            )));
        }
        if !(self.min_lon.is_finite() && self.max_lat.is_finite()) {
            return Err(SstError::invalid_grid("origin must be finite"));
        }
        Ok(())
    }

    /// Total number of grid cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    /// Check if the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// Geographic extent of the grid.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_lon,
            self.max_lat - self.ny as f64 * self.dy,
            self.min_lon + self.nx as f64 * self.dx,
            self.max_lat,
        )
    }

    /// Row-major index of a cell.
    pub fn flat_index(&self, col: usize, row: usize) -> usize {
        row * self.nx + col
    }

    /// Coordinates of the centre of a cell.
    pub fn cell_to_coords(&self, col: usize, row: usize) -> (f64, f64) {
        let lon = self.min_lon + (col as f64 + 0.5) * self.dx;
        let lat = self.max_lat - (row as f64 + 0.5) * self.dy;
        (lon, lat)
    }

    /// Cell containing a coordinate, if it lies on the grid.
    pub fn coords_to_cell(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let col_f = (lon - self.min_lon) / self.dx;
        let row_f = (self.max_lat - lat) / self.dy;

        if !(col_f.is_finite() && row_f.is_finite()) || col_f < 0.0 || row_f < 0.0 {
            return None;
        }

        let col = col_f.floor() as usize;
        let row = row_f.floor() as usize;

        if col < self.nx && row < self.ny {
            Some((col, row))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reef_grid() -> GridSpec {
        // 4x2 cells of 0.5 degrees starting at 145E, 15S
        GridSpec::new(4, 2, 145.0, -15.0, 0.5, 0.5)
    }

    #[test]
    fn test_grid_bbox() {
        let bbox = reef_grid().bbox();
        assert!((bbox.min_lon - 145.0).abs() < 1e-9);
        assert!((bbox.max_lon - 147.0).abs() < 1e-9);
        assert!((bbox.min_lat - -16.0).abs() < 1e-9);
        assert!((bbox.max_lat - -15.0).abs() < 1e-9);
    }

    #[test]
    fn test_cell_round_trip() {
        let grid = reef_grid();
        for row in 0..grid.ny {
            for col in 0..grid.nx {
                let (lon, lat) = grid.cell_to_coords(col, row);
                assert_eq!(grid.coords_to_cell(lon, lat), Some((col, row)));
            }
        }
    }

    #[test]
    fn test_coords_outside_grid() {
        let grid = reef_grid();
        assert_eq!(grid.coords_to_cell(144.9, -15.5), None);
        assert_eq!(grid.coords_to_cell(145.2, -14.9), None);
        assert_eq!(grid.coords_to_cell(147.1, -15.5), None);
        assert_eq!(grid.coords_to_cell(f64::NAN, -15.5), None);
    }

    #[test]
    fn test_validate() {
        assert!(reef_grid().validate().is_ok());
        assert!(GridSpec::new(0, 2, 0.0, 0.0, 1.0, 1.0).validate().is_err());
        assert!(GridSpec::new(2, 2, 0.0, 0.0, -1.0, 1.0).validate().is_err());
    }

    #[test]
    fn test_from_bbox() {
        let bbox = BoundingBox::new(145.0, -16.0, 147.0, -15.0);
        let grid = GridSpec::from_bbox(&bbox, 4, 2).unwrap();
        assert_eq!(grid, reef_grid());
    }
}
