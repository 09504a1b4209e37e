//! Test data generators for synthetic SST grids.
//!
//! All grids are row-major with row 0 at the northern edge, matching the
//! raster layout used by the analysis crates.

/// A grid where every cell holds `value`.
pub fn constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates an SST grid with a meridional gradient.
///
/// Values run from `north` on the first row to `south` on the last row,
/// constant along each row, roughly like a tropical reef area in the
/// southern hemisphere.
///
/// # Example
///
/// ```
/// use test_utils::create_sst_gradient;
///
/// let grid = create_sst_gradient(3, 2, 29.0, 27.0);
/// assert_eq!(grid, vec![29.0, 29.0, 29.0, 27.0, 27.0, 27.0]);
/// ```
pub fn create_sst_gradient(width: usize, height: usize, north: f32, south: f32) -> Vec<f32> {
    let step = if height > 1 {
        (south - north) / (height - 1) as f32
    } else {
        0.0
    };
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        let value = north + step * row as f32;
        data.extend(std::iter::repeat(value).take(width));
    }
    data
}

/// Seasonal SST for a southern-hemisphere site: warmest in February,
/// coolest in August.
///
/// `month` is 1-12. The cycle is a cosine with the given mean and
/// amplitude.
pub fn seasonal_sst(month: u32, mean: f32, amplitude: f32) -> f32 {
    let phase = (month as f32 - 2.0) / 12.0 * std::f32::consts::TAU;
    mean + amplitude * phase.cos()
}

/// Mark cells as no-data (`NaN`) in a grid.
///
/// Out-of-range indices are ignored.
pub fn with_no_data(mut data: Vec<f32>, indices: &[usize]) -> Vec<f32> {
    for &i in indices {
        if let Some(v) = data.get_mut(i) {
            *v = f32::NAN;
        }
    }
    data
}

/// Inverse of a linear scale: the raw value a source would store so that
/// `raw * multiplier + offset == value`.
pub fn unscale(value: f32, multiplier: f32, offset: f32) -> f32 {
    (value - offset) / multiplier
}
