//! Shared test utilities for the SST climatology workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Deterministic SST grid generators
//! - Date and grid fixtures
//! - Helpers writing raster documents for filesystem source tests
//!
//! Everything here returns plain values (`Vec<f32>`, tuples, chrono types)
//! so that it can be used from any crate without pulling in analysis types.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod documents;
pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use documents::*;
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(30.148_f32, 30.148_f64, 1e-4); // passes
/// assert_approx_eq!(30.5_f32, 30.148_f32, 1e-4);   // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that every value of a slice is approximately `expected`, treating
/// `NaN` (no-data) as a failure.
#[macro_export]
macro_rules! assert_all_approx {
    ($values:expr, $expected:expr, $epsilon:expr) => {{
        for (i, v) in $values.iter().enumerate() {
            if v.is_nan() {
                panic!("assertion failed: value {} is no-data", i);
            }
            $crate::assert_approx_eq!(*v, $expected, $epsilon);
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(30.148_f32, 30.148, 1e-4);
        assert_approx_eq!(-0.5, -0.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(30.5, 30.148, 0.001);
    }

    #[test]
    #[should_panic(expected = "no-data")]
    fn test_assert_all_approx_rejects_nan() {
        assert_all_approx!([1.0_f32, f32::NAN], 1.0, 0.001);
    }
}
