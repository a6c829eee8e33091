//! Line detectors
//!
//! Implementations of [`LineDetector`](crate::LineDetector) that turn a
//! [`ChartRaster`](crate::raster::ChartRaster) into line segments.
//!
//! - **hough**: progressive probabilistic Hough transform (reference detector)
//! - **helpers**: default thresholds and shared angle arithmetic

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod hough;

pub use helpers::*;
pub use hough::*;
