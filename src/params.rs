//! Parameter metadata for tunable components
//!
//! The detector and classifier thresholds are heuristics tuned for a 400 x 200
//! raster. This module describes them so callers can:
//! - Recalibrate them for other raster sizes
//! - Run grid searches
//! - Build components from plain key/value maps
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use chartsight::prelude::*;
//!
//! for param in HoughDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("min_length", 60.0);
//! let detector = HoughDetector::with_params(&params).unwrap();
//! assert_eq!(detector.min_length.get(), 60);
//! ```

use std::collections::HashMap;

use crate::classifier::PatternClassifier;
use crate::detectors::{helpers, HoughDetector};
use crate::{Degrees, LineDetector, Pixels, Result, VisionError};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Angle in degrees (0.0..=180.0)
  Degrees,
  /// Pixel distance (positive integer)
  Pixels,
  /// Plain count (non-negative integer, e.g. votes or a gap allowance)
  Count,
}

/// Metadata for a single tunable
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_length")
  pub name: &'static str,
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn degrees(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Degrees, default, range, description }
  }

  pub const fn pixels(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Pixels, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(VisionError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Degrees => Degrees::new(value).map(|_| ()),
      ParamType::Pixels => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(VisionError::InvalidValue("Pixels must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Count => {
        if value < 0.0 || value.fract() != 0.0 {
          return Err(VisionError::InvalidValue("Count must be a non-negative integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// TUNABLE TRAIT
// ============================================================

/// Components whose thresholds can be discovered and overridden
pub trait Tunable: Sized {
  /// Metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Build from a key/value map; missing keys use their defaults.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  fn component_name() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get Degrees from params with default fallback
pub fn get_degrees(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Degrees> {
  let value = params.get(key).copied().unwrap_or(default);
  Degrees::new(value)
}

/// Helper to get Pixels from params with default fallback
pub fn get_pixels(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Pixels> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(VisionError::InvalidValue("Pixels must be a positive integer"));
  }
  Pixels::new(value as usize)
}

/// Helper to get a count from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
    return Err(VisionError::InvalidValue("Count must be a non-negative integer"));
  }
  Ok(value as usize)
}

// ============================================================
// COMPONENT METADATA
// ============================================================

static HOUGH_PARAMS: [ParamMeta; 4] = [
  ParamMeta::count(
    "threshold",
    helpers::HOUGH_THRESHOLD as f64,
    (5.0, 100.0, 5.0),
    "Accumulator votes needed before a line is traced",
  ),
  ParamMeta::pixels(
    "min_length",
    helpers::MIN_LINE_LENGTH as f64,
    (10.0, 120.0, 5.0),
    "Minimum x or y extent of an emitted segment",
  ),
  ParamMeta::count(
    "max_gap",
    helpers::MAX_LINE_GAP as f64,
    (0.0, 40.0, 2.0),
    "Longest run of missing pixels bridged while tracing",
  ),
  ParamMeta::degrees(
    "angle_resolution",
    helpers::ANGLE_RESOLUTION_DEG,
    (0.25, 5.0, 0.25),
    "Accumulator angle step",
  ),
];

impl Tunable for HoughDetector {
  fn param_meta() -> &'static [ParamMeta] {
    &HOUGH_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let detector = Self {
      threshold: get_count(params, "threshold", helpers::HOUGH_THRESHOLD)?,
      min_length: get_pixels(params, "min_length", helpers::MIN_LINE_LENGTH)?,
      max_gap: get_count(params, "max_gap", helpers::MAX_LINE_GAP)?,
      angle_resolution: get_degrees(params, "angle_resolution", helpers::ANGLE_RESOLUTION_DEG)?,
    };
    LineDetector::validate_config(&detector)?;
    Ok(detector)
  }

  fn component_name() -> &'static str {
    "probabilistic_hough"
  }
}

static CLASSIFIER_PARAMS: [ParamMeta; 5] = [
  ParamMeta::degrees(
    "horizontal_tolerance",
    helpers::HORIZONTAL_TOLERANCE_DEG,
    (1.0, 15.0, 1.0),
    "Segments flatter than this are support/resistance",
  ),
  ParamMeta::degrees(
    "opposing_slope",
    helpers::OPPOSING_SLOPE_DEG,
    (1.0, 15.0, 1.0),
    "Rising and falling trendlines steeper than this form a triangle/wedge",
  ),
  ParamMeta::degrees(
    "channel_max_std",
    helpers::CHANNEL_MAX_STD_DEG,
    (0.5, 6.0, 0.5),
    "Trend angle std dev below this is a channel",
  ),
  ParamMeta::pixels(
    "support_tolerance",
    helpers::SUPPORT_TOLERANCE_PX as f64,
    (1.0, 20.0, 1.0),
    "Rows between the last price and a level that still count as support",
  ),
  ParamMeta::count(
    "min_trend_lines",
    helpers::MIN_TREND_LINES as f64,
    (2.0, 6.0, 1.0),
    "Trendlines required before a pattern is labelled",
  ),
];

impl Tunable for PatternClassifier {
  fn param_meta() -> &'static [ParamMeta] {
    &CLASSIFIER_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let classifier = Self {
      horizontal_tolerance: get_degrees(
        params,
        "horizontal_tolerance",
        helpers::HORIZONTAL_TOLERANCE_DEG,
      )?,
      opposing_slope: get_degrees(params, "opposing_slope", helpers::OPPOSING_SLOPE_DEG)?,
      channel_max_std: get_degrees(params, "channel_max_std", helpers::CHANNEL_MAX_STD_DEG)?,
      support_tolerance: get_pixels(params, "support_tolerance", helpers::SUPPORT_TOLERANCE_PX)?,
      min_trend_lines: get_count(params, "min_trend_lines", helpers::MIN_TREND_LINES)?,
    };
    classifier.validate_config()?;
    Ok(classifier)
  }

  fn component_name() -> &'static str {
    "pattern_classifier"
  }
}

// ============================================================
// TESTS
// ============================================================
