//! # chartsight - visual chart pattern recognition
//!
//! Treats a price series as a rendered line chart and reads its geometry the
//! way a chartist would: trendlines, support/resistance levels and
//! channel/triangle formations, found with a probabilistic Hough transform.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartsight::prelude::*;
//!
//! // closes, oldest first
//! let closes: Vec<f64> = (0..120)
//!     .map(|i| (i as f64 / 12.0).sin() + i as f64 / 20.0)
//!     .collect();
//!
//! let analyst = VisualAnalyst::new();
//! let features = analyst.analyze(&closes).unwrap();
//!
//! println!(
//!     "momentum={:.3} patterns={:?} levels={} support={}",
//!     features.momentum,
//!     features.patterns,
//!     features.support_resistance_levels,
//!     features.has_visual_support,
//! );
//! ```
//!
//! ## Tuning
//!
//! ```rust
//! use chartsight::prelude::*;
//!
//! let analyst = AnalystBuilder::new()
//!     .raster_size(800, 400)
//!     .detector(HoughDetector::new(40, 60, 20, 1.0).unwrap())
//!     .min_samples(100)
//!     .build()
//!     .unwrap();
//! assert_eq!(analyst.min_samples(), 100);
//! ```

use tracing::debug;

pub mod classifier;
pub mod detectors;
pub mod ensemble;
pub mod params;
pub mod raster;

use classifier::PatternClassifier;
use detectors::HoughDetector;
use raster::{ChartRaster, ChartRasterizer};

pub mod prelude {
    pub use crate::{
        // Components
        classifier::PatternClassifier,
        detectors::*,
        // Ensemble
        ensemble::{
            EnsembleWeights, Forecaster, HybridEnsemble, Indicators, MarketData, Prediction,
            Signal, SignalRules, WilderRsi,
        },
        // Parameters
        params::{get_count, get_degrees, get_pixels, ParamMeta, ParamType, Tunable},
        raster::{ChartRaster, ChartRasterizer},
        // Parallel
        analyze_parallel,
        // Facade
        AnalysisError,
        AnalysisResult,
        AnalystBuilder,
        AnalystConfig,
        // Types
        Degrees,
        // Core traits
        LineDetector,
        LineSegment,
        PatternLabel,
        Pixels,
        // Errors
        Result,
        VisionError,
        VisualAnalyst,
        VisualFeatures,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, VisionError>;

/// Errors that can occur during visual analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum VisionError {
    #[error("Invalid input at index {index}: {reason}")]
    InvalidInput { index: usize, reason: &'static str },

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Forecaster '{name}' failed: {reason}")]
    Forecast { name: String, reason: String },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Angle in degrees, 0.0..=180.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Degrees(f64);

impl Degrees {
    /// Create new Degrees, validating the value is finite and in [0, 180]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(VisionError::InvalidValue(
                "Degrees cannot be NaN or infinite",
            ));
        }
        if !(0.0..=180.0).contains(&value) {
            return Err(VisionError::OutOfRange {
                field: "Degrees",
                value,
                min: 0.0,
                max: 180.0,
            });
        }
        Ok(Self(value))
    }

    /// Create Degrees from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Degrees {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Degrees {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Degrees::new(value).map_err(serde::de::Error::custom)
    }
}

/// Pixel count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pixels(usize);

impl Pixels {
    /// Create new Pixels, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(VisionError::InvalidValue("Pixels must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Pixels {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Pixels {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Pixels::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAIT
// ============================================================

/// Bar data as delivered by a market-data source.
///
/// Only `close` feeds the visual analysis.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Close column of a bar slice
pub fn close_prices<T: OHLCV>(bars: &[T]) -> Vec<f64> {
    bars.iter().map(|b| b.close()).collect()
}

// ============================================================
// LINE SEGMENTS & FEATURES
// ============================================================

/// Detected line segment in raster coordinates (row 0 at the top)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Angle in chart orientation, degrees in [-90, 90]; rising is positive.
    #[inline]
    pub fn angle(&self) -> f64 {
        detectors::helpers::chart_angle(self)
    }

    #[inline]
    pub fn length(&self) -> f64 {
        f64::from(self.x2 - self.x1).hypot(f64::from(self.y2 - self.y1))
    }
}

/// Chart formation recognized from trendline angles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternLabel {
    /// Rising and falling trendlines at once (converging or diverging)
    TriangleWedge,
    /// Near-parallel trendlines
    Channel,
}

impl PatternLabel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternLabel::TriangleWedge => "TRIANGLE_WEDGE",
            PatternLabel::Channel => "CHANNEL",
        }
    }
}

impl std::fmt::Display for PatternLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `analyze` call
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisualFeatures {
    /// Mean trendline angle / 90, roughly -1.0..=1.0
    pub momentum: f64,
    /// At most one label; the rules are mutually exclusive
    pub patterns: Vec<PatternLabel>,
    /// Number of near-horizontal segments
    pub support_resistance_levels: usize,
    /// Last price sits on a support/resistance level
    pub has_visual_support: bool,
}

impl VisualFeatures {
    #[inline]
    pub fn has_pattern(&self, label: PatternLabel) -> bool {
        self.patterns.contains(&label)
    }
}

// ============================================================
// LINE DETECTOR TRAIT
// ============================================================

/// Extracts straight segments from a binary raster.
///
/// Implementations must be deterministic for a given raster; returning no
/// segments is a normal outcome, not an error.
pub trait LineDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, raster: &ChartRaster) -> Result<Vec<LineSegment>>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

impl<D: LineDetector + ?Sized> LineDetector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&self, raster: &ChartRaster) -> Result<Vec<LineSegment>> {
        (**self).detect(raster)
    }

    fn validate_config(&self) -> Result<()> {
        (**self).validate_config()
    }
}

// ============================================================
// VISUAL ANALYST
// ============================================================

/// Series shorter than this produce no geometry worth fitting
pub const DEFAULT_MIN_SAMPLES: usize = 50;

/// Serializable analyst configuration
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub rasterizer: ChartRasterizer,
    pub detector: HoughDetector,
    pub classifier: PatternClassifier,
    pub min_samples: usize,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            rasterizer: ChartRasterizer::default(),
            detector: HoughDetector::default(),
            classifier: PatternClassifier::default(),
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Rasterize -> detect -> classify. Immutable once built.
#[derive(Debug, Clone)]
pub struct VisualAnalyst<D: LineDetector = HoughDetector> {
    rasterizer: ChartRasterizer,
    detector: D,
    classifier: PatternClassifier,
    min_samples: usize,
}

impl Default for VisualAnalyst<HoughDetector> {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualAnalyst<HoughDetector> {
    /// Analyst with every default (400 x 200 raster, Hough 20/30/10)
    pub fn new() -> Self {
        let config = AnalystConfig::default();
        Self {
            rasterizer: config.rasterizer,
            detector: config.detector,
            classifier: config.classifier,
            min_samples: config.min_samples,
        }
    }

    pub fn from_config(config: AnalystConfig) -> Result<Self> {
        AnalystBuilder::new()
            .raster_size(config.rasterizer.width.get(), config.rasterizer.height.get())
            .detector(config.detector)
            .classifier(config.classifier)
            .min_samples(config.min_samples)
            .build()
    }

    pub fn config(&self) -> AnalystConfig {
        AnalystConfig {
            rasterizer: self.rasterizer,
            detector: self.detector,
            classifier: self.classifier,
            min_samples: self.min_samples,
        }
    }
}

impl<D: LineDetector> VisualAnalyst<D> {
    /// Extract visual features from a close-price series (oldest first).
    ///
    /// Series shorter than `min_samples` return empty features without being
    /// rendered; an empty series is an error.
    pub fn analyze(&self, series: &[f64]) -> Result<VisualFeatures> {
        if series.is_empty() {
            return Err(VisionError::InvalidInput {
                index: 0,
                reason: "empty series",
            });
        }
        if series.len() < self.min_samples {
            debug!(
                samples = series.len(),
                min_samples = self.min_samples,
                "series below analysis threshold"
            );
            return Ok(VisualFeatures::default());
        }

        let raster = self.rasterizer.rasterize(series)?;
        let segments = self.detector.detect(&raster)?;
        let last_row = self.rasterizer.last_row(series)?;

        debug!(
            detector = self.detector.name(),
            samples = series.len(),
            pixels = raster.foreground_count(),
            segments = segments.len(),
            last_row,
            "chart analyzed"
        );

        Ok(self.classifier.classify(&segments, last_row))
    }

    /// Analyze the close column of a bar slice.
    pub fn analyze_bars<T: OHLCV>(&self, bars: &[T]) -> Result<VisualFeatures> {
        self.analyze(&close_prices(bars))
    }

    #[inline]
    pub fn rasterizer(&self) -> &ChartRasterizer {
        &self.rasterizer
    }

    #[inline]
    pub fn detector(&self) -> &D {
        &self.detector
    }

    #[inline]
    pub fn classifier(&self) -> &PatternClassifier {
        &self.classifier
    }

    #[inline]
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating VisualAnalyst instances
pub struct AnalystBuilder<D: LineDetector = HoughDetector> {
    raster_size: (usize, usize),
    detector: D,
    classifier: PatternClassifier,
    min_samples: usize,
}

impl Default for AnalystBuilder<HoughDetector> {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalystBuilder<HoughDetector> {
    pub fn new() -> Self {
        Self {
            raster_size: (raster::DEFAULT_WIDTH, raster::DEFAULT_HEIGHT),
            detector: HoughDetector::default(),
            classifier: PatternClassifier::default(),
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl<D: LineDetector> AnalystBuilder<D> {
    /// Swap the line detector
    pub fn detector<D2: LineDetector>(self, detector: D2) -> AnalystBuilder<D2> {
        AnalystBuilder {
            raster_size: self.raster_size,
            detector,
            classifier: self.classifier,
            min_samples: self.min_samples,
        }
    }

    /// Raster dimensions; detector lengths should scale with them
    pub fn raster_size(mut self, width: usize, height: usize) -> Self {
        self.raster_size = (width, height);
        self
    }

    pub fn classifier(mut self, classifier: PatternClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Shortest series that gets rendered
    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Build the analyst
    pub fn build(self) -> Result<VisualAnalyst<D>> {
        let (width, height) = self.raster_size;
        let rasterizer = ChartRasterizer::new(width, height)?;
        if self.min_samples < 2 {
            return Err(VisionError::InvalidConfig(format!(
                "min_samples must be >= 2, got {}",
                self.min_samples
            )));
        }
        self.detector.validate_config()?;
        self.classifier.validate_config()?;

        Ok(VisualAnalyst {
            rasterizer,
            detector: self.detector,
            classifier: self.classifier,
            min_samples: self.min_samples,
        })
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Features for a single instrument
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub symbol: String,
    pub features: VisualFeatures,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisError {
    pub symbol: String,
    pub error: VisionError,
}

/// Analyze many instruments in parallel
pub fn analyze_parallel<'a, D, I>(
    analyst: &VisualAnalyst<D>,
    instruments: I,
) -> (Vec<AnalysisResult>, Vec<AnalysisError>)
where
    D: LineDetector,
    I: IntoParallelIterator<Item = (&'a str, &'a [f64])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, series)| {
            analyst
                .analyze(series)
                .map(|features| AnalysisResult {
                    symbol: symbol.to_string(),
                    features,
                })
                .map_err(|error| AnalysisError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Test OHLCV bar
    #[derive(Debug, Clone)]
    struct Bar {
        c: f64,
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.c
        }

        fn high(&self) -> f64 {
            self.c + 1.0
        }

        fn low(&self) -> f64 {
            self.c - 1.0
        }

        fn close(&self) -> f64 {
            self.c
        }

        fn volume(&self) -> f64 {
            1000.0
        }
    }

    /// Returns the same segments for any raster
    struct FixedDetector(Vec<LineSegment>);

    impl LineDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _raster: &ChartRaster) -> Result<Vec<LineSegment>> {
            Ok(self.0.clone())
        }
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn test_degrees_validation() {
        assert!(Degrees::new(0.0).is_ok());
        assert!(Degrees::new(180.0).is_ok());
        assert!(Degrees::new(5.0).is_ok());
        assert!(Degrees::new(-0.1).is_err());
        assert!(Degrees::new(180.1).is_err());
        assert!(Degrees::new(f64::NAN).is_err());
        assert!(Degrees::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_pixels_validation() {
        assert!(Pixels::new(1).is_ok());
        assert!(Pixels::new(400).is_ok());
        assert!(Pixels::new(0).is_err());
    }

    #[test]
    fn test_short_series_gate() {
        let analyst = VisualAnalyst::new();
        let features = analyst.analyze(&ramp(49)).unwrap();
        assert_eq!(features, VisualFeatures::default());

        // not validated below the gate
        let mut noisy = ramp(10);
        noisy[3] = f64::NAN;
        assert_eq!(analyst.analyze(&noisy).unwrap(), VisualFeatures::default());
    }

    #[test]
    fn test_empty_series_error() {
        let analyst = VisualAnalyst::new();
        assert!(matches!(
            analyst.analyze(&[]),
            Err(VisionError::InvalidInput { index: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_error() {
        let analyst = VisualAnalyst::new();
        let mut series = ramp(60);
        series[42] = f64::NEG_INFINITY;
        assert!(matches!(
            analyst.analyze(&series),
            Err(VisionError::InvalidInput { index: 42, .. })
        ));
    }

    #[test]
    fn test_custom_detector() {
        let analyst = AnalystBuilder::new()
            .detector(FixedDetector(vec![
                LineSegment::new(0, 150, 100, 50),
                LineSegment::new(100, 50, 200, 150),
            ]))
            .build()
            .unwrap();

        let features = analyst.analyze(&ramp(60)).unwrap();
        assert!(features.has_pattern(PatternLabel::TriangleWedge));
    }

    #[test]
    fn test_boxed_detector() {
        let detector: Box<dyn LineDetector> = Box::new(FixedDetector(vec![LineSegment::new(
            0, 0, 399, 0,
        )]));
        let analyst = AnalystBuilder::new().detector(detector).build().unwrap();

        // rising ramp ends on row 0, right on the fixed level
        let features = analyst.analyze(&ramp(60)).unwrap();
        assert_eq!(features.support_resistance_levels, 1);
        assert!(features.has_visual_support);
        assert_eq!(analyst.detector().name(), "fixed");
    }

    #[test]
    fn test_builder_validation() {
        assert!(AnalystBuilder::new().raster_size(0, 200).build().is_err());
        assert!(AnalystBuilder::new().min_samples(1).build().is_err());
        assert!(AnalystBuilder::new()
            .classifier(PatternClassifier {
                min_trend_lines: 0,
                ..PatternClassifier::default()
            })
            .build()
            .is_err());
        assert!(AnalystBuilder::new()
            .detector(HoughDetector {
                threshold: 0,
                ..HoughDetector::default()
            })
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_oversized_raster() {
        for (width, height) in [(usize::MAX / 2, 4), (usize::MAX, usize::MAX), (10_000, 10)] {
            assert!(matches!(
                AnalystBuilder::new().raster_size(width, height).build(),
                Err(VisionError::InvalidConfig(_))
            ));
        }
        let analyst = AnalystBuilder::new().raster_size(4096, 4096).build().unwrap();
        assert_eq!(analyst.rasterizer().width.get(), 4096);
    }

    #[test]
    fn test_config_roundtrip() {
        let analyst = VisualAnalyst::new();
        let config = analyst.config();
        assert_eq!(config, AnalystConfig::default());

        let rebuilt = VisualAnalyst::from_config(config).unwrap();
        assert_eq!(rebuilt.config(), config);
    }

    #[test]
    fn test_analyze_bars_uses_close() {
        let analyst = VisualAnalyst::new();
        let closes = ramp(80);
        let bars: Vec<Bar> = closes.iter().map(|&c| Bar { c }).collect();

        assert_eq!(
            analyst.analyze_bars(&bars).unwrap(),
            analyst.analyze(&closes).unwrap()
        );
    }

    #[test]
    fn test_parallel_analysis() {
        let analyst = VisualAnalyst::new();
        let up = ramp(100);
        let down: Vec<f64> = up.iter().rev().copied().collect();
        let broken = vec![1.0, f64::NAN];
        let broken_long: Vec<f64> = (0..60)
            .map(|i| if i == 30 { f64::NAN } else { i as f64 })
            .collect();

        let instruments: Vec<(&str, &[f64])> = vec![
            ("UP", &up),
            ("DOWN", &down),
            ("SHORT", &broken),
            ("BROKEN", &broken_long),
        ];

        let (results, errors) = analyze_parallel(&analyst, instruments);
        assert_eq!(results.len(), 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "BROKEN");

        let up_features = results.iter().find(|r| r.symbol == "UP").unwrap();
        assert_eq!(up_features.features, analyst.analyze(&up).unwrap());
    }

    #[test]
    fn test_pattern_label_names() {
        assert_eq!(PatternLabel::TriangleWedge.as_str(), "TRIANGLE_WEDGE");
        assert_eq!(PatternLabel::Channel.to_string(), "CHANNEL");
    }

    #[test]
    fn test_segment_geometry() {
        let s = LineSegment::new(0, 40, 30, 0);
        assert_eq!(s.length(), 50.0);
        assert!(s.angle() > 0.0);
    }
}
