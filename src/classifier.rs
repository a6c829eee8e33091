//! Segment classification
//!
//! Splits detected segments into near-horizontal support/resistance levels and
//! angled trendlines, then derives momentum and a pattern label from the trend
//! angles. Every threshold is a heuristic and is exposed as a field.

use tracing::debug;

use crate::detectors::helpers::{self, chart_angle, mean, oriented, std_dev};
use crate::{Degrees, LineSegment, PatternLabel, Pixels, Result, VisionError, VisualFeatures};

/// Turns line segments into [`VisualFeatures`]
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PatternClassifier {
    /// |angle| below this is support/resistance
    pub horizontal_tolerance: Degrees,
    /// Both a rising and a falling trendline steeper than this -> triangle/wedge
    pub opposing_slope: Degrees,
    /// Trend angle std dev below this -> channel
    pub channel_max_std: Degrees,
    /// Rows between the last price and a level that still count as support
    pub support_tolerance: Pixels,
    /// Trendlines required before any label is considered
    pub min_trend_lines: usize,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self {
            horizontal_tolerance: Degrees::new_const(helpers::HORIZONTAL_TOLERANCE_DEG),
            opposing_slope: Degrees::new_const(helpers::OPPOSING_SLOPE_DEG),
            channel_max_std: Degrees::new_const(helpers::CHANNEL_MAX_STD_DEG),
            support_tolerance: Pixels::new_const(helpers::SUPPORT_TOLERANCE_PX),
            min_trend_lines: helpers::MIN_TREND_LINES,
        }
    }
}

impl PatternClassifier {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.min_trend_lines < 2 {
            return Err(VisionError::InvalidConfig(format!(
                "min_trend_lines must be >= 2, got {}",
                self.min_trend_lines
            )));
        }
        if self.horizontal_tolerance.get() >= 90.0 {
            return Err(VisionError::OutOfRange {
                field: "horizontal_tolerance",
                value: self.horizontal_tolerance.get(),
                min: 0.0,
                max: 90.0,
            });
        }
        Ok(())
    }

    /// Classify `segments` given the raster row of the most recent price.
    ///
    /// An empty segment set is the ordinary "nothing detected" result.
    pub fn classify(&self, segments: &[LineSegment], last_price_row: usize) -> VisualFeatures {
        let mut levels = Vec::new();
        let mut trend_angles = Vec::new();

        for segment in segments {
            let angle = chart_angle(segment);
            if angle.abs() < self.horizontal_tolerance.get() {
                levels.push(oriented(segment).y1);
            } else {
                trend_angles.push(angle);
            }
        }

        let momentum = mean(&trend_angles).map_or(0.0, |m| m / helpers::MOMENTUM_SCALE_DEG);
        let patterns = self.label(&trend_angles).into_iter().collect();

        let tolerance = self.support_tolerance.get() as i64;
        let has_visual_support = levels
            .iter()
            .any(|&level| (last_price_row as i64 - i64::from(level)).abs() < tolerance);

        debug!(
            segments = segments.len(),
            levels = levels.len(),
            trendlines = trend_angles.len(),
            momentum,
            "segments classified"
        );

        VisualFeatures {
            momentum,
            patterns,
            support_resistance_levels: levels.len(),
            has_visual_support,
        }
    }

    /// First match wins: opposing slopes before near-parallel lines.
    fn label(&self, trend_angles: &[f64]) -> Option<PatternLabel> {
        if trend_angles.len() < self.min_trend_lines {
            return None;
        }

        let slope = self.opposing_slope.get();
        let rising = trend_angles.iter().any(|&a| a > slope);
        let falling = trend_angles.iter().any(|&a| a < -slope);
        if rising && falling {
            return Some(PatternLabel::TriangleWedge);
        }

        match std_dev(trend_angles) {
            Some(sd) if sd < self.channel_max_std.get() => Some(PatternLabel::Channel),
            _ => None,
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(segments: &[LineSegment], last_row: usize) -> VisualFeatures {
        PatternClassifier::default().classify(segments, last_row)
    }

    #[test]
    fn test_empty_segments() {
        let features = classify(&[], 100);
        assert_eq!(features, VisualFeatures::default());
    }

    #[test]
    fn test_horizontal_levels() {
        let segments = [
            LineSegment::new(0, 50, 100, 50),
            LineSegment::new(200, 120, 300, 122),
        ];
        let features = classify(&segments, 52);

        assert_eq!(features.support_resistance_levels, 2);
        assert_eq!(features.momentum, 0.0);
        assert!(features.patterns.is_empty());
        assert!(features.has_visual_support);
    }

    #[test]
    fn test_support_tolerance_is_strict() {
        let segments = [LineSegment::new(0, 50, 100, 50)];
        assert!(classify(&segments, 54).has_visual_support);
        assert!(!classify(&segments, 55).has_visual_support);
        assert!(classify(&segments, 46).has_visual_support);
        assert!(!classify(&segments, 45).has_visual_support);
    }

    #[test]
    fn test_level_uses_left_endpoint() {
        // drawn right to left; left end sits at row 103
        let segments = [LineSegment::new(300, 100, 200, 103)];
        assert!(classify(&segments, 107).has_visual_support);
        assert!(!classify(&segments, 96).has_visual_support);
    }

    #[test]
    fn test_opposing_slopes_triangle() {
        let segments = [
            LineSegment::new(0, 150, 100, 50), // +45
            LineSegment::new(100, 50, 200, 150), // -45
        ];
        let features = classify(&segments, 150);

        assert_eq!(features.patterns, vec![PatternLabel::TriangleWedge]);
        assert!(features.momentum.abs() < 1e-9);
        assert_eq!(features.support_resistance_levels, 0);
    }

    #[test]
    fn test_parallel_channel() {
        let segments = [
            LineSegment::new(0, 150, 100, 50),
            LineSegment::new(100, 190, 200, 89),
        ];
        let features = classify(&segments, 0);

        assert_eq!(features.patterns, vec![PatternLabel::Channel]);
        assert!(features.momentum > 0.49 && features.momentum < 0.51);
    }

    #[test]
    fn test_diverging_same_sign_no_label() {
        let segments = [
            LineSegment::new(0, 100, 100, 90),  // ~5.7
            LineSegment::new(0, 150, 100, 50), // 45
        ];
        assert!(classify(&segments, 0).patterns.is_empty());
    }

    #[test]
    fn test_single_trendline_no_label() {
        let segments = [LineSegment::new(0, 150, 100, 50)];
        let features = classify(&segments, 0);
        assert!(features.patterns.is_empty());
        assert!((features.momentum - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_sign() {
        let down = [LineSegment::new(0, 20, 100, 120), LineSegment::new(100, 20, 200, 100)];
        assert!(classify(&down, 0).momentum < 0.0);

        let up = [LineSegment::new(0, 120, 100, 20)];
        assert!(classify(&up, 0).momentum > 0.0);
    }

    #[test]
    fn test_custom_thresholds() {
        let classifier = PatternClassifier {
            horizontal_tolerance: Degrees::new(10.0).unwrap(),
            ..PatternClassifier::default()
        };
        // ~5.7 degrees: trend by default, level with the wider tolerance
        let segments = [LineSegment::new(0, 100, 100, 90)];
        assert_eq!(classifier.classify(&segments, 0).support_resistance_levels, 1);
        assert_eq!(classify(&segments, 0).support_resistance_levels, 0);
    }

    #[test]
    fn test_validate_config() {
        assert!(PatternClassifier::default().validate_config().is_ok());
        let bad = PatternClassifier {
            min_trend_lines: 1,
            ..PatternClassifier::default()
        };
        assert!(bad.validate_config().is_err());
    }
}
