//! Common geometry helpers for line detection and classification
//!
//! Default thresholds shared by the Hough detector and the pattern classifier,
//! plus the small amount of angle arithmetic both need.

use crate::LineSegment;

// ============================================================
// DETECTOR DEFAULTS (tuned for a 400 x 200 raster)
// ============================================================

/// Minimum accumulator votes before a line is traced
pub const HOUGH_THRESHOLD: usize = 20;
/// Minimum x or y extent of a kept segment, in pixels
pub const MIN_LINE_LENGTH: usize = 30;
/// Longest run of missing pixels bridged while tracing
pub const MAX_LINE_GAP: usize = 10;
/// Accumulator angle step
pub const ANGLE_RESOLUTION_DEG: f64 = 1.0;
/// Accumulator distance step, in pixels
pub const RHO_RESOLUTION: f64 = 1.0;

// ============================================================
// CLASSIFIER DEFAULTS
// ============================================================

/// |angle| below this is support/resistance
pub const HORIZONTAL_TOLERANCE_DEG: f64 = 5.0;
/// Rising and falling trendlines both steeper than this form a triangle/wedge
pub const OPPOSING_SLOPE_DEG: f64 = 5.0;
/// Trend angle std dev below this is a channel
pub const CHANNEL_MAX_STD_DEG: f64 = 2.0;
/// Last price within this many rows of a level counts as support
pub const SUPPORT_TOLERANCE_PX: usize = 5;
/// Trendlines needed before any pattern is labelled
pub const MIN_TREND_LINES: usize = 2;
/// Momentum is the mean trend angle over this
pub const MOMENTUM_SCALE_DEG: f64 = 90.0;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Segment endpoints ordered left to right (top to bottom when vertical).
#[inline]
pub fn oriented(segment: &LineSegment) -> LineSegment {
    let LineSegment { x1, y1, x2, y2 } = *segment;
    if x2 < x1 || (x2 == x1 && y2 < y1) {
        LineSegment::new(x2, y2, x1, y1)
    } else {
        *segment
    }
}

/// Angle in chart orientation, degrees in [-90, 90].
///
/// Raster rows grow downward, so the y difference is flipped: a segment that
/// climbs toward the right of the image has a positive angle.
#[inline]
pub fn chart_angle(segment: &LineSegment) -> f64 {
    let s = oriented(segment);
    f64::from(s.y1 - s.y2).atan2(f64::from(s.x2 - s.x1)).to_degrees()
}

#[inline]
pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
#[inline]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// (cos, sin) for each accumulator angle over [0, 180).
pub fn trig_table(angle_resolution_deg: f64) -> Vec<(f64, f64)> {
    let bins = angle_bins(angle_resolution_deg);
    (0..bins)
        .map(|n| {
            let theta = (n as f64 * angle_resolution_deg).to_radians();
            (theta.cos(), theta.sin())
        })
        .collect()
}

#[inline]
pub fn angle_bins(angle_resolution_deg: f64) -> usize {
    ((180.0 / angle_resolution_deg).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_angle_orientation() {
        // climbing to the right on screen = row decreasing
        assert!((chart_angle(&LineSegment::new(0, 100, 100, 0)) - 45.0).abs() < 1e-9);
        assert!((chart_angle(&LineSegment::new(0, 0, 100, 100)) + 45.0).abs() < 1e-9);
        // endpoint order does not matter
        assert!((chart_angle(&LineSegment::new(100, 0, 0, 100)) - 45.0).abs() < 1e-9);
        assert_eq!(chart_angle(&LineSegment::new(50, 20, 10, 20)), 0.0);
        assert!((chart_angle(&LineSegment::new(5, 0, 5, 40)).abs() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(std_dev(&[4.0, 4.0]), Some(0.0));
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_trig_table() {
        let table = trig_table(1.0);
        assert_eq!(table.len(), 180);
        assert!((table[90].0).abs() < 1e-12);
        assert!((table[90].1 - 1.0).abs() < 1e-12);
        assert_eq!(angle_bins(0.5), 360);
    }
}
