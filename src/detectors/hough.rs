//! Progressive probabilistic Hough transform
//!
//! Reference [`LineDetector`] implementation. Each foreground pixel votes in an
//! (angle, rho) accumulator; as soon as one of its bins collects `threshold`
//! votes the detector traces that line through the pixel in both directions,
//! bridging up to `max_gap` missing pixels. The traced run is removed from the
//! image, and when it reaches `min_length` it is emitted and its votes are
//! withdrawn so the same pixels cannot support another line.
//!
//! Pixels are visited in column-major order rather than at random, so a given
//! raster always yields the same segments.

use tracing::trace;

use super::helpers::{self, angle_bins, trig_table};
use crate::raster::ChartRaster;
use crate::{Degrees, LineDetector, LineSegment, Pixels, Result, VisionError};

impl_with_defaults!(HoughDetector);

/// Probabilistic Hough line detector
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HoughDetector {
    /// Accumulator votes needed before a line is traced
    pub threshold: usize,
    /// Minimum x or y extent of an emitted segment
    pub min_length: Pixels,
    /// Longest gap bridged while tracing
    pub max_gap: usize,
    /// Accumulator angle step
    pub angle_resolution: Degrees,
}

impl Default for HoughDetector {
    fn default() -> Self {
        Self {
            threshold: helpers::HOUGH_THRESHOLD,
            min_length: Pixels::new_const(helpers::MIN_LINE_LENGTH),
            max_gap: helpers::MAX_LINE_GAP,
            angle_resolution: Degrees::new_const(helpers::ANGLE_RESOLUTION_DEG),
        }
    }
}

/// Vote bookkeeping for a single `detect` call
struct Accumulator {
    trig: Vec<(f64, f64)>,
    max_rho: i64,
    num_rho: usize,
    votes: Vec<usize>,
}

impl Accumulator {
    fn new(raster: &ChartRaster, angle_resolution: f64) -> Self {
        let trig = trig_table(angle_resolution);
        let diagonal = (raster.width() as f64).hypot(raster.height() as f64);
        let max_rho = (diagonal / helpers::RHO_RESOLUTION).ceil() as i64;
        let num_rho = (2 * max_rho + 1) as usize;
        let votes = vec![0; trig.len() * num_rho];

        Self {
            trig,
            max_rho,
            num_rho,
            votes,
        }
    }

    #[inline]
    fn cell(&self, angle: usize, x: usize, y: usize) -> usize {
        let (cos, sin) = self.trig[angle];
        let rho = ((x as f64 * cos + y as f64 * sin) / helpers::RHO_RESOLUTION).round() as i64;
        angle * self.num_rho + (rho + self.max_rho) as usize
    }

    /// Vote for every line through (x, y); returns the strongest bin this
    /// pixel touched as (votes, angle index). Ties keep the smaller angle.
    fn vote(&mut self, x: usize, y: usize) -> (usize, usize) {
        let mut best = (0, 0);
        for angle in 0..self.trig.len() {
            let cell = self.cell(angle, x, y);
            self.votes[cell] += 1;
            if self.votes[cell] > best.0 {
                best = (self.votes[cell], angle);
            }
        }
        best
    }

    fn withdraw(&mut self, x: usize, y: usize) {
        for angle in 0..self.trig.len() {
            let cell = self.cell(angle, x, y);
            self.votes[cell] = self.votes[cell].saturating_sub(1);
        }
    }

    /// Unit step along the line of the given bin, normalized so the major
    /// axis advances exactly one pixel.
    fn step(&self, angle: usize) -> (f64, f64) {
        let (cos, sin) = self.trig[angle];
        let (dx, dy) = (-sin, cos);
        if dx.abs() >= dy.abs() {
            (dx.signum(), dy / dx.abs())
        } else {
            (dx / dy.abs(), dy.signum())
        }
    }
}

impl HoughDetector {
    /// Create with explicit tunables
    pub fn new(
        threshold: usize,
        min_length: usize,
        max_gap: usize,
        angle_resolution: f64,
    ) -> Result<Self> {
        let detector = Self {
            threshold,
            min_length: Pixels::new(min_length)?,
            max_gap,
            angle_resolution: Degrees::new(angle_resolution)?,
        };
        LineDetector::validate_config(&detector)?;
        Ok(detector)
    }

    /// Position `t` steps from `origin` along `step`, rounded to a pixel.
    #[inline]
    fn pixel_at(origin: (usize, usize), step: (f64, f64), t: f64) -> (i64, i64) {
        (
            (origin.0 as f64 + t * step.0).round() as i64,
            (origin.1 as f64 + t * step.1).round() as i64,
        )
    }

    /// Walk away from `origin` and return the last foreground pixel reached
    /// before the gap allowance or the image border runs out.
    fn trace_end(
        &self,
        raster: &ChartRaster,
        mask: &[bool],
        origin: (usize, usize),
        step: (f64, f64),
    ) -> (i64, i64) {
        let mut end = (origin.0 as i64, origin.1 as i64);
        let mut gap = 0;
        let mut t = 1.0;

        loop {
            let (x, y) = Self::pixel_at(origin, step, t);
            if !raster.contains(x, y) {
                break;
            }
            if mask[y as usize * raster.width() + x as usize] {
                gap = 0;
                end = (x, y);
            } else {
                gap += 1;
                if gap > self.max_gap {
                    break;
                }
            }
            t += 1.0;
        }

        end
    }
}

impl LineDetector for HoughDetector {
    fn name(&self) -> &'static str {
        "probabilistic_hough"
    }

    fn detect(&self, raster: &ChartRaster) -> Result<Vec<LineSegment>> {
        let width = raster.width();
        let mut segments = Vec::new();
        if raster.foreground_count() == 0 {
            return Ok(segments);
        }

        let mut accumulator = Accumulator::new(raster, self.angle_resolution.get());
        let mut mask = raster.pixels().to_vec();
        let mut voted = vec![false; mask.len()];
        let min_length = self.min_length.get() as i64;

        for (x, y) in raster.foreground() {
            if !mask[y * width + x] {
                continue;
            }

            voted[y * width + x] = true;
            let (votes, angle) = accumulator.vote(x, y);
            if votes < self.threshold {
                continue;
            }

            let step = accumulator.step(angle);
            let back = (-step.0, -step.1);
            let ends = [
                self.trace_end(raster, &mask, (x, y), step),
                self.trace_end(raster, &mask, (x, y), back),
            ];

            let keep = (ends[1].0 - ends[0].0).abs() >= min_length
                || (ends[1].1 - ends[0].1).abs() >= min_length;

            // clear the traced run, withdrawing its votes if it is kept
            for (dir, end) in [step, back].into_iter().zip(ends) {
                let mut t = 0.0;
                loop {
                    let (px, py) = Self::pixel_at((x, y), dir, t);
                    if !raster.contains(px, py) {
                        break;
                    }
                    let idx = py as usize * width + px as usize;
                    if mask[idx] {
                        if keep && voted[idx] {
                            accumulator.withdraw(px as usize, py as usize);
                        }
                        mask[idx] = false;
                    }
                    if (px, py) == end {
                        break;
                    }
                    t += 1.0;
                }
            }

            if keep {
                let [(x1, y1), (x2, y2)] = ends;
                let segment = LineSegment::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32);
                trace!(?segment, votes, angle_bin = angle, "line segment accepted");
                segments.push(segment);
            }
        }

        Ok(segments)
    }

    fn validate_config(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(VisionError::InvalidConfig(
                "hough threshold must be > 0".to_string(),
            ));
        }
        let resolution = self.angle_resolution.get();
        if resolution <= 0.0 || resolution > 90.0 {
            return Err(VisionError::OutOfRange {
                field: "angle_resolution",
                value: resolution,
                min: f64::MIN_POSITIVE,
                max: 90.0,
            });
        }
        // keep the bin count sane
        if angle_bins(resolution) > 36_000 {
            return Err(VisionError::InvalidConfig(
                "angle_resolution too fine".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::helpers::chart_angle;

    fn detector() -> HoughDetector {
        HoughDetector::with_defaults()
    }

    #[test]
    fn test_empty_raster() {
        let raster = ChartRaster::new(400, 200).unwrap();
        assert!(detector().detect(&raster).unwrap().is_empty());
    }

    #[test]
    fn test_isolated_pixels_yield_nothing() {
        let mut raster = ChartRaster::new(400, 200).unwrap();
        for i in 0..15 {
            raster.set(i * 25, (i * 37) % 200);
        }
        assert!(detector().detect(&raster).unwrap().is_empty());
    }

    #[test]
    fn test_horizontal_line() {
        let mut raster = ChartRaster::new(400, 200).unwrap();
        raster.draw_line((20, 80), (300, 80));

        let segments = detector().detect(&raster).unwrap();
        assert!(!segments.is_empty());
        for s in &segments {
            assert_eq!((s.y1, s.y2), (80, 80));
            assert!((s.x2 - s.x1).abs() >= 30);
        }
    }

    #[test]
    fn test_diagonal_line_stays_on_pixels() {
        let mut raster = ChartRaster::new(400, 200).unwrap();
        raster.draw_line((10, 190), (190, 10));

        let segments = detector().detect(&raster).unwrap();
        assert!(!segments.is_empty());
        for s in &segments {
            assert_eq!(s.x1 + s.y1, 200);
            assert_eq!(s.x2 + s.y2, 200);
            assert!((chart_angle(s) - 45.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_line_below_min_length() {
        let mut raster = ChartRaster::new(400, 200).unwrap();
        raster.draw_line((100, 100), (120, 100));
        assert!(detector().detect(&raster).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic() {
        let mut raster = ChartRaster::new(400, 200).unwrap();
        raster.draw_line((0, 150), (120, 40));
        raster.draw_line((120, 40), (260, 170));
        raster.draw_line((260, 170), (399, 90));

        let first = detector().detect(&raster).unwrap();
        let second = detector().detect(&raster).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_validation() {
        assert!(HoughDetector::new(20, 30, 10, 1.0).is_ok());
        assert!(HoughDetector::new(0, 30, 10, 1.0).is_err());
        assert!(HoughDetector::new(20, 0, 10, 1.0).is_err());
        assert!(HoughDetector::new(20, 30, 10, 0.0).is_err());
        assert!(HoughDetector::new(20, 30, 10, f64::NAN).is_err());
    }
}
