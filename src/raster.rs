//! Price series rasterization
//!
//! Renders a price series as a synthetic line chart: a fixed-size binary image
//! holding a single 1-pixel polyline. Higher prices land on lower rows, the
//! same orientation a chart has on screen.

use crate::{Pixels, Result, VisionError};

/// Default raster width, tuned together with the Hough defaults
pub const DEFAULT_WIDTH: usize = 400;
/// Default raster height
pub const DEFAULT_HEIGHT: usize = 200;
/// Largest accepted width or height
pub const MAX_SIDE: usize = 8192;
/// Largest accepted pixel count (4096 x 4096)
pub const MAX_PIXELS: usize = 1 << 24;

/// Pixel count of a `width` x `height` raster, if within bounds
fn pixel_count(width: usize, height: usize) -> Result<usize> {
    let count = width
        .checked_mul(height)
        .filter(|&count| count <= MAX_PIXELS && width <= MAX_SIDE && height <= MAX_SIDE);
    count.ok_or_else(|| {
        VisionError::InvalidConfig(format!(
            "raster {width}x{height} exceeds {MAX_SIDE} px per side or {MAX_PIXELS} px total"
        ))
    })
}

// ============================================================
// RASTER
// ============================================================

/// Binary W x H image. Row 0 is the top of the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRaster {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl ChartRaster {
    /// Blank raster (every pixel background)
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let count = pixel_count(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![false; count],
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Foreground test; out-of-bounds coordinates read as background.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> bool {
        self.contains(x, y) && self.pixels[y as usize * self.width + x as usize]
    }

    /// Mark a pixel as foreground. Out-of-bounds coordinates are ignored.
    #[inline]
    pub fn set(&mut self, x: i64, y: i64) {
        if self.contains(x, y) {
            self.pixels[y as usize * self.width + x as usize] = true;
        }
    }

    /// Draw an 8-connected segment between two pixels (Bresenham).
    pub fn draw_line(&mut self, from: (i64, i64), to: (i64, i64)) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.set(x, y);
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// Foreground pixels in column-major order (left to right, top to bottom).
    pub fn foreground(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.width).flat_map(move |x| {
            (0..self.height)
                .filter(move |&y| self.pixels[y * self.width + x])
                .map(move |y| (x, y))
        })
    }

    #[inline]
    pub(crate) fn pixels(&self) -> &[bool] {
        &self.pixels
    }
}

// ============================================================
// PRICE SCALE
// ============================================================

/// Min/span of a validated series; maps prices onto raster rows.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceScale {
    min: f64,
    span: f64,
}

impl PriceScale {
    fn fit(series: &[f64]) -> Result<Self> {
        if series.is_empty() {
            return Err(VisionError::InvalidInput {
                index: 0,
                reason: "empty series",
            });
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (index, &value) in series.iter().enumerate() {
            if !value.is_finite() {
                return Err(VisionError::InvalidInput {
                    index,
                    reason: "non-finite price",
                });
            }
            min = min.min(value);
            max = max.max(value);
        }

        let span = max - min;
        if !span.is_finite() {
            return Err(VisionError::InvalidInput {
                index: 0,
                reason: "price range overflows",
            });
        }

        Ok(Self { min, span })
    }

    /// Flat series collapse onto row 0.
    fn row(&self, value: f64, index: usize, height: usize) -> Result<i64> {
        if self.span == 0.0 {
            return Ok(0);
        }
        let normalized = (value - self.min) / self.span;
        let row = ((1.0 - normalized) * (height - 1) as f64).round();
        if !row.is_finite() {
            return Err(VisionError::InvalidInput {
                index,
                reason: "normalization produced NaN",
            });
        }
        Ok(row as i64)
    }
}

// ============================================================
// RASTERIZER
// ============================================================

/// Renders price series onto a W x H raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChartRasterizer {
    pub width: Pixels,
    pub height: Pixels,
}

impl Default for ChartRasterizer {
    fn default() -> Self {
        Self {
            width: Pixels::new_const(DEFAULT_WIDTH),
            height: Pixels::new_const(DEFAULT_HEIGHT),
        }
    }
}

impl ChartRasterizer {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let rasterizer = Self {
            width: Pixels::new(width)?,
            height: Pixels::new(height)?,
        };
        rasterizer.validate()?;
        Ok(rasterizer)
    }

    /// Size check for rasterizers built from public fields or config
    pub fn validate(&self) -> Result<()> {
        pixel_count(self.width.get(), self.height.get()).map(|_| ())
    }

    /// Raster coordinates of every series point.
    ///
    /// Index `i` of `n` maps to `round(i * (W - 1) / (n - 1))`, so points are
    /// evenly spaced whatever the series length.
    pub fn project(&self, series: &[f64]) -> Result<Vec<(i64, i64)>> {
        let scale = PriceScale::fit(series)?;
        let height = self.height.get();

        series
            .iter()
            .enumerate()
            .map(|(i, &value)| Ok((self.column(i, series.len()), scale.row(value, i, height)?)))
            .collect()
    }

    /// Draw the series as a single open polyline.
    pub fn rasterize(&self, series: &[f64]) -> Result<ChartRaster> {
        let points = self.project(series)?;
        let mut raster = ChartRaster::new(self.width.get(), self.height.get())?;

        match points.as_slice() {
            [single] => raster.set(single.0, single.1),
            _ => {
                for pair in points.windows(2) {
                    raster.draw_line(pair[0], pair[1]);
                }
            }
        }

        Ok(raster)
    }

    /// Raster row of the final value, through the same normalization
    /// `rasterize` uses.
    pub fn last_row(&self, series: &[f64]) -> Result<usize> {
        let scale = PriceScale::fit(series)?;
        let index = series.len() - 1;
        let row = scale.row(series[index], index, self.height.get())?;
        Ok(row as usize)
    }

    fn column(&self, index: usize, len: usize) -> i64 {
        if len < 2 {
            return 0;
        }
        let last = (self.width.get() - 1) as f64;
        (index as f64 * last / (len - 1) as f64).round() as i64
    }
}

// ============================================================
// TESTS
// ============================================================
