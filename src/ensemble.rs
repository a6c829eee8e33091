//! Hybrid price prediction
//!
//! Blends two black-box forecasters (a sequence model and a tabular model)
//! with the visual momentum from [`VisualAnalyst`] and turns the blended move
//! into a Buy/Sell/Hold signal gated by RSI.
//!
//! Forecasters, market data and indicators are traits; training and fetching
//! happen elsewhere. [`WilderRsi`] is the stock indicator. Given the same
//! inputs the result is always the same.
//!
//! # Example
//!
//! ```rust
//! use chartsight::prelude::*;
//!
//! struct Drift(f64);
//!
//! impl Forecaster for Drift {
//!     fn name(&self) -> &str { "drift" }
//!     fn forecast(&self, closes: &[f64]) -> Result<f64> {
//!         Ok(closes[closes.len() - 1] * (1.0 + self.0))
//!     }
//! }
//!
//! let ensemble = HybridEnsemble::new(Drift(0.03), Drift(0.02));
//! // too short to render, so only the forecasters move the target
//! let closes = vec![100.0; 20];
//! let prediction = ensemble.predict("BTC/USDT", &closes, 50.0).unwrap();
//! assert_eq!(prediction.signal, Signal::Buy);
//! ```

use tracing::debug;

use crate::detectors::HoughDetector;
use crate::{LineDetector, PatternLabel, Result, VisionError, VisualAnalyst, OHLCV};

/// Bars requested per prediction
pub const DEFAULT_FETCH_LIMIT: usize = 200;

// ============================================================
// COLLABORATORS
// ============================================================

/// Point estimate of the next close
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    /// `closes` is oldest first and never empty.
    fn forecast(&self, closes: &[f64]) -> Result<f64>;
}

impl<F: Forecaster + ?Sized> Forecaster for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn forecast(&self, closes: &[f64]) -> Result<f64> {
        (**self).forecast(closes)
    }
}

/// OHLCV source; `None` means no data for the request.
pub trait MarketData {
    type Bar: OHLCV;

    fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize) -> Option<Vec<Self::Bar>>;
}

/// Indicators derived from the fetched bars
pub trait Indicators {
    /// RSI (0..=100) at the last bar; `None` when the bars are too few.
    fn rsi<B: OHLCV>(&self, bars: &[B]) -> Option<f64>;
}

/// Default RSI period
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// RSI on closes with Wilder's smoothing.
///
/// The first `period` changes seed plain averages of gains and losses, then
/// `avg = (prev * (period - 1) + x) / period`. No movement at all reads 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WilderRsi {
    pub period: usize,
}

impl Default for WilderRsi {
    fn default() -> Self {
        Self {
            period: DEFAULT_RSI_PERIOD,
        }
    }
}

impl Indicators for WilderRsi {
    fn rsi<B: OHLCV>(&self, bars: &[B]) -> Option<f64> {
        if self.period == 0 || bars.len() <= self.period {
            return None;
        }
        let period = self.period as f64;
        let changes = bars.windows(2).map(|w| w[1].close() - w[0].close());

        let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
        for (i, change) in changes.enumerate() {
            let (gain, loss) = (change.max(0.0), (-change).max(0.0));
            if i < self.period {
                avg_gain += gain / period;
                avg_loss += loss / period;
            } else {
                avg_gain = (avg_gain * (period - 1.0) + gain) / period;
                avg_loss = (avg_loss * (period - 1.0) + loss) / period;
            }
        }

        let sum = avg_gain + avg_loss;
        let rsi = if sum == 0.0 { 50.0 } else { 100.0 * avg_gain / sum };
        rsi.is_finite().then_some(rsi)
    }
}

// ============================================================
// CONFIG
// ============================================================

/// Blend weights
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EnsembleWeights {
    pub sequence: f64,
    pub tabular: f64,
    /// Multiplier on visual momentum, added straight to the move
    pub visual: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            sequence: 0.6,
            tabular: 0.4,
            visual: 0.15,
        }
    }
}

/// Signal thresholds
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SignalRules {
    /// Relative rise required for Buy
    pub buy_move: f64,
    /// Relative drop required for Sell
    pub sell_move: f64,
    /// Buy only below this RSI
    pub rsi_overbought: f64,
    /// Sell only above this RSI
    pub rsi_oversold: f64,
    /// Added to confidence when a Buy/Sell is backed by a triangle/wedge
    pub pattern_bonus: f64,
    pub max_confidence: f64,
}

impl Default for SignalRules {
    fn default() -> Self {
        Self {
            buy_move: 0.01,
            sell_move: 0.01,
            rsi_overbought: 65.0,
            rsi_oversold: 35.0,
            pattern_bonus: 0.1,
            max_confidence: 0.99,
        }
    }
}

impl SignalRules {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("buy_move", self.buy_move), ("sell_move", self.sell_move)] {
            if !(0.0..1.0).contains(&value) {
                return Err(VisionError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        let rsi_finite = self.rsi_oversold.is_finite() && self.rsi_overbought.is_finite();
        if !rsi_finite || self.rsi_oversold >= self.rsi_overbought {
            return Err(VisionError::InvalidConfig(format!(
                "rsi_oversold ({}) must be below rsi_overbought ({})",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        if !(0.0..=1.0).contains(&self.max_confidence) {
            return Err(VisionError::OutOfRange {
                field: "max_confidence",
                value: self.max_confidence,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

// ============================================================
// OUTPUT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "Buy",
            Signal::Sell => "Sell",
            Signal::Hold => "Hold",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Prediction {
    pub pair: String,
    pub signal: Signal,
    pub current_price: f64,
    pub target_price: f64,
    pub confidence: f64,
    pub visual_patterns: Vec<PatternLabel>,
    /// Visual contribution to the move (momentum x visual weight)
    pub visual_momentum: f64,
    /// Timestamp of the last bar, when the source provides one
    pub timestamp: Option<i64>,
}

// ============================================================
// ENSEMBLE
// ============================================================

pub struct HybridEnsemble<S, T, D: LineDetector = HoughDetector> {
    sequence: S,
    tabular: T,
    analyst: VisualAnalyst<D>,
    weights: EnsembleWeights,
    rules: SignalRules,
}

impl<S: Forecaster, T: Forecaster> HybridEnsemble<S, T, HoughDetector> {
    /// Default analyst, weights and rules
    pub fn new(sequence: S, tabular: T) -> Self {
        Self {
            sequence,
            tabular,
            analyst: VisualAnalyst::new(),
            weights: EnsembleWeights::default(),
            rules: SignalRules::default(),
        }
    }
}

impl<S: Forecaster, T: Forecaster, D: LineDetector> HybridEnsemble<S, T, D> {
    /// Swap the visual analyst
    pub fn with_analyst<D2: LineDetector>(
        self,
        analyst: VisualAnalyst<D2>,
    ) -> HybridEnsemble<S, T, D2> {
        HybridEnsemble {
            sequence: self.sequence,
            tabular: self.tabular,
            analyst,
            weights: self.weights,
            rules: self.rules,
        }
    }

    pub fn with_weights(mut self, weights: EnsembleWeights) -> Result<Self> {
        let all = [weights.sequence, weights.tabular, weights.visual];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(VisionError::InvalidValue(
                "ensemble weights must be finite and non-negative",
            ));
        }
        self.weights = weights;
        Ok(self)
    }

    pub fn with_rules(mut self, rules: SignalRules) -> Result<Self> {
        rules.validate()?;
        self.rules = rules;
        Ok(self)
    }

    #[inline]
    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    #[inline]
    pub fn rules(&self) -> &SignalRules {
        &self.rules
    }

    #[inline]
    pub fn analyst(&self) -> &VisualAnalyst<D> {
        &self.analyst
    }

    /// Predict from a close series (oldest first) and the current RSI.
    pub fn predict(&self, pair: &str, closes: &[f64], rsi: f64) -> Result<Prediction> {
        let current = match closes.last() {
            Some(&c) if c.is_finite() && c > 0.0 => c,
            Some(_) => {
                return Err(VisionError::InvalidInput {
                    index: closes.len() - 1,
                    reason: "current price must be finite and positive",
                })
            },
            None => {
                return Err(VisionError::InvalidInput {
                    index: 0,
                    reason: "empty series",
                })
            },
        };
        if !rsi.is_finite() {
            return Err(VisionError::InvalidValue("rsi must be finite"));
        }

        let features = self.analyst.analyze(closes)?;
        let visual_impact = features.momentum * self.weights.visual;

        let sequence_move = self.relative_move(&self.sequence, closes, current)?;
        let tabular_move = self.relative_move(&self.tabular, closes, current)?;
        let model_move =
            self.weights.sequence * sequence_move + self.weights.tabular * tabular_move;
        let target_price = current * (1.0 + model_move + visual_impact);

        let rules = &self.rules;
        let rising = target_price > current * (1.0 + rules.buy_move);
        let falling = target_price < current * (1.0 - rules.sell_move);
        let signal = if rising && rsi < rules.rsi_overbought {
            Signal::Buy
        } else if falling && rsi > rules.rsi_oversold {
            Signal::Sell
        } else {
            Signal::Hold
        };

        let mut confidence = 0.5 + visual_impact.abs() * 0.5;
        if signal != Signal::Hold && features.has_pattern(PatternLabel::TriangleWedge) {
            confidence += rules.pattern_bonus;
        }
        let confidence = confidence.min(rules.max_confidence);

        debug!(
            pair,
            sequence_move,
            tabular_move,
            visual_impact,
            %signal,
            confidence,
            "prediction blended"
        );

        Ok(Prediction {
            pair: pair.to_string(),
            signal,
            current_price: current,
            target_price,
            confidence,
            visual_patterns: features.patterns,
            visual_momentum: visual_impact,
            timestamp: None,
        })
    }

    /// Fetch bars, read RSI from them and predict on their closes.
    ///
    /// `Ok(None)` when the source has no data or the bars yield no usable RSI.
    pub fn run_prediction<M: MarketData, I: Indicators>(
        &self,
        market: &M,
        indicators: &I,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Option<Prediction>> {
        let bars = match market.fetch_ohlcv(symbol, timeframe, DEFAULT_FETCH_LIMIT) {
            Some(bars) if !bars.is_empty() => bars,
            _ => {
                debug!(symbol, timeframe, "no market data");
                return Ok(None);
            },
        };
        let rsi = match indicators.rsi(&bars) {
            Some(rsi) if rsi.is_finite() => rsi,
            other => {
                debug!(symbol, timeframe, bars = bars.len(), rsi = ?other, "no usable rsi");
                return Ok(None);
            },
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let mut prediction = self.predict(symbol, &closes, rsi)?;
        prediction.timestamp = bars.last().and_then(|b| b.timestamp());
        Ok(Some(prediction))
    }

    fn relative_move<F: Forecaster>(
        &self,
        forecaster: &F,
        closes: &[f64],
        current: f64,
    ) -> Result<f64> {
        let forecast_error = |reason: String| VisionError::Forecast {
            name: forecaster.name().to_string(),
            reason,
        };
        let next = forecaster.forecast(closes).map_err(|e| match e {
            e @ VisionError::Forecast { .. } => e,
            other => forecast_error(other.to_string()),
        })?;
        if !next.is_finite() {
            return Err(forecast_error(format!("non-finite forecast {next}")));
        }
        Ok(next / current - 1.0)
    }
}

// ============================================================
// TESTS
// ============================================================
