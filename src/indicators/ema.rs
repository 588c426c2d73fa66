// =============================================================================
// Exponential Moving Average (adjusted)
// =============================================================================
//
//   alpha = 2 / (span + 1)
//   EMA_t = sum_{i=0..t} (1 - alpha)^i * x_{t-i} / sum_{i=0..t} (1 - alpha)^i
//
// The denominator makes the early window an exponentially weighted expanding
// mean rather than seeding from the first value, so the first output equals
// the first input and the weights converge to the recursive form over time.
// =============================================================================

use super::ensure_len;
use crate::error::IndicatorError;
use ta::{Next, Reset};

pub const EMA_200_SPAN: usize = 200;

#[derive(Debug, Clone)]
pub struct AdjustedEma {
    decay: f64,
    numerator: f64,
    denominator: f64,
}

impl AdjustedEma {
    /// EMA with `alpha = 2 / (span + 1)`.
    pub fn with_span(span: usize) -> Result<Self, IndicatorError> {
        if span == 0 {
            return Err(IndicatorError::InvalidParameter("EMA span must be > 0".into()));
        }
        Self::with_alpha(2.0 / (span as f64 + 1.0))
    }

    /// Wilder-style smoothing, `alpha = 1 / length`.
    pub fn with_length(length: usize) -> Result<Self, IndicatorError> {
        if length == 0 {
            return Err(IndicatorError::InvalidParameter("RMA length must be > 0".into()));
        }
        Self::with_alpha(1.0 / length as f64)
    }

    fn with_alpha(alpha: f64) -> Result<Self, IndicatorError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(IndicatorError::InvalidParameter(format!(
                "smoothing factor {alpha} outside (0, 1]"
            )));
        }
        Ok(Self {
            decay: 1.0 - alpha,
            numerator: 0.0,
            denominator: 0.0,
        })
    }
}

impl Next<f64> for AdjustedEma {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        self.numerator = input + self.decay * self.numerator;
        self.denominator = 1.0 + self.decay * self.denominator;
        self.numerator / self.denominator
    }
}

impl Reset for AdjustedEma {
    fn reset(&mut self) {
        self.numerator = 0.0;
        self.denominator = 0.0;
    }
}

/// Full EMA series, one value per input.
pub fn ema_series(values: &[f64], span: usize) -> Result<Vec<f64>, IndicatorError> {
    let mut ema = AdjustedEma::with_span(span)?;
    Ok(values.iter().map(|&v| ema.next(v)).collect())
}

/// Latest EMA-200 of the closes.
pub fn compute_ema200(closes: &[f64]) -> Result<f64, IndicatorError> {
    latest_ema(closes, EMA_200_SPAN)
}

/// Latest EMA for `span`, requiring at least `span` observations.
pub fn latest_ema(closes: &[f64], span: usize) -> Result<f64, IndicatorError> {
    ensure_len(closes.len(), span)?;
    let series = ema_series(closes, span)?;
    series
        .last()
        .copied()
        .ok_or(IndicatorError::InsufficientData {
            required: span,
            actual: 0,
        })
}
