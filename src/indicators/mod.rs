//! Pure indicator calculators over an ordered price series.
//!
//! Every column is aligned index-for-index with the input bars. Warm-up
//! entries are `None` and must be ignored by anything making decisions.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod supertrend;

pub use ema::{AdjustedEma, compute_ema200, ema_series, latest_ema};
pub use macd::{Cross, MacdColumns, MacdParams, compute_macd};
pub use rsi::{RsiColumns, compute_rsi};
pub use supertrend::{Direction, SuperTrendColumns, SuperTrendParams, compute_supertrend};

use crate::error::IndicatorError;
use crate::market_data::PriceBar;

pub(crate) fn ensure_len(actual: usize, required: usize) -> Result<(), IndicatorError> {
    if actual < required {
        Err(IndicatorError::InsufficientData { required, actual })
    } else {
        Ok(())
    }
}

/// Indicator columns computed for one symbol, aligned with its bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorFrame {
    pub bars: Vec<PriceBar>,
    pub rsi: Option<RsiColumns>,
    pub macd: Option<MacdColumns>,
    pub supertrend: Vec<SuperTrendColumns>,
    /// Only the latest EMA-200 value is ever needed.
    pub ema200: Option<f64>,
}

impl IndicatorFrame {
    pub fn new(bars: &[PriceBar]) -> Self {
        Self {
            bars: bars.to_vec(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_bar(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn supertrend_for(&self, params: SuperTrendParams) -> Option<&SuperTrendColumns> {
        self.supertrend.iter().find(|st| st.params == params)
    }
}
