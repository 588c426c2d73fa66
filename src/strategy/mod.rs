//! Buy/sell classifiers. Each strategy knows which indicators it needs,
//! how to compute them from a price series and how to turn them into a
//! verdict.

pub mod macd_rsi;
pub mod supertrend;

pub use macd_rsi::{MacdRsiChecks, MacdRsiConfig, MacdRsiStrategy};
pub use supertrend::{SuperTrendConfig, SuperTrendStrategy};

use crate::chart::Overlay;
use crate::error::IndicatorError;
use crate::filter_utils::LiquidityFilter;
use crate::indicators::IndicatorFrame;
use crate::market_data::{CompanyInfo, FinancialSummary, MovingAverages, PriceSeries};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Everything besides the price series a classifier may look at.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketContext {
    pub info: CompanyInfo,
    pub financials: Option<FinancialSummary>,
    pub moving_averages: Option<MovingAverages>,
}

impl MarketContext {
    pub fn new(info: CompanyInfo) -> Self {
        Self {
            info,
            financials: None,
            moving_averages: None,
        }
    }

    /// Price-to-book ratio, with total equity in millions.
    ///
    /// `None` when there is no balance sheet, when equity or share count is
    /// zero, or when the result is not finite. An undefined PBR fails every
    /// threshold it is compared against.
    pub fn pbr(&self) -> Option<f64> {
        let equity = self.financials?.total_equity;
        let shares = self.info.shares_outstanding;
        if equity == 0.0 || shares == 0.0 {
            return None;
        }
        let book_per_share = equity * 1_000_000.0 / shares;
        let pbr = self.info.previous_close / book_per_share;
        pbr.is_finite().then_some(pbr)
    }
}

/// Extra provider data a strategy wants fetched before classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inputs {
    pub financials: bool,
    pub moving_averages: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub buy: bool,
    pub sell: bool,
}

impl Decision {
    pub fn is_flagged(&self) -> bool {
        self.buy || self.sell
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Flag(b) => write!(f, "{b}"),
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => MetricValue::Number(v),
            None => MetricValue::Text("N/A".to_string()),
        }
    }
}

/// Supporting metrics in display order.
pub type Metrics = IndexMap<String, MetricValue>;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pre-filter applied to the company snapshot before any history is fetched.
    fn filter(&self) -> &LiquidityFilter;

    fn inputs(&self) -> Inputs;

    /// Minimum number of bars `compute` accepts.
    fn warm_up(&self) -> usize;

    fn compute(
        &self,
        series: &PriceSeries,
        ctx: &MarketContext,
    ) -> Result<IndicatorFrame, IndicatorError>;

    fn classify(&self, frame: &IndicatorFrame, ctx: &MarketContext) -> Decision;

    fn metrics(&self, frame: &IndicatorFrame, ctx: &MarketContext) -> Metrics;

    /// Indicator lines drawn on the chart of a flagged symbol.
    fn overlays(&self, frame: &IndicatorFrame) -> Vec<Overlay>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    MacdRsi(MacdRsiConfig),
    SuperTrend(SuperTrendConfig),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::MacdRsi(MacdRsiConfig::default())
    }
}

impl StrategyConfig {
    pub fn build(&self) -> Arc<dyn Strategy> {
        match self {
            StrategyConfig::MacdRsi(config) => Arc::new(MacdRsiStrategy::new(config.clone())),
            StrategyConfig::SuperTrend(config) => Arc::new(SuperTrendStrategy::new(config.clone())),
        }
    }
}
