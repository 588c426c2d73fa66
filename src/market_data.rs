//! Market data model and the provider interface the scanner talks to.

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One trading session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl ta::Open for PriceBar {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for PriceBar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for PriceBar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for PriceBar {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for PriceBar {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Chronological bars for one symbol. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Builds a series, sorting the bars by date so callers can rely on
    /// chronological order.
    pub fn new(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|bar| bar.date);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }
}

/// An entry of the symbol universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub symbol: String,
    pub name: String,
}

/// Company snapshot fetched fresh on every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub previous_close: f64,
    pub volume: f64,
    pub todays_range: String,
    pub next_earnings_date: Option<NaiveDate>,
    pub shares_outstanding: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The `days` calendar days ending at `end`.
    pub fn lookback(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Quarterly,
    Annual,
}

/// Latest balance-sheet figures. `total_equity` is expressed in millions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_equity: f64,
}

/// Exponential moving averages keyed by period (days).
pub type MovingAverages = BTreeMap<u32, f64>;

/// External market-data provider.
///
/// Every call may fail with [`FetchError::Transient`] (retryable) or
/// [`FetchError::DataUnavailable`] (skip the symbol).
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn list_symbols(&self, market: &str) -> Result<Vec<Listing>, FetchError>;

    async fn company_info(&self, symbol: &str) -> Result<CompanyInfo, FetchError>;

    async fn historical_series(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<PriceSeries, FetchError>;

    async fn moving_averages(&self, symbol: &str) -> Result<MovingAverages, FetchError>;

    async fn financial_summary(
        &self,
        symbol: &str,
        period: ReportPeriod,
    ) -> Result<FinancialSummary, FetchError>;
}
