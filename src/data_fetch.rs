//! Provider calls wrapped in the retry policy.

use crate::error::FetchError;
use crate::market_data::{
    CompanyInfo, DateRange, FinancialSummary, Listing, MarketData, MovingAverages, PriceSeries,
    ReportPeriod,
};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct DataFetcher {
    provider: Arc<dyn MarketData>,
    retry: RetryPolicy,
}

impl DataFetcher {
    pub fn new(provider: Arc<dyn MarketData>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub async fn list_symbols(&self, market: &str) -> Result<Vec<Listing>, FetchError> {
        self.retry
            .run("list_symbols", || self.provider.list_symbols(market))
            .await
    }

    pub async fn company_info(&self, symbol: &str) -> Result<CompanyInfo, FetchError> {
        self.retry
            .run("company_info", || self.provider.company_info(symbol))
            .await
    }

    /// `Ok(None)` when the provider has no usable history for the symbol.
    /// Transient failures that outlast the retry budget are still errors.
    pub async fn historical_series(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Option<PriceSeries>, FetchError> {
        let result = self
            .retry
            .run("historical_series", || {
                self.provider.historical_series(symbol, range)
            })
            .await;

        match result {
            Ok(series) if series.is_empty() => {
                warn!(symbol, "historical data empty");
                Ok(None)
            }
            Ok(series) => Ok(Some(series)),
            Err(e @ (FetchError::DataUnavailable(_) | FetchError::Malformed(_))) => {
                warn!(symbol, error = %e, "historical data unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn moving_averages(&self, symbol: &str) -> Result<MovingAverages, FetchError> {
        self.retry
            .run("moving_averages", || self.provider.moving_averages(symbol))
            .await
    }

    pub async fn financial_summary(
        &self,
        symbol: &str,
        period: ReportPeriod,
    ) -> Result<FinancialSummary, FetchError> {
        self.retry
            .run("financial_summary", || {
                self.provider.financial_summary(symbol, period)
            })
            .await
    }
}
