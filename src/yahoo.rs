//! Yahoo Finance implementation of the market-data provider.
//!
//! Uses the unofficial chart, quote and quoteSummary endpoints. The symbol
//! universe comes from `find_tickers` since Yahoo has no listing endpoint.

use crate::error::FetchError;
use crate::find_tickers::{UniverseSource, fetch_universe};
use crate::indicators::latest_ema;
use crate::market_data::{
    CompanyInfo, DateRange, FinancialSummary, Listing, MarketData, MovingAverages, PriceBar,
    PriceSeries, ReportPeriod,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Periods reported in the moving-average table.
pub const MOVING_AVERAGE_PERIODS: [u32; 6] = [5, 10, 20, 50, 100, 200];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Appended to exchange codes, e.g. ".T" for Tokyo.
    pub symbol_suffix: String,
    pub universe: UniverseSource,
    pub timeout_secs: u64,
    /// Chart range fetched to derive the moving-average table.
    pub moving_average_range: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            symbol_suffix: ".T".to_string(),
            universe: UniverseSource::default(),
            timeout_secs: 30,
            moving_average_range: "2y".to_string(),
        }
    }
}

// --- Chart endpoint ---

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

// --- Quote endpoint ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    result: Vec<QuoteResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResult {
    regular_market_previous_close: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_day_range: Option<String>,
    earnings_timestamp: Option<i64>,
    shares_outstanding: Option<f64>,
}

// --- quoteSummary endpoint ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    balance_sheet_history_quarterly: Option<BalanceSheetHistory>,
    balance_sheet_history: Option<BalanceSheetHistory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceSheetHistory {
    balance_sheet_statements: Vec<BalanceSheetStatement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceSheetStatement {
    end_date: Option<RawValue>,
    total_stockholder_equity: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

pub struct YahooFinanceProvider {
    client: Client,
    config: ProviderConfig,
    /// Resolves relative universe files.
    storage_dir: PathBuf,
}

impl YahooFinanceProvider {
    pub fn new(config: ProviderConfig, storage_dir: PathBuf) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| FetchError::Rejected(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            storage_dir,
        })
    }

    fn ticker(&self, symbol: &str) -> String {
        if self.config.symbol_suffix.is_empty() || symbol.ends_with(&self.config.symbol_suffix) {
            symbol.to_uppercase()
        } else {
            format!("{}{}", symbol.to_uppercase(), self.config.symbol_suffix)
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        debug!(url, "GET");
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::from_status(status, url));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(format!("{url}: {e}")))
    }

    async fn chart(
        &self,
        symbol: &str,
        query: &[(&str, String)],
    ) -> Result<PriceSeries, FetchError> {
        let url = format!("{}/v8/finance/chart/{}", self.config.base_url, self.ticker(symbol));
        let response: ChartResponse = self.get_json(&url, query).await?;
        parse_chart(symbol, response)
    }
}

#[async_trait]
impl MarketData for YahooFinanceProvider {
    async fn list_symbols(&self, market: &str) -> Result<Vec<Listing>, FetchError> {
        fetch_universe(&self.client, &self.config.universe, market, &self.storage_dir).await
    }

    async fn company_info(&self, symbol: &str) -> Result<CompanyInfo, FetchError> {
        let url = format!("{}/v7/finance/quote", self.config.base_url);
        let response: QuoteResponse = self
            .get_json(&url, &[("symbols", self.ticker(symbol))])
            .await?;
        parse_quote(symbol, response)
    }

    async fn historical_series(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<PriceSeries, FetchError> {
        let query = [
            ("period1", day_start_timestamp(range.start).to_string()),
            (
                "period2",
                day_start_timestamp(range.end + ChronoDuration::days(1)).to_string(),
            ),
            ("interval", "1d".to_string()),
            ("includePrePost", "false".to_string()),
        ];
        self.chart(symbol, &query).await
    }

    async fn moving_averages(&self, symbol: &str) -> Result<MovingAverages, FetchError> {
        let query = [
            ("range", self.config.moving_average_range.clone()),
            ("interval", "1d".to_string()),
        ];
        let series = self.chart(symbol, &query).await?;
        Ok(moving_average_table(&series.closes()))
    }

    async fn financial_summary(
        &self,
        symbol: &str,
        period: ReportPeriod,
    ) -> Result<FinancialSummary, FetchError> {
        let module = match period {
            ReportPeriod::Quarterly => "balanceSheetHistoryQuarterly",
            ReportPeriod::Annual => "balanceSheetHistory",
        };
        let url = format!(
            "{}/v10/finance/quoteSummary/{}",
            self.config.base_url,
            self.ticker(symbol)
        );
        let response: SummaryResponse = self
            .get_json(&url, &[("modules", module.to_string())])
            .await?;
        parse_balance_sheet(symbol, response)
    }
}

fn day_start_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn parse_chart(symbol: &str, response: ChartResponse) -> Result<PriceSeries, FetchError> {
    if let Some(error) = response.chart.error {
        return Err(FetchError::DataUnavailable(format!(
            "{symbol}: {} - {}",
            error.code, error.description
        )));
    }
    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol}: empty chart result")))?;

    let timestamps = result.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        return Err(FetchError::DataUnavailable(format!("{symbol}: no sessions in range")));
    }
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Malformed(format!("{symbol}: chart without quote block")))?;

    let offset = result.meta.gmtoffset.unwrap_or(0);
    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let value = |column: &[Option<f64>], i: usize| column.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        // Sessions without a close (halts, the still-open day) carry no information.
        let Some(close) = value(&closes, i) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive()) else {
            return Err(FetchError::Malformed(format!("{symbol}: bad timestamp {ts}")));
        };
        bars.push(PriceBar {
            date,
            open: value(&opens, i).unwrap_or(close),
            high: value(&highs, i).unwrap_or(close),
            low: value(&lows, i).unwrap_or(close),
            close,
            volume: value(&volumes, i).unwrap_or(0.0),
        });
    }

    if bars.is_empty() {
        return Err(FetchError::DataUnavailable(format!("{symbol}: no closes in range")));
    }
    Ok(PriceSeries::new(symbol, bars))
}

fn parse_quote(symbol: &str, response: QuoteResponse) -> Result<CompanyInfo, FetchError> {
    let quote = response
        .quote_response
        .result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol}: no quote")))?;

    let previous_close = quote
        .regular_market_previous_close
        .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol}: no previous close")))?;

    Ok(CompanyInfo {
        previous_close,
        volume: quote.regular_market_volume.unwrap_or(0.0),
        todays_range: quote.regular_market_day_range.unwrap_or_default(),
        next_earnings_date: quote
            .earnings_timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive()),
        shares_outstanding: quote.shares_outstanding.unwrap_or(0.0),
    })
}

/// Latest statement's total equity, converted to millions.
fn parse_balance_sheet(
    symbol: &str,
    response: SummaryResponse,
) -> Result<FinancialSummary, FetchError> {
    if let Some(error) = response.quote_summary.error {
        return Err(FetchError::DataUnavailable(format!(
            "{symbol}: {} - {}",
            error.code, error.description
        )));
    }
    let result = response
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol}: empty summary")))?;

    let history = result
        .balance_sheet_history_quarterly
        .or(result.balance_sheet_history)
        .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol}: no balance sheet")))?;

    let latest = history
        .balance_sheet_statements
        .into_iter()
        .filter_map(|s| {
            let equity = s.total_stockholder_equity.and_then(|v| v.raw)?;
            let end = s.end_date.and_then(|v| v.raw).unwrap_or(0.0);
            Some((end, equity))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol}: no equity figure")))?;

    Ok(FinancialSummary {
        total_equity: latest.1 / 1_000_000.0,
    })
}

fn moving_average_table(closes: &[f64]) -> MovingAverages {
    MOVING_AVERAGE_PERIODS
        .iter()
        .filter_map(|&period| {
            latest_ema(closes, period as usize)
                .ok()
                .map(|value| (period, value))
        })
        .collect()
}
