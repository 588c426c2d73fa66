#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use signal_screener::analysis::{NotifyMode, ScanContext};
use signal_screener::chart::{ChartRenderer, Overlay};
use signal_screener::data_fetch::DataFetcher;
use signal_screener::error::{FetchError, IndicatorError};
use signal_screener::filter_utils::LiquidityFilter;
use signal_screener::indicators::IndicatorFrame;
use signal_screener::market_data::{
    CompanyInfo, DateRange, FinancialSummary, Listing, MarketData, MovingAverages, PriceBar,
    PriceSeries, ReportPeriod,
};
use signal_screener::notifier::Notifier;
use signal_screener::retry::RetryPolicy;
use signal_screener::storage_utils::AsyncStorageManager;
use signal_screener::strategy::{Decision, Inputs, MarketContext, Metrics, Strategy};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A Friday.
pub fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 19).unwrap()
}

pub fn bars(closes: &[f64]) -> Vec<PriceBar> {
    let start = trading_day() - Duration::days(closes.len() as i64);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close + 5.0,
            low: close - 5.0,
            close,
            volume: 250_000.0,
        })
        .collect()
}

pub fn info(previous_close: f64, volume: f64, shares: f64) -> CompanyInfo {
    CompanyInfo {
        previous_close,
        volume,
        todays_range: format!("{} - {}", previous_close - 10.0, previous_close + 10.0),
        next_earnings_date: None,
        shares_outstanding: shares,
    }
}

#[derive(Clone)]
pub struct FakeSymbol {
    pub name: String,
    pub info: CompanyInfo,
    pub closes: Vec<f64>,
    pub equity: Option<f64>,
    pub moving_averages: Option<MovingAverages>,
    /// Transient failures `company_info` returns before answering.
    pub info_failures: usize,
}

impl FakeSymbol {
    pub fn new(name: &str, closes: Vec<f64>) -> Self {
        let last = closes.last().copied().unwrap_or(1500.0);
        Self {
            name: name.to_string(),
            info: info(last, 250_000.0, 10_000_000.0),
            closes,
            equity: Some(8_000.0),
            moving_averages: Some(MovingAverages::from([(200, last)])),
            info_failures: 0,
        }
    }
}

/// Scripted provider. Symbols keep universe insertion order.
#[derive(Default)]
pub struct FakeMarket {
    pub symbols: Vec<(String, FakeSymbol)>,
    pub fail_listing: bool,
    pub info_calls: Mutex<HashMap<String, usize>>,
    pub history_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
}

impl FakeMarket {
    pub fn with(symbols: Vec<(&str, FakeSymbol)>) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|(code, s)| (code.to_string(), s))
                .collect(),
            ..Self::default()
        }
    }

    fn get(&self, symbol: &str) -> Result<&FakeSymbol, FetchError> {
        self.symbols
            .iter()
            .find(|(code, _)| code == symbol)
            .map(|(_, s)| s)
            .ok_or_else(|| FetchError::DataUnavailable(format!("{symbol} unknown")))
    }

    pub fn info_calls(&self, symbol: &str) -> usize {
        self.info_calls
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn list_symbols(&self, _market: &str) -> Result<Vec<Listing>, FetchError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(FetchError::Transient("connection reset".into()));
        }
        Ok(self
            .symbols
            .iter()
            .map(|(code, s)| Listing {
                symbol: code.clone(),
                name: s.name.clone(),
            })
            .collect())
    }

    async fn company_info(&self, symbol: &str) -> Result<CompanyInfo, FetchError> {
        let fake = self.get(symbol)?;
        let attempt = {
            let mut calls = self.info_calls.lock().unwrap();
            let n = calls.entry(symbol.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if attempt <= fake.info_failures {
            return Err(FetchError::Transient(format!("timeout #{attempt}")));
        }
        Ok(fake.info.clone())
    }

    async fn historical_series(
        &self,
        symbol: &str,
        _range: DateRange,
    ) -> Result<PriceSeries, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let fake = self.get(symbol)?;
        Ok(PriceSeries::new(symbol, bars(&fake.closes)))
    }

    async fn moving_averages(&self, symbol: &str) -> Result<MovingAverages, FetchError> {
        self.get(symbol)?
            .moving_averages
            .clone()
            .ok_or_else(|| FetchError::DataUnavailable("no moving averages".into()))
    }

    async fn financial_summary(
        &self,
        symbol: &str,
        _period: ReportPeriod,
    ) -> Result<FinancialSummary, FetchError> {
        self.get(symbol)?
            .equity
            .map(|total_equity| FinancialSummary { total_equity })
            .ok_or_else(|| FetchError::DataUnavailable("no balance sheet".into()))
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub text: String,
    pub attachment: Option<PathBuf>,
    /// Whether the attachment was on disk while sending.
    pub attachment_existed: bool,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentMessage>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str, attachment: Option<&Path>) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            text: message.to_string(),
            attachment: attachment.map(Path::to_path_buf),
            attachment_existed: attachment.is_some_and(Path::exists),
        });
        if self.fail {
            bail!("notification endpoint returned 500");
        }
        Ok(())
    }
}

/// Writes a placeholder file so cleanup can be observed.
#[derive(Default)]
pub struct RecordingRenderer {
    pub rendered: Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait]
impl ChartRenderer for RecordingRenderer {
    async fn render(
        &self,
        title: &str,
        bars: &[PriceBar],
        _overlays: &[Overlay],
        output: &Path,
    ) -> Result<()> {
        tokio::fs::write(output, format!("{title}: {} bars", bars.len())).await?;
        self.rendered
            .lock()
            .unwrap()
            .push((title.to_string(), output.to_path_buf()));
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "svg"
    }
}

/// Buys whenever the last close is above the first one.
pub struct RisingStrategy {
    filter: LiquidityFilter,
}

impl Default for RisingStrategy {
    fn default() -> Self {
        Self {
            filter: LiquidityFilter {
                min_price: 100.0,
                max_price: 10_000.0,
                min_volume: 1_000.0,
            },
        }
    }
}

impl Strategy for RisingStrategy {
    fn name(&self) -> &'static str {
        "rising"
    }

    fn filter(&self) -> &LiquidityFilter {
        &self.filter
    }

    fn inputs(&self) -> Inputs {
        Inputs::default()
    }

    fn warm_up(&self) -> usize {
        2
    }

    fn compute(
        &self,
        series: &PriceSeries,
        _ctx: &MarketContext,
    ) -> Result<IndicatorFrame, IndicatorError> {
        Ok(IndicatorFrame::new(series.bars()))
    }

    fn classify(&self, frame: &IndicatorFrame, _ctx: &MarketContext) -> Decision {
        let first = frame.bars.first().map(|b| b.close).unwrap_or_default();
        let last = frame.bars.last().map(|b| b.close).unwrap_or_default();
        Decision {
            buy: last > first,
            sell: false,
        }
    }

    fn metrics(&self, frame: &IndicatorFrame, _ctx: &MarketContext) -> Metrics {
        let mut metrics = Metrics::new();
        if let Some(bar) = frame.last_bar() {
            metrics.insert("Close".into(), bar.close.into());
        }
        metrics
    }

    fn overlays(&self, _frame: &IndicatorFrame) -> Vec<Overlay> {
        Vec::new()
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        backoff: std::time::Duration::ZERO,
        ..RetryPolicy::default()
    }
}

pub struct Harness {
    pub market: Arc<FakeMarket>,
    pub notifier: Arc<RecordingNotifier>,
    pub renderer: Arc<RecordingRenderer>,
    pub storage: Arc<AsyncStorageManager>,
    pub ctx: Arc<ScanContext>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new(
        market: FakeMarket,
        strategy: Arc<dyn Strategy>,
        notifier: RecordingNotifier,
        notify: NotifyMode,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(AsyncStorageManager::new(dir.path()).await.unwrap());
        let market = Arc::new(market);
        let notifier = Arc::new(notifier);
        let renderer = Arc::new(RecordingRenderer::default());
        let ctx = Arc::new(ScanContext {
            fetcher: DataFetcher::new(market.clone(), fast_retry()),
            strategy,
            renderer: renderer.clone(),
            notifier: notifier.clone(),
            storage: storage.clone(),
            market: "japan".into(),
            lookback_days: 200,
            quote_url: "https://finance.yahoo.co.jp/quote/{code}.T".into(),
            notify,
        });
        Self {
            market,
            notifier,
            renderer,
            storage,
            ctx,
            _dir: dir,
        }
    }
}
