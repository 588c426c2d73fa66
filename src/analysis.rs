//! This module contains the scan pipeline: list the universe, then for every
//! symbol filter, fetch, compute, classify and deliver.

use crate::chart::ChartRenderer;
use crate::comfy_table;
use crate::data_fetch::DataFetcher;
use crate::error::{FetchError, IndicatorError, ScanError};
use crate::indicators::IndicatorFrame;
use crate::market_data::{DateRange, Listing, ReportPeriod};
use crate::notifier::{Notifier, format_summary_message, format_verdict_message};
use crate::scheduler::is_trading_day;
use crate::storage_utils::AsyncStorageManager;
use crate::strategy::{MarketContext, Strategy};
use crate::verdict::SignalVerdict;
use anyhow::Result;
use chrono::NaiveDate;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// File (in storage) holding verdicts waiting for the notify phase.
pub const FLAGGED_FILE: &str = "flagged";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Up to `n` symbols in flight at once.
    Pooled(usize),
    Sequential,
    /// Only this symbol, regardless of the universe.
    Single(String),
}

impl ExecutionMode {
    fn width(&self) -> usize {
        match self {
            ExecutionMode::Pooled(n) => (*n).max(1),
            ExecutionMode::Sequential | ExecutionMode::Single(_) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Notify each flagged symbol as soon as it is classified.
    Immediate,
    /// Persist flagged verdicts for `run_notify_phase`.
    Deferred,
}

/// Everything a scan needs, shared read-only by all workers.
pub struct ScanContext {
    pub fetcher: DataFetcher,
    pub strategy: Arc<dyn Strategy>,
    pub renderer: Arc<dyn ChartRenderer>,
    pub notifier: Arc<dyn Notifier>,
    pub storage: Arc<AsyncStorageManager>,
    pub market: String,
    pub lookback_days: u32,
    pub quote_url: String,
    pub notify: NotifyMode,
}

/// A flagged verdict waiting for the notify phase, with its pre-rendered chart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub verdict: SignalVerdict,
    pub chart: Option<PathBuf>,
}

#[derive(Debug)]
enum Outcome {
    Filtered,
    Skipped(String),
    Classified {
        verdict: SignalVerdict,
        pending: Option<PendingNotification>,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub date: NaiveDate,
    pub strategy: String,
    pub processed: usize,
    pub classified: usize,
    pub filtered: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// In universe order.
    pub flagged: Vec<SignalVerdict>,
    pub elapsed: Duration,
}

impl ScanReport {
    fn new(date: NaiveDate, strategy: &str) -> Self {
        Self {
            date,
            strategy: strategy.to_string(),
            processed: 0,
            classified: 0,
            filtered: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            flagged: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Runs one scan for `today`. Returns `None` on weekends.
///
/// Only a failure to list the universe is an error; per-symbol failures are
/// logged and recorded in the report.
pub async fn run_scan(
    ctx: Arc<ScanContext>,
    mode: ExecutionMode,
    today: NaiveDate,
) -> Result<Option<ScanReport>> {
    if !is_trading_day(today) {
        info!(%today, "not a trading day, nothing to scan");
        return Ok(None);
    }

    let start = Instant::now();
    let strategy = ctx.strategy.name();
    info!(%today, strategy, ?mode, "scan started");

    let listings = resolve_universe(&ctx, &mode).await?;
    info!("{} symbols to scan", listings.len());

    let outcomes: Vec<(Listing, Outcome)> = stream::iter(listings)
        .map(|listing| {
            let ctx = ctx.clone();
            async move {
                let symbol = listing.symbol.clone();
                let handle = tokio::spawn(async move {
                    let outcome = process_symbol(&ctx, &listing, today).await;
                    (outcome, listing)
                });
                match handle.await {
                    Ok((outcome, listing)) => (listing, outcome),
                    Err(e) => {
                        error!(symbol = %symbol, "worker crashed: {}", e);
                        (
                            Listing {
                                symbol,
                                name: String::new(),
                            },
                            Outcome::Failed(e.to_string()),
                        )
                    }
                }
            }
        })
        .buffered(mode.width())
        .collect()
        .await;

    let mut report = ScanReport::new(today, strategy);
    let mut pending = Vec::new();
    for (listing, outcome) in outcomes {
        report.processed += 1;
        match outcome {
            Outcome::Filtered => report.filtered.push(listing.symbol),
            Outcome::Skipped(reason) => {
                debug!(symbol = %listing.symbol, %reason, "skipped");
                report.skipped.push(listing.symbol);
            }
            Outcome::Failed(reason) => {
                debug!(symbol = %listing.symbol, %reason, "failed");
                report.failed.push(listing.symbol);
            }
            Outcome::Classified {
                verdict,
                pending: deferred,
            } => {
                report.classified += 1;
                if verdict.is_flagged() {
                    report.flagged.push(verdict);
                }
                pending.extend(deferred);
            }
        }
    }

    match ctx.notify {
        NotifyMode::Immediate => {
            let summary = format_summary_message(strategy, &report.flagged);
            if let Err(e) = ctx.notifier.send(&summary, None).await {
                error!("summary notification failed: {:#}", e);
            }
        }
        NotifyMode::Deferred => {
            ctx.storage.save(FLAGGED_FILE, &pending).await?;
            info!("{} verdicts queued for notification", pending.len());
        }
    }

    report.elapsed = start.elapsed();
    info!(
        processed = report.processed,
        flagged = report.flagged.len(),
        failed = report.failed.len(),
        "scan finished in {:.1}s",
        report.elapsed.as_secs_f64()
    );
    comfy_table::print_report(&report);

    Ok(Some(report))
}

async fn resolve_universe(ctx: &ScanContext, mode: &ExecutionMode) -> Result<Vec<Listing>> {
    let listings = ctx.fetcher.list_symbols(&ctx.market).await?;
    let ExecutionMode::Single(symbol) = mode else {
        return Ok(listings);
    };
    // Ad-hoc symbols need not be part of the universe.
    let listing = listings
        .into_iter()
        .find(|l| l.symbol == *symbol)
        .unwrap_or_else(|| Listing {
            symbol: symbol.clone(),
            name: symbol.clone(),
        });
    Ok(vec![listing])
}

async fn process_symbol(ctx: &ScanContext, listing: &Listing, today: NaiveDate) -> Outcome {
    match evaluate_symbol(ctx, listing, today).await {
        Ok(outcome) => outcome,
        Err(ScanError::Fetch(FetchError::DataUnavailable(reason))) => {
            info!(symbol = %listing.symbol, " -- skip. {}", reason);
            Outcome::Skipped(reason)
        }
        Err(ScanError::Indicator(e @ IndicatorError::InsufficientData { .. })) => {
            info!(symbol = %listing.symbol, " -- skip. {}", e);
            Outcome::Skipped(e.to_string())
        }
        Err(e) => {
            error!(symbol = %listing.symbol, "{}", e);
            Outcome::Failed(e.to_string())
        }
    }
}

async fn evaluate_symbol(
    ctx: &ScanContext,
    listing: &Listing,
    today: NaiveDate,
) -> Result<Outcome, ScanError> {
    let symbol = listing.symbol.as_str();
    let strategy = &ctx.strategy;
    info!("{} - {}", symbol, listing.name);

    let info = ctx.fetcher.company_info(symbol).await?;
    if let Err(rejection) = strategy.filter().check(&info) {
        info!(" -- ignore. price:{} volume:{}", info.previous_close, info.volume);
        debug!(symbol, ?rejection);
        return Ok(Outcome::Filtered);
    }

    let range = DateRange::lookback(today, ctx.lookback_days);
    let Some(series) = ctx.fetcher.historical_series(symbol, range).await? else {
        return Ok(Outcome::Skipped("no price history".to_string()));
    };
    if series.len() < strategy.warm_up() {
        return Err(IndicatorError::InsufficientData {
            required: strategy.warm_up(),
            actual: series.len(),
        }
        .into());
    }

    let mut market = MarketContext::new(info);
    let inputs = strategy.inputs();
    if inputs.financials {
        market.financials = optional(
            symbol,
            ctx.fetcher
                .financial_summary(symbol, ReportPeriod::Quarterly)
                .await,
        )?;
    }
    if inputs.moving_averages {
        market.moving_averages = optional(symbol, ctx.fetcher.moving_averages(symbol).await)?;
    }

    let frame = strategy.compute(&series, &market)?;
    let decision = strategy.classify(&frame, &market);
    let metrics = strategy.metrics(&frame, &market);
    let verdict = SignalVerdict::new(symbol, &listing.name, decision, metrics);
    debug!(symbol, buy = verdict.buy, sell = verdict.sell, "classified");

    if !verdict.is_flagged() {
        return Ok(Outcome::Classified {
            verdict,
            pending: None,
        });
    }

    info!(symbol, " -- {}", verdict.label());
    let pending = match ctx.notify {
        NotifyMode::Immediate => {
            deliver_now(ctx, &verdict, &frame).await;
            None
        }
        NotifyMode::Deferred => Some(PendingNotification {
            chart: render_for_later(ctx, &verdict, &frame).await,
            verdict: verdict.clone(),
        }),
    };
    Ok(Outcome::Classified { verdict, pending })
}

/// Supplementary data the classifier can do without.
fn optional<T>(symbol: &str, result: Result<T, FetchError>) -> Result<Option<T>, ScanError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e @ (FetchError::DataUnavailable(_) | FetchError::Malformed(_))) => {
            warn!(symbol, error = %e, "supplementary data unavailable");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn chart_title(verdict: &SignalVerdict) -> String {
    format!("{} - {}", verdict.symbol, verdict.name)
}

/// Renders the chart to a temporary file, sends, and removes the file
/// whichever way the send goes. Delivery failures are logged, the verdict
/// stands.
async fn deliver_now(ctx: &ScanContext, verdict: &SignalVerdict, frame: &IndicatorFrame) {
    let message = format_verdict_message(verdict, &ctx.quote_url);
    let chart = match render_temp_chart(ctx, verdict, frame).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(symbol = %verdict.symbol, "chart rendering failed: {:#}", e);
            None
        }
    };
    let attachment = chart.as_ref().map(|f| f.path());
    if let Err(e) = ctx.notifier.send(&message, attachment).await {
        error!(symbol = %verdict.symbol, "notification failed: {:#}", e);
    }
    // `chart` drops here and the file with it.
}

async fn render_temp_chart(
    ctx: &ScanContext,
    verdict: &SignalVerdict,
    frame: &IndicatorFrame,
) -> Result<tempfile::NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix(&format!("{}-", verdict.symbol))
        .suffix(&format!(".{}", ctx.renderer.extension()))
        .tempfile()?;
    ctx.renderer
        .render(
            &chart_title(verdict),
            &frame.bars,
            &ctx.strategy.overlays(frame),
            file.path(),
        )
        .await?;
    Ok(file)
}

async fn render_for_later(
    ctx: &ScanContext,
    verdict: &SignalVerdict,
    frame: &IndicatorFrame,
) -> Option<PathBuf> {
    let dir = ctx.storage.path("charts");
    let path = dir.join(format!("{}.{}", verdict.symbol, ctx.renderer.extension()));
    let rendered = async {
        tokio::fs::create_dir_all(&dir).await?;
        ctx.renderer
            .render(
                &chart_title(verdict),
                &frame.bars,
                &ctx.strategy.overlays(frame),
                &path,
            )
            .await
    };
    match rendered.await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(symbol = %verdict.symbol, "chart rendering failed: {:#}", e);
            None
        }
    }
}

/// Second half of the two-phase schedule: sends what the last scan queued,
/// then clears the queue and its charts. Returns the number of messages sent.
pub async fn run_notify_phase(
    storage: &AsyncStorageManager,
    notifier: &dyn Notifier,
    strategy: &str,
    quote_url: &str,
    today: NaiveDate,
) -> Result<usize> {
    if !is_trading_day(today) {
        info!(%today, "not a trading day, queued verdicts kept");
        return Ok(0);
    }
    if !tokio::fs::try_exists(storage.path(&format!("{FLAGGED_FILE}.json"))).await? {
        info!("no queued verdicts");
        return Ok(0);
    }
    let pending: Vec<PendingNotification> = storage.load(FLAGGED_FILE).await?;

    let mut sent = 0;
    for item in &pending {
        let message = format_verdict_message(&item.verdict, quote_url);
        let attachment = item.chart.as_deref().filter(|p| p.exists());
        match notifier.send(&message, attachment).await {
            Ok(()) => sent += 1,
            Err(e) => error!(symbol = %item.verdict.symbol, "notification failed: {:#}", e),
        }
        if let Some(chart) = &item.chart {
            remove_chart(chart).await;
        }
    }

    let verdicts: Vec<SignalVerdict> = pending.into_iter().map(|p| p.verdict).collect();
    if let Err(e) = notifier
        .send(&format_summary_message(strategy, &verdicts), None)
        .await
    {
        error!("summary notification failed: {:#}", e);
    }

    storage.remove(FLAGGED_FILE).await?;
    Ok(sent)
}

async fn remove_chart(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "could not remove chart: {}", e);
        }
    }
}
