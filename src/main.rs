use anyhow::Context;
use chrono::Local;
use clap::Parser;
use signal_screener::analysis::{self, NotifyMode, ScanContext};
use signal_screener::chart::SvgChartRenderer;
use signal_screener::cli::Cli;
use signal_screener::data_fetch::DataFetcher;
use signal_screener::notifier::{HttpNotifier, LogNotifier, Notifier};
use signal_screener::retry::RetryPolicy;
use signal_screener::scheduler::{self, Phase, ScheduleMode};
use signal_screener::storage_utils::{AppConfig, AsyncStorageManager};
use signal_screener::yahoo::YahooFinanceProvider;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const TOKEN_VAR: &str = "SCREENER_NOTIFY_TOKEN";

fn init_logging(debug: bool, log_file: Option<std::fs::File>) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Step 1: Environment, flags and config
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let storage = match &cli.storage {
        Some(dir) => AsyncStorageManager::new(dir).await?,
        None => AsyncStorageManager::new_relative("storage").await?,
    };
    let mut config: AppConfig = storage.load_or_init("config").await?;
    cli.apply(&mut config);
    if let Ok(token) = std::env::var(TOKEN_VAR) {
        config.notifier.token = token;
    }

    // Step 2: Logging
    let log_file = match &config.log_file {
        Some(name) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(storage.path(name))
                .with_context(|| format!("opening log file {name}"))?,
        ),
        None => None,
    };
    init_logging(cli.debug, log_file);
    info!(storage = %storage.base_dir.display(), "starting");

    // Step 3: Collaborators
    let storage = Arc::new(storage);
    let provider = YahooFinanceProvider::new(config.provider.clone(), storage.base_dir.clone())?;
    let fetcher = DataFetcher::new(Arc::new(provider), RetryPolicy::from(config.retry));

    let notifier: Arc<dyn Notifier> = if config.notifier.enabled {
        if config.notifier.token.is_empty() {
            warn!("notifier enabled without a token; set {}", TOKEN_VAR);
        }
        Arc::new(HttpNotifier::new(config.notifier.clone())?)
    } else {
        Arc::new(LogNotifier)
    };

    let notify = match config.schedule.mode {
        ScheduleMode::SinglePhase => NotifyMode::Immediate,
        ScheduleMode::TwoPhase => NotifyMode::Deferred,
    };
    let ctx = Arc::new(ScanContext {
        fetcher,
        strategy: config.strategy.build(),
        renderer: Arc::new(SvgChartRenderer::new(config.chart_days)),
        notifier: notifier.clone(),
        storage: storage.clone(),
        market: config.market.clone(),
        lookback_days: config.lookback_days,
        quote_url: config.notifier.quote_url.clone(),
        notify,
    });
    let mode = cli.execution_mode(&config);

    let run_phase = |phase: Phase| {
        let ctx = ctx.clone();
        let mode = mode.clone();
        async move {
            match phase {
                Phase::Scan => {
                    analysis::run_scan(ctx, mode, Local::now().date_naive()).await?;
                }
                Phase::Notify => {
                    let sent = analysis::run_notify_phase(
                        &ctx.storage,
                        ctx.notifier.as_ref(),
                        ctx.strategy.name(),
                        &ctx.quote_url,
                        Local::now().date_naive(),
                    )
                    .await?;
                    info!("{} notifications sent", sent);
                }
            }
            anyhow::Ok(())
        }
    };

    // Step 4: Run now or wait for the daily trigger
    if cli.run_once() {
        match cli.phase.map(Phase::from) {
            Some(phase) => run_phase(phase).await?,
            None => {
                run_phase(Phase::Scan).await?;
                if notify == NotifyMode::Deferred {
                    run_phase(Phase::Notify).await?;
                }
            }
        }
        return Ok(());
    }

    scheduler::run_daily(&config.schedule, run_phase).await
}
