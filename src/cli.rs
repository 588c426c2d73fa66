use crate::analysis::ExecutionMode;
use crate::scheduler::Phase;
use crate::storage_utils::AppConfig;
use crate::strategy::{MacdRsiConfig, StrategyConfig, SuperTrendConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily buy/sell signal screener")]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    pub debug: bool,

    /// Scan this symbol only (implies --once)
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Run one scan now instead of waiting for the daily trigger
    #[arg(long)]
    pub once: bool,

    /// Process symbols one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Symbols processed concurrently (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Strategy preset, replacing the configured one
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Storage directory; defaults to `storage` next to the binary
    #[arg(long, value_name = "DIR")]
    pub storage: Option<PathBuf>,

    /// With --once, run only this half of the two-phase schedule
    #[arg(long, value_enum)]
    pub phase: Option<PhaseArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MacdRsi,
    SuperTrend,
    SuperTrendTriple,
}

impl StrategyKind {
    pub fn config(self) -> StrategyConfig {
        match self {
            StrategyKind::MacdRsi => StrategyConfig::MacdRsi(MacdRsiConfig::default()),
            StrategyKind::SuperTrend => StrategyConfig::SuperTrend(SuperTrendConfig::default()),
            StrategyKind::SuperTrendTriple => {
                StrategyConfig::SuperTrend(SuperTrendConfig::triple())
            }
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseArg {
    Scan,
    Notify,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Scan => Phase::Scan,
            PhaseArg::Notify => Phase::Notify,
        }
    }
}

impl Cli {
    pub fn run_once(&self) -> bool {
        self.once || self.symbol.is_some()
    }

    pub fn execution_mode(&self, config: &AppConfig) -> ExecutionMode {
        if let Some(symbol) = &self.symbol {
            ExecutionMode::Single(symbol.clone())
        } else if self.sequential {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Pooled(config.workers)
        }
    }

    /// Command-line flags win over config.json.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(kind) = self.strategy {
            config.strategy = kind.config();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_selects_single_mode() {
        let cli = Cli::parse_from(["signal-screener", "--symbol", "7203", "--sequential"]);
        assert!(cli.run_once());
        assert_eq!(
            cli.execution_mode(&AppConfig::default()),
            ExecutionMode::Single("7203".into())
        );
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "signal-screener",
            "--workers",
            "8",
            "--strategy",
            "super-trend-triple",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.workers, 8);
        assert_eq!(config.strategy, StrategyConfig::SuperTrend(SuperTrendConfig::triple()));
        assert_eq!(cli.execution_mode(&config), ExecutionMode::Pooled(8));
        assert!(!cli.run_once());
    }
}
