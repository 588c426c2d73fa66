//! MACD crossover confirmed by RSI extremes and book value.
//!
//! Sell: dead cross on the last bar, no golden cross in the lookback window,
//! MACD above zero, RSI_short peaked above the sell threshold in the window,
//! RSI_long above RSI_short, RSI_short above the midline, PBR above the sell
//! floor. Buy mirrors every condition.

use super::{Decision, Inputs, MarketContext, Metrics, MetricValue, Strategy, round2};
use crate::chart::{Overlay, Panel};
use crate::error::IndicatorError;
use crate::filter_utils::LiquidityFilter;
use crate::indicators::{Cross, IndicatorFrame, MacdParams, compute_macd, compute_rsi};
use crate::market_data::PriceSeries;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MacdRsiConfig {
    pub macd: MacdParams,
    pub rsi_short: usize,
    pub rsi_long: usize,
    /// Trailing bars (last one included) searched for opposite crosses and RSI extremes.
    pub lookback: usize,
    pub sell_rsi_peak: f64,
    pub buy_rsi_trough: f64,
    pub rsi_midline: f64,
    pub sell_min_pbr: f64,
    pub buy_max_pbr: f64,
    pub filter: LiquidityFilter,
}

impl Default for MacdRsiConfig {
    fn default() -> Self {
        Self {
            macd: MacdParams::default(),
            rsi_short: 9,
            rsi_long: 14,
            lookback: 9,
            sell_rsi_peak: 75.0,
            buy_rsi_trough: 25.0,
            rsi_midline: 50.0,
            sell_min_pbr: 1.5,
            buy_max_pbr: 5.0,
            filter: LiquidityFilter {
                min_price: 700.0,
                max_price: 7000.0,
                min_volume: 10_000.0,
            },
        }
    }
}

/// Individual conditions of one side of the rule. The side fires only when
/// all of them hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacdRsiChecks {
    pub cross_on_last_bar: bool,
    pub no_opposite_cross: bool,
    pub macd_side: bool,
    pub rsi_extreme: bool,
    pub rsi_order: bool,
    pub rsi_midline: bool,
    pub pbr: bool,
}

impl MacdRsiChecks {
    pub fn all(&self) -> bool {
        self.cross_on_last_bar
            && self.no_opposite_cross
            && self.macd_side
            && self.rsi_extreme
            && self.rsi_order
            && self.rsi_midline
            && self.pbr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

pub struct MacdRsiStrategy {
    config: MacdRsiConfig,
}

impl MacdRsiStrategy {
    pub fn new(config: MacdRsiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MacdRsiConfig {
        &self.config
    }

    pub fn sell_checks(&self, frame: &IndicatorFrame, pbr: Option<f64>) -> MacdRsiChecks {
        self.checks(frame, pbr, Side::Sell).unwrap_or_default()
    }

    pub fn buy_checks(&self, frame: &IndicatorFrame, pbr: Option<f64>) -> MacdRsiChecks {
        self.checks(frame, pbr, Side::Buy).unwrap_or_default()
    }

    fn checks(
        &self,
        frame: &IndicatorFrame,
        pbr: Option<f64>,
        side: Side,
    ) -> Option<MacdRsiChecks> {
        let macd = frame.macd.as_ref()?;
        let rsi = frame.rsi.as_ref()?;
        let n = macd.macd.len();
        if n == 0 || macd.signal.len() != n || rsi.short.len() != n || rsi.long.len() != n {
            return None;
        }
        let last = n - 1;
        let window = n.saturating_sub(self.config.lookback.max(1))..n;

        let crosses = macd.crosses();
        let (wanted, opposite) = match side {
            Side::Sell => (Cross::Dead, Cross::Golden),
            Side::Buy => (Cross::Golden, Cross::Dead),
        };

        let rsi_short_window = rsi.short[window.clone()].iter().flatten().copied();
        let rsi_extreme = match side {
            Side::Sell => rsi_short_window
                .reduce(f64::max)
                .is_some_and(|peak| peak > self.config.sell_rsi_peak),
            Side::Buy => rsi_short_window
                .reduce(f64::min)
                .is_some_and(|trough| trough < self.config.buy_rsi_trough),
        };

        let short_now = rsi.short[last];
        let long_now = rsi.long[last];
        let macd_now = macd.macd[last];

        let checks = match side {
            Side::Sell => MacdRsiChecks {
                cross_on_last_bar: crosses[last] == wanted,
                no_opposite_cross: !crosses[window].contains(&opposite),
                macd_side: macd_now > 0.0,
                rsi_extreme,
                rsi_order: matches!((long_now, short_now), (Some(l), Some(s)) if l > s),
                rsi_midline: short_now.is_some_and(|s| s > self.config.rsi_midline),
                pbr: pbr.is_some_and(|p| p > self.config.sell_min_pbr),
            },
            Side::Buy => MacdRsiChecks {
                cross_on_last_bar: crosses[last] == wanted,
                no_opposite_cross: !crosses[window].contains(&opposite),
                macd_side: macd_now < 0.0,
                rsi_extreme,
                rsi_order: matches!((long_now, short_now), (Some(l), Some(s)) if l < s),
                rsi_midline: short_now.is_some_and(|s| s < self.config.rsi_midline),
                pbr: pbr.is_some_and(|p| p < self.config.buy_max_pbr),
            },
        };
        Some(checks)
    }
}

impl Strategy for MacdRsiStrategy {
    fn name(&self) -> &'static str {
        "macd_rsi"
    }

    fn filter(&self) -> &LiquidityFilter {
        &self.config.filter
    }

    fn inputs(&self) -> Inputs {
        Inputs {
            financials: true,
            moving_averages: false,
        }
    }

    fn warm_up(&self) -> usize {
        let c = &self.config;
        (c.rsi_short.max(c.rsi_long) + 1)
            .max(c.macd.short.max(c.macd.long))
            .max(c.lookback + 1)
    }

    fn compute(
        &self,
        series: &PriceSeries,
        _ctx: &MarketContext,
    ) -> Result<IndicatorFrame, IndicatorError> {
        crate::indicators::ensure_len(series.len(), self.warm_up())?;
        let closes = series.closes();
        let mut frame = IndicatorFrame::new(series.bars());
        frame.rsi = Some(compute_rsi(&closes, self.config.rsi_short, self.config.rsi_long)?);
        frame.macd = Some(compute_macd(&closes, self.config.macd)?);
        Ok(frame)
    }

    fn classify(&self, frame: &IndicatorFrame, ctx: &MarketContext) -> Decision {
        let pbr = ctx.pbr();
        Decision {
            buy: self.buy_checks(frame, pbr).all(),
            sell: self.sell_checks(frame, pbr).all(),
        }
    }

    fn metrics(&self, frame: &IndicatorFrame, ctx: &MarketContext) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("Range".into(), ctx.info.todays_range.as_str().into());
        metrics.insert(
            "Earnings".into(),
            match ctx.info.next_earnings_date {
                Some(date) => MetricValue::Text(date.format("%Y/%m/%d").to_string()),
                None => MetricValue::Text("N/A".into()),
            },
        );
        metrics.insert("PBR".into(), ctx.pbr().map(round2).into());

        if let Some(bar) = frame.last_bar() {
            metrics.insert("Open".into(), bar.open.into());
            metrics.insert("Close".into(), bar.close.into());
            metrics.insert("High".into(), bar.high.into());
            metrics.insert("Low".into(), bar.low.into());
            metrics.insert("Volume".into(), bar.volume.into());
        }
        if let Some(rsi) = &frame.rsi {
            let short = rsi.short.last().copied().flatten().map(round2);
            let long = rsi.long.last().copied().flatten().map(round2);
            metrics.insert(format!("RSI_{}", rsi.short_window), short.into());
            metrics.insert(format!("RSI_{}", rsi.long_window), long.into());
        }
        if let Some(macd) = &frame.macd {
            metrics.insert("MACD".into(), macd.macd.last().copied().map(round2).into());
            metrics.insert("Signal".into(), macd.signal.last().copied().map(round2).into());
        }
        metrics
    }

    fn overlays(&self, frame: &IndicatorFrame) -> Vec<Overlay> {
        let Some(macd) = &frame.macd else {
            return Vec::new();
        };
        vec![
            Overlay {
                label: "MACD".into(),
                color: "#d62728".into(),
                panel: Panel::Lower,
                values: macd.macd.iter().copied().map(Some).collect(),
            },
            Overlay {
                label: "Signal".into(),
                color: "#2ca02c".into(),
                panel: Panel::Lower,
                values: macd.signal.iter().copied().map(Some).collect(),
            },
        ]
    }
}
