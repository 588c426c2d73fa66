//! SuperTrend direction flip filtered by the long-term EMA.
//!
//! Buy when every configured SuperTrend turns from down to up on the last
//! bar and the close sits above EMA-200; sell on the opposite flip with the
//! close below EMA-200.

use super::{Decision, Inputs, MarketContext, Metrics, Strategy};
use crate::chart::{Overlay, Panel};
use crate::error::IndicatorError;
use crate::filter_utils::LiquidityFilter;
use crate::indicators::{
    Direction, IndicatorFrame, SuperTrendParams, compute_supertrend, ensure_len, latest_ema,
};
use crate::market_data::PriceSeries;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SuperTrendConfig {
    /// All of these must flip together.
    pub params: Vec<SuperTrendParams>,
    pub ema_period: u32,
    pub filter: LiquidityFilter,
}

impl Default for SuperTrendConfig {
    fn default() -> Self {
        Self {
            params: vec![SuperTrendParams::new(10, 3.0)],
            ema_period: 200,
            filter: LiquidityFilter {
                min_price: 1000.0,
                max_price: 7000.0,
                min_volume: 100_000.0,
            },
        }
    }
}

impl SuperTrendConfig {
    /// Conjunction of three SuperTrends with increasing length and width.
    pub fn triple() -> Self {
        Self {
            params: vec![
                SuperTrendParams::new(10, 1.0),
                SuperTrendParams::new(11, 2.0),
                SuperTrendParams::new(12, 3.0),
            ],
            ..Self::default()
        }
    }
}

pub struct SuperTrendStrategy {
    config: SuperTrendConfig,
}

impl SuperTrendStrategy {
    pub fn new(config: SuperTrendConfig) -> Self {
        Self { config }
    }

    fn flipped(&self, frame: &IndicatorFrame, from: Direction, to: Direction) -> bool {
        if self.config.params.is_empty() {
            return false;
        }
        self.config.params.iter().all(|params| {
            let Some(st) = frame.supertrend_for(*params) else {
                return false;
            };
            let n = st.direction.len();
            n >= 2 && st.direction[n - 2] == Some(from) && st.direction[n - 1] == Some(to)
        })
    }
}

impl Strategy for SuperTrendStrategy {
    fn name(&self) -> &'static str {
        "supertrend"
    }

    fn filter(&self) -> &LiquidityFilter {
        &self.config.filter
    }

    fn inputs(&self) -> Inputs {
        Inputs {
            financials: false,
            moving_averages: true,
        }
    }

    fn warm_up(&self) -> usize {
        // ATR appears at index `length`; a flip needs two defined bars.
        self.config
            .params
            .iter()
            .map(|p| p.length + 2)
            .max()
            .unwrap_or(2)
    }

    fn compute(
        &self,
        series: &PriceSeries,
        ctx: &MarketContext,
    ) -> Result<IndicatorFrame, IndicatorError> {
        ensure_len(series.len(), self.warm_up())?;
        let mut frame = IndicatorFrame::new(series.bars());
        for params in &self.config.params {
            frame.supertrend.push(compute_supertrend(series.bars(), *params)?);
        }

        let provided = ctx
            .moving_averages
            .as_ref()
            .and_then(|table| table.get(&self.config.ema_period).copied());
        frame.ema200 = match provided {
            Some(value) => Some(value),
            None => {
                debug!(
                    symbol = series.symbol(),
                    period = self.config.ema_period,
                    "moving average missing from provider, computing locally"
                );
                Some(latest_ema(&series.closes(), self.config.ema_period as usize)?)
            }
        };
        Ok(frame)
    }

    fn classify(&self, frame: &IndicatorFrame, _ctx: &MarketContext) -> Decision {
        let (Some(ema), Some(bar)) = (frame.ema200, frame.last_bar()) else {
            return Decision::default();
        };
        Decision {
            buy: self.flipped(frame, Direction::Down, Direction::Up) && ema < bar.close,
            sell: self.flipped(frame, Direction::Up, Direction::Down) && ema > bar.close,
        }
    }

    fn metrics(&self, frame: &IndicatorFrame, _ctx: &MarketContext) -> Metrics {
        let mut metrics = Metrics::new();
        if let Some(bar) = frame.last_bar() {
            metrics.insert("Open".into(), bar.open.into());
            metrics.insert("Close".into(), bar.close.into());
            metrics.insert("High".into(), bar.high.into());
            metrics.insert("Low".into(), bar.low.into());
        }
        metrics.insert(format!("EMA{}", self.config.ema_period), frame.ema200.into());
        for st in &frame.supertrend {
            let value = st.trend.last().copied().flatten();
            metrics.insert(format!("SUPERT_{}", st.params), value.into());
        }
        metrics
    }

    fn overlays(&self, frame: &IndicatorFrame) -> Vec<Overlay> {
        frame
            .supertrend
            .iter()
            .flat_map(|st| {
                [
                    Overlay {
                        label: format!("SUPERTl_{}", st.params),
                        color: "#2ca02c".into(),
                        panel: Panel::Price,
                        values: st.long_line(),
                    },
                    Overlay {
                        label: format!("SUPERTs_{}", st.params),
                        color: "#d62728".into(),
                        panel: Panel::Price,
                        values: st.short_line(),
                    },
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::SuperTrendColumns;
    use crate::market_data::{CompanyInfo, MovingAverages, PriceBar};
    use chrono::{Duration, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 200_000.0,
            })
            .collect()
    }

    fn ctx(ema200: Option<f64>) -> MarketContext {
        let mut ctx = MarketContext::new(CompanyInfo {
            previous_close: 1500.0,
            volume: 200_000.0,
            todays_range: String::new(),
            next_earnings_date: None,
            shares_outstanding: 1_000_000.0,
        });
        ctx.moving_averages = ema200.map(|v| MovingAverages::from([(200, v)]));
        ctx
    }

    fn columns(params: SuperTrendParams, tail: [Direction; 2]) -> SuperTrendColumns {
        let mut direction = vec![None; 3];
        direction.extend(tail.map(Some));
        SuperTrendColumns {
            params,
            direction,
            trend: vec![None; 5],
            upper: vec![None; 5],
            lower: vec![None; 5],
        }
    }

    fn frame(close: f64, ema: f64, cols: Vec<SuperTrendColumns>) -> IndicatorFrame {
        let mut frame = IndicatorFrame::new(&bars(&[close; 5]));
        frame.supertrend = cols;
        frame.ema200 = Some(ema);
        frame
    }

    #[test]
    fn single_flip_up_above_ema_buys() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::default());
        let f = frame(
            1500.0,
            1400.0,
            vec![columns(SuperTrendParams::new(10, 3.0), [Direction::Down, Direction::Up])],
        );
        assert_eq!(
            s.classify(&f, &ctx(None)),
            Decision {
                buy: true,
                sell: false
            }
        );
    }

    #[test]
    fn flip_up_below_ema_does_not_buy() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::default());
        let f = frame(
            1500.0,
            1600.0,
            vec![columns(SuperTrendParams::new(10, 3.0), [Direction::Down, Direction::Up])],
        );
        assert_eq!(s.classify(&f, &ctx(None)), Decision::default());
    }

    #[test]
    fn flip_down_below_ema_sells() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::default());
        let f = frame(
            1500.0,
            1600.0,
            vec![columns(SuperTrendParams::new(10, 3.0), [Direction::Up, Direction::Down])],
        );
        assert!(s.classify(&f, &ctx(None)).sell);
    }

    #[test]
    fn triple_requires_every_configuration_to_flip() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::triple());
        let flip = [Direction::Down, Direction::Up];
        let all = vec![
            columns(SuperTrendParams::new(10, 1.0), flip),
            columns(SuperTrendParams::new(11, 2.0), flip),
            columns(SuperTrendParams::new(12, 3.0), flip),
        ];
        assert!(s.classify(&frame(1500.0, 1400.0, all.clone()), &ctx(None)).buy);

        for i in 0..3 {
            let mut cols = all.clone();
            cols[i] = columns(cols[i].params, [Direction::Up, Direction::Up]);
            assert!(
                !s.classify(&frame(1500.0, 1400.0, cols), &ctx(None)).buy,
                "configuration {i} did not flip"
            );
        }
    }

    #[test]
    fn flat_series_gives_no_signal() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::triple());
        let series = PriceSeries::new("7203", bars(&[1500.0; 30]));
        let c = ctx(Some(1500.0));
        let f = s.compute(&series, &c).unwrap();
        assert_eq!(f.ema200, Some(1500.0));
        assert_eq!(s.classify(&f, &c), Decision::default());
    }

    #[test]
    fn missing_provider_average_needs_local_history() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::default());
        let series = PriceSeries::new("7203", bars(&[1500.0; 30]));
        assert_eq!(
            s.compute(&series, &ctx(None)),
            Err(IndicatorError::InsufficientData {
                required: 200,
                actual: 30
            })
        );

        let long = PriceSeries::new("7203", bars(&[1500.0; 210]));
        let f = s.compute(&long, &ctx(None)).unwrap();
        assert!((f.ema200.unwrap() - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn warm_up_covers_longest_configuration() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::triple());
        assert_eq!(s.warm_up(), 14);
        let series = PriceSeries::new("7203", bars(&[1500.0; 13]));
        assert!(matches!(
            s.compute(&series, &ctx(Some(1.0))),
            Err(IndicatorError::InsufficientData { .. })
        ));
    }

    #[test]
    fn overlays_come_in_long_short_pairs() {
        let s = SuperTrendStrategy::new(SuperTrendConfig::triple());
        let series = PriceSeries::new("7203", bars(&[1500.0; 30]));
        let f = s.compute(&series, &ctx(Some(1500.0))).unwrap();
        let labels: Vec<String> = s.overlays(&f).into_iter().map(|o| o.label).collect();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], "SUPERTl_10_1.0");
        assert_eq!(labels[1], "SUPERTs_10_1.0");
    }
}
