// =============================================================================
// SuperTrend
// =============================================================================
//
//   ATR     = RMA(true range, length), alpha = 1 / length
//   upper   = (high + low) / 2 + multiplier * ATR
//   lower   = (high + low) / 2 - multiplier * ATR
//
// One forward pass. At bar i the direction turns up when the close breaks
// the finalized upper band of bar i-1, turns down when it breaks the
// finalized lower band, and otherwise keeps its previous value while the
// active band ratchets: the lower band never falls during an up trend and
// the upper band never rises during a down trend.
//
// True range is undefined on the first bar, so ATR (and everything derived
// from it) first appears at index `length`.
// =============================================================================

use super::ema::AdjustedEma;
use super::ensure_len;
use crate::error::IndicatorError;
use crate::market_data::PriceBar;
use serde::{Deserialize, Serialize};
use std::fmt;
use ta::Next;
use ta::indicators::TrueRange;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SuperTrendParams {
    pub length: usize,
    pub multiplier: f64,
}

impl SuperTrendParams {
    pub const fn new(length: usize, multiplier: f64) -> Self {
        Self { length, multiplier }
    }
}

impl fmt::Display for SuperTrendParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:.1}", self.length, self.multiplier)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_i8(self) -> i8 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperTrendColumns {
    pub params: SuperTrendParams,
    pub direction: Vec<Option<Direction>>,
    /// Active band: lower band in an up trend, upper band in a down trend.
    pub trend: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

impl SuperTrendColumns {
    /// Trend line while the direction is up, for plotting.
    pub fn long_line(&self) -> Vec<Option<f64>> {
        self.side(Direction::Up)
    }

    /// Trend line while the direction is down, for plotting.
    pub fn short_line(&self) -> Vec<Option<f64>> {
        self.side(Direction::Down)
    }

    fn side(&self, wanted: Direction) -> Vec<Option<f64>> {
        self.direction
            .iter()
            .zip(&self.trend)
            .map(|(dir, value)| match dir {
                Some(d) if *d == wanted => *value,
                _ => None,
            })
            .collect()
    }
}

pub fn compute_supertrend(
    bars: &[PriceBar],
    params: SuperTrendParams,
) -> Result<SuperTrendColumns, IndicatorError> {
    if params.length == 0 || !(params.multiplier.is_finite() && params.multiplier > 0.0) {
        return Err(IndicatorError::InvalidParameter(format!(
            "SuperTrend({params}) needs length > 0 and a positive multiplier"
        )));
    }
    ensure_len(bars.len(), params.length + 1)?;

    let n = bars.len();
    let mut true_range = TrueRange::new();
    let mut rma = AdjustedEma::with_length(params.length)?;

    let mut upper: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut lower: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut direction = Vec::with_capacity(n);
    let mut trend = Vec::with_capacity(n);

    let mut current = Direction::Up;
    let mut observed = 0usize;

    for (i, bar) in bars.iter().enumerate() {
        let tr = true_range.next(bar);

        let atr = if i == 0 {
            None
        } else {
            observed += 1;
            let value = rma.next(tr);
            (observed >= params.length).then_some(value)
        };

        let mid = (bar.high + bar.low) / 2.0;
        let mut up_band = atr.map(|a| mid + params.multiplier * a);
        let mut low_band = atr.map(|a| mid - params.multiplier * a);

        if i > 0 {
            let prev_upper = upper[i - 1];
            let prev_lower = lower[i - 1];

            if prev_upper.is_some_and(|u| bar.close > u) {
                current = Direction::Up;
            } else if prev_lower.is_some_and(|l| bar.close < l) {
                current = Direction::Down;
            } else {
                if current == Direction::Up {
                    if let (Some(now), Some(prev)) = (low_band, prev_lower) {
                        if now < prev {
                            low_band = Some(prev);
                        }
                    }
                }
                if current == Direction::Down {
                    if let (Some(now), Some(prev)) = (up_band, prev_upper) {
                        if now > prev {
                            up_band = Some(prev);
                        }
                    }
                }
            }
        }

        upper.push(up_band);
        lower.push(low_band);

        if atr.is_some() {
            direction.push(Some(current));
            trend.push(match current {
                Direction::Up => low_band,
                Direction::Down => up_band,
            });
        } else {
            direction.push(None);
            trend.push(None);
        }
    }

    Ok(SuperTrendColumns {
        params,
        direction,
        trend,
        upper,
        lower,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars_from_closes(closes: &[f64], spread: f64) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close + spread,
                low: close - spread,
                close,
                volume: 50_000.0,
            })
            .collect()
    }

    #[test]
    fn needs_length_plus_one_bars() {
        let bars = bars_from_closes(&[100.0; 10], 1.0);
        assert_eq!(
            compute_supertrend(&bars, SuperTrendParams::new(10, 3.0)),
            Err(IndicatorError::InsufficientData {
                required: 11,
                actual: 10
            })
        );
    }

    #[test]
    fn warm_up_is_undefined() {
        let bars = bars_from_closes(&[100.0; 15], 1.0);
        let st = compute_supertrend(&bars, SuperTrendParams::new(10, 3.0)).unwrap();
        assert!(st.direction[..10].iter().all(Option::is_none));
        assert!(st.direction[10..].iter().all(|d| *d == Some(Direction::Up)));
        assert_eq!(st.direction.len(), bars.len());
    }

    #[test]
    fn flat_prices_never_flip() {
        let bars = bars_from_closes(&[1500.0; 30], 0.0);
        let st = compute_supertrend(&bars, SuperTrendParams::new(10, 3.0)).unwrap();
        let defined: Vec<_> = st.direction.iter().flatten().collect();
        assert!(!defined.is_empty());
        assert!(defined.iter().all(|d| **d == Direction::Up));
    }

    #[test]
    fn crash_then_recovery_flips_both_ways() {
        let mut closes = vec![100.0; 15];
        closes.extend((1..=10).map(|i| 100.0 - 4.0 * i as f64));
        closes.extend((1..=12).map(|i| 60.0 + 6.0 * i as f64));
        let bars = bars_from_closes(&closes, 1.0);
        let st = compute_supertrend(&bars, SuperTrendParams::new(10, 1.0)).unwrap();

        let dirs: Vec<Direction> = st.direction.iter().flatten().copied().collect();
        let first_down = dirs.iter().position(|d| *d == Direction::Down);
        assert!(first_down.is_some(), "sell-off should turn the trend down");
        let back_up = dirs[first_down.unwrap()..]
            .iter()
            .any(|d| *d == Direction::Up);
        assert!(back_up, "recovery should turn the trend up again");
    }

    // length 2, multiplier 1, high/low = close +- 1.
    //   i=2: TR 2, 2        -> ATR 2,          bands 14 / 10, Up
    //   i=3: TR 2           -> ATR 2,          lower 9 held at 10
    //   i=4: close 8 < 10   -> TR 4, ATR 46/15, Down, trend = 8 + 46/15
    //   i=5: upper 9 + 78/31 would rise, held at 166/15
    //   i=6: close 13 > 166/15 -> Up, trend = 13 - 34/9
    #[test]
    fn matches_hand_computed_reference() {
        let closes = [10.0, 11.0, 12.0, 11.0, 8.0, 9.0, 13.0];
        let bars = bars_from_closes(&closes, 1.0);
        let st = compute_supertrend(&bars, SuperTrendParams::new(2, 1.0)).unwrap();

        use Direction::{Down, Up};
        assert_eq!(
            st.direction,
            vec![None, None, Some(Up), Some(Up), Some(Down), Some(Down), Some(Up)]
        );

        let expected = [10.0, 10.0, 166.0 / 15.0, 166.0 / 15.0, 83.0 / 9.0];
        for (i, want) in (2..).zip(expected) {
            let got = st.trend[i].unwrap();
            assert!((got - want).abs() < 1e-9, "trend[{i}] = {got}, want {want}");
        }
        assert_eq!(st.trend[..2], [None, None]);
        assert!((st.upper[4].unwrap() - 166.0 / 15.0).abs() < 1e-9);
        assert!((st.lower[4].unwrap() - 74.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn lower_band_ratchets_up_in_up_trend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes, 2.0);
        let st = compute_supertrend(&bars, SuperTrendParams::new(10, 3.0)).unwrap();
        let lows: Vec<f64> = st.lower.iter().flatten().copied().collect();
        assert!(lows.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn recomputation_is_deterministic() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 + ((i as f64) / 4.0).sin() * 15.0).collect();
        let bars = bars_from_closes(&closes, 1.5);
        let params = SuperTrendParams::new(11, 2.0);
        let first = compute_supertrend(&bars, params).unwrap();
        let _other = compute_supertrend(&bars_from_closes(&[10.0; 30], 0.5), params).unwrap();
        let second = compute_supertrend(&bars, params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn label_matches_column_naming() {
        assert_eq!(SuperTrendParams::new(10, 3.0).to_string(), "10_3.0");
    }

    #[test]
    fn rejects_bad_parameters() {
        let bars = bars_from_closes(&[100.0; 20], 1.0);
        assert!(matches!(
            compute_supertrend(&bars, SuperTrendParams::new(0, 3.0)),
            Err(IndicatorError::InvalidParameter(_))
        ));
        assert!(matches!(
            compute_supertrend(&bars, SuperTrendParams::new(10, -1.0)),
            Err(IndicatorError::InvalidParameter(_))
        ));
    }
}
