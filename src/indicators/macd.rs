// =============================================================================
// MACD
// =============================================================================
//
//   MACD   = EMA(close, short) - EMA(close, long)
//   Signal = EMA(MACD, signal)
//
// Both EMAs use the adjusted weighting from `ema.rs`.
// =============================================================================

use super::ema::ema_series;
use super::ensure_len;
use crate::error::IndicatorError;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdParams {
    pub short: usize,
    pub long: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            short: 6,
            long: 19,
            signal: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdColumns {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

/// Crossing of the MACD line through its signal line at one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    None,
    /// MACD moved above the signal line.
    Golden,
    /// MACD moved below the signal line.
    Dead,
}

pub fn compute_macd(closes: &[f64], params: MacdParams) -> Result<MacdColumns, IndicatorError> {
    ensure_len(closes.len(), params.short.max(params.long))?;
    let short = ema_series(closes, params.short)?;
    let long = ema_series(closes, params.long)?;
    let macd: Vec<f64> = short.iter().zip(&long).map(|(s, l)| s - l).collect();
    let signal = ema_series(&macd, params.signal)?;
    Ok(MacdColumns { macd, signal })
}

impl MacdColumns {
    /// Cross state per bar. The first bar has nothing to cross from.
    pub fn crosses(&self) -> Vec<Cross> {
        let above: Vec<bool> = self
            .macd
            .iter()
            .zip(&self.signal)
            .map(|(m, s)| m > s)
            .collect();

        let mut out = Vec::with_capacity(above.len());
        if !above.is_empty() {
            out.push(Cross::None);
        }
        for pair in above.windows(2) {
            out.push(match (pair[0], pair[1]) {
                (false, true) => Cross::Golden,
                (true, false) => Cross::Dead,
                _ => Cross::None,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising_series() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 100.0 } else { 99.0 }).collect();
        closes.extend([110.0, 120.0, 130.0, 140.0, 150.0]);
        closes.extend([150.0; 5]);
        closes
    }

    #[test]
    fn rejects_series_shorter_than_long_span() {
        let closes = vec![100.0; 18];
        assert_eq!(
            compute_macd(&closes, MacdParams::default()),
            Err(IndicatorError::InsufficientData {
                required: 19,
                actual: 18
            })
        );
    }

    #[test]
    fn matches_hand_computed_values() {
        let cols = compute_macd(&rising_series(), MacdParams::default()).unwrap();
        assert_eq!(cols.macd.len(), 20);
        assert!((cols.macd[1] - -0.05701754385964364).abs() < 1e-6);
        assert!((cols.signal[1] - -0.031676413255357576).abs() < 1e-6);
        assert!((cols.macd[19] - 14.24276321005658).abs() < 1e-6);
        assert!((cols.signal[19] - 12.111839578119524).abs() < 1e-6);
        assert!(cols.macd[19] > 0.0);
    }

    #[test]
    fn golden_cross_when_rally_starts() {
        let cols = compute_macd(&rising_series(), MacdParams::default()).unwrap();
        let crosses = cols.crosses();
        assert_eq!(crosses[0], Cross::None);
        assert_eq!(crosses[10], Cross::Golden);
        assert_eq!(crosses[19], Cross::None);
    }

    #[test]
    fn golden_and_dead_never_coincide() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + ((i as f64) / 3.0).sin() * 10.0).collect();
        let crosses = compute_macd(&closes, MacdParams::default()).unwrap().crosses();
        assert_eq!(crosses.len(), closes.len());
        let golden = crosses.iter().filter(|c| **c == Cross::Golden).count();
        let dead = crosses.iter().filter(|c| **c == Cross::Dead).count();
        assert!(golden > 0 && dead > 0);
        // Alternation follows from the sign sequence; two golden crosses in a row are impossible.
        let mut last = Cross::None;
        for c in crosses.into_iter().filter(|c| *c != Cross::None) {
            assert_ne!(c, last);
            last = c;
        }
    }

    #[test]
    fn flat_series_never_crosses() {
        let cols = compute_macd(&[1200.0; 30], MacdParams::default()).unwrap();
        assert!(cols.crosses().iter().all(|c| *c == Cross::None));
        assert!(cols.macd.iter().all(|m| m.abs() < 1e-9));
    }
}
