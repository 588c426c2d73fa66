// =============================================================================
// Relative Strength Index (simple rolling mean)
// =============================================================================
//
//   diff_i = close_i - close_{i-1}
//   up_i   = max(diff_i, 0),  down_i = max(-diff_i, 0)
//   RSI_w  = SMA(up, w) / (SMA(up, w) + SMA(down, w)) * 100
//
// Plain trailing means, not Wilder smoothing. RSI_w is undefined before
// index w and wherever the window saw no movement at all.
// =============================================================================

use super::ensure_len;
use crate::error::IndicatorError;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

// Below this the rolling sums are float residue from values leaving the window.
const FLAT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct RsiColumns {
    pub short_window: usize,
    pub long_window: usize,
    pub short: Vec<Option<f64>>,
    pub long: Vec<Option<f64>>,
}

pub fn compute_rsi(
    closes: &[f64],
    short_window: usize,
    long_window: usize,
) -> Result<RsiColumns, IndicatorError> {
    ensure_len(closes.len(), short_window.max(long_window) + 1)?;
    Ok(RsiColumns {
        short_window,
        long_window,
        short: rsi_column(closes, short_window)?,
        long: rsi_column(closes, long_window)?,
    })
}

fn rsi_column(closes: &[f64], window: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let mut up_sma = SimpleMovingAverage::new(window)
        .map_err(|e| IndicatorError::InvalidParameter(format!("RSI window {window}: {e:?}")))?;
    let mut down_sma = SimpleMovingAverage::new(window)
        .map_err(|e| IndicatorError::InvalidParameter(format!("RSI window {window}: {e:?}")))?;

    let mut out = Vec::with_capacity(closes.len());
    out.push(None);

    for (i, pair) in closes.windows(2).enumerate() {
        let diff = pair[1] - pair[0];
        let up = up_sma.next(diff.max(0.0));
        let down = down_sma.next((-diff).max(0.0));

        // `i + 1` diffs seen so far; the SMA only spans a full window after `window` of them.
        if i + 1 < window {
            out.push(None);
            continue;
        }
        let total = up + down;
        out.push(if total > FLAT_EPSILON {
            Some(up / total * 100.0)
        } else {
            None
        });
    }

    Ok(out)
}
