use crate::strategy::{Decision, Metrics};
use serde::{Deserialize, Serialize};

/// Outcome of classifying one symbol in one scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignalVerdict {
    pub symbol: String,
    pub name: String,
    pub buy: bool,
    pub sell: bool,
    pub metrics: Metrics,
}

impl SignalVerdict {
    pub fn new(symbol: &str, name: &str, decision: Decision, metrics: Metrics) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            buy: decision.buy,
            sell: decision.sell,
            metrics,
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.buy || self.sell
    }

    pub fn label(&self) -> &'static str {
        match (self.buy, self.sell) {
            (true, true) => "BUY/SELL",
            (true, false) => "BUY",
            (false, true) => "SELL",
            (false, false) => "-",
        }
    }
}
