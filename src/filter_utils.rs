use crate::market_data::CompanyInfo;
use serde::{Deserialize, Serialize};

/// Price band and volume floor a symbol must meet before its history is
/// fetched. Each strategy carries its own thresholds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LiquidityFilter {
    pub min_price: f64,
    pub max_price: f64,
    pub min_volume: f64,
}

/// Why a symbol was filtered out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    PriceBelow { price: f64, min: f64 },
    PriceAbove { price: f64, max: f64 },
    VolumeBelow { volume: f64, min: f64 },
}

impl LiquidityFilter {
    pub fn check(&self, info: &CompanyInfo) -> Result<(), Rejection> {
        let price = info.previous_close;
        // Case A: price outside the band
        if price.is_nan() || price < self.min_price {
            return Err(Rejection::PriceBelow {
                price,
                min: self.min_price,
            });
        }
        if price > self.max_price {
            return Err(Rejection::PriceAbove {
                price,
                max: self.max_price,
            });
        }
        // Case B: too thin to trade
        if info.volume.is_nan() || info.volume < self.min_volume {
            return Err(Rejection::VolumeBelow {
                volume: info.volume,
                min: self.min_volume,
            });
        }
        Ok(())
    }

    pub fn matches(&self, info: &CompanyInfo) -> bool {
        self.check(info).is_ok()
    }
}
