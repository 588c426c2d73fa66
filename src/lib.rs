//! Daily technical screener: scans a market's listed symbols, classifies
//! each with a buy/sell strategy and notifies about the flagged ones.

pub mod analysis;
pub mod chart;
pub mod cli;
pub mod comfy_table;
pub mod data_fetch;
pub mod error;
pub mod filter_utils;
pub mod find_tickers;
pub mod indicators;
pub mod market_data;
pub mod notifier;
pub mod retry;
pub mod scheduler;
pub mod storage_utils;
pub mod strategy;
pub mod verdict;
pub mod yahoo;
