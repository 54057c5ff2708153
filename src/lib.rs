pub mod analyzer;
pub mod config;
pub mod determinism;
pub mod error;
pub mod expr;
pub mod factor;
pub mod filter;
pub mod handicap;
pub mod history;
pub mod profit;
pub mod record;
pub mod search;
pub mod staking;
pub mod synthetic;
