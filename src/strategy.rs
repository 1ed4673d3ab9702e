use crate::models::{Bar, StrategySignal};
use crate::portfolio::PortfolioState;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Bars visible to a strategy on one simulated date: for every symbol,
/// only bars dated at or before that date. The engine builds these views;
/// strategies never see the future.
pub type AsOfData<'a> = HashMap<String, &'a [Bar]>;

pub trait Strategy {
    fn name(&self) -> &str;

    /// Called once before the first simulated date.
    fn initialize(&mut self, symbols: &[String], start: NaiveDate, end: NaiveDate) -> Result<()>;

    /// Called once per simulated date, before signal generation.
    fn update_state(
        &mut self,
        as_of: &AsOfData,
        date: NaiveDate,
        portfolio: &PortfolioState,
    ) -> Result<()>;

    /// Called once per simulated date, after `update_state`.
    fn generate_signals(
        &self,
        as_of: &AsOfData,
        date: NaiveDate,
        portfolio: &PortfolioState,
    ) -> Vec<StrategySignal>;

    /// Date of the last `update_state` call, used by the validator's smoke
    /// test to confirm internal state actually advances.
    fn last_update(&self) -> Option<NaiveDate> {
        None
    }

    /// Minimum bars of history needed before signals become meaningful.
    fn min_data_points(&self) -> usize;
}

#[path = "strategies/ma_crossover.rs"]
pub mod ma_crossover;

pub use ma_crossover::MaCrossoverStrategy;

#[path = "strategies/mean_reversion.rs"]
pub mod mean_reversion;

pub use mean_reversion::MeanReversionStrategy;

#[path = "strategies/buy_and_hold.rs"]
pub mod buy_and_hold;

pub use buy_and_hold::BuyAndHoldStrategy;

pub fn create_strategy(
    name: &str,
    parameters: HashMap<String, f64>,
) -> Result<Box<dyn Strategy + Send + Sync>> {
    match name {
        "ma_crossover" => Ok(Box::new(MaCrossoverStrategy::new(parameters))),
        "mean_reversion" => Ok(Box::new(MeanReversionStrategy::new(parameters))),
        "buy_and_hold" => Ok(Box::new(BuyAndHoldStrategy::new(parameters))),
        _ => Err(anyhow::anyhow!("Unknown strategy: {}", name)),
    }
}
