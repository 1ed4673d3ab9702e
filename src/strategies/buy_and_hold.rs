use crate::models::{SignalDirection, StrategySignal};
use crate::portfolio::PortfolioState;
use crate::strategy::AsOfData;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Buys every symbol once on its first available bar and never sells.
/// Mostly useful as a benchmark.
pub struct BuyAndHoldStrategy {
    last_update: Option<NaiveDate>,
}

impl BuyAndHoldStrategy {
    pub fn new(_parameters: HashMap<String, f64>) -> Self {
        Self { last_update: None }
    }
}

impl super::Strategy for BuyAndHoldStrategy {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn initialize(&mut self, _symbols: &[String], _start: NaiveDate, _end: NaiveDate) -> Result<()> {
        self.last_update = None;
        Ok(())
    }

    fn update_state(
        &mut self,
        _as_of: &AsOfData,
        date: NaiveDate,
        _portfolio: &PortfolioState,
    ) -> Result<()> {
        self.last_update = Some(date);
        Ok(())
    }

    fn generate_signals(
        &self,
        as_of: &AsOfData,
        date: NaiveDate,
        portfolio: &PortfolioState,
    ) -> Vec<StrategySignal> {
        let mut symbols: Vec<&String> = as_of.keys().collect();
        symbols.sort();

        symbols
            .into_iter()
            .filter(|symbol| portfolio.held_quantity(symbol) <= Decimal::ZERO)
            .filter_map(|symbol| {
                let close = as_of.get(symbol).and_then(|bars| bars.last())?.close;
                // Quantity left unset so the simulator applies default sizing.
                Some(
                    StrategySignal::market(symbol, date, SignalDirection::Buy, close)
                        .with_reason("initial buy and hold entry"),
                )
            })
            .collect()
    }

    fn last_update(&self) -> Option<NaiveDate> {
        self.last_update
    }

    fn min_data_points(&self) -> usize {
        1
    }
}
