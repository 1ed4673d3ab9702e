use crate::indicators;
use crate::models::{SignalDirection, StrategySignal};
use crate::param_utils::{get_param_f64_clamped, get_usize_param_min};
use crate::portfolio::PortfolioState;
use crate::strategy::AsOfData;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Classic dual moving average crossover: buy when the fast SMA crosses
/// above the slow SMA, exit the full position when it crosses back below.
pub struct MaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
    position_size_pct: f64,
    // (fast, slow) per symbol from the previous and current update.
    prev_mas: HashMap<String, (f64, f64)>,
    current_mas: HashMap<String, (f64, f64)>,
    last_update: Option<NaiveDate>,
}

impl MaCrossoverStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let fast_period = get_usize_param_min(&parameters, "fastPeriod", 10, 1);
        let slow_period = get_usize_param_min(&parameters, "slowPeriod", 30, 2);
        let position_size_pct =
            get_param_f64_clamped(&parameters, "positionSizePct", 0.1, 0.01, 1.0);
        Self {
            fast_period,
            slow_period: slow_period.max(fast_period + 1),
            position_size_pct,
            prev_mas: HashMap::new(),
            current_mas: HashMap::new(),
            last_update: None,
        }
    }

    fn sized_quantity(&self, portfolio: &PortfolioState, price: Decimal) -> Option<Decimal> {
        let budget = portfolio.total_value
            * Decimal::from_f64(self.position_size_pct).unwrap_or(Decimal::ZERO);
        if price <= Decimal::ZERO {
            return None;
        }
        let quantity = (budget / price).floor();
        (quantity > Decimal::ZERO).then_some(quantity)
    }
}

impl super::Strategy for MaCrossoverStrategy {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn initialize(&mut self, _symbols: &[String], _start: NaiveDate, _end: NaiveDate) -> Result<()> {
        self.prev_mas.clear();
        self.current_mas.clear();
        self.last_update = None;
        Ok(())
    }

    fn update_state(
        &mut self,
        as_of: &AsOfData,
        date: NaiveDate,
        _portfolio: &PortfolioState,
    ) -> Result<()> {
        self.prev_mas = std::mem::take(&mut self.current_mas);
        for (symbol, bars) in as_of {
            let last = match bars.len().checked_sub(1) {
                Some(last) => last,
                None => continue,
            };
            if let (Some(fast), Some(slow)) = (
                indicators::sma_at(bars, self.fast_period, last),
                indicators::sma_at(bars, self.slow_period, last),
            ) {
                self.current_mas.insert(symbol.clone(), (fast, slow));
            }
        }
        self.last_update = Some(date);
        Ok(())
    }

    fn generate_signals(
        &self,
        as_of: &AsOfData,
        date: NaiveDate,
        portfolio: &PortfolioState,
    ) -> Vec<StrategySignal> {
        let mut signals = Vec::new();
        let mut symbols: Vec<&String> = self.current_mas.keys().collect();
        symbols.sort();

        for symbol in symbols {
            let (fast, slow) = self.current_mas[symbol];
            let (prev_fast, prev_slow) = match self.prev_mas.get(symbol) {
                Some(&pair) => pair,
                None => continue,
            };
            let close = match as_of.get(symbol).and_then(|bars| bars.last()) {
                Some(bar) => bar.close,
                None => continue,
            };
            let held = portfolio.held_quantity(symbol);

            let crossed_up = prev_fast <= prev_slow && fast > slow;
            let crossed_down = prev_fast >= prev_slow && fast < slow;

            if crossed_up && held <= Decimal::ZERO {
                if let Some(quantity) = self.sized_quantity(portfolio, close) {
                    signals.push(
                        StrategySignal::market(symbol, date, SignalDirection::Buy, close)
                            .with_quantity(quantity)
                            .with_reason("fast MA crossed above slow MA"),
                    );
                }
            } else if crossed_down && held > Decimal::ZERO {
                signals.push(
                    StrategySignal::market(symbol, date, SignalDirection::Sell, close)
                        .with_quantity(held)
                        .with_reason("fast MA crossed below slow MA"),
                );
            }
        }

        signals
    }

    fn last_update(&self) -> Option<NaiveDate> {
        self.last_update
    }

    fn min_data_points(&self) -> usize {
        self.slow_period + 1
    }
}
