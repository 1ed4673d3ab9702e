use crate::indicators;
use crate::models::{SignalDirection, StrategySignal};
use crate::param_utils::{get_param_f64, get_param_f64_clamped, get_usize_param_min};
use crate::portfolio::PortfolioState;
use crate::strategy::AsOfData;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// RSI mean reversion: buy oversold symbols, exit when they become
/// overbought.
pub struct MeanReversionStrategy {
    period: usize,
    oversold_level: f64,
    overbought_level: f64,
    position_size_pct: f64,
    current_rsi: HashMap<String, f64>,
    last_update: Option<NaiveDate>,
}

impl MeanReversionStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let period = get_usize_param_min(&parameters, "rsiPeriod", 14, 2);
        let oversold_level = get_param_f64(&parameters, "oversoldLevel", 30.0);
        let overbought_level = get_param_f64(&parameters, "overboughtLevel", 70.0);
        let position_size_pct =
            get_param_f64_clamped(&parameters, "positionSizePct", 0.1, 0.01, 1.0);
        Self {
            period,
            oversold_level,
            overbought_level: overbought_level.max(oversold_level),
            position_size_pct,
            current_rsi: HashMap::new(),
            last_update: None,
        }
    }
}

impl super::Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn initialize(&mut self, _symbols: &[String], _start: NaiveDate, _end: NaiveDate) -> Result<()> {
        self.current_rsi.clear();
        self.last_update = None;
        Ok(())
    }

    fn update_state(
        &mut self,
        as_of: &AsOfData,
        date: NaiveDate,
        _portfolio: &PortfolioState,
    ) -> Result<()> {
        self.current_rsi.clear();
        for (symbol, bars) in as_of {
            let last = match bars.len().checked_sub(1) {
                Some(last) => last,
                None => continue,
            };
            if let Some(rsi) = indicators::rsi_at(bars, self.period, last) {
                self.current_rsi.insert(symbol.clone(), rsi);
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
        let mut symbols: Vec<&String> = self.current_rsi.keys().collect();
        symbols.sort();

        for symbol in symbols {
            let rsi = self.current_rsi[symbol];
            let close = match as_of.get(symbol).and_then(|bars| bars.last()) {
                Some(bar) => bar.close,
                None => continue,
            };
            let held = portfolio.held_quantity(symbol);

            if rsi < self.oversold_level && held <= Decimal::ZERO {
                let budget = portfolio.total_value
                    * Decimal::from_f64(self.position_size_pct).unwrap_or(Decimal::ZERO);
                if close <= Decimal::ZERO {
                    continue;
                }
                let quantity = (budget / close).floor();
                if quantity <= Decimal::ZERO {
                    continue;
                }
                let confidence =
                    ((self.oversold_level - rsi) / self.oversold_level + 0.5).min(1.0);
                signals.push(
                    StrategySignal::market(symbol, date, SignalDirection::Buy, close)
                        .with_quantity(quantity)
                        .with_confidence(confidence)
                        .with_reason("RSI oversold"),
                );
            } else if rsi > self.overbought_level && held > Decimal::ZERO {
                let confidence = ((rsi - self.overbought_level)
                    / (100.0 - self.overbought_level).max(f64::EPSILON)
                    + 0.5)
                    .min(1.0);
                signals.push(
                    StrategySignal::market(symbol, date, SignalDirection::Sell, close)
                        .with_quantity(held)
                        .with_confidence(confidence)
                        .with_reason("RSI overbought"),
                );
            }
        }

        signals
    }

    fn last_update(&self) -> Option<NaiveDate> {
        self.last_update
    }

    fn min_data_points(&self) -> usize {
        self.period + 1
    }
}
