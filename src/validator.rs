use crate::models::{Bar, OrderKind, StrategyConfig, StrategySignal};
use crate::portfolio::Portfolio;
use crate::strategy::{AsOfData, Strategy};
use log::info;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use thiserror::Error;

/// Pre-run validation failure carrying every issue found, not just the
/// first, so a job can be fixed in one pass.
#[derive(Debug, Error)]
#[error("Validation failed with {} issue(s): {}", .issues.len(), .issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

impl ValidationError {
    fn from_issues(issues: Vec<String>) -> Result<(), ValidationError> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

pub struct StrategyValidator;

impl StrategyValidator {
    /// Bounds checks on the strategy configuration.
    pub fn validate_config(config: &StrategyConfig) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if config.name.trim().is_empty() {
            issues.push("strategy name must not be empty".to_string());
        }
        if !(config.risk_per_trade > 0.0 && config.risk_per_trade <= 1.0) {
            issues.push(format!(
                "riskPerTrade must be in (0, 1], got {}",
                config.risk_per_trade
            ));
        }
        if config.max_position_size <= 0.0 {
            issues.push(format!(
                "maxPositionSize must be positive, got {}",
                config.max_position_size
            ));
        }
        if config.max_positions == 0 {
            issues.push("maxPositions must be at least 1".to_string());
        }
        if config.lookback_period == 0 {
            issues.push("lookbackPeriod must be positive".to_string());
        }
        if let Some(stop_loss) = config.stop_loss_pct {
            if !(stop_loss > 0.0 && stop_loss < 1.0) {
                issues.push(format!("stopLossPct must be in (0, 1), got {}", stop_loss));
            }
        }
        if let Some(take_profit) = config.take_profit_pct {
            if take_profit <= 0.0 {
                issues.push(format!("takeProfitPct must be positive, got {}", take_profit));
            }
        }

        ValidationError::from_issues(issues)
    }

    /// Per-bar sanity checks over every symbol's sequence: positive prices,
    /// non-negative volume, OHLC ordering, strictly ascending dates.
    pub fn validate_data(data: &HashMap<String, Vec<Bar>>) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for (symbol, bars) in data {
            if bars.is_empty() {
                issues.push(format!("{}: no bars in range", symbol));
                continue;
            }
            for (i, bar) in bars.iter().enumerate() {
                if bar.open <= Decimal::ZERO
                    || bar.high <= Decimal::ZERO
                    || bar.low <= Decimal::ZERO
                    || bar.close <= Decimal::ZERO
                {
                    issues.push(format!("{} {}: non-positive price", symbol, bar.date));
                }
                if bar.volume < 0 {
                    issues.push(format!("{} {}: negative volume", symbol, bar.date));
                }
                if bar.high < bar.open.max(bar.close) {
                    issues.push(format!("{} {}: high below open/close", symbol, bar.date));
                }
                if bar.low > bar.open.min(bar.close) {
                    issues.push(format!("{} {}: low above open/close", symbol, bar.date));
                }
                if i > 0 && bars[i - 1].date >= bar.date {
                    issues.push(format!(
                        "{}: dates not strictly ascending at {}",
                        symbol, bar.date
                    ));
                }
            }
        }

        ValidationError::from_issues(issues)
    }

    /// Well-formedness checks for a single emitted signal.
    pub fn validate_signal(signal: &StrategySignal) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if signal.symbol.trim().is_empty() {
            issues.push("signal symbol must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&signal.confidence) {
            issues.push(format!(
                "signal confidence must be in [0, 1], got {}",
                signal.confidence
            ));
        }
        if signal.price <= Decimal::ZERO {
            issues.push(format!("signal price must be positive, got {}", signal.price));
        }
        for (label, price) in [("limit", signal.limit_price), ("stop", signal.stop_price)] {
            if let Some(price) = price {
                if price <= Decimal::ZERO {
                    issues.push(format!("{} price must be positive, got {}", label, price));
                }
            }
        }
        if let Some(quantity) = signal.quantity {
            if quantity <= Decimal::ZERO {
                issues.push(format!("signal quantity must be positive, got {}", quantity));
            }
        }
        match signal.order_kind {
            OrderKind::Market => {}
            OrderKind::Limit => {
                if signal.limit_price.is_none() {
                    issues.push("limit order without a limit price".to_string());
                }
            }
            OrderKind::Stop => {
                if signal.stop_price.is_none() {
                    issues.push("stop order without a stop price".to_string());
                }
            }
            OrderKind::StopLimit => {
                if signal.limit_price.is_none() || signal.stop_price.is_none() {
                    issues.push("stop-limit order needs both limit and stop prices".to_string());
                }
            }
        }

        ValidationError::from_issues(issues)
    }

    /// Drive the strategy over a small data sample and assert that its
    /// internal state advances and every emitted signal is well formed.
    /// The structural gate is discharged at compile time by the trait.
    pub fn smoke_test(
        strategy: &mut dyn Strategy,
        data: &HashMap<String, Vec<Bar>>,
    ) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let symbols: Vec<String> = data.keys().cloned().collect();
        let mut dates: Vec<_> = data
            .values()
            .flat_map(|bars| bars.iter().map(|bar| bar.date))
            .collect();
        dates.sort();
        dates.dedup();

        let (Some(&start), Some(&end)) = (dates.first(), dates.last()) else {
            return ValidationError::from_issues(vec!["smoke test sample has no bars".to_string()]);
        };

        if let Err(err) = strategy.initialize(&symbols, start, end) {
            return ValidationError::from_issues(vec![format!("initialize failed: {}", err)]);
        }

        let portfolio = Portfolio::new(dec!(100000));
        let snapshot = portfolio.snapshot();
        let mut last_seen = strategy.last_update();

        for &date in &dates {
            let as_of: AsOfData = data
                .iter()
                .map(|(symbol, bars)| {
                    let upto = bars.partition_point(|bar| bar.date <= date);
                    (symbol.clone(), &bars[..upto])
                })
                .collect();

            if let Err(err) = strategy.update_state(&as_of, date, &snapshot) {
                issues.push(format!("update_state failed on {}: {}", date, err));
                break;
            }
            let updated = strategy.last_update();
            if updated == last_seen {
                issues.push(format!("update_state did not advance state on {}", date));
            }
            last_seen = updated;

            for signal in strategy.generate_signals(&as_of, date, &snapshot) {
                if let Err(err) = Self::validate_signal(&signal) {
                    issues.extend(err.issues);
                }
            }
        }

        ValidationError::from_issues(issues)
    }

    /// All gates together; the order matches the engine's pre-run sequence.
    pub fn validate_all(
        strategy: &mut dyn Strategy,
        config: &StrategyConfig,
        data: &HashMap<String, Vec<Bar>>,
    ) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if let Err(err) = Self::validate_config(config) {
            issues.extend(err.issues);
        }
        if let Err(err) = Self::validate_data(data) {
            issues.extend(err.issues);
        }
        if let Err(err) = Self::smoke_test(strategy, data) {
            issues.extend(err.issues);
        }

        if issues.is_empty() {
            info!("Strategy {} passed all validation gates", config.name);
        }
        ValidationError::from_issues(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::create_strategy;
    use chrono::NaiveDate;
    use rust_decimal::prelude::FromPrimitive;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            symbol: "AAA".to_string(),
            date,
            open: Decimal::from_f64(open).unwrap(),
            high: Decimal::from_f64(high).unwrap(),
            low: Decimal::from_f64(low).unwrap(),
            close: Decimal::from_f64(close).unwrap(),
            volume: 1_000,
        }
    }

    fn good_data() -> HashMap<String, Vec<Bar>> {
        let bars: Vec<Bar> = (1..=20)
            .map(|d| bar(day(d), 10.0, 11.0, 9.0, 10.5))
            .collect();
        let mut data = HashMap::new();
        data.insert("AAA".to_string(), bars);
        data
    }

    #[test]
    fn default_config_passes() {
        let config = StrategyConfig::from_parameters("ma_crossover", &HashMap::new());
        assert!(StrategyValidator::validate_config(&config).is_ok());
    }

    #[test]
    fn bad_bounds_are_itemized() {
        let mut params = HashMap::new();
        params.insert("riskPerTrade".to_string(), 1.5);
        params.insert("maxPositionSize".to_string(), -1.0);
        params.insert("stopLossPct".to_string(), 2.0);
        let config = StrategyConfig::from_parameters("x", &params);
        let err = StrategyValidator::validate_config(&config).unwrap_err();
        assert_eq!(err.issues.len(), 3);
    }

    #[test]
    fn broken_ohlc_fails_data_gate() {
        let mut data = good_data();
        // high below close
        data.get_mut("AAA").unwrap()[3] = bar(day(4), 10.0, 10.2, 9.0, 10.5);
        assert!(StrategyValidator::validate_data(&data).is_err());
    }

    #[test]
    fn unsorted_dates_fail_data_gate() {
        let mut data = good_data();
        data.get_mut("AAA").unwrap().swap(2, 3);
        assert!(StrategyValidator::validate_data(&data).is_err());
    }

    #[test]
    fn smoke_test_passes_for_builtin_strategies() {
        let data = good_data();
        for name in ["ma_crossover", "mean_reversion", "buy_and_hold"] {
            let mut strategy = create_strategy(name, HashMap::new()).unwrap();
            assert!(
                StrategyValidator::smoke_test(strategy.as_mut(), &data).is_ok(),
                "{} failed smoke test",
                name
            );
        }
    }

    #[test]
    fn limit_signal_without_price_is_rejected() {
        let mut signal = StrategySignal::market(
            "AAA",
            day(1),
            crate::models::SignalDirection::Buy,
            Decimal::from_f64(10.0).unwrap(),
        );
        signal.order_kind = OrderKind::Limit;
        assert!(StrategyValidator::validate_signal(&signal).is_err());
    }
}
