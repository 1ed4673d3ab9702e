use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tradesim::engine::{BacktestEngine, EngineState};
use tradesim::models::{Bar, JobConfig, SignalDirection, StrategySignal};
use tradesim::optimizer::ParameterOptimizer;
use tradesim::portfolio::PortfolioState;
use tradesim::provider::{InMemoryStore, MarketDataProvider};
use tradesim::strategy::{create_strategy, AsOfData, Strategy};

fn day(d: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(d - 1)
}

fn bar(symbol: &str, date: NaiveDate, close: f64) -> Bar {
    let price = Decimal::from_f64(close).unwrap();
    Bar {
        symbol: symbol.to_string(),
        date,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 10_000,
    }
}

/// A slow sine over a rising trend, enough to force MA crossovers both ways.
fn wavy_bars(symbol: &str, days: u64) -> Vec<Bar> {
    (1..=days)
        .map(|d| {
            let t = d as f64;
            let close = 100.0 + t * 0.1 + 15.0 * (t / 9.0).sin();
            bar(symbol, day(d), close)
        })
        .collect()
}

fn provider_with(bars_by_symbol: HashMap<String, Vec<Bar>>) -> MarketDataProvider {
    MarketDataProvider::new(Box::new(InMemoryStore::new(bars_by_symbol)))
}

fn job(strategy: &str, symbols: &[&str], days: u64) -> JobConfig {
    JobConfig {
        strategy: strategy.to_string(),
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        start_date: day(1),
        end_date: day(days),
        initial_capital: dec!(100000),
        commission_pct: Decimal::ZERO,
        slippage_pct: Decimal::ZERO,
        max_position_value: dec!(20000),
        parameters: HashMap::new(),
        parameter_grid: HashMap::new(),
    }
}

#[test]
fn ma_crossover_run_keeps_the_ledger_consistent() {
    let mut data = HashMap::new();
    data.insert("AAA".to_string(), wavy_bars("AAA", 120));
    data.insert("BBB".to_string(), wavy_bars("BBB", 120));

    let mut config = job("ma_crossover", &["AAA", "BBB"], 120);
    config.parameters.insert("fastPeriod".to_string(), 5.0);
    config.parameters.insert("slowPeriod".to_string(), 15.0);
    config.commission_pct = dec!(0.001);
    config.slippage_pct = dec!(0.0005);

    let mut provider = provider_with(data);
    let mut strategy = create_strategy("ma_crossover", config.parameters.clone()).unwrap();
    let mut engine = BacktestEngine::new(config);
    let result = engine.run(strategy.as_mut(), &mut provider).unwrap();

    assert_eq!(engine.state(), EngineState::Completed);
    assert!(!result.trades.is_empty(), "crossovers should produce trades");
    assert_eq!(result.equity_curve.len(), 120);

    // cash + sum(position market values) == total value, at every sample
    for point in &result.equity_curve {
        assert_eq!(point.cash + point.positions_value, point.total_value);
    }

    // final value ties out against the last equity sample
    assert_eq!(result.final_value, result.equity_curve.last().unwrap().total_value);

    // costs were actually charged
    assert!(result.performance.total_commission > Decimal::ZERO);
    assert!(result.performance.total_slippage > Decimal::ZERO);
}

/// Buys a fixed quantity on the first date and sells it on the second.
struct RoundTrip {
    quantity: Decimal,
    step: usize,
    last_update: Option<NaiveDate>,
}

impl Strategy for RoundTrip {
    fn name(&self) -> &str {
        "round_trip"
    }

    fn initialize(&mut self, _: &[String], _: NaiveDate, _: NaiveDate) -> Result<()> {
        self.step = 0;
        Ok(())
    }

    fn update_state(
        &mut self,
        _as_of: &AsOfData,
        date: NaiveDate,
        _portfolio: &PortfolioState,
    ) -> Result<()> {
        self.step += 1;
        self.last_update = Some(date);
        Ok(())
    }

    fn generate_signals(
        &self,
        as_of: &AsOfData,
        date: NaiveDate,
        _portfolio: &PortfolioState,
    ) -> Vec<StrategySignal> {
        let Some(close) = as_of.get("AAA").and_then(|bars| bars.last()).map(|b| b.close) else {
            return Vec::new();
        };
        match self.step {
            1 => vec![
                StrategySignal::market("AAA", date, SignalDirection::Buy, close)
                    .with_quantity(self.quantity),
            ],
            2 => vec![
                StrategySignal::market("AAA", date, SignalDirection::Sell, close)
                    .with_quantity(self.quantity),
            ],
            _ => Vec::new(),
        }
    }

    fn last_update(&self) -> Option<NaiveDate> {
        self.last_update
    }

    fn min_data_points(&self) -> usize {
        1
    }
}

#[test]
fn round_trip_at_constant_price_is_neutral() {
    let mut data = HashMap::new();
    // constant price, zero commission, zero slippage
    data.insert(
        "AAA".to_string(),
        (1..=5).map(|d| bar("AAA", day(d), 100.0)).collect(),
    );

    let mut strategy = RoundTrip {
        quantity: dec!(50),
        step: 0,
        last_update: None,
    };
    let mut provider = provider_with(data);
    let mut engine = BacktestEngine::new(job("round_trip", &["AAA"], 5));
    let result = engine.run(&mut strategy, &mut provider).unwrap();

    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.final_value, dec!(100000));
    assert_eq!(result.trades[1].realized_pnl, Some(Decimal::ZERO));
    assert_eq!(result.performance.total_return, Decimal::ZERO);
}

#[test]
fn flat_prices_and_no_trades_produce_degenerate_metrics() {
    let mut data = HashMap::new();
    data.insert(
        "AAA".to_string(),
        (1..=40).map(|d| bar("AAA", day(d), 100.0)).collect(),
    );

    // thresholds no RSI can reach, so the strategy stays silent
    let mut config = job("mean_reversion", &["AAA"], 40);
    config.parameters.insert("oversoldLevel".to_string(), -1.0);
    config.parameters.insert("overboughtLevel".to_string(), 101.0);

    let mut provider = provider_with(data);
    let mut strategy = create_strategy("mean_reversion", config.parameters.clone()).unwrap();
    let mut engine = BacktestEngine::new(config);
    let result = engine.run(strategy.as_mut(), &mut provider).unwrap();

    let perf = &result.performance;
    assert_eq!(perf.total_trades, 0);
    assert_eq!(perf.win_rate, 0.0);
    assert_eq!(perf.profit_factor, 0.0);
    assert_eq!(perf.sharpe_ratio, 0.0);
    assert_eq!(perf.sortino_ratio, 0.0);
    assert_eq!(perf.calmar_ratio, 0.0);
    assert_eq!(perf.max_drawdown, Decimal::ZERO);
    assert_eq!(perf.max_drawdown_duration_days, 0);
    assert_eq!(result.final_value, dec!(100000));
}

#[test]
fn entry_costs_on_the_first_date_carry_no_volatility() {
    let mut data = HashMap::new();
    data.insert(
        "AAA".to_string(),
        (1..=20).map(|d| bar("AAA", day(d), 100.0)).collect(),
    );

    // flat prices: the only equity move is the day-one entry commission
    let mut config = job("buy_and_hold", &["AAA"], 20);
    config.commission_pct = dec!(0.01);

    let mut provider = provider_with(data);
    let mut strategy = create_strategy("buy_and_hold", HashMap::new()).unwrap();
    let mut engine = BacktestEngine::new(config);
    let result = engine.run(strategy.as_mut(), &mut provider).unwrap();

    assert!(result.performance.total_commission > Decimal::ZERO);
    assert!(result.final_value < dec!(100000));

    // returns start on the second date, so the series is all zeros
    assert_eq!(result.performance.volatility, 0.0);
    assert_eq!(result.performance.sharpe_ratio, 0.0);
    assert_eq!(result.performance.sortino_ratio, 0.0);
}

#[test]
fn optimizer_sweeps_the_grid_and_ranks_outcomes() {
    let mut data = HashMap::new();
    data.insert("AAA".to_string(), wavy_bars("AAA", 90));

    let mut config = job("ma_crossover", &["AAA"], 90);
    config
        .parameter_grid
        .insert("fastPeriod".to_string(), vec![3.0, 5.0]);
    config
        .parameter_grid
        .insert("slowPeriod".to_string(), vec![10.0, 20.0, 30.0]);

    let mut provider = provider_with(data);
    let optimizer = ParameterOptimizer::new(config, &mut provider).unwrap();
    let outcomes = optimizer.run().unwrap();

    assert_eq!(outcomes.len(), 6, "full Cartesian product must be evaluated");

    let score = |o: &tradesim::models::SweepOutcome| {
        if o.sharpe_ratio > 0.0 {
            o.sharpe_ratio
        } else {
            o.total_return_pct
        }
    };
    for pair in outcomes.windows(2) {
        assert!(
            score(&pair[0]) >= score(&pair[1]),
            "outcomes must be ranked best-first"
        );
    }

    // every combination carries its own parameters back
    for outcome in &outcomes {
        assert!(outcome.parameters.contains_key("fastPeriod"));
        assert!(outcome.parameters.contains_key("slowPeriod"));
    }
}

#[test]
fn validation_failures_abort_before_simulation() {
    let mut data = HashMap::new();
    data.insert(
        "AAA".to_string(),
        (1..=20).map(|d| bar("AAA", day(d), 100.0)).collect(),
    );

    let mut config = job("ma_crossover", &["AAA"], 20);
    config.parameters.insert("riskPerTrade".to_string(), 5.0);

    let mut provider = provider_with(data);
    let mut strategy = create_strategy("ma_crossover", config.parameters.clone()).unwrap();
    let mut engine = BacktestEngine::new(config);
    let result = engine.run(strategy.as_mut(), &mut provider);

    assert!(result.is_err());
    assert_eq!(engine.state(), EngineState::Failed);
}
