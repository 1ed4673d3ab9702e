use crate::execution::{Execution, ExecutionReport, ExecutionSimulator, RejectReason};
use crate::models::{BacktestResult, Bar, JobConfig, StrategyConfig};
use crate::performance::PerformanceCalculator;
use crate::portfolio::Portfolio;
use crate::provider::MarketDataProvider;
use crate::strategy::{AsOfData, Strategy};
use crate::validator::StrategyValidator;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const PROGRESS_LOG_INTERVAL: usize = 50;
const SMOKE_TEST_BARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Validating,
    Running,
    Stopped,
    Failed,
    Completed,
}

/// Single-run, single-threaded backtest driver. The simulation clock
/// advances one trading date at a time; ledger updates are strictly
/// sequential because fill order affects cash available to later signals.
pub struct BacktestEngine {
    config: JobConfig,
    simulator: ExecutionSimulator,
    stop_flag: Arc<AtomicBool>,
    state: EngineState,
    pub execution_report: ExecutionReport,
}

impl BacktestEngine {
    pub fn new(config: JobConfig) -> Self {
        let simulator = ExecutionSimulator::new(
            config.commission_pct,
            config.slippage_pct,
            config.max_position_value,
        );
        Self {
            config,
            simulator,
            stop_flag: Arc::new(AtomicBool::new(false)),
            state: EngineState::Initializing,
            execution_report: ExecutionReport::default(),
        }
    }

    pub fn with_stop_flag(mut self, stop_flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = stop_flag;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Load data through the provider, validate, then simulate.
    pub fn run(
        &mut self,
        strategy: &mut dyn Strategy,
        provider: &mut MarketDataProvider,
    ) -> Result<BacktestResult> {
        self.state = EngineState::Initializing;
        let data = self.load_data(provider)?;
        self.run_loaded(strategy, &data)
    }

    /// Simulate against data the caller already loaded. The optimizer uses
    /// this path so every worker shares one immutable dataset.
    pub fn run_loaded(
        &mut self,
        strategy: &mut dyn Strategy,
        data: &HashMap<String, Arc<Vec<Bar>>>,
    ) -> Result<BacktestResult> {
        if data.is_empty() {
            self.state = EngineState::Failed;
            return Err(anyhow!("No market data for any requested symbol"));
        }

        self.state = EngineState::Validating;
        if let Err(err) = self.validate(strategy, data) {
            self.state = EngineState::Failed;
            return Err(err);
        }

        let symbols: Vec<String> = {
            let mut symbols: Vec<String> = data.keys().cloned().collect();
            symbols.sort();
            symbols
        };
        if let Err(err) = strategy.initialize(&symbols, self.config.start_date, self.config.end_date)
        {
            self.state = EngineState::Failed;
            return Err(err);
        }

        self.state = EngineState::Running;
        info!(
            "Running {} over {} symbol(s), {} - {}",
            strategy.name(),
            symbols.len(),
            self.config.start_date,
            self.config.end_date
        );

        // Sorted union of all trading dates across symbols.
        let dates: Vec<NaiveDate> = data
            .values()
            .flat_map(|bars| bars.iter().map(|bar| bar.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut portfolio = Portfolio::new(self.config.initial_capital);
        let mut daily_returns: Vec<f64> = Vec::with_capacity(dates.len().saturating_sub(1));
        let mut previous_value = portfolio.total_value();
        // Monotone per-symbol cursor: bars[..cursor] is the as-of view.
        let mut cursors: HashMap<&str, usize> = HashMap::new();

        for (i, &date) in dates.iter().enumerate() {
            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop requested; halting at {} with a consistent ledger", date);
                self.state = EngineState::Stopped;
                break;
            }

            let mut as_of: AsOfData = HashMap::new();
            let mut closes: HashMap<String, Decimal> = HashMap::new();
            for (symbol, bars) in data {
                let cursor = cursors.entry(symbol.as_str()).or_insert(0);
                while *cursor < bars.len() && bars[*cursor].date <= date {
                    *cursor += 1;
                }
                as_of.insert(symbol.clone(), &bars[..*cursor]);
                if *cursor > 0 {
                    closes.insert(symbol.clone(), bars[*cursor - 1].close);
                }
            }

            portfolio.mark_to_market(date, &closes);

            let snapshot = portfolio.snapshot();
            if let Err(err) = strategy.update_state(&as_of, date, &snapshot) {
                self.state = EngineState::Failed;
                return Err(err);
            }
            let signals = strategy.generate_signals(&as_of, date, &snapshot);

            // Signals execute in the order returned; each fill changes the
            // cash available to the next.
            for signal in signals {
                if let Err(err) = StrategyValidator::validate_signal(&signal) {
                    warn!("Malformed signal for {} on {} dropped: {}", signal.symbol, date, err);
                    self.execution_report.record_rejection(RejectReason::Malformed);
                    continue;
                }
                let Some(close) = closes.get(&signal.symbol).copied() else {
                    warn!("Signal for {} has no bar on {}; dropped", signal.symbol, date);
                    continue;
                };
                match self.simulator.execute(&signal, close, &portfolio.snapshot()) {
                    Execution::Filled(trade) => {
                        if let Err(err) = portfolio.apply_trade(trade) {
                            self.state = EngineState::Failed;
                            return Err(err);
                        }
                        self.execution_report.filled += 1;
                    }
                    Execution::Rejected(reason) => {
                        debug!("Signal for {} on {} rejected: {:?}", signal.symbol, date, reason);
                        self.execution_report.record_rejection(reason);
                    }
                }
            }

            portfolio.record_equity(date);
            let value = portfolio.total_value();
            // The first date has no prior sample; its entry costs belong to
            // the equity curve, not the return series.
            if i > 0 && previous_value > Decimal::ZERO {
                let day_return = ((value - previous_value) / previous_value)
                    .to_f64()
                    .unwrap_or(0.0);
                daily_returns.push(day_return);
            }
            previous_value = value;

            if (i + 1) % PROGRESS_LOG_INTERVAL == 0 {
                debug!(
                    "Simulated {}/{} dates, portfolio value {:.2}",
                    i + 1,
                    dates.len(),
                    value
                );
            }
        }

        if self.state == EngineState::Running {
            self.state = EngineState::Completed;
        }

        let final_value = portfolio.total_value();
        let performance = PerformanceCalculator::summarize(
            &portfolio.trade_history,
            self.config.initial_capital,
            final_value,
            self.config.start_date,
            self.config.end_date,
            &portfolio.equity_curve,
            &daily_returns,
        );

        info!(
            "Backtest {:?}: final value {:.2}, {} trade(s), {} rejection(s)",
            self.state,
            final_value,
            portfolio.trade_history.len(),
            self.execution_report.total_rejected()
        );

        Ok(BacktestResult {
            strategy: strategy.name().to_string(),
            created_at: chrono::Utc::now(),
            symbols,
            start_date: self.config.start_date,
            end_date: self.config.end_date,
            initial_capital: self.config.initial_capital,
            final_value,
            performance,
            trades: portfolio.trade_history,
            equity_curve: portfolio.equity_curve,
        })
    }

    fn load_data(
        &mut self,
        provider: &mut MarketDataProvider,
    ) -> Result<HashMap<String, Arc<Vec<Bar>>>> {
        let mut data = HashMap::new();
        for symbol in &self.config.symbols {
            match provider.get_bars(symbol, self.config.start_date, self.config.end_date) {
                Ok(bars) if bars.is_empty() => {
                    warn!("No bars for {} in range; symbol skipped", symbol);
                }
                Ok(bars) => {
                    data.insert(symbol.clone(), bars);
                }
                Err(err) => {
                    warn!("Failed to load {}: {}; symbol skipped", symbol, err);
                }
            }
        }
        if data.is_empty() {
            self.state = EngineState::Failed;
            return Err(anyhow!(
                "No market data for any of {:?} in {} - {}",
                self.config.symbols,
                self.config.start_date,
                self.config.end_date
            ));
        }
        Ok(data)
    }

    fn validate(
        &self,
        strategy: &mut dyn Strategy,
        data: &HashMap<String, Arc<Vec<Bar>>>,
    ) -> Result<()> {
        let strategy_config =
            StrategyConfig::from_parameters(&self.config.strategy, &self.config.parameters);
        let full: HashMap<String, Vec<Bar>> = data
            .iter()
            .map(|(symbol, bars)| (symbol.clone(), bars.as_ref().clone()))
            .collect();
        StrategyValidator::validate_config(&strategy_config)?;
        StrategyValidator::validate_data(&full)?;

        // Smoke-test over a short prefix; full history would double the run.
        let sample: HashMap<String, Vec<Bar>> = data
            .iter()
            .map(|(symbol, bars)| {
                let take = bars.len().min(SMOKE_TEST_BARS.max(strategy.min_data_points()));
                (symbol.clone(), bars[..take].to_vec())
            })
            .collect();
        StrategyValidator::smoke_test(strategy, &sample)?;
        Ok(())
    }
}
