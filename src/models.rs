use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single daily OHLCV bar. Prices are decimals so cash accounting
/// downstream never accumulates binary floating point residue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// A trading intention emitted by a strategy for one symbol on one date.
/// Quantity is optional; the execution simulator sizes the order when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySignal {
    pub symbol: String,
    pub date: NaiveDate,
    pub direction: SignalDirection,
    pub order_kind: OrderKind,
    /// Close at signal time, the execution simulator's reference price.
    pub price: Decimal,
    /// Strategy conviction in [0, 1].
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StrategySignal {
    pub fn market(
        symbol: &str,
        date: NaiveDate,
        direction: SignalDirection,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            date,
            direction,
            order_kind: OrderKind::Market,
            price,
            confidence: 1.0,
            quantity: None,
            limit_price: None,
            stop_price: None,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

/// An executed fill. `realized_pnl` is set only on position-reducing trades:
/// (fill price - average entry price) * quantity - commission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub symbol: String,
    pub date: NaiveDate,
    pub direction: SignalDirection,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub commission: Decimal,
    pub slippage_cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
}

/// One point of the daily equity curve, recorded after marking to market.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub total_value: Decimal,
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub position_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_return: Decimal,
    pub total_return_pct: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration_days: i64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_commission: Decimal,
    pub total_slippage: Decimal,
}

/// The full artifact of one completed backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub strategy: String,
    pub created_at: DateTime<Utc>,
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub final_value: Decimal,
    pub performance: PerformanceSummary,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

/// Strategy-level knobs extracted from the raw parameter map. Bounds are
/// enforced by the validator, not here.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub max_position_size: f64,
    pub max_positions: usize,
    pub risk_per_trade: f64,
    pub lookback_period: usize,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub rebalance_frequency: RebalanceFrequency,
    pub parameters: HashMap<String, f64>,
}

impl StrategyConfig {
    pub fn from_parameters(name: &str, parameters: &HashMap<String, f64>) -> Self {
        use crate::param_utils::{finite_param, get_param_f64, get_usize_param_min};

        let rebalance_frequency = match parameters.get("rebalanceFrequency").copied() {
            Some(v) if v.round() == 1.0 => RebalanceFrequency::Weekly,
            Some(v) if v.round() == 2.0 => RebalanceFrequency::Monthly,
            Some(v) if v.round() == 3.0 => RebalanceFrequency::Quarterly,
            _ => RebalanceFrequency::Daily,
        };

        Self {
            name: name.to_string(),
            max_position_size: get_param_f64(parameters, "maxPositionSize", 10000.0),
            max_positions: get_usize_param_min(parameters, "maxPositions", 10, 1),
            risk_per_trade: get_param_f64(parameters, "riskPerTrade", 0.02),
            lookback_period: get_usize_param_min(parameters, "lookbackPeriod", 50, 1),
            stop_loss_pct: finite_param(parameters, "stopLossPct"),
            take_profit_pct: finite_param(parameters, "takeProfitPct"),
            rebalance_frequency,
            parameters: parameters.clone(),
        }
    }
}

fn default_initial_capital() -> Decimal {
    dec!(100000)
}

fn default_commission_pct() -> Decimal {
    dec!(0.001)
}

fn default_slippage_pct() -> Decimal {
    dec!(0.0005)
}

fn default_max_position_value() -> Decimal {
    dec!(10000)
}

/// A backtest or optimization job as loaded from a JSON job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub strategy: String,
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    #[serde(default = "default_commission_pct")]
    pub commission_pct: Decimal,
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: Decimal,
    #[serde(default = "default_max_position_value")]
    pub max_position_value: Decimal,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    /// Sweep values for the optimizer, keyed by parameter name.
    #[serde(default)]
    pub parameter_grid: HashMap<String, Vec<f64>>,
}

/// A single parameter combination queued for the optimizer worker pool.
#[derive(Debug, Clone)]
pub struct SweepTask {
    pub id: String,
    pub parameters: HashMap<String, f64>,
}

#[derive(Debug)]
pub struct SweepTaskResult {
    pub task_id: String,
    pub outcome: Option<SweepOutcome>,
    pub error: Option<String>,
}

/// Condensed result of one optimizer combination, kept small so thousands
/// of them can be collected and ranked cheaply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub parameters: HashMap<String, f64>,
    pub sharpe_ratio: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub final_value: Decimal,
}
