use crate::models::{EquityPoint, SignalDirection, Trade};
use anyhow::{ensure, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An open long position. Average price follows the weighted-average
/// method: adds reprice it, reductions leave it unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub last_price: Decimal,
    pub opened: NaiveDate,
    pub last_marked: NaiveDate,
    /// Fills that built and reduced this position, in execution order.
    pub trades: Vec<Trade>,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_price
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.market_value() - self.cost_basis()
    }
}

/// Read-only view of the ledger handed to strategies so they can size
/// orders without being able to mutate cash or positions.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    pub cash: Decimal,
    pub positions: HashMap<String, (Decimal, Decimal)>,
    pub total_value: Decimal,
}

impl PortfolioState {
    pub fn held_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|(quantity, _)| *quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Cash plus positions, with full trade and equity history. All money
/// amounts are decimals so the accounting identity holds exactly.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
    pub trade_history: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub total_commission: Decimal,
    pub total_slippage: Decimal,
    initial_cash: Decimal,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            positions: HashMap::new(),
            trade_history: Vec::new(),
            equity_curve: Vec::new(),
            total_commission: Decimal::ZERO,
            total_slippage: Decimal::ZERO,
            initial_cash,
        }
    }

    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    /// Apply an executed fill to cash and positions. Buys must already be
    /// affordable and sells clamped to held quantity by the execution
    /// simulator; violations here are internal errors.
    pub fn apply_trade(&mut self, mut trade: Trade) -> Result<()> {
        ensure!(
            trade.quantity > Decimal::ZERO,
            "Trade quantity must be positive: {} {}",
            trade.symbol,
            trade.quantity
        );

        let notional = trade.fill_price * trade.quantity;
        match trade.direction {
            SignalDirection::Buy => {
                let total_cost = notional + trade.commission;
                ensure!(
                    total_cost <= self.cash,
                    "Buy of {} exceeds available cash ({} > {})",
                    trade.symbol,
                    total_cost,
                    self.cash
                );
                self.cash -= total_cost;

                let position =
                    self.positions
                        .entry(trade.symbol.clone())
                        .or_insert_with(|| Position {
                            symbol: trade.symbol.clone(),
                            quantity: Decimal::ZERO,
                            avg_price: Decimal::ZERO,
                            last_price: trade.fill_price,
                            opened: trade.date,
                            last_marked: trade.date,
                            trades: Vec::new(),
                        });
                let new_quantity = position.quantity + trade.quantity;
                position.avg_price = (position.quantity * position.avg_price + notional)
                    / new_quantity;
                position.quantity = new_quantity;
                position.last_price = trade.fill_price;
                position.last_marked = trade.date;
                position.trades.push(trade.clone());
            }
            SignalDirection::Sell => {
                let position = self
                    .positions
                    .get_mut(&trade.symbol)
                    .filter(|p| p.quantity >= trade.quantity)
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Sell of {} {} exceeds held quantity",
                            trade.quantity,
                            trade.symbol
                        )
                    })?;

                trade.realized_pnl = Some(
                    (trade.fill_price - position.avg_price) * trade.quantity - trade.commission,
                );
                self.cash += notional - trade.commission;
                position.quantity -= trade.quantity;
                position.last_price = trade.fill_price;
                position.last_marked = trade.date;
                position.trades.push(trade.clone());
                if position.quantity == Decimal::ZERO {
                    self.positions.remove(&trade.symbol);
                }
            }
        }

        self.total_commission += trade.commission;
        self.total_slippage += trade.slippage_cost;
        self.trade_history.push(trade);
        Ok(())
    }

    /// Reprice all open positions from the latest closes. Symbols absent
    /// from the map keep their previous mark.
    pub fn mark_to_market(&mut self, date: NaiveDate, closes: &HashMap<String, Decimal>) {
        for position in self.positions.values_mut() {
            if let Some(close) = closes.get(&position.symbol) {
                position.last_price = *close;
                position.last_marked = date;
            }
        }
    }

    pub fn positions_value(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Sum of crystallized P&L over the whole trade history.
    pub fn realized_pnl(&self) -> Decimal {
        self.trade_history
            .iter()
            .filter_map(|trade| trade.realized_pnl)
            .sum()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    pub fn total_value(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    pub fn record_equity(&mut self, date: NaiveDate) {
        let positions_value = self.positions_value();
        self.equity_curve.push(EquityPoint {
            date,
            total_value: self.cash + positions_value,
            cash: self.cash,
            positions_value,
            position_count: self.positions.len(),
        });
    }

    pub fn snapshot(&self) -> PortfolioState {
        PortfolioState {
            cash: self.cash,
            positions: self
                .positions
                .iter()
                .map(|(symbol, p)| (symbol.clone(), (p.quantity, p.avg_price)))
                .collect(),
            total_value: self.total_value(),
        }
    }
}
