use crate::models::{OrderKind, SignalDirection, StrategySignal, Trade};
use crate::portfolio::PortfolioState;
use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Fraction of available cash committed when a signal carries no quantity.
const DEFAULT_SIZE_FRACTION: Decimal = dec!(0.1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NonPositiveQuantity,
    InsufficientCash,
    NoPosition,
    NotMarketable,
    /// Signal failed well-formedness validation; recorded by the engine
    /// before the simulator ever sees it.
    Malformed,
}

#[derive(Debug)]
pub enum Execution {
    Filled(Trade),
    Rejected(RejectReason),
}

/// Per-run tally of fills and rejections, reported once at the end.
#[derive(Debug, Default, Clone)]
pub struct ExecutionReport {
    pub filled: usize,
    pub rejected_non_positive_quantity: usize,
    pub rejected_insufficient_cash: usize,
    pub rejected_no_position: usize,
    pub rejected_not_marketable: usize,
    pub rejected_malformed: usize,
}

impl ExecutionReport {
    pub fn record_rejection(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::NonPositiveQuantity => self.rejected_non_positive_quantity += 1,
            RejectReason::InsufficientCash => self.rejected_insufficient_cash += 1,
            RejectReason::NoPosition => self.rejected_no_position += 1,
            RejectReason::NotMarketable => self.rejected_not_marketable += 1,
            RejectReason::Malformed => self.rejected_malformed += 1,
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected_non_positive_quantity
            + self.rejected_insufficient_cash
            + self.rejected_no_position
            + self.rejected_not_marketable
            + self.rejected_malformed
    }
}

/// Turns signals into fills against the latest close, applying directional
/// slippage and percentage commission. Rejections are reported back to the
/// caller; they never mutate the ledger.
pub struct ExecutionSimulator {
    commission_pct: Decimal,
    slippage_pct: Decimal,
    max_position_value: Decimal,
}

impl ExecutionSimulator {
    pub fn new(commission_pct: Decimal, slippage_pct: Decimal, max_position_value: Decimal) -> Self {
        Self {
            commission_pct,
            slippage_pct,
            max_position_value,
        }
    }

    /// Simulate one signal against the latest close for its symbol.
    pub fn execute(&self, signal: &StrategySignal, close: Decimal, state: &PortfolioState) -> Execution {
        let fill_price = self.fill_price(signal.direction, close);

        if !self.is_marketable(signal, fill_price) {
            debug!(
                "Signal for {} not marketable at {} (limit {:?}, stop {:?})",
                signal.symbol, fill_price, signal.limit_price, signal.stop_price
            );
            return Execution::Rejected(RejectReason::NotMarketable);
        }

        let quantity = match signal.direction {
            SignalDirection::Buy => match signal.quantity {
                Some(quantity) => quantity,
                None => self.default_buy_quantity(state.cash, fill_price),
            },
            SignalDirection::Sell => {
                let held = state.held_quantity(&signal.symbol);
                if held <= Decimal::ZERO {
                    return Execution::Rejected(RejectReason::NoPosition);
                }
                // Sells never go short: clamp to what is actually held.
                signal.quantity.map(|q| q.min(held)).unwrap_or(held)
            }
        };

        if quantity <= Decimal::ZERO {
            return Execution::Rejected(RejectReason::NonPositiveQuantity);
        }

        let notional = fill_price * quantity;
        let commission = notional * self.commission_pct;

        if signal.direction == SignalDirection::Buy && notional + commission > state.cash {
            debug!(
                "Buy of {} {} rejected: cost {} exceeds cash {}",
                quantity,
                signal.symbol,
                notional + commission,
                state.cash
            );
            return Execution::Rejected(RejectReason::InsufficientCash);
        }

        Execution::Filled(Trade {
            symbol: signal.symbol.clone(),
            date: signal.date,
            direction: signal.direction,
            quantity,
            fill_price,
            commission,
            slippage_cost: (fill_price - close).abs() * quantity,
            realized_pnl: None,
        })
    }

    fn fill_price(&self, direction: SignalDirection, close: Decimal) -> Decimal {
        match direction {
            SignalDirection::Buy => close * (Decimal::ONE + self.slippage_pct),
            SignalDirection::Sell => close * (Decimal::ONE - self.slippage_pct),
        }
    }

    fn is_marketable(&self, signal: &StrategySignal, fill_price: Decimal) -> bool {
        match signal.order_kind {
            OrderKind::Market => true,
            OrderKind::Limit => match (signal.direction, signal.limit_price) {
                (SignalDirection::Buy, Some(limit)) => fill_price <= limit,
                (SignalDirection::Sell, Some(limit)) => fill_price >= limit,
                (_, None) => false,
            },
            OrderKind::Stop => match (signal.direction, signal.stop_price) {
                (SignalDirection::Buy, Some(stop)) => fill_price >= stop,
                (SignalDirection::Sell, Some(stop)) => fill_price <= stop,
                (_, None) => false,
            },
            OrderKind::StopLimit => {
                let stop_hit = match (signal.direction, signal.stop_price) {
                    (SignalDirection::Buy, Some(stop)) => fill_price >= stop,
                    (SignalDirection::Sell, Some(stop)) => fill_price <= stop,
                    (_, None) => false,
                };
                let within_limit = match (signal.direction, signal.limit_price) {
                    (SignalDirection::Buy, Some(limit)) => fill_price <= limit,
                    (SignalDirection::Sell, Some(limit)) => fill_price >= limit,
                    (_, None) => false,
                };
                stop_hit && within_limit
            }
        }
    }

    fn default_buy_quantity(&self, cash: Decimal, fill_price: Decimal) -> Decimal {
        if fill_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let budget = (cash * DEFAULT_SIZE_FRACTION).min(self.max_position_value);
        (budget / fill_price).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn state(cash: Decimal, held: Option<(String, Decimal)>) -> PortfolioState {
        let mut positions = HashMap::new();
        if let Some((symbol, quantity)) = held {
            positions.insert(symbol, (quantity, dec!(10)));
        }
        PortfolioState {
            cash,
            positions,
            total_value: cash,
        }
    }

    fn simulator() -> ExecutionSimulator {
        ExecutionSimulator::new(dec!(0.001), dec!(0.01), dec!(10000))
    }

    #[test]
    fn buys_fill_above_close_and_sells_below() {
        let sim = simulator();
        let state = state(dec!(100000), Some(("AAA".to_string(), dec!(10))));

        let buy = StrategySignal::market("AAA", day(), SignalDirection::Buy, dec!(100))
            .with_quantity(dec!(1));
        match sim.execute(&buy, dec!(100), &state) {
            Execution::Filled(trade) => {
                assert_eq!(trade.fill_price, dec!(101));
                assert_eq!(trade.slippage_cost, dec!(1));
            }
            other => panic!("expected fill, got {:?}", other),
        }

        let sell = StrategySignal::market("AAA", day(), SignalDirection::Sell, dec!(100))
            .with_quantity(dec!(1));
        match sim.execute(&sell, dec!(100), &state) {
            Execution::Filled(trade) => assert_eq!(trade.fill_price, dec!(99)),
            other => panic!("expected fill, got {:?}", other),
        }
    }

    #[test]
    fn default_sizing_commits_a_tenth_of_cash() {
        let sim = ExecutionSimulator::new(Decimal::ZERO, Decimal::ZERO, dec!(1000000));
        let state = state(dec!(10000), None);
        let buy = StrategySignal::market("AAA", day(), SignalDirection::Buy, dec!(30));
        match sim.execute(&buy, dec!(30), &state) {
            // floor(10000 * 0.1 / 30) = 33
            Execution::Filled(trade) => assert_eq!(trade.quantity, dec!(33)),
            other => panic!("expected fill, got {:?}", other),
        }
    }

    #[test]
    fn default_sizing_is_capped_by_max_position_value() {
        let sim = ExecutionSimulator::new(Decimal::ZERO, Decimal::ZERO, dec!(500));
        let state = state(dec!(100000), None);
        let buy = StrategySignal::market("AAA", day(), SignalDirection::Buy, dec!(30));
        match sim.execute(&buy, dec!(30), &state) {
            // floor(500 / 30) = 16
            Execution::Filled(trade) => assert_eq!(trade.quantity, dec!(16)),
            other => panic!("expected fill, got {:?}", other),
        }
    }

    #[test]
    fn unaffordable_buys_are_rejected() {
        let sim = simulator();
        let state = state(dec!(50), None);
        let buy = StrategySignal::market("AAA", day(), SignalDirection::Buy, dec!(100))
            .with_quantity(dec!(1));
        match sim.execute(&buy, dec!(100), &state) {
            Execution::Rejected(reason) => assert_eq!(reason, RejectReason::InsufficientCash),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn sells_without_a_position_are_rejected() {
        let sim = simulator();
        let state = state(dec!(1000), None);
        let sell = StrategySignal::market("AAA", day(), SignalDirection::Sell, dec!(100));
        match sim.execute(&sell, dec!(100), &state) {
            Execution::Rejected(reason) => assert_eq!(reason, RejectReason::NoPosition),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn oversized_sells_are_clamped_to_held_quantity() {
        let sim = ExecutionSimulator::new(Decimal::ZERO, Decimal::ZERO, dec!(10000));
        let state = state(dec!(1000), Some(("AAA".to_string(), dec!(5))));
        let sell = StrategySignal::market("AAA", day(), SignalDirection::Sell, dec!(100))
            .with_quantity(dec!(50));
        match sim.execute(&sell, dec!(100), &state) {
            Execution::Filled(trade) => assert_eq!(trade.quantity, dec!(5)),
            other => panic!("expected fill, got {:?}", other),
        }
    }

    #[test]
    fn limit_buy_above_limit_is_not_marketable() {
        let sim = simulator();
        let state = state(dec!(100000), None);
        let mut buy = StrategySignal::market("AAA", day(), SignalDirection::Buy, dec!(100))
            .with_quantity(dec!(1));
        buy.order_kind = OrderKind::Limit;
        buy.limit_price = Some(dec!(100));
        // Fill would be 101 after slippage, above the 100 limit.
        match sim.execute(&buy, dec!(100), &state) {
            Execution::Rejected(reason) => assert_eq!(reason, RejectReason::NotMarketable),
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
