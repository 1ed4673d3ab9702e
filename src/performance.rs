use crate::models::{EquityPoint, PerformanceSummary, Trade};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const RISK_FREE_RATE: f64 = 0.02;

struct DrawdownInfo {
    max_drawdown: Decimal,
    max_drawdown_pct: f64,
    max_duration_days: i64,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn summarize(
        trades: &[Trade],
        initial_capital: Decimal,
        final_value: Decimal,
        start_date: NaiveDate,
        end_date: NaiveDate,
        equity_curve: &[EquityPoint],
        daily_returns: &[f64],
    ) -> PerformanceSummary {
        let total_return = final_value - initial_capital;
        let total_return_pct = if initial_capital > Decimal::ZERO {
            (total_return / initial_capital).to_f64().unwrap_or(0.0) * 100.0
        } else {
            0.0
        };

        let annualized_return =
            Self::annualized_return(initial_capital, final_value, start_date, end_date);
        let volatility = Self::annualized_volatility(daily_returns);
        let sharpe_ratio = Self::sharpe_ratio(daily_returns);
        let sortino_ratio = Self::sortino_ratio(daily_returns);
        let drawdown = Self::max_drawdown(equity_curve);
        let calmar_ratio = Self::calmar_ratio(annualized_return, drawdown.max_drawdown_pct);

        // Win/loss statistics cover trades with crystallized P&L, i.e.
        // position reductions. Entries have no outcome yet.
        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut gross_profit = Decimal::ZERO;
        let mut gross_loss = Decimal::ZERO;
        for trade in trades {
            match trade.realized_pnl {
                Some(pnl) if pnl > Decimal::ZERO => {
                    winning_trades += 1;
                    gross_profit += pnl;
                }
                Some(pnl) if pnl < Decimal::ZERO => {
                    losing_trades += 1;
                    gross_loss += -pnl;
                }
                _ => {}
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };
        let profit_factor = if gross_loss > Decimal::ZERO {
            (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let avg_win = if winning_trades > 0 {
            (gross_profit / Decimal::from(winning_trades as u64))
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            (gross_loss / Decimal::from(losing_trades as u64))
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };

        PerformanceSummary {
            total_return,
            total_return_pct,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown: drawdown.max_drawdown,
            max_drawdown_pct: drawdown.max_drawdown_pct,
            max_drawdown_duration_days: drawdown.max_duration_days,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            total_commission: trades.iter().map(|t| t.commission).sum(),
            total_slippage: trades.iter().map(|t| t.slippage_cost).sum(),
        }
    }

    fn annualized_return(
        initial_capital: Decimal,
        final_value: Decimal,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> f64 {
        if initial_capital <= Decimal::ZERO || end_date <= start_date {
            return 0.0;
        }

        let years = (end_date - start_date).num_days() as f64 / 365.25;
        if years <= 0.0 {
            return 0.0;
        }

        let ratio = (final_value / initial_capital).to_f64().unwrap_or(0.0);
        if ratio <= 0.0 {
            return -1.0;
        }

        ratio.powf(1.0 / years) - 1.0
    }

    fn annualized_volatility(daily_returns: &[f64]) -> f64 {
        if daily_returns.len() < 2 {
            return 0.0;
        }
        daily_returns.std_dev() * TRADING_DAYS_PER_YEAR.sqrt()
    }

    /// Annualized Sharpe over daily returns; 0 when volatility is zero.
    pub fn sharpe_ratio(daily_returns: &[f64]) -> f64 {
        if daily_returns.len() < 2 {
            return 0.0;
        }

        let mean_return = daily_returns.mean();
        let std_dev = daily_returns.std_dev();
        if std_dev == 0.0 {
            return 0.0;
        }

        let daily_risk_free = RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;
        (mean_return - daily_risk_free) / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    }

    /// Like Sharpe but penalizing only downside deviation; 0 when there are
    /// no negative returns.
    pub fn sortino_ratio(daily_returns: &[f64]) -> f64 {
        if daily_returns.len() < 2 {
            return 0.0;
        }

        let negative: Vec<f64> = daily_returns.iter().copied().filter(|r| *r < 0.0).collect();
        if negative.is_empty() {
            return 0.0;
        }

        let downside_dev = negative.std_dev();
        if downside_dev == 0.0 || !downside_dev.is_finite() {
            return 0.0;
        }

        let mean_return = daily_returns.mean();
        let daily_risk_free = RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;
        (mean_return - daily_risk_free) / downside_dev * TRADING_DAYS_PER_YEAR.sqrt()
    }

    fn calmar_ratio(annualized_return: f64, max_drawdown_pct: f64) -> f64 {
        if !annualized_return.is_finite() || max_drawdown_pct <= 0.0 {
            return 0.0;
        }
        annualized_return / (max_drawdown_pct / 100.0)
    }

    /// Running-peak drawdown over the equity curve. Duration counts
    /// consecutive samples strictly below the running peak; touching the
    /// peak again ends the stretch.
    fn max_drawdown(equity_curve: &[EquityPoint]) -> DrawdownInfo {
        let mut info = DrawdownInfo {
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            max_duration_days: 0,
        };
        let Some(first) = equity_curve.first() else {
            return info;
        };

        let mut peak = first.total_value;
        let mut underwater_since: Option<NaiveDate> = None;

        for point in equity_curve {
            if point.total_value >= peak {
                if point.total_value > peak {
                    peak = point.total_value;
                }
                underwater_since = None;
                continue;
            }

            let drawdown = peak - point.total_value;
            if drawdown > info.max_drawdown {
                info.max_drawdown = drawdown;
                info.max_drawdown_pct = if peak > Decimal::ZERO {
                    (drawdown / peak).to_f64().unwrap_or(0.0) * 100.0
                } else {
                    0.0
                };
            }

            let since = *underwater_since.get_or_insert(point.date);
            let duration = (point.date - since).num_days() + 1;
            if duration > info.max_duration_days {
                info.max_duration_days = duration;
            }
        }

        info
    }
}
