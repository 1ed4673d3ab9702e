use crate::models::Bar;
use rust_decimal::prelude::ToPrimitive;

fn close_f64(bar: &Bar) -> f64 {
    bar.close.to_f64().unwrap_or(0.0)
}

/// Simple moving average of closes over the `period` bars ending at `index`.
/// Returns None when not enough history precedes `index`.
pub fn sma_at(bars: &[Bar], period: usize, index: usize) -> Option<f64> {
    if period == 0 || index >= bars.len() || index + 1 < period {
        return None;
    }

    let window = &bars[index + 1 - period..=index];
    let sum: f64 = window.iter().map(close_f64).sum();
    Some(sum / period as f64)
}

/// Wilder-smoothed RSI of closes at `index`. Needs `period + 1` bars of history.
pub fn rsi_at(bars: &[Bar], period: usize, index: usize) -> Option<f64> {
    if period == 0 || index >= bars.len() || index < period {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in index + 1 - period..=index {
        let change = close_f64(&bars[i]) - close_f64(&bars[i - 1]);
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let price = Decimal::from_f64(close).unwrap();
                Bar {
                    symbol: "TEST".to_string(),
                    date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                        + chrono::Days::new(i as u64),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: 1_000,
                }
            })
            .collect()
    }

    #[test]
    fn sma_averages_trailing_window() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(sma_at(&bars, 3, 4), Some(4.0));
        assert_eq!(sma_at(&bars, 3, 2), Some(2.0));
        assert_eq!(sma_at(&bars, 3, 1), None);
    }

    #[test]
    fn rsi_is_100_when_only_gains() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(rsi_at(&bars, 4, 4), Some(100.0));
    }

    #[test]
    fn rsi_is_50_for_symmetric_moves() {
        let bars = bars_from_closes(&[10.0, 11.0, 10.0, 11.0, 10.0]);
        let rsi = rsi_at(&bars, 4, 4).unwrap();
        assert!((rsi - 50.0).abs() < 1e-9);
    }
}
