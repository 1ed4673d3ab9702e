use crate::models::Bar;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Source of historical bars. Implementations return bars for one symbol
/// sorted by date ascending, restricted to the requested window.
pub trait HistoricalDataStore {
    fn query(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>>;
    fn symbols(&self) -> Vec<String>;
}

/// Store backed by bars already in memory, keyed by symbol.
pub struct InMemoryStore {
    bars_by_symbol: HashMap<String, Vec<Bar>>,
}

impl InMemoryStore {
    pub fn new(mut bars_by_symbol: HashMap<String, Vec<Bar>>) -> Self {
        for bars in bars_by_symbol.values_mut() {
            bars.sort_by_key(|bar| bar.date);
        }
        Self { bars_by_symbol }
    }

    /// Load a JSON snapshot file containing a flat array of bars.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read market data file {}", path.display()))?;
        let all_bars: Vec<Bar> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse market data file {}", path.display()))?;

        let mut bars_by_symbol: HashMap<String, Vec<Bar>> = HashMap::new();
        for bar in all_bars {
            bars_by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }

        info!(
            "Loaded market data for {} symbol(s) from {}",
            bars_by_symbol.len(),
            path.display()
        );
        Ok(Self::new(bars_by_symbol))
    }
}

impl HistoricalDataStore for InMemoryStore {
    fn query(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        let bars = self
            .bars_by_symbol
            .get(symbol)
            .ok_or_else(|| anyhow!("No market data for symbol {}", symbol))?;

        // Bars are date-sorted, so the window is a contiguous slice.
        let from = bars.partition_point(|bar| bar.date < start);
        let to = bars.partition_point(|bar| bar.date <= end);
        Ok(bars[from..to].to_vec())
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.bars_by_symbol.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Caching facade over a store. Each provider instance owns its cache,
/// keyed by (symbol, start, end), so concurrent backtests never share
/// mutable state.
pub struct MarketDataProvider {
    store: Box<dyn HistoricalDataStore + Send + Sync>,
    cache: HashMap<(String, NaiveDate, NaiveDate), Arc<Vec<Bar>>>,
}

impl MarketDataProvider {
    pub fn new(store: Box<dyn HistoricalDataStore + Send + Sync>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// Fetch bars for one symbol over a date window, serving repeats from
    /// the cache. Returned bars are shared, never copied per call.
    pub fn get_bars(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Arc<Vec<Bar>>> {
        let key = (symbol.to_string(), start, end);
        if let Some(bars) = self.cache.get(&key) {
            debug!("Cache hit for {} {} - {}", symbol, start, end);
            return Ok(Arc::clone(bars));
        }

        let bars = Arc::new(self.store.query(symbol, start, end)?);
        self.cache.insert(key, Arc::clone(&bars));
        Ok(bars)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.store.symbols()
    }

    #[cfg(test)]
    pub fn cached_window_count(&self) -> usize {
        self.cache.len()
    }
}
