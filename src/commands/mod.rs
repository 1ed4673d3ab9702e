pub mod backtest;
pub mod optimize;
pub mod validate;

use crate::models::JobConfig;
use crate::provider::{InMemoryStore, MarketDataProvider};
use anyhow::{Context, Result};
use std::path::Path;

pub(crate) fn load_job(path: &Path) -> Result<JobConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse job file {}", path.display()))
}

pub(crate) fn load_provider(data_file: &Path) -> Result<MarketDataProvider> {
    let store = InMemoryStore::load_from_file(data_file)?;
    Ok(MarketDataProvider::new(Box::new(store)))
}
