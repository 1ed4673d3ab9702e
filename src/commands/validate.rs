use crate::commands::{load_job, load_provider};
use crate::models::StrategyConfig;
use crate::strategy::create_strategy;
use crate::validator::StrategyValidator;
use anyhow::Result;
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::Path;

pub fn run(job_file: &Path, data_file: &Path) -> Result<()> {
    let job = load_job(job_file)?;
    let mut provider = load_provider(data_file)?;

    let mut data = HashMap::new();
    for symbol in &job.symbols {
        match provider.get_bars(symbol, job.start_date, job.end_date) {
            Ok(bars) if !bars.is_empty() => {
                data.insert(symbol.clone(), bars.as_ref().clone());
            }
            Ok(_) => warn!("No bars for {} in range", symbol),
            Err(err) => warn!("Failed to load {}: {}", symbol, err),
        }
    }

    let config = StrategyConfig::from_parameters(&job.strategy, &job.parameters);
    let mut strategy = create_strategy(&job.strategy, job.parameters.clone())?;

    match StrategyValidator::validate_all(strategy.as_mut(), &config, &data) {
        Ok(()) => {
            info!("{} passed all validation gates", job.strategy);
            Ok(())
        }
        Err(err) => {
            for issue in &err.issues {
                error!("{}", issue);
            }
            Err(err.into())
        }
    }
}
