use crate::commands::{load_job, load_provider};
use crate::engine::BacktestEngine;
use crate::strategy::create_strategy;
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

pub fn run(job_file: &Path, data_file: &Path, output: Option<&Path>) -> Result<()> {
    let job = load_job(job_file)?;
    info!(
        "Backtesting {} on {:?}, {} - {}",
        job.strategy, job.symbols, job.start_date, job.end_date
    );

    let mut provider = load_provider(data_file)?;
    let mut strategy = create_strategy(&job.strategy, job.parameters.clone())?;
    let mut engine = BacktestEngine::new(job);
    let result = engine.run(strategy.as_mut(), &mut provider)?;

    let perf = &result.performance;
    info!(
        "Final value: {:.2} ({:+.2}%)",
        result.final_value, perf.total_return_pct
    );
    info!(
        "Sharpe: {:.4}, Sortino: {:.4}, Calmar: {:.4}, Volatility: {:.4}",
        perf.sharpe_ratio, perf.sortino_ratio, perf.calmar_ratio, perf.volatility
    );
    info!(
        "Max drawdown: {:.2}% over {} day(s)",
        perf.max_drawdown_pct, perf.max_drawdown_duration_days
    );
    info!(
        "Trades: {} ({} wins / {} losses, win rate {:.1}%, profit factor {:.2})",
        perf.total_trades,
        perf.winning_trades,
        perf.losing_trades,
        perf.win_rate * 100.0,
        perf.profit_factor
    );

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write result to {}", path.display()))?;
        info!("Result written to {}", path.display());
    }

    Ok(())
}
