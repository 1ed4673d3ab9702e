use crate::commands::{load_job, load_provider};
use crate::optimizer::ParameterOptimizer;
use crate::param_utils::parameter_signature;
use anyhow::{ensure, Result};
use log::info;
use std::path::Path;

pub fn run(job_file: &Path, data_file: &Path, top: usize) -> Result<()> {
    let job = load_job(job_file)?;
    ensure!(
        !job.parameter_grid.is_empty(),
        "Job file has no parameterGrid to sweep"
    );
    info!(
        "Optimizing {} on {:?}, {} - {}",
        job.strategy, job.symbols, job.start_date, job.end_date
    );

    let mut provider = load_provider(data_file)?;
    let optimizer = ParameterOptimizer::new(job, &mut provider)?;
    let outcomes = optimizer.run()?;

    info!("Top {} of {} outcome(s):", top.min(outcomes.len()), outcomes.len());
    for (rank, outcome) in outcomes.iter().take(top).enumerate() {
        info!(
            "#{} Sharpe {:.4}, Return {:.2}%, Max DD {:.2}%, Win rate {:.1}%, Trades {}, Params {}",
            rank + 1,
            outcome.sharpe_ratio,
            outcome.total_return_pct,
            outcome.max_drawdown_pct,
            outcome.win_rate * 100.0,
            outcome.total_trades,
            parameter_signature(&outcome.parameters)
        );
    }

    Ok(())
}
