use crate::engine::BacktestEngine;
use crate::models::{Bar, JobConfig, SweepOutcome, SweepTask, SweepTaskResult};
use crate::param_utils::parameter_signature;
use crate::provider::MarketDataProvider;
use crate::strategy::create_strategy;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Cartesian product over named candidate-value lists. Purely index-driven:
/// each `next` advances an odometer over the value lists, so the whole grid
/// never materializes in memory. An empty grid yields one empty combination.
pub struct ParameterGrid {
    names: Vec<String>,
    values: Vec<Vec<f64>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl ParameterGrid {
    pub fn new(grid: &HashMap<String, Vec<f64>>) -> Self {
        let mut names: Vec<String> = grid.keys().cloned().collect();
        names.sort();
        let values: Vec<Vec<f64>> = names.iter().map(|name| grid[name].clone()).collect();
        let exhausted = values.iter().any(|candidates| candidates.is_empty());
        Self {
            indices: vec![0; names.len()],
            names,
            values,
            exhausted,
        }
    }

    pub fn combination_count(&self) -> usize {
        if self.exhausted {
            return 0;
        }
        self.values.iter().map(Vec::len).product()
    }
}

impl Iterator for ParameterGrid {
    type Item = HashMap<String, f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let combination: HashMap<String, f64> = self
            .names
            .iter()
            .zip(&self.values)
            .zip(&self.indices)
            .map(|((name, candidates), &i)| (name.clone(), candidates[i]))
            .collect();

        // Odometer increment, least-significant position last.
        self.exhausted = true;
        for position in (0..self.indices.len()).rev() {
            self.indices[position] += 1;
            if self.indices[position] < self.values[position].len() {
                self.exhausted = false;
                break;
            }
            self.indices[position] = 0;
        }

        Some(combination)
    }
}

/// Score used to rank sweep outcomes: Sharpe when it is meaningful,
/// otherwise total return.
fn sweep_score(outcome: &SweepOutcome) -> f64 {
    if outcome.sharpe_ratio > 0.0 {
        outcome.sharpe_ratio
    } else {
        outcome.total_return_pct
    }
}

/// Sort outcomes best-first.
pub fn rank_outcomes(outcomes: &mut [SweepOutcome]) {
    outcomes.sort_by(|a, b| {
        sweep_score(b)
            .partial_cmp(&sweep_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Runs every grid combination as an independent backtest across a worker
/// pool. Workers share the loaded bars immutably; each combination gets a
/// fresh strategy, engine, and portfolio.
pub struct ParameterOptimizer {
    job: JobConfig,
    data: HashMap<String, Arc<Vec<Bar>>>,
    stop_flag: Arc<AtomicBool>,
}

impl ParameterOptimizer {
    pub fn new(job: JobConfig, provider: &mut MarketDataProvider) -> Result<Self> {
        let mut data = HashMap::new();
        for symbol in &job.symbols {
            match provider.get_bars(symbol, job.start_date, job.end_date) {
                Ok(bars) if bars.is_empty() => {
                    warn!("No bars for {} in range; symbol skipped", symbol);
                }
                Ok(bars) => {
                    data.insert(symbol.clone(), bars);
                }
                Err(err) => {
                    warn!("Failed to load {}: {}; symbol skipped", symbol, err);
                }
            }
        }
        if data.is_empty() {
            return Err(anyhow!("No market data for any symbol in the sweep"));
        }
        Ok(Self {
            job,
            data,
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_stop_flag(mut self, stop_flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = stop_flag;
        self
    }

    /// Run the full sweep and return outcomes ranked best-first.
    pub fn run(&self) -> Result<Vec<SweepOutcome>> {
        let grid = ParameterGrid::new(&self.job.parameter_grid);
        let combination_count = grid.combination_count();
        if combination_count == 0 {
            return Err(anyhow!("Parameter grid has an empty candidate list"));
        }
        info!(
            "Sweeping {} combination(s) of {:?}",
            combination_count,
            {
                let mut names: Vec<&String> = self.job.parameter_grid.keys().collect();
                names.sort();
                names
            }
        );

        let num_workers = std::cmp::min(combination_count, std::cmp::max(1, num_cpus::get()));
        info!("Using {} worker threads", num_workers);

        let (tx, rx): (Sender<SweepTask>, Receiver<SweepTask>) = bounded(combination_count);
        let (result_tx, result_rx): (Sender<SweepTaskResult>, Receiver<SweepTaskResult>) =
            bounded(combination_count);

        let mut handles = Vec::new();
        for _worker_id in 0..num_workers {
            let rx = rx.clone();
            let result_tx = result_tx.clone();
            let job = self.job.clone();
            let data = self.data.clone();

            let handle = thread::spawn(move || {
                while let Ok(task) = rx.recv() {
                    let start_time = Instant::now();
                    let result = Self::run_single_backtest(&job, &data, &task);
                    let duration = start_time.elapsed();

                    if let Some(outcome) = &result.outcome {
                        info!(
                            "Task {} done in {:.1}s. Sharpe: {:.4}, Return: {:.2}%, Max DD: {:.2}%, Trades: {}, Params: {}",
                            task.id,
                            duration.as_secs_f64(),
                            outcome.sharpe_ratio,
                            outcome.total_return_pct,
                            outcome.max_drawdown_pct,
                            outcome.total_trades,
                            parameter_signature(&task.parameters)
                        );
                    } else if let Some(error) = &result.error {
                        warn!(
                            "Task {} failed in {:.1}s: {}",
                            task.id,
                            duration.as_secs_f64(),
                            error
                        );
                    }

                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }

        let mut queued = 0usize;
        for (i, combination) in grid.enumerate() {
            // Cooperative stop, observed once per queued combination.
            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop requested; {} of {} combinations queued", queued, combination_count);
                break;
            }
            let mut parameters = self.job.parameters.clone();
            parameters.extend(combination);
            let task = SweepTask {
                id: format!("{}_{}", self.job.strategy, i),
                parameters,
            };
            tx.send(task)?;
            queued += 1;
        }
        drop(tx);

        let mut outcomes = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let pb = ProgressBar::new(queued as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        while completed < queued {
            match result_rx.recv_timeout(std::time::Duration::from_millis(200)) {
                Ok(result) => {
                    completed += 1;
                    pb.set_position(completed as u64);

                    if let Some(outcome) = result.outcome {
                        outcomes.push(outcome);
                    } else {
                        failed += 1;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("Result channel closed unexpectedly. Some results may be lost.");
                    break;
                }
            }
        }

        if failed > 0 {
            warn!("Sweep completed with {} failed combination(s)", failed);
            pb.finish_with_message("Sweep completed with errors");
        } else {
            pb.finish_with_message("Sweep completed");
        }

        for handle in handles {
            let _ = handle.join();
        }

        rank_outcomes(&mut outcomes);
        Ok(outcomes)
    }

    fn run_single_backtest(
        job: &JobConfig,
        data: &HashMap<String, Arc<Vec<Bar>>>,
        task: &SweepTask,
    ) -> SweepTaskResult {
        let mut strategy = match create_strategy(&job.strategy, task.parameters.clone()) {
            Ok(strategy) => strategy,
            Err(err) => {
                return SweepTaskResult {
                    task_id: task.id.clone(),
                    outcome: None,
                    error: Some(err.to_string()),
                };
            }
        };

        let mut run_config = job.clone();
        run_config.parameters = task.parameters.clone();
        let mut engine = BacktestEngine::new(run_config);

        match engine.run_loaded(strategy.as_mut(), data) {
            Ok(result) => SweepTaskResult {
                task_id: task.id.clone(),
                outcome: Some(SweepOutcome {
                    parameters: task.parameters.clone(),
                    sharpe_ratio: result.performance.sharpe_ratio,
                    total_return_pct: result.performance.total_return_pct,
                    max_drawdown_pct: result.performance.max_drawdown_pct,
                    win_rate: result.performance.win_rate,
                    profit_factor: result.performance.profit_factor,
                    total_trades: result.performance.total_trades,
                    final_value: result.final_value,
                }),
                error: None,
            },
            Err(err) => SweepTaskResult {
                task_id: task.id.clone(),
                outcome: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn grid_yields_the_full_cartesian_product() {
        let mut grid = HashMap::new();
        grid.insert("a".to_string(), vec![1.0, 2.0]);
        grid.insert("b".to_string(), vec![10.0, 20.0, 30.0]);

        let iter = ParameterGrid::new(&grid);
        assert_eq!(iter.combination_count(), 6);

        let combos: Vec<HashMap<String, f64>> = iter.collect();
        assert_eq!(combos.len(), 6);

        let signatures: std::collections::HashSet<String> =
            combos.iter().map(parameter_signature).collect();
        assert_eq!(signatures.len(), 6, "combinations must be distinct");
        for combo in &combos {
            assert!(combo.contains_key("a") && combo.contains_key("b"));
        }
    }

    #[test]
    fn empty_grid_yields_one_base_combination() {
        let grid = HashMap::new();
        let combos: Vec<HashMap<String, f64>> = ParameterGrid::new(&grid).collect();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
    }

    #[test]
    fn empty_candidate_list_yields_nothing() {
        let mut grid = HashMap::new();
        grid.insert("a".to_string(), Vec::new());
        let mut iter = ParameterGrid::new(&grid);
        assert_eq!(iter.combination_count(), 0);
        assert!(iter.next().is_none());
    }

    #[test]
    fn ranking_prefers_sharpe_and_falls_back_to_return() {
        let outcome = |sharpe: f64, ret: f64| SweepOutcome {
            parameters: HashMap::new(),
            sharpe_ratio: sharpe,
            total_return_pct: ret,
            max_drawdown_pct: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            total_trades: 0,
            final_value: dec!(100000),
        };

        let mut outcomes = vec![
            outcome(0.0, 0.5),
            outcome(1.2, 1.0),
            outcome(0.0, 0.9),
            outcome(2.5, -3.0),
        ];
        rank_outcomes(&mut outcomes);

        assert_eq!(outcomes[0].sharpe_ratio, 2.5);
        assert_eq!(outcomes[1].sharpe_ratio, 1.2);
        // Zero-Sharpe outcomes fall back to total return.
        assert_eq!(outcomes[2].total_return_pct, 0.9);
        assert_eq!(outcomes[3].total_return_pct, 0.5);
    }
}
