use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tradesim::commands::{backtest, optimize, validate};

#[derive(Parser)]
#[command(name = "tradesim")]
#[command(about = "A trading strategy backtesting and optimization tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest described by a job file
    Backtest {
        /// Path to the JSON job file
        job: PathBuf,
        /// Path to the JSON market data file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// Write the full result as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep the job's parameter grid and rank the outcomes
    Optimize {
        /// Path to the JSON job file
        job: PathBuf,
        /// Path to the JSON market data file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// How many top outcomes to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Run the validation gates without simulating
    Validate {
        /// Path to the JSON job file
        job: PathBuf,
        /// Path to the JSON market data file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("Starting tradesim. Simulated results are not indicative of live performance.");

    match cli.command {
        Commands::Backtest {
            job,
            data_file,
            output,
        } => backtest::run(&job, &data_file, output.as_deref()),
        Commands::Optimize {
            job,
            data_file,
            top,
        } => optimize::run(&job, &data_file, top),
        Commands::Validate { job, data_file } => validate::run(&job, &data_file),
    }
}
