//! Headless skirmish runner.
//!
//! Runs missions without any presentation layer. Reports go to stdout,
//! logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run one mission
//! cargo run -p skirmish_headless -- run --scenario skirmish_1v1 --ticks 2000
//!
//! # Run a batch of seeds in parallel
//! cargo run -p skirmish_headless -- batch --scenario scenarios/glade_duel.ron --count 100 --seed 1
//!
//! # Check that a seed replays identically
//! cargo run -p skirmish_headless -- verify --scenario scenarios/glade_duel.ron --seed 7 --runs 3
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{run_mission, RunOptions},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish mission runner for AI testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single mission and print its report
    Run {
        /// Scenario file (RON), or `skirmish_1v1` for the built-in one
        #[arg(short, long)]
        scenario: String,

        /// Tick limit (defaults to the scenario's)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Random seed (defaults to the scenario's)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run many seeds in parallel and print aggregate results as JSON
    Batch {
        /// Scenario file (RON), or `skirmish_1v1` for the built-in one
        #[arg(short, long)]
        scenario: String,

        /// Number of missions to run
        #[arg(short, long, default_value = "10")]
        count: u32,

        /// First seed; mission i uses seed + i
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Tick limit per mission (defaults to the scenario's)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long, default_value = "0")]
        parallel: usize,

        /// Also write the full results to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay one seed several times and compare state hashes
    Verify {
        /// Scenario file (RON), or `skirmish_1v1` for the built-in one
        #[arg(short, long)]
        scenario: String,

        /// Seed to replay
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Number of runs to compare
        #[arg(short, long, default_value = "3")]
        runs: u32,

        /// Tick limit per run (defaults to the scenario's)
        #[arg(short, long)]
        ticks: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            ticks,
            seed,
            json,
        } => cmd_run(&scenario, RunOptions { ticks, seed }, json),
        Commands::Batch {
            scenario,
            count,
            seed,
            ticks,
            parallel,
            output,
        } => cmd_batch(
            &scenario,
            BatchConfig {
                count,
                seed_start: seed,
                ticks,
                parallel,
            },
            output,
        ),
        Commands::Verify {
            scenario,
            seed,
            runs,
            ticks,
        } => cmd_verify(&scenario, seed, runs, ticks),
    };

    match result {
        Ok(code) => code,
        Err(message) => {
            tracing::error!("{message}");
            eprintln!("FATAL: {message}");
            ExitCode::FAILURE
        }
    }
}

fn load_scenario(arg: &str) -> Result<Scenario, String> {
    Scenario::resolve(arg).map_err(|e| format!("{arg}: {e}"))
}

/// Run a single mission.
fn cmd_run(scenario: &str, options: RunOptions, json: bool) -> Result<ExitCode, String> {
    let scenario = load_scenario(scenario)?;
    let report = run_mission(&scenario, options).map_err(|e| e.to_string())?;

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        println!("{report}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Run a batch of missions.
fn cmd_batch(
    scenario: &str,
    config: BatchConfig,
    output: Option<PathBuf>,
) -> Result<ExitCode, String> {
    let scenario = load_scenario(scenario)?;
    let results = run_batch(&scenario, config);

    if let Some(path) = output {
        results
            .save(&path)
            .map_err(|e| format!("failed to save results to {}: {e}", path.display()))?;
        tracing::info!(path = %path.display(), "Results saved");
    }

    let text = serde_json::to_string_pretty(&results.summary).map_err(|e| e.to_string())?;
    println!("{text}");

    if !results.errors.is_empty() {
        eprintln!("{} of {} missions failed", results.errors.len(), config.count);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Replay one seed and compare hashes.
fn cmd_verify(scenario: &str, seed: u64, runs: u32, ticks: Option<u64>) -> Result<ExitCode, String> {
    let scenario = load_scenario(scenario)?;
    tracing::info!(seed, runs, "Verifying determinism");

    let report = verify_determinism(&scenario, seed, runs, ticks).map_err(|e| e.to_string())?;

    if report.deterministic {
        println!(
            "PASS: {} runs of seed {} agree after {} ticks (hash {:016x})",
            report.hashes.len(),
            report.seed,
            report.ticks,
            report.hashes.first().copied().unwrap_or_default()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!("FAIL: seed {} diverged: {:016x?}", report.seed, report.hashes);
        Ok(ExitCode::FAILURE)
    }
}
