//! Headless mission runner for AI testing and CI verification.
//!
//! Loads a [`Scenario`] from RON, runs it without any presentation layer and
//! reports the outcome. This enables:
//!
//! - **Strategist testing**: computer factions play full missions unattended
//! - **Batch runs**: many seeds in parallel with aggregate win rates
//! - **CI verification**: replay a seed and compare state hashes
//!
//! Reports go to stdout (text or JSON); logs go to stderr.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario
//! cargo run -p skirmish_headless -- run --scenario scenarios/river_crossing.ron --json
//!
//! # Run 100 seeds
//! cargo run -p skirmish_headless -- batch --scenario skirmish_1v1 --count 100 --seed 1
//!
//! # Verify determinism
//! cargo run -p skirmish_headless -- verify --scenario skirmish_1v1 --seed 7 --runs 3
//! ```

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, BatchSummary, VerifyReport};
pub use metrics::{FactionMetrics, MetricsCollector};
pub use runner::{run_mission, FactionReport, MissionReport, RunOptions};
pub use scenario::{MapSource, Scenario, ScenarioError};
