//! Batch mission runner.
//!
//! Runs many seeds of one scenario in parallel using rayon and aggregates
//! the outcomes. Also hosts the determinism check, which replays one seed
//! several times and compares state hashes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::runner::{run_mission, MissionReport, RunOptions};
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of missions to run.
    pub count: u32,
    /// Seed of the first mission; mission `i` uses `seed_start + i`.
    pub seed_start: u64,
    /// Replaces the scenario's tick limit.
    pub ticks: Option<u64>,
    /// Worker threads (0 = rayon default).
    pub parallel: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 10,
            seed_start: 0,
            ticks: None,
            parallel: 0,
        }
    }
}

impl BatchConfig {
    /// Config for `count` missions.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    /// Set seed start.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the tick limit.
    #[must_use]
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = Some(ticks);
        self
    }
}

/// A mission that could not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Index within the batch.
    pub index: u32,
    /// Seed of the failed mission.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Aggregate statistics across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Missions that completed.
    pub total_games: u32,
    /// Missions won by each faction name.
    pub wins_by_faction: BTreeMap<String, u32>,
    /// Share of completed missions won by each faction name.
    pub win_rates: BTreeMap<String, f64>,
    /// Missions still undecided at the tick limit, or with no survivor.
    pub draws: u32,
    /// Average mission length.
    pub avg_ticks: f64,
    /// Shortest mission.
    pub min_ticks: u64,
    /// Longest mission.
    pub max_ticks: u64,
    /// Average resources delivered per mission by faction name.
    pub avg_resources_delivered: BTreeMap<String, f64>,
    /// Average units lost per mission by faction name.
    pub avg_units_lost: BTreeMap<String, f64>,
}

impl BatchSummary {
    /// Calculate the summary of a list of reports.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_games(games: &[MissionReport]) -> Self {
        if games.is_empty() {
            return Self::default();
        }

        let total = games.len() as f64;
        let mut summary = Self {
            total_games: u32::try_from(games.len()).unwrap_or(u32::MAX),
            min_ticks: u64::MAX,
            ..Default::default()
        };

        let mut tick_sum = 0u64;
        for game in games {
            tick_sum += game.ticks;
            summary.min_ticks = summary.min_ticks.min(game.ticks);
            summary.max_ticks = summary.max_ticks.max(game.ticks);

            match &game.winner {
                Some(name) => *summary.wins_by_faction.entry(name.clone()).or_insert(0) += 1,
                None => summary.draws += 1,
            }

            for faction in &game.factions {
                let name = &faction.summary.name;
                *summary
                    .avg_resources_delivered
                    .entry(name.clone())
                    .or_insert(0.0) += faction.metrics.resources_delivered as f64;
                *summary.avg_units_lost.entry(name.clone()).or_insert(0.0) +=
                    f64::from(faction.metrics.units_lost);
            }
        }

        summary.avg_ticks = tick_sum as f64 / total;
        for value in summary
            .avg_resources_delivered
            .values_mut()
            .chain(summary.avg_units_lost.values_mut())
        {
            *value /= total;
        }
        summary.win_rates = summary
            .wins_by_faction
            .iter()
            .map(|(name, wins)| (name.clone(), f64::from(*wins) / total))
            .collect();
        summary
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Scenario name.
    pub scenario: String,
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual mission reports, in seed order.
    pub games: Vec<MissionReport>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Missions that failed to start.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Run a batch of missions.
#[must_use]
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        scenario = %scenario.name,
        count = config.count,
        seed_start = config.seed_start,
        "Starting batch run"
    );

    let completed = AtomicU32::new(0);
    let run_one = |index: u32| {
        let seed = config.seed_start.wrapping_add(u64::from(index));
        let options = RunOptions {
            ticks: config.ticks,
            seed: Some(seed),
        };
        let result = run_mission(scenario, options).map_err(|e| {
            warn!(index, seed, error = %e, "Mission failed");
            BatchError {
                index,
                seed,
                message: e.to_string(),
            }
        });
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % 10 == 0 {
            debug!("Progress: {}/{}", done, config.count);
        }
        result
    };

    let results: Vec<Result<MissionReport, BatchError>> = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel)
            .build()
        {
            Ok(pool) => pool.install(|| (0..config.count).into_par_iter().map(run_one).collect()),
            Err(e) => {
                warn!(error = %e, "Thread pool unavailable, using the global pool");
                (0..config.count).into_par_iter().map(run_one).collect()
            }
        }
    } else {
        (0..config.count).into_par_iter().map(run_one).collect()
    };

    let mut games = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(report) => games.push(report),
            Err(e) => errors.push(e),
        }
    }

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        games = games.len(),
        failed = errors.len(),
        duration_secs = format!("{duration_seconds:.1}"),
        "Batch complete"
    );

    BatchResults {
        scenario: scenario.name.clone(),
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

// ============================================================================
// Determinism check
// ============================================================================

/// Hashes from replaying one seed several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Seed replayed.
    pub seed: u64,
    /// Ticks reached by the first run.
    pub ticks: u64,
    /// Final state hash of every run.
    pub hashes: Vec<u64>,
    /// True when every run produced the same hash.
    pub deterministic: bool,
}

/// Replay one seed `runs` times and compare final state hashes.
///
/// # Errors
///
/// [`ScenarioError::InvalidScenario`] when the scenario cannot start.
pub fn verify_determinism(
    scenario: &Scenario,
    seed: u64,
    runs: u32,
    ticks: Option<u64>,
) -> Result<VerifyReport, ScenarioError> {
    let options = RunOptions {
        ticks,
        seed: Some(seed),
    };
    let reports = (0..runs.max(1))
        .into_par_iter()
        .map(|_| run_mission(scenario, options))
        .collect::<Result<Vec<_>, ScenarioError>>()?;

    let hashes: Vec<u64> = reports.iter().map(|r| r.state_hash).collect();
    let deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    if !deterministic {
        warn!(seed, ?hashes, "Runs diverged");
    }

    Ok(VerifyReport {
        seed,
        ticks: reports.first().map_or(0, |r| r.ticks),
        hashes,
        deterministic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::FactionMetrics;
    use crate::runner::FactionReport;
    use skirmish_core::economy::ResourceBundle;
    use skirmish_core::factions::{Controller, FactionId};
    use skirmish_core::simulation::FactionSummary;

    fn report(ticks: u64, winner: Option<&str>, delivered: [u64; 2]) -> MissionReport {
        let factions = ["red", "blue"]
            .iter()
            .zip(delivered)
            .enumerate()
            .map(|(i, (name, delivered))| FactionReport {
                summary: FactionSummary {
                    faction: FactionId(i as u8),
                    name: (*name).to_string(),
                    controller: Controller::Computer,
                    units: BTreeMap::new(),
                    buildings: BTreeMap::new(),
                    resources: ResourceBundle::ZERO,
                    population: 0,
                    population_cap: 10,
                    researched: Vec::new(),
                    priority: None,
                    eliminated: winner.is_some_and(|w| w != *name),
                },
                metrics: FactionMetrics {
                    resources_delivered: delivered,
                    ..FactionMetrics::default()
                },
            })
            .collect();
        MissionReport {
            scenario: "test".into(),
            seed: 0,
            ticks,
            decided: winner.is_some(),
            winner: winner.map(str::to_string),
            factions,
            state_hash: 0,
        }
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new(500).with_seed(12345).with_ticks(90);
        assert_eq!(config.count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.ticks, Some(90));
    }

    #[test]
    fn test_summary_from_games() {
        let games = vec![
            report(100, Some("red"), [10, 0]),
            report(300, Some("red"), [20, 4]),
            report(200, None, [0, 8]),
        ];
        let summary = BatchSummary::from_games(&games);

        assert_eq!(summary.total_games, 3);
        assert_eq!(summary.wins_by_faction.get("red"), Some(&2));
        assert_eq!(summary.draws, 1);
        assert_eq!(summary.min_ticks, 100);
        assert_eq!(summary.max_ticks, 300);
        assert!((summary.avg_ticks - 200.0).abs() < f64::EPSILON);
        assert!((summary.win_rates["red"] - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.avg_resources_delivered["red"] - 10.0).abs() < 1e-9);
        assert!((summary.avg_resources_delivered["blue"] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(BatchSummary::from_games(&[]), BatchSummary::default());
    }

    #[test]
    fn test_run_batch_small() {
        let config = BatchConfig::new(4).with_seed(20).with_ticks(30);
        let results = run_batch(&Scenario::skirmish_1v1(), config);

        assert_eq!(results.games.len(), 4);
        assert!(results.errors.is_empty());
        let seeds: Vec<u64> = results.games.iter().map(|g| g.seed).collect();
        assert_eq!(seeds, vec![20, 21, 22, 23]);
        assert_eq!(results.summary.total_games, 4);
    }

    #[test]
    fn test_run_batch_with_own_pool() {
        let config = BatchConfig {
            parallel: 2,
            ..BatchConfig::new(2).with_ticks(10)
        };
        let results = run_batch(&Scenario::skirmish_1v1(), config);
        assert_eq!(results.games.len(), 2);
    }

    #[test]
    fn test_failed_missions_are_collected() {
        let scenario = Scenario {
            factions: Vec::new(),
            ..Scenario::skirmish_1v1()
        };
        let results = run_batch(&scenario, BatchConfig::new(3));
        assert!(results.games.is_empty());
        assert_eq!(results.errors.len(), 3);
        assert_eq!(results.errors[1].seed, 1);
    }

    #[test]
    fn test_verify_determinism() {
        let report = verify_determinism(&Scenario::skirmish_1v1(), 12345, 3, Some(150)).unwrap();
        assert!(report.deterministic);
        assert_eq!(report.hashes.len(), 3);
        assert_eq!(report.ticks, 150);
    }

    #[test]
    fn test_batch_results_save_load() {
        let results = run_batch(&Scenario::skirmish_1v1(), BatchConfig::new(2).with_ticks(5));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.games, results.games);
        assert_eq!(loaded.scenario, "Standard 1v1 Skirmish");
    }
}
