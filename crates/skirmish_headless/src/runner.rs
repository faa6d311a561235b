//! Single-mission runner.
//!
//! Drives a [`Simulation`] built from a [`Scenario`] until one faction is
//! left standing or the tick limit is reached, and condenses the result into
//! a serializable [`MissionReport`].

use std::fmt;

use serde::{Deserialize, Serialize};
use skirmish_core::error::GameError;
use skirmish_core::simulation::{FactionSummary, Simulation};
use tracing::{debug, info};

use crate::metrics::{FactionMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Ticks between progress log lines.
const PROGRESS_INTERVAL: u64 = 1_000;

/// Command-line overrides for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Replaces the scenario's tick limit.
    pub ticks: Option<u64>,
    /// Replaces the scenario's seed.
    pub seed: Option<u64>,
}

impl RunOptions {
    /// Seed to use for `scenario`.
    #[must_use]
    pub fn seed_for(&self, scenario: &Scenario) -> u64 {
        self.seed.unwrap_or(scenario.seed)
    }

    /// Tick limit to use for `scenario`.
    #[must_use]
    pub fn ticks_for(&self, scenario: &Scenario) -> u64 {
        self.ticks.unwrap_or(scenario.tick_limit)
    }
}

/// One faction's end state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionReport {
    /// Counts and balances at the end.
    pub summary: FactionSummary,
    /// Event tallies over the mission.
    pub metrics: FactionMetrics,
}

/// Outcome of one mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u64,
    /// Ticks simulated.
    pub ticks: u64,
    /// True when at most one faction survived.
    pub decided: bool,
    /// Name of the sole survivor of a decided mission.
    pub winner: Option<String>,
    /// Per-faction end state in faction order.
    pub factions: Vec<FactionReport>,
    /// Final simulation state hash.
    pub state_hash: u64,
}

impl MissionReport {
    /// Condense a finished simulation.
    ///
    /// # Errors
    ///
    /// Propagates [`GameError::FactionNotFound`] from the summaries.
    pub fn from_simulation(
        scenario: &str,
        seed: u64,
        sim: &Simulation,
        metrics: &MetricsCollector,
    ) -> Result<Self, GameError> {
        let factions = sim
            .factions()
            .iter()
            .map(|faction| {
                Ok(FactionReport {
                    summary: sim.summary(faction.id)?,
                    metrics: metrics.faction(faction.id),
                })
            })
            .collect::<Result<Vec<_>, GameError>>()?;

        let decided = sim.is_decided();
        let winner = if decided {
            factions
                .iter()
                .find(|f| !f.summary.eliminated)
                .map(|f| f.summary.name.clone())
        } else {
            None
        };

        Ok(Self {
            scenario: scenario.to_string(),
            seed,
            ticks: sim.current_tick(),
            decided,
            winner,
            factions,
            state_hash: sim.state_hash(),
        })
    }
}

impl fmt::Display for MissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario: {} (seed {})", self.scenario, self.seed)?;
        writeln!(f, "Ticks:    {}", self.ticks)?;
        match &self.winner {
            Some(name) => writeln!(f, "Winner:   {name}")?,
            None if self.decided => writeln!(f, "Winner:   none (all eliminated)")?,
            None => writeln!(f, "Winner:   undecided")?,
        }
        for report in &self.factions {
            let summary = &report.summary;
            writeln!(
                f,
                "\n[{}] {} ({:?}){}",
                summary.faction,
                summary.name,
                summary.controller,
                if summary.eliminated { " - eliminated" } else { "" }
            )?;
            let res = summary.resources;
            writeln!(
                f,
                "  resources: gold {} wood {} stone {} metal {}",
                res.gold, res.wood, res.stone, res.metal
            )?;
            writeln!(
                f,
                "  population: {}/{}",
                summary.population, summary.population_cap
            )?;
            if !summary.researched.is_empty() {
                writeln!(f, "  researched: {}", summary.researched.join(", "))?;
            }
            if let Some(priority) = summary.priority {
                writeln!(f, "  priority:  {priority:?}")?;
            }
            for (key, count) in &summary.units {
                writeln!(f, "  unit      {key:<12} x{count}")?;
            }
            for (key, count) in &summary.buildings {
                writeln!(f, "  building  {key:<12} x{count}")?;
            }
            let m = &report.metrics;
            writeln!(
                f,
                "  spawned {} lost {} buildings lost {} delivered {}",
                m.units_spawned, m.units_lost, m.buildings_lost, m.resources_delivered
            )?;
        }
        write!(f, "\nState hash: {:016x}", self.state_hash)
    }
}

/// Run one mission to completion.
///
/// # Errors
///
/// [`ScenarioError::InvalidScenario`] when the scenario cannot start.
pub fn run_mission(scenario: &Scenario, options: RunOptions) -> Result<MissionReport, ScenarioError> {
    let seed = options.seed_for(scenario);
    let limit = options.ticks_for(scenario);
    let span = tracing::info_span!("mission", scenario = %scenario.name, seed);
    let _enter = span.enter();

    let mut sim = Simulation::new(scenario.mission_setup(seed)?)?;
    let mut metrics = MetricsCollector::new();
    info!(limit, factions = sim.factions().len(), "Mission started");

    while sim.current_tick() < limit && !sim.is_decided() {
        let events = sim.tick();
        metrics.record(&events);
        if sim.current_tick() % PROGRESS_INTERVAL == 0 {
            debug!(
                tick = sim.current_tick(),
                surviving = sim.surviving_factions().len(),
                "Progress"
            );
        }
    }

    let report = MissionReport::from_simulation(&scenario.name, seed, &sim, &metrics)?;
    info!(
        ticks = report.ticks,
        winner = ?report.winner,
        state_hash = report.state_hash,
        "Mission finished"
    );
    Ok(report)
}
