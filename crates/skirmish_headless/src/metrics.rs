//! Mission metrics collection.
//!
//! Tallies the simulation's event stream per faction so reports can show
//! what happened during a mission, not only how it ended.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skirmish_core::components::TargetRef;
use skirmish_core::events::{SimEvent, TickEvents};
use skirmish_core::factions::FactionId;

/// Event counts for one faction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionMetrics {
    /// Agents that entered the world, production and spawns alike.
    pub units_spawned: u32,
    /// Own agents destroyed.
    pub units_lost: u32,
    /// Own buildings destroyed.
    pub buildings_lost: u32,
    /// Construction sites placed.
    pub constructions_started: u32,
    /// Construction sites finished.
    pub constructions_completed: u32,
    /// Resource units credited, all kinds together.
    pub resources_delivered: u64,
    /// Strategist priority switches.
    pub priority_changes: u32,
    /// Upgrades finished.
    pub upgrades_researched: u32,
    /// Tick of the first loss, if any.
    pub first_loss_tick: Option<u64>,
}

/// Per-faction tallies for a whole mission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsCollector {
    factions: BTreeMap<FactionId, FactionMetrics>,
}

impl MetricsCollector {
    /// Empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn faction_mut(&mut self, faction: FactionId) -> &mut FactionMetrics {
        self.factions.entry(faction).or_default()
    }

    /// Fold one tick's events into the tallies.
    pub fn record(&mut self, tick: &TickEvents) {
        for event in &tick.events {
            match event {
                SimEvent::Spawned { faction, .. } => self.faction_mut(*faction).units_spawned += 1,
                SimEvent::Destroyed {
                    entity, faction, ..
                } => {
                    let metrics = self.faction_mut(*faction);
                    match entity {
                        TargetRef::Agent(_) => metrics.units_lost += 1,
                        TargetRef::Building(_) => metrics.buildings_lost += 1,
                    }
                    metrics.first_loss_tick.get_or_insert(tick.tick);
                }
                SimEvent::ConstructionStarted { faction, .. } => {
                    self.faction_mut(*faction).constructions_started += 1;
                }
                SimEvent::ConstructionComplete { faction, .. } => {
                    self.faction_mut(*faction).constructions_completed += 1;
                }
                SimEvent::ResourcesDelivered {
                    faction, amount, ..
                } => self.faction_mut(*faction).resources_delivered += u64::from(*amount),
                SimEvent::PriorityChanged { faction, .. } => {
                    self.faction_mut(*faction).priority_changes += 1;
                }
                SimEvent::ResearchComplete { faction, .. } => {
                    self.faction_mut(*faction).upgrades_researched += 1;
                }
                SimEvent::Moved { .. }
                | SimEvent::BuildingPlaced { .. }
                | SimEvent::HealthChanged { .. }
                | SimEvent::UnitProduced { .. } => {}
            }
        }
    }

    /// Tallies for one faction.
    #[must_use]
    pub fn faction(&self, faction: FactionId) -> FactionMetrics {
        self.factions.get(&faction).cloned().unwrap_or_default()
    }

    /// Consume the collector into per-faction tallies.
    #[must_use]
    pub fn finish(self) -> BTreeMap<FactionId, FactionMetrics> {
        self.factions
    }
}
