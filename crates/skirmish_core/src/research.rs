//! Research: lab queues and completed upgrades.
//!
//! A research building owns a bounded [`ResearchQueue`]. As with unit
//! production, the cost is debited when an upgrade is queued and only the
//! head item progresses. A finished upgrade is recorded in the faction's
//! [`ResearchState`], which also holds the accumulated effects the rest of
//! the simulation reads (currently the per-cycle gather bonus).

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, UpgradeType, UpgradeTypeId};
use crate::data::UpgradeEffect;
use crate::economy::{ResourceBundle, ResourceKind};
use crate::error::{GameError, Result};
use crate::factions::Faction;
use crate::production::ProductionError;
use crate::storage::EntityId;

/// An upgrade being researched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResearchItem {
    /// The upgrade.
    pub upgrade: UpgradeTypeId,
    /// Ticks of work done.
    pub progress: u32,
    /// Ticks required.
    pub total_time: u32,
}

impl ResearchItem {
    /// Check if research is complete.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress >= self.total_time
    }
}

/// Bounded FIFO of upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResearchQueue {
    queue: VecDeque<ResearchItem>,
    max_queue_size: usize,
}

impl ResearchQueue {
    /// Create a queue holding at most `max_queue_size` upgrades.
    #[must_use]
    pub fn with_max_size(max_queue_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_queue_size,
        }
    }

    /// Maximum number of upgrades.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_queue_size
    }

    /// Check if the queue is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.max_queue_size
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued upgrades.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Upgrades in queue order.
    pub fn items(&self) -> impl Iterator<Item = &ResearchItem> {
        self.queue.iter()
    }

    /// True if `upgrade` is queued here.
    #[must_use]
    pub fn contains(&self, upgrade: UpgradeTypeId) -> bool {
        self.queue.iter().any(|item| item.upgrade == upgrade)
    }

    /// Append an upgrade. Returns `Err` if the queue is full.
    pub fn add(
        &mut self,
        upgrade: UpgradeTypeId,
        research_ticks: u32,
    ) -> std::result::Result<(), ProductionError> {
        if self.is_full() {
            return Err(ProductionError::QueueFull);
        }
        self.queue.push_back(ResearchItem {
            upgrade,
            progress: 0,
            total_time: research_ticks,
        });
        Ok(())
    }

    /// The upgrade being researched.
    #[must_use]
    pub fn current(&self) -> Option<&ResearchItem> {
        self.queue.front()
    }

    /// Advance the head item by one tick and pop it once complete.
    pub fn advance(&mut self) -> Option<UpgradeTypeId> {
        let item = self.queue.front_mut()?;
        item.progress = (item.progress + 1).min(item.total_time);
        if item.is_complete() {
            return self.queue.pop_front().map(|item| item.upgrade);
        }
        None
    }
}

/// Upgrades a faction has finished and their accumulated effects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResearchState {
    completed: BTreeSet<UpgradeTypeId>,
    gather_bonus: ResourceBundle,
}

impl ResearchState {
    /// True once `upgrade` has finished.
    #[must_use]
    pub fn is_researched(&self, upgrade: UpgradeTypeId) -> bool {
        self.completed.contains(&upgrade)
    }

    /// Finished upgrades in id order.
    pub fn completed(&self) -> impl Iterator<Item = UpgradeTypeId> + '_ {
        self.completed.iter().copied()
    }

    /// Extra units gathered per cycle, per kind.
    #[must_use]
    pub const fn gather_bonus(&self) -> ResourceBundle {
        self.gather_bonus
    }

    /// Units a worker takes from a deposit of `kind` per gather cycle.
    #[must_use]
    pub const fn gather_amount(&self, kind: ResourceKind) -> u32 {
        kind.gather_amount() + self.gather_bonus.get(kind)
    }

    /// True when every prerequisite of `upgrade_type` has finished.
    #[must_use]
    pub fn prerequisites_met(&self, upgrade_type: &UpgradeType) -> bool {
        upgrade_type
            .prerequisites
            .iter()
            .all(|id| self.is_researched(*id))
    }

    /// Record a finished upgrade and apply its effect. Returns `false` if it
    /// was already recorded.
    pub fn complete(&mut self, upgrade: UpgradeTypeId, upgrade_type: &UpgradeType) -> bool {
        if !self.completed.insert(upgrade) {
            return false;
        }
        match upgrade_type.effect {
            UpgradeEffect::GatherBonus { kind, extra } => {
                let mut bonus = ResourceBundle::ZERO;
                match kind {
                    ResourceKind::Gold => bonus.gold = extra,
                    ResourceKind::Wood => bonus.wood = extra,
                    ResourceKind::Stone => bonus.stone = extra,
                    ResourceKind::Metal => bonus.metal = extra,
                }
                self.gather_bonus = self.gather_bonus.saturating_add(&bonus);
            }
        }
        true
    }
}

/// Queue an upgrade at one of the faction's research buildings.
///
/// Every check runs before the debit: the building must exist, be
/// operational and research upgrades; the upgrade must be neither finished
/// nor queued at any lab of the faction; its prerequisites must be done and
/// the queue must have room.
pub fn enqueue_research(
    faction: &mut Faction,
    catalog: &Catalog,
    lab: EntityId,
    upgrade: UpgradeTypeId,
) -> Result<()> {
    let upgrade_type = catalog
        .upgrade(upgrade)
        .ok_or_else(|| GameError::UnknownType(format!("upgrade {}", upgrade.0)))?;
    let building = faction
        .buildings
        .get(lab)
        .filter(|b| b.health.is_alive())
        .ok_or(ProductionError::UnknownBuilding(lab))?;
    if !building.is_operational() {
        return Err(ProductionError::NotOperational.into());
    }
    if !catalog
        .building(building.building_type)
        .is_some_and(|t| t.researches())
    {
        return Err(ProductionError::CannotProduce.into());
    }
    if faction.research.is_researched(upgrade) || faction.is_research_pending(upgrade) {
        return Err(ProductionError::AlreadyResearched.into());
    }
    if !faction.research.prerequisites_met(upgrade_type) {
        return Err(ProductionError::MissingPrerequisite.into());
    }
    if building.research.is_full() {
        return Err(ProductionError::QueueFull.into());
    }
    faction
        .ledger
        .spend(&upgrade_type.cost)
        .map_err(ProductionError::from)?;

    let Some(building) = faction.buildings.get_mut(lab) else {
        return Err(ProductionError::UnknownBuilding(lab).into());
    };
    building.research.add(upgrade, upgrade_type.research_ticks)?;
    tracing::debug!(
        faction = %faction.id,
        lab = %lab,
        upgrade = %upgrade_type.key,
        queued = building.research.len(),
        "Research queued"
    );
    Ok(())
}
