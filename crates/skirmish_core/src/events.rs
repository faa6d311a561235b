//! Events emitted for the presentation layer.
//!
//! The simulation never renders anything. Each tick returns a [`TickEvents`]
//! list the renderer can use to spawn visuals, move sprites, update health
//! bars and play destruction effects.

use serde::{Deserialize, Serialize};

use crate::catalog::{BuildingTypeId, UnitTypeId, UpgradeTypeId};
use crate::components::TargetRef;
use crate::economy::ResourceKind;
use crate::factions::FactionId;
use crate::math::Vec2Fixed;
use crate::storage::EntityId;
use crate::strategist::Priority;
use crate::terrain::CellPos;

/// Why an entity was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestructionCause {
    /// Killed by a mobile combat agent.
    Unit(EntityId),
    /// Killed by a defensive building.
    Tower(EntityId),
}

impl DestructionCause {
    /// Cause for a hit from `attacker`.
    #[must_use]
    pub const fn from_attacker(attacker: TargetRef) -> Self {
        match attacker {
            TargetRef::Agent(id) => Self::Unit(id),
            TargetRef::Building(id) => Self::Tower(id),
        }
    }
}

/// One observable change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    /// An agent entered the world.
    Spawned {
        /// The new agent.
        agent: EntityId,
        /// Owner.
        faction: FactionId,
        /// Unit type.
        unit_type: UnitTypeId,
        /// Spawn position.
        position: Vec2Fixed,
    },
    /// An agent changed position.
    Moved {
        /// The agent.
        agent: EntityId,
        /// New position.
        position: Vec2Fixed,
    },
    /// An entity took damage.
    HealthChanged {
        /// The entity.
        entity: TargetRef,
        /// Health after the hit.
        current: u32,
        /// Maximum health.
        max: u32,
    },
    /// An entity reached zero health. Fired exactly once per entity.
    Destroyed {
        /// The entity.
        entity: TargetRef,
        /// Owner.
        faction: FactionId,
        /// What killed it.
        cause: DestructionCause,
    },
    /// A complete building was placed directly, such as a starting
    /// headquarters.
    BuildingPlaced {
        /// The building.
        building: EntityId,
        /// Owner.
        faction: FactionId,
        /// Building type.
        building_type: BuildingTypeId,
        /// Top-left cell of the footprint.
        origin: CellPos,
    },
    /// A construction site was placed.
    ConstructionStarted {
        /// The site.
        building: EntityId,
        /// Owner.
        faction: FactionId,
        /// Building type.
        building_type: BuildingTypeId,
        /// Top-left cell of the footprint.
        origin: CellPos,
    },
    /// A construction site became operational.
    ConstructionComplete {
        /// The building.
        building: EntityId,
        /// Owner.
        faction: FactionId,
    },
    /// A factory finished a queued unit.
    UnitProduced {
        /// The factory.
        building: EntityId,
        /// The new agent.
        agent: EntityId,
        /// Unit type.
        unit_type: UnitTypeId,
    },
    /// A research building finished an upgrade.
    ResearchComplete {
        /// The lab.
        building: EntityId,
        /// Owner.
        faction: FactionId,
        /// The upgrade.
        upgrade: UpgradeTypeId,
    },
    /// A worker unloaded cargo at a storage building.
    ResourcesDelivered {
        /// The worker.
        agent: EntityId,
        /// Owner.
        faction: FactionId,
        /// Resource kind.
        kind: ResourceKind,
        /// Amount credited; cargo beyond the storage cap is lost.
        amount: u32,
    },
    /// A strategist switched priority.
    PriorityChanged {
        /// The faction.
        faction: FactionId,
        /// New priority.
        priority: Priority,
    },
}

/// Events generated during a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick the events belong to.
    pub tick: u64,
    /// Events in the order they happened.
    pub events: Vec<SimEvent>,
}

impl TickEvents {
    /// Empty event list for a tick.
    #[must_use]
    pub const fn new(tick: u64) -> Self {
        Self {
            tick,
            events: Vec::new(),
        }
    }

    /// Record an event.
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Iterate over destruction events.
    pub fn destroyed(&self) -> impl Iterator<Item = (TargetRef, DestructionCause)> + '_ {
        self.events.iter().filter_map(|event| match event {
            SimEvent::Destroyed { entity, cause, .. } => Some((*entity, *cause)),
            _ => None,
        })
    }
}
