//! Read-only snapshot of every live entity.
//!
//! Systems that scan other entities (agent updates, tower scans, memory
//! refresh) read a [`Snapshot`] captured at the start of their phase instead
//! of the live arenas, so mutation during the phase never changes what later
//! entities observe.

use std::collections::BTreeMap;

use crate::buildings::Footprint;
use crate::catalog::{BuildingTypeId, UnitTypeId};
use crate::components::TargetRef;
use crate::data::{BuildingRole, UnitRole};
use crate::economy::DepositField;
use crate::factions::{Faction, FactionId};
use crate::math::{Fixed, Vec2Fixed};
use crate::pathfinding::ObstacleSet;
use crate::storage::EntityId;
use crate::terrain::CellPos;

/// Observable state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentView {
    /// Handle.
    pub id: EntityId,
    /// Owner.
    pub faction: FactionId,
    /// Unit type.
    pub unit_type: UnitTypeId,
    /// Behavioural role.
    pub role: UnitRole,
    /// World position.
    pub position: Vec2Fixed,
    /// Current health.
    pub health: u32,
}

impl AgentView {
    /// Cell the agent stands on.
    #[must_use]
    pub fn cell(&self) -> CellPos {
        CellPos::from_world(self.position)
    }

    /// True for armed, fighting units.
    #[must_use]
    pub fn is_combatant(&self) -> bool {
        self.role == UnitRole::Combat
    }
}

/// Observable state of a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingView {
    /// Handle.
    pub id: EntityId,
    /// Owner.
    pub faction: FactionId,
    /// Building type.
    pub building_type: BuildingTypeId,
    /// Occupied cells.
    pub footprint: Footprint,
    /// Functional role.
    pub role: BuildingRole,
    /// Marks a headquarters.
    pub headquarters: bool,
    /// Construction finished and not destroyed.
    pub operational: bool,
    /// Current health.
    pub health: u32,
}

impl BuildingView {
    /// True for operational storage buildings.
    #[must_use]
    pub fn accepts_delivery(&self) -> bool {
        self.operational && self.role == BuildingRole::Storage
    }
}

/// Every live agent and building plus the static obstacle set.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    agents: BTreeMap<EntityId, AgentView>,
    buildings: BTreeMap<EntityId, BuildingView>,
    obstacles: ObstacleSet,
}

impl Snapshot {
    /// Capture the current state of all factions.
    ///
    /// Building footprints and non-depleted deposits become path obstacles.
    /// Agents never block paths.
    #[must_use]
    pub fn capture(factions: &[Faction], deposits: &DepositField) -> Self {
        let mut snapshot = Self::default();

        for faction in factions {
            for agent in faction.agents.values() {
                if agent.health.is_dead() {
                    continue;
                }
                snapshot.agents.insert(
                    agent.id,
                    AgentView {
                        id: agent.id,
                        faction: faction.id,
                        unit_type: agent.unit_type,
                        role: agent.role(),
                        position: agent.position,
                        health: agent.health.current,
                    },
                );
            }
            for building in faction.buildings.values() {
                if building.health.is_dead() {
                    continue;
                }
                snapshot.obstacles.extend(building.footprint.cells());
                snapshot.buildings.insert(
                    building.id,
                    BuildingView {
                        id: building.id,
                        faction: faction.id,
                        building_type: building.building_type,
                        footprint: building.footprint,
                        role: building.role,
                        headquarters: building.headquarters,
                        operational: building.is_operational(),
                        health: building.health.current,
                    },
                );
            }
        }

        snapshot.obstacles.extend(
            deposits
                .values()
                .filter(|deposit| !deposit.is_depleted())
                .map(|deposit| deposit.cell),
        );
        snapshot
    }

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&AgentView> {
        self.agents.get(&id)
    }

    /// Look up a building.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&BuildingView> {
        self.buildings.get(&id)
    }

    /// All agents in handle order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentView> {
        self.agents.values()
    }

    /// All buildings in handle order.
    pub fn buildings(&self) -> impl Iterator<Item = &BuildingView> {
        self.buildings.values()
    }

    /// Cells blocked for pathfinding.
    #[must_use]
    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    /// Obstacles plus every cell an agent stands on.
    #[must_use]
    pub fn occupied_cells(&self) -> ObstacleSet {
        let mut occupied = self.obstacles.clone();
        occupied.extend(self.agents.values().map(AgentView::cell));
        occupied
    }

    /// True if the referenced entity was alive when the snapshot was taken.
    #[must_use]
    pub fn is_alive(&self, target: TargetRef) -> bool {
        match target {
            TargetRef::Agent(id) => self.agents.contains_key(&id),
            TargetRef::Building(id) => self.buildings.contains_key(&id),
        }
    }

    /// Owner of the referenced entity.
    #[must_use]
    pub fn faction_of(&self, target: TargetRef) -> Option<FactionId> {
        match target {
            TargetRef::Agent(id) => self.agent(id).map(|a| a.faction),
            TargetRef::Building(id) => self.building(id).map(|b| b.faction),
        }
    }

    /// Agent position or building centre.
    #[must_use]
    pub fn target_position(&self, target: TargetRef) -> Option<Vec2Fixed> {
        match target {
            TargetRef::Agent(id) => self.agent(id).map(|a| a.position),
            TargetRef::Building(id) => self.building(id).map(|b| b.footprint.center()),
        }
    }

    /// Squared distance from `from` to the target; for buildings, to the
    /// nearest point of the footprint.
    #[must_use]
    pub fn distance_squared_to(&self, target: TargetRef, from: Vec2Fixed) -> Option<Fixed> {
        match target {
            TargetRef::Agent(id) => self.agent(id).map(|a| a.position.distance_squared(from)),
            TargetRef::Building(id) => self
                .building(id)
                .map(|b| b.footprint.distance_squared_to(from)),
        }
    }

    /// Combat agents of `faction` within `radius` of `point`.
    #[must_use]
    pub fn count_combatants_near(
        &self,
        faction: FactionId,
        point: Vec2Fixed,
        radius: Fixed,
        exclude: Option<EntityId>,
    ) -> usize {
        self.agents
            .values()
            .filter(|a| a.faction == faction && a.is_combatant())
            .filter(|a| Some(a.id) != exclude)
            .filter(|a| a.position.within(point, radius))
            .count()
    }

    /// Combat agents of every other faction within `radius` of `point`.
    #[must_use]
    pub fn count_enemy_combatants_near(
        &self,
        faction: FactionId,
        point: Vec2Fixed,
        radius: Fixed,
    ) -> usize {
        self.agents
            .values()
            .filter(|a| a.faction != faction && a.is_combatant())
            .filter(|a| a.position.within(point, radius))
            .count()
    }

    /// Closest enemy agent within `radius`; ties go to the lower handle.
    #[must_use]
    pub fn nearest_enemy_agent(
        &self,
        faction: FactionId,
        point: Vec2Fixed,
        radius: Fixed,
    ) -> Option<&AgentView> {
        let limit = radius.saturating_mul(radius);
        self.agents
            .values()
            .filter(|a| a.faction != faction)
            .map(|a| (a.position.distance_squared(point), a))
            .filter(|(d, _)| *d <= limit)
            .min_by_key(|(d, a)| (*d, a.id))
            .map(|(_, a)| a)
    }

    /// Closest operational storage building of `faction`.
    #[must_use]
    pub fn nearest_storage(&self, faction: FactionId, point: Vec2Fixed) -> Option<&BuildingView> {
        self.buildings
            .values()
            .filter(|b| b.faction == faction && b.accepts_delivery())
            .min_by_key(|b| (b.footprint.distance_squared_to(point), b.id))
    }
}
