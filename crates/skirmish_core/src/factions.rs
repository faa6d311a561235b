//! Factions and their owned collections.
//!
//! Each faction owns its ledger, agents, buildings and research. Nothing
//! outside the faction mutates them except combat resolution applying hits.
//!
//! Resource caps and the population cap are derived from the operational
//! buildings by [`Faction::refresh_limits`]; a faction that never had its
//! limits refreshed is uncapped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::buildings::{Building, Footprint};
use crate::catalog::{BuildingType, BuildingTypeId, Catalog, UnitType, UnitTypeId, UpgradeTypeId};
use crate::config::SimConfig;
use crate::data::{BuildingRole, UnitRole};
use crate::economy::{ResourceLedger, Shortfall};
use crate::events::SimEvent;
use crate::memory::VisionCircle;
use crate::production::Population;
use crate::research::ResearchState;
use crate::storage::{Arena, EntityId};
use crate::strategist::Strategist;
use crate::terrain::CellPos;

/// Unique identifier for factions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct FactionId(pub u8);

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "faction{}", self.0)
    }
}

/// Who gives the faction its orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Controller {
    /// Orders arrive through the command surface.
    #[default]
    Human,
    /// A strategist runs the faction.
    Computer,
}

/// A participant in the mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faction {
    /// Identifier.
    pub id: FactionId,
    /// Display name.
    pub name: String,
    /// Order source.
    pub controller: Controller,
    /// Resource balances.
    pub ledger: ResourceLedger,
    /// Mobile agents.
    pub agents: Arena<Agent>,
    /// Buildings, including construction sites.
    pub buildings: Arena<Building>,
    /// Base origin; construction sites are searched around it.
    pub base: CellPos,
    /// Decision loop of a computer-controlled faction.
    pub strategist: Option<Strategist>,
    /// Finished upgrades.
    #[serde(default)]
    pub research: ResearchState,
    /// Maximum living agents plus queued unit orders.
    pub population_cap: usize,
}

impl Faction {
    /// Create a faction with empty collections.
    #[must_use]
    pub fn new(
        id: FactionId,
        name: impl Into<String>,
        controller: Controller,
        ledger: ResourceLedger,
        base: CellPos,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            controller,
            ledger,
            agents: Arena::new(),
            buildings: Arena::new(),
            base,
            strategist: None,
            research: ResearchState::default(),
            population_cap: usize::MAX,
        }
    }

    /// Place a new agent on the centre of `cell`.
    pub fn spawn_agent(
        &mut self,
        id: EntityId,
        type_id: UnitTypeId,
        unit_type: &UnitType,
        cell: CellPos,
    ) -> SimEvent {
        let position = cell.center();
        self.agents
            .insert(id, Agent::new(id, self.id, type_id, unit_type, position));
        SimEvent::Spawned {
            agent: id,
            faction: self.id,
            unit_type: type_id,
            position,
        }
    }

    /// Pay for and place a construction site.
    ///
    /// Nothing is debited or placed when the ledger cannot cover the cost.
    pub fn start_construction(
        &mut self,
        id: EntityId,
        type_id: BuildingTypeId,
        building_type: &BuildingType,
        footprint: Footprint,
    ) -> Result<SimEvent, Shortfall> {
        self.ledger.spend(&building_type.cost)?;
        self.buildings.insert(
            id,
            Building::under_construction(id, self.id, type_id, building_type, footprint),
        );
        tracing::debug!(faction = %self.id, building = %id, key = %building_type.key, origin = %footprint.origin, "Construction started");
        Ok(SimEvent::ConstructionStarted {
            building: id,
            faction: self.id,
            building_type: type_id,
            origin: footprint.origin,
        })
    }

    /// Living agents of one type.
    #[must_use]
    pub fn count_units(&self, unit_type: UnitTypeId) -> usize {
        self.agents
            .values()
            .filter(|a| a.unit_type == unit_type && a.health.is_alive())
            .count()
    }

    /// Living agents of one role.
    #[must_use]
    pub fn count_role(&self, role: UnitRole) -> usize {
        self.agents
            .values()
            .filter(|a| a.role() == role && a.health.is_alive())
            .count()
    }

    /// Buildings of one type, construction sites included.
    #[must_use]
    pub fn count_buildings(&self, building_type: BuildingTypeId) -> usize {
        self.buildings
            .values()
            .filter(|b| b.building_type == building_type && b.health.is_alive())
            .count()
    }

    /// Buildings of one role, construction sites included.
    #[must_use]
    pub fn count_building_role(&self, role: BuildingRole) -> usize {
        self.buildings
            .values()
            .filter(|b| b.role == role && b.health.is_alive())
            .count()
    }

    /// Vision circles of every living agent and building.
    #[must_use]
    pub fn vision(&self) -> Vec<VisionCircle> {
        let agents = self
            .agents
            .values()
            .filter(|a| a.health.is_alive())
            .map(|a| VisionCircle::new(a.position, a.vision));
        let buildings = self
            .buildings
            .values()
            .filter(|b| b.health.is_alive())
            .map(|b| VisionCircle::new(b.footprint.center(), b.vision));
        agents.chain(buildings).collect()
    }

    /// True once the faction has neither agents nor buildings.
    #[must_use]
    pub fn is_eliminated(&self) -> bool {
        self.agents.is_empty() && self.buildings.is_empty()
    }

    /// Current population usage against the cap.
    #[must_use]
    pub fn population(&self) -> Population {
        let living = self.agents.values().filter(|a| a.health.is_alive()).count();
        let queued: usize = self
            .buildings
            .values()
            .filter(|b| b.health.is_alive())
            .map(|b| b.queue.len())
            .sum();
        Population::new(living + queued, self.population_cap)
    }

    /// True if `upgrade` waits in any of the faction's research queues.
    #[must_use]
    pub fn is_research_pending(&self, upgrade: UpgradeTypeId) -> bool {
        self.buildings
            .values()
            .any(|b| b.health.is_alive() && b.research.contains(upgrade))
    }

    /// Recompute resource and population caps from operational buildings.
    ///
    /// Construction sites and destroyed buildings contribute nothing.
    pub fn refresh_limits(&mut self, catalog: &Catalog, config: &SimConfig) {
        let mut caps = config.base_resource_caps;
        let mut population = config.base_population_cap;
        for building in self
            .buildings
            .values()
            .filter(|b| b.is_operational() && b.health.is_alive())
        {
            if let Some(building_type) = catalog.building(building.building_type) {
                caps = caps.saturating_add(&building_type.storage_bonus);
                population = population.saturating_add(building_type.population_bonus);
            }
        }
        self.ledger.set_caps(caps);
        self.population_cap = population;
    }
}
