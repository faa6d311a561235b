//! Core simulation loop.
//!
//! The simulation owns the terrain, the deposits and every faction, and
//! advances them one fixed tick at a time.
//!
//! # Tick order
//!
//! 1. Buildings: construction, production, research, damaged timers, tower
//!    fire.
//! 2. Strategists whose cycle is due: plan, then direct on a fresh snapshot.
//! 3. Agents, faction by faction in ascending handle order.
//! 4. Combat resolution: queued hits are applied in the order they were
//!    fired; damage reactions and calls for help happen here.
//! 5. Removal of everything destroyed this tick, then resource and
//!    population caps are recomputed from the surviving buildings.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`](crate::math::Fixed))
//! - One seeded random source shared by every system
//! - Consistent iteration order (ordered maps keyed by handle)
//! - Same seed and same commands always produce the same state hash
//!
//! # Example
//!
//! ```
//! use skirmish_core::maps::MissionMap;
//! use skirmish_core::simulation::{FactionSetup, MissionSetup, Simulation};
//!
//! let setup = MissionSetup::new(
//!     MissionMap::glade(),
//!     vec![FactionSetup::computer("red"), FactionSetup::computer("blue")],
//! );
//! let mut sim = Simulation::new(setup).unwrap();
//! for _ in 0..20 {
//!     sim.tick();
//! }
//! assert_eq!(sim.current_tick(), 20);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{Task, TaskContext, TaskOutcome, TickContext};
use crate::buildings::{find_spawn_cell, site_is_valid, Building, Footprint, SiteBlockers};
use crate::catalog::{BuildingTypeId, Catalog, UnitTypeId, UpgradeTypeId};
use crate::combat::{apply_damage, DamageOutcome, Hit};
use crate::components::TargetRef;
use crate::config::SimConfig;
use crate::data::UnitRole;
use crate::economy::{DepositField, ResourceBundle, ResourceLedger};
use crate::error::{GameError, Result};
use crate::events::{DestructionCause, SimEvent, TickEvents};
use crate::factions::{Controller, Faction, FactionId};
use crate::maps::MissionMap;
use crate::production::{self, ProductionError};
use crate::research;
use crate::storage::{EntityId, IdAllocator};
use crate::strategist::{AiProfile, Priority, StrategyContext, Strategist};
use crate::terrain::{CellPos, TerrainGrid};
use crate::world::Snapshot;

/// Rings searched around a headquarters for starting units.
const START_SPAWN_CELLS: i32 = 4;

// ============================================================================
// Setup
// ============================================================================

fn default_starting() -> ResourceBundle {
    ResourceBundle::new(200, 150, 100, 50)
}

fn default_units() -> Vec<String> {
    vec!["worker".into(), "worker".into(), "worker".into()]
}

/// One participant at mission start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionSetup {
    /// Display name.
    pub name: String,
    /// Order source.
    #[serde(default)]
    pub controller: Controller,
    /// Starting balances.
    #[serde(default = "default_starting")]
    pub starting: ResourceBundle,
    /// Unit type keys placed around the headquarters.
    #[serde(default = "default_units")]
    pub units: Vec<String>,
}

impl FactionSetup {
    /// A human-controlled faction with the standard start.
    #[must_use]
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            controller: Controller::Human,
            starting: default_starting(),
            units: default_units(),
        }
    }

    /// A computer-controlled faction with the standard start.
    #[must_use]
    pub fn computer(name: impl Into<String>) -> Self {
        Self {
            controller: Controller::Computer,
            ..Self::human(name)
        }
    }
}

/// Everything needed to start a mission.
#[derive(Debug, Clone)]
pub struct MissionSetup {
    /// Terrain, deposits and bases.
    pub map: MissionMap,
    /// Participants; faction `i` starts on base `i`.
    pub factions: Vec<FactionSetup>,
    /// Unit and building types.
    pub catalog: Catalog,
    /// Tuning.
    pub config: SimConfig,
    /// Strategist rules; the standard profile when absent.
    pub profile: Option<AiProfile>,
    /// Seed of the shared random source.
    pub seed: u64,
}

impl MissionSetup {
    /// Standard catalog, default tuning, seed 0.
    #[must_use]
    pub fn new(map: MissionMap, factions: Vec<FactionSetup>) -> Self {
        Self {
            map,
            factions,
            catalog: Catalog::standard(),
            config: SimConfig::default(),
            profile: None,
            seed: 0,
        }
    }

    /// Replace the seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Per-faction counts for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionSummary {
    /// Faction.
    pub faction: FactionId,
    /// Display name.
    pub name: String,
    /// Order source.
    pub controller: Controller,
    /// Living units by type key.
    pub units: BTreeMap<String, usize>,
    /// Standing buildings by type key, sites included.
    pub buildings: BTreeMap<String, usize>,
    /// Balances.
    pub resources: ResourceBundle,
    /// Living agents plus queued unit orders.
    pub population: usize,
    /// Population cap.
    pub population_cap: usize,
    /// Finished upgrades by key.
    pub researched: Vec<String>,
    /// Current strategist priority.
    pub priority: Option<Priority>,
    /// No agents and no buildings left.
    pub eliminated: bool,
}

// ============================================================================
// Simulation
// ============================================================================

/// The deterministic mission simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    terrain: TerrainGrid,
    deposits: DepositField,
    factions: Vec<Faction>,
    catalog: Catalog,
    config: SimConfig,
    ids: IdAllocator,
    rng: ChaCha8Rng,
    tick: u64,
    /// Events raised by commands between ticks, reported with the next tick.
    pending_events: Vec<SimEvent>,
}

impl Simulation {
    /// Start a mission: a complete headquarters on every faction's base and
    /// its starting units around it.
    ///
    /// # Errors
    ///
    /// - [`GameError::InvalidMap`] if the map is malformed or has fewer bases
    ///   than factions
    /// - [`GameError::UnknownType`] for unknown unit keys or a catalog
    ///   without a headquarters type
    pub fn new(setup: MissionSetup) -> Result<Self> {
        let MissionSetup {
            map,
            factions,
            catalog,
            config,
            profile,
            seed,
        } = setup;
        map.validate()?;
        if factions.len() > map.bases.len() {
            return Err(GameError::InvalidMap(format!(
                "map '{}' has {} bases for {} factions",
                map.name,
                map.bases.len(),
                factions.len()
            )));
        }
        let profile = profile.unwrap_or_else(|| AiProfile::standard(&catalog));
        let headquarters = catalog
            .buildings()
            .find(|(_, building)| building.headquarters)
            .map(|(id, _)| id)
            .ok_or_else(|| GameError::UnknownType("headquarters".into()))?;

        let mut sim = Self {
            deposits: map.deposit_field(),
            terrain: map.terrain,
            factions: Vec::with_capacity(factions.len()),
            catalog,
            config,
            ids: IdAllocator::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
            pending_events: Vec::new(),
        };

        for (index, (setup, base)) in factions.into_iter().zip(map.bases).enumerate() {
            let id = FactionId(
                u8::try_from(index)
                    .map_err(|_| GameError::InvalidMap("too many factions".into()))?,
            );
            let mut faction = Faction::new(
                id,
                setup.name,
                setup.controller,
                ResourceLedger::new(setup.starting),
                base,
            );
            if setup.controller == Controller::Computer {
                faction.strategist = Some(Strategist::new(profile.clone(), &sim.config));
            }
            sim.factions.push(faction);

            let hq = sim.place_building(id, headquarters, base)?;
            for key in &setup.units {
                let unit = sim.catalog.require_unit(key)?;
                sim.spawn_near(id, unit, hq)?;
            }
        }
        // Starting placements are reported with the first tick.
        sim.refresh_limits();

        tracing::info!(
            map = %map.name,
            factions = sim.factions.len(),
            seed,
            "Mission started"
        );
        Ok(sim)
    }

    // ------------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------------

    /// Place an operational building, skipping site and cost checks.
    ///
    /// # Errors
    ///
    /// [`GameError::FactionNotFound`] / [`GameError::UnknownType`].
    pub fn place_building(
        &mut self,
        faction: FactionId,
        building: BuildingTypeId,
        origin: CellPos,
    ) -> Result<EntityId> {
        let index = self.faction_index(faction)?;
        let building_type = self
            .catalog
            .building(building)
            .ok_or_else(|| GameError::UnknownType(format!("building {}", building.0)))?;
        let id = self.ids.allocate();
        let footprint = Footprint::new(origin, building_type.size);
        self.factions[index].buildings.insert(
            id,
            Building::complete(id, faction, building, building_type, footprint),
        );
        self.factions[index].refresh_limits(&self.catalog, &self.config);
        self.pending_events.push(SimEvent::BuildingPlaced {
            building: id,
            faction,
            building_type: building,
            origin,
        });
        Ok(id)
    }

    /// Place an agent on `cell`, skipping cost checks.
    ///
    /// # Errors
    ///
    /// [`GameError::FactionNotFound`] / [`GameError::UnknownType`].
    pub fn spawn_agent(
        &mut self,
        faction: FactionId,
        unit: UnitTypeId,
        cell: CellPos,
    ) -> Result<EntityId> {
        let index = self.faction_index(faction)?;
        let unit_type = self
            .catalog
            .unit(unit)
            .ok_or_else(|| GameError::UnknownType(format!("unit {}", unit.0)))?;
        let id = self.ids.allocate();
        let event = self.factions[index].spawn_agent(id, unit, unit_type, cell);
        self.pending_events.push(event);
        Ok(id)
    }

    /// Place an agent on the first free cell around a building.
    fn spawn_near(&mut self, faction: FactionId, unit: UnitTypeId, building: EntityId) -> Result<EntityId> {
        let index = self.faction_index(faction)?;
        let footprint = self.factions[index]
            .buildings
            .get(building)
            .map(|b| b.footprint)
            .ok_or(GameError::EntityNotFound(building.0))?;
        let movement = self
            .catalog
            .unit(unit)
            .map(|u| u.movement)
            .ok_or_else(|| GameError::UnknownType(format!("unit {}", unit.0)))?;
        let occupied = self.snapshot().occupied_cells();
        let cell = find_spawn_cell(&self.terrain, movement, footprint, &occupied, START_SPAWN_CELLS)
            .ok_or_else(|| {
                GameError::InvalidMap(format!("no room for starting units around {building}"))
            })?;
        self.spawn_agent(faction, unit, cell)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Hand a task to one of the faction's agents.
    ///
    /// A rejected task leaves the agent idle.
    ///
    /// # Errors
    ///
    /// [`GameError::EntityNotFound`] if the agent does not belong to the
    /// faction, otherwise whatever [`Agent::assign`](crate::agent::Agent::assign)
    /// reports.
    pub fn issue_task(
        &mut self,
        faction: FactionId,
        agent: EntityId,
        task: Task,
    ) -> Result<TaskOutcome> {
        let index = self.faction_index(faction)?;
        let snapshot = self.snapshot();
        let Self {
            factions,
            terrain,
            deposits,
            config,
            rng,
            ..
        } = self;
        let unit = factions[index]
            .agents
            .get_mut(agent)
            .filter(|a| a.health.is_alive())
            .ok_or(GameError::EntityNotFound(agent.0))?;
        let ctx = TaskContext {
            grid: terrain,
            snapshot: &snapshot,
            deposits,
            config,
        };
        unit.assign(task, &ctx, rng)
    }

    /// Order a unit at one of the faction's factories.
    ///
    /// # Errors
    ///
    /// [`GameError::Production`] when the factory is unknown, not
    /// operational, cannot produce the type, has a full queue, the faction
    /// is at its population cap or cannot pay. Nothing is debited on error.
    pub fn enqueue_unit(
        &mut self,
        faction: FactionId,
        factory: EntityId,
        unit: UnitTypeId,
    ) -> Result<()> {
        let index = self.faction_index(faction)?;
        let unit_type = self
            .catalog
            .unit(unit)
            .ok_or_else(|| GameError::UnknownType(format!("unit {}", unit.0)))?;
        let population = self.factions[index].population();
        let Faction {
            ledger, buildings, ..
        } = &mut self.factions[index];
        let building = buildings
            .get_mut(factory)
            .filter(|b| b.health.is_alive())
            .ok_or(ProductionError::UnknownBuilding(factory))?;
        let factory_type = self
            .catalog
            .building(building.building_type)
            .ok_or_else(|| GameError::UnknownType(format!("building {}", building.building_type.0)))?;
        production::enqueue_unit(ledger, population, building, factory_type, unit, unit_type)?;
        Ok(())
    }

    /// Queue an upgrade at one of the faction's research buildings.
    ///
    /// # Errors
    ///
    /// [`GameError::Production`] when the lab is unknown, not operational
    /// or not a research building, the upgrade is already researched or
    /// queued, a prerequisite is missing, the queue is full or the faction
    /// cannot pay. Nothing is debited on error.
    pub fn enqueue_research(
        &mut self,
        faction: FactionId,
        lab: EntityId,
        upgrade: UpgradeTypeId,
    ) -> Result<()> {
        let index = self.faction_index(faction)?;
        research::enqueue_research(&mut self.factions[index], &self.catalog, lab, upgrade)
    }

    /// Place a paid construction site with its top-left cell at `origin`.
    ///
    /// # Errors
    ///
    /// - [`GameError::InvalidSite`] if the footprint is off the map, on
    ///   impassable ground or too close to another structure
    /// - [`GameError::InsufficientResources`] if the faction cannot pay
    pub fn queue_construction(
        &mut self,
        faction: FactionId,
        building: BuildingTypeId,
        origin: CellPos,
    ) -> Result<EntityId> {
        let index = self.faction_index(faction)?;
        let building_type = self
            .catalog
            .building(building)
            .ok_or_else(|| GameError::UnknownType(format!("building {}", building.0)))?;
        let footprint = Footprint::new(origin, building_type.size);
        let blockers = SiteBlockers::capture(&self.snapshot(), &self.deposits);
        if !site_is_valid(
            &self.terrain,
            footprint,
            &blockers,
            self.config.build_spacing_cells,
        ) {
            return Err(GameError::InvalidSite {
                x: origin.x,
                y: origin.y,
            });
        }
        let id = self.ids.allocate();
        let event = self.factions[index].start_construction(id, building, building_type, footprint)?;
        self.pending_events.push(event);
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::new(self.tick);
        events.events.append(&mut self.pending_events);
        let mut hits = Vec::new();

        // 1. Buildings
        self.run_buildings(&mut hits, &mut events);

        // 2. Strategists
        self.run_strategists(&mut events);

        // 3. Agents
        self.run_agents(&mut hits, &mut events);

        // 4. Combat resolution
        self.resolve_combat(&hits, &mut events);

        // 5. Deferred removal
        for faction in &mut self.factions {
            faction.agents.flush_removals();
            faction.buildings.flush_removals();
        }
        self.refresh_limits();

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    fn refresh_limits(&mut self) {
        for faction in &mut self.factions {
            faction.refresh_limits(&self.catalog, &self.config);
        }
    }

    fn run_buildings(&mut self, hits: &mut Vec<Hit>, events: &mut TickEvents) {
        let snapshot = self.snapshot();
        let mut occupied = snapshot.occupied_cells();
        let Self {
            factions,
            terrain,
            catalog,
            config,
            ids,
            ..
        } = self;

        for faction in factions.iter_mut() {
            for id in faction.buildings.ids() {
                let Some(building) = faction.buildings.get_mut(id) else {
                    continue;
                };
                if building.tick_construction() {
                    tracing::info!(faction = %faction.id, building = %id, "Construction complete");
                    events.push(SimEvent::ConstructionComplete {
                        building: id,
                        faction: faction.id,
                    });
                }

                let finished = building.tick_operation();
                let researched = building.tick_research();
                let footprint = building.footprint;
                if let Some(hit) = building.update_defense(&snapshot) {
                    hits.push(hit);
                }

                if let Some(upgrade) = researched {
                    if let Some(upgrade_type) = catalog.upgrade(upgrade) {
                        if faction.research.complete(upgrade, upgrade_type) {
                            tracing::info!(faction = %faction.id, lab = %id, upgrade = %upgrade_type.key, "Research complete");
                            events.push(SimEvent::ResearchComplete {
                                building: id,
                                faction: faction.id,
                                upgrade,
                            });
                        }
                    }
                }

                let Some(unit) = finished else {
                    continue;
                };
                let Some(unit_type) = catalog.unit(unit) else {
                    if let Some(building) = faction.buildings.get_mut(id) {
                        building.queue.complete();
                    }
                    continue;
                };
                // Finished units wait in the queue until a tile frees up.
                let Some(cell) = find_spawn_cell(
                    terrain,
                    unit_type.movement,
                    footprint,
                    &occupied,
                    config.spawn_search_cells,
                ) else {
                    continue;
                };
                if let Some(building) = faction.buildings.get_mut(id) {
                    building.queue.complete();
                }
                occupied.insert(cell);
                let agent = ids.allocate();
                events.push(faction.spawn_agent(agent, unit, unit_type, cell));
                events.push(SimEvent::UnitProduced {
                    building: id,
                    agent,
                    unit_type: unit,
                });
                tracing::info!(faction = %faction.id, factory = %id, %agent, unit = %unit_type.key, "Unit produced");
            }
        }
    }

    fn run_strategists(&mut self, events: &mut TickEvents) {
        for index in 0..self.factions.len() {
            let Some(mut strategist) = self.factions[index].strategist.take() else {
                continue;
            };
            if strategist.is_due(self.config.strategist_interval) {
                self.with_strategy_context(index, events, |ctx| strategist.plan(ctx));
                self.with_strategy_context(index, events, |ctx| strategist.direct(ctx));
            }
            self.factions[index].strategist = Some(strategist);
        }
    }

    /// Run `phase` against a fresh snapshot.
    fn with_strategy_context<F>(&mut self, index: usize, events: &mut TickEvents, phase: F)
    where
        F: FnOnce(&mut StrategyContext<'_, ChaCha8Rng>),
    {
        let snapshot = self.snapshot();
        let Self {
            factions,
            terrain,
            catalog,
            config,
            deposits,
            ids,
            rng,
            tick,
            ..
        } = self;
        let Some(faction) = factions.get_mut(index) else {
            return;
        };
        let mut ctx = StrategyContext {
            faction,
            grid: terrain,
            catalog,
            config,
            snapshot: &snapshot,
            deposits,
            ids,
            rng,
            events,
            now: *tick,
        };
        phase(&mut ctx);
    }

    fn run_agents(&mut self, hits: &mut Vec<Hit>, events: &mut TickEvents) {
        let snapshot = self.snapshot();
        let Self {
            factions,
            terrain,
            config,
            deposits,
            rng,
            ..
        } = self;

        for faction in factions.iter_mut() {
            let Faction {
                agents,
                ledger,
                research,
                ..
            } = faction;
            let mut ctx = TickContext {
                grid: terrain,
                snapshot: &snapshot,
                config,
                deposits: &mut *deposits,
                ledger,
                research: &*research,
                rng: &mut *rng,
                hits: &mut *hits,
                events: &mut *events,
            };
            for id in agents.ids() {
                if let Some(agent) = agents.get_mut(id) {
                    agent.update(&mut ctx);
                }
            }
        }
    }

    /// Apply hits in the order they were fired.
    ///
    /// Hits on targets already destroyed earlier in the pass are discarded,
    /// so each entity is destroyed exactly once. Hits fired by an attacker
    /// destroyed earlier in the pass are discarded too.
    fn resolve_combat(&mut self, hits: &[Hit], events: &mut TickEvents) {
        if hits.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for hit in hits {
            if !self.attacker_alive(hit) {
                continue;
            }
            let Some(index) = snapshot
                .faction_of(hit.target)
                .and_then(|id| self.faction_index(id).ok())
            else {
                continue;
            };
            match hit.target {
                TargetRef::Agent(id) => self.hit_agent(index, id, hit, &snapshot, events),
                TargetRef::Building(id) => self.hit_building(index, id, hit, events),
            }
        }
    }

    fn attacker_alive(&self, hit: &Hit) -> bool {
        let Some(faction) = self.faction(hit.attacker_faction) else {
            return false;
        };
        match hit.attacker {
            TargetRef::Agent(id) => {
                !faction.agents.is_pending_removal(id)
                    && faction.agents.get(id).is_some_and(|a| a.health.is_alive())
            }
            TargetRef::Building(id) => {
                !faction.buildings.is_pending_removal(id)
                    && faction.buildings.get(id).is_some_and(|b| b.health.is_alive())
            }
        }
    }

    fn hit_agent(
        &mut self,
        index: usize,
        id: EntityId,
        hit: &Hit,
        snapshot: &Snapshot,
        events: &mut TickEvents,
    ) {
        let Self {
            factions,
            terrain,
            deposits,
            config,
            rng,
            ..
        } = self;
        let faction = &mut factions[index];
        if faction.agents.is_pending_removal(id) {
            return;
        }
        let Some(agent) = faction.agents.get_mut(id) else {
            return;
        };
        let outcome = apply_damage(&mut agent.health, hit.damage);
        if outcome == DamageOutcome::AlreadyDead {
            return;
        }
        events.push(SimEvent::HealthChanged {
            entity: hit.target,
            current: agent.health.current,
            max: agent.health.max,
        });

        if outcome == DamageOutcome::Destroyed {
            faction.agents.schedule_removal(id);
            tracing::info!(faction = %faction.id, agent = %id, attacker = ?hit.attacker, "Agent destroyed");
            events.push(SimEvent::Destroyed {
                entity: hit.target,
                faction: faction.id,
                cause: DestructionCause::from_attacker(hit.attacker),
            });
            return;
        }

        let ctx = TaskContext {
            grid: terrain,
            snapshot,
            deposits,
            config,
        };
        let position = agent.position;
        if !agent.react_to_damage(hit.attacker, hit.attacker_position, &ctx, rng) {
            return;
        }

        // One hop: allies answer but do not call further.
        let radius = config.help_radius();
        let mut answered = 0_usize;
        for ally in faction.agents.values_mut() {
            if ally.id != id
                && ally.health.is_alive()
                && ally.role() == UnitRole::Combat
                && ally.position.within(position, radius)
                && ally.engage(hit.attacker)
            {
                answered += 1;
            }
        }
        if answered > 0 {
            tracing::debug!(agent = %id, answered, attacker = ?hit.attacker, "Call for help answered");
        }
    }

    fn hit_building(&mut self, index: usize, id: EntityId, hit: &Hit, events: &mut TickEvents) {
        let recovery = self.config.damaged_recovery;
        let faction = &mut self.factions[index];
        if faction.buildings.is_pending_removal(id) {
            return;
        }
        let Some(building) = faction.buildings.get_mut(id) else {
            return;
        };
        let outcome = apply_damage(&mut building.health, hit.damage);
        if outcome == DamageOutcome::AlreadyDead {
            return;
        }
        events.push(SimEvent::HealthChanged {
            entity: hit.target,
            current: building.health.current,
            max: building.health.max,
        });

        match outcome {
            DamageOutcome::Destroyed => {
                building.mark_destroyed();
                faction.buildings.schedule_removal(id);
                tracing::info!(faction = %faction.id, building = %id, attacker = ?hit.attacker, "Building destroyed");
                events.push(SimEvent::Destroyed {
                    entity: hit.target,
                    faction: faction.id,
                    cause: DestructionCause::from_attacker(hit.attacker),
                });
            }
            DamageOutcome::Survived { .. } => building.on_damaged(recovery),
            DamageOutcome::AlreadyDead => {}
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    fn faction_index(&self, id: FactionId) -> Result<usize> {
        self.factions
            .iter()
            .position(|f| f.id == id)
            .ok_or(GameError::FactionNotFound(id.0))
    }

    /// Get the current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Static terrain.
    #[must_use]
    pub const fn terrain(&self) -> &TerrainGrid {
        &self.terrain
    }

    /// Resource deposits.
    #[must_use]
    pub const fn deposits(&self) -> &DepositField {
        &self.deposits
    }

    /// Unit and building types.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Tuning.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// All factions in id order.
    #[must_use]
    pub fn factions(&self) -> &[Faction] {
        &self.factions
    }

    /// Look up a faction.
    #[must_use]
    pub fn faction(&self, id: FactionId) -> Option<&Faction> {
        self.factions.iter().find(|f| f.id == id)
    }

    /// Mutable access to a faction, for scenario set-up.
    pub fn faction_mut(&mut self, id: FactionId) -> Option<&mut Faction> {
        self.factions.iter_mut().find(|f| f.id == id)
    }

    /// Read-only view of every live entity.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.factions, &self.deposits)
    }

    /// Factions that still have agents or buildings.
    #[must_use]
    pub fn surviving_factions(&self) -> Vec<FactionId> {
        self.factions
            .iter()
            .filter(|f| !f.is_eliminated())
            .map(|f| f.id)
            .collect()
    }

    /// True once at most one faction survives.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.factions.len() > 1 && self.surviving_factions().len() <= 1
    }

    /// Counts and balances of one faction.
    ///
    /// # Errors
    ///
    /// [`GameError::FactionNotFound`] for unknown factions.
    pub fn summary(&self, id: FactionId) -> Result<FactionSummary> {
        let faction = &self.factions[self.faction_index(id)?];
        let mut units = BTreeMap::new();
        for agent in faction.agents.values().filter(|a| a.health.is_alive()) {
            if let Some(unit_type) = self.catalog.unit(agent.unit_type) {
                *units.entry(unit_type.key.clone()).or_insert(0) += 1;
            }
        }
        let mut buildings = BTreeMap::new();
        for building in faction.buildings.values().filter(|b| b.health.is_alive()) {
            if let Some(building_type) = self.catalog.building(building.building_type) {
                *buildings.entry(building_type.key.clone()).or_insert(0) += 1;
            }
        }
        Ok(FactionSummary {
            faction: faction.id,
            name: faction.name.clone(),
            controller: faction.controller,
            units,
            buildings,
            resources: faction.ledger.balances(),
            population: faction.population().used,
            population_cap: faction.population_cap,
            researched: faction
                .research
                .completed()
                .filter_map(|id| self.catalog.upgrade(id))
                .map(|upgrade| upgrade.key.clone())
                .collect(),
            priority: faction.strategist.as_ref().map(Strategist::priority),
            eliminated: faction.is_eliminated(),
        })
    }

    /// Compute a hash of the simulation state for desync detection.
    ///
    /// Covers the tick, balances and caps, research, deposits and every
    /// agent and building.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);

        for deposit in self.deposits.values() {
            deposit.id.hash(&mut hasher);
            deposit.remaining().hash(&mut hasher);
        }

        for faction in &self.factions {
            faction.id.hash(&mut hasher);
            faction.ledger.balances().hash(&mut hasher);
            faction.ledger.caps().hash(&mut hasher);
            faction.population_cap.hash(&mut hasher);
            faction.research.hash(&mut hasher);
            faction
                .strategist
                .as_ref()
                .map(Strategist::priority)
                .hash(&mut hasher);

            faction.agents.len().hash(&mut hasher);
            for (id, agent) in faction.agents.iter() {
                id.hash(&mut hasher);
                agent.position.x.to_bits().hash(&mut hasher);
                agent.position.y.to_bits().hash(&mut hasher);
                agent.health.hash(&mut hasher);
                agent.state.hash(&mut hasher);
                agent.role.hash(&mut hasher);
            }

            faction.buildings.len().hash(&mut hasher);
            for (id, building) in faction.buildings.iter() {
                id.hash(&mut hasher);
                building.health.hash(&mut hasher);
                building.state.hash(&mut hasher);
                building.construction.progress.hash(&mut hasher);
                building.queue.hash(&mut hasher);
                building.research.hash(&mut hasher);
                building.weapon.hash(&mut hasher);
            }
        }

        hasher.finish()
    }
}
