//! Decision loop of a computer-controlled faction.
//!
//! A strategist runs on a coarse cadence. Each cycle it picks a priority,
//! places construction sites, creates units within the population cap,
//! queues research, refreshes its perception memory and hands out tasks to
//! workers, scouts and combat agents.
//!
//! The simulation calls [`Strategist::plan`] and then [`Strategist::direct`]
//! with a fresh snapshot in between, so tasks see the sites and units the
//! plan phase created.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentState, PatrolZone, ScoutRange, Task, TaskContext, ZoneKind};
use crate::buildings::{find_build_site, find_spawn_cell, Footprint, SiteBlockers};
use crate::catalog::{BuildingTypeId, Catalog, UnitTypeId};
use crate::components::TargetRef;
use crate::config::SimConfig;
use crate::data::{AiProfileData, BuildingRole, UnitRole};
use crate::economy::DepositField;
use crate::error::{GameError, Result};
use crate::events::{SimEvent, TickEvents};
use crate::factions::Faction;
use crate::math::units;
use crate::memory::MemoryLedger;
use crate::research::enqueue_research;
use crate::storage::{EntityId, IdAllocator};
use crate::terrain::{TerrainGrid, CELL_SIZE};
use crate::world::Snapshot;

/// Combat agents below which a faction without towers feels exposed.
const MIN_GARRISON: usize = 3;

/// Cells around a factory checked for units it already produced.
const FACTORY_CROWD_CELLS: i32 = 2;

/// What the faction is currently working toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Grow the economy; worker caps are relaxed.
    #[default]
    Development,
    /// Protect the base; combat caps are relaxed.
    Defense,
}

// ============================================================================
// Profile
// ============================================================================

/// Population cap of one building type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildQuota {
    /// Building type.
    pub building: BuildingTypeId,
    /// Maximum built + queued count.
    pub cap: usize,
}

/// Per-factory population limit of one unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitQuota {
    /// Unit type.
    pub unit: UnitTypeId,
    /// Base population limit.
    pub limit: usize,
}

/// Strategist rules resolved against a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiProfile {
    /// Construction caps, evaluated in order.
    pub buildings: Vec<BuildQuota>,
    /// Production rules, evaluated in order.
    pub units: Vec<UnitQuota>,
}

impl AiProfile {
    /// Resolve string keys against the catalog.
    pub fn from_data(data: &AiProfileData, catalog: &Catalog) -> Result<Self> {
        let buildings = data
            .buildings
            .iter()
            .map(|rule| {
                Ok(BuildQuota {
                    building: catalog.require_building(&rule.building)?,
                    cap: rule.cap,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let units = data
            .units
            .iter()
            .map(|rule| {
                Ok(UnitQuota {
                    unit: catalog.require_unit(&rule.unit)?,
                    limit: rule.limit,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { buildings, units })
    }

    /// Parse a RON [`AiProfileData`] document and resolve it.
    pub fn from_ron_str(source: &str, catalog: &Catalog) -> Result<Self> {
        let data: AiProfileData =
            ron::from_str(source).map_err(|e| GameError::DataParseError {
                path: "ai profile".into(),
                message: e.to_string(),
            })?;
        Self::from_data(&data, catalog)
    }

    /// Standard profile for a catalog; rules naming missing types are dropped.
    #[must_use]
    pub fn standard(catalog: &Catalog) -> Self {
        let data = AiProfileData::standard();
        Self {
            buildings: data
                .buildings
                .iter()
                .filter_map(|rule| {
                    catalog.building_id(&rule.building).map(|building| BuildQuota {
                        building,
                        cap: rule.cap,
                    })
                })
                .collect(),
            units: data
                .units
                .iter()
                .filter_map(|rule| {
                    catalog.unit_id(&rule.unit).map(|unit| UnitQuota {
                        unit,
                        limit: rule.limit,
                    })
                })
                .collect(),
        }
    }
}

// ============================================================================
// Strategist
// ============================================================================

/// Everything a strategist cycle reads and writes.
#[derive(Debug)]
pub struct StrategyContext<'a, R> {
    /// The faction being run.
    pub faction: &'a mut Faction,
    /// Terrain.
    pub grid: &'a TerrainGrid,
    /// Type descriptors.
    pub catalog: &'a Catalog,
    /// Tuning.
    pub config: &'a SimConfig,
    /// Entities at the start of the phase.
    pub snapshot: &'a Snapshot,
    /// Deposits.
    pub deposits: &'a DepositField,
    /// Handle source for new entities.
    pub ids: &'a mut IdAllocator,
    /// Shared random source.
    pub rng: &'a mut R,
    /// Event sink.
    pub events: &'a mut TickEvents,
    /// Current tick.
    pub now: u64,
}

/// Decision loop state of one faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategist {
    profile: AiProfile,
    memory: MemoryLedger,
    priority: Priority,
    countdown: u32,
    patrol_cursor: usize,
}

impl Strategist {
    /// A strategist whose first cycle runs on the next tick.
    #[must_use]
    pub fn new(profile: AiProfile, config: &SimConfig) -> Self {
        Self {
            profile,
            memory: MemoryLedger::new(config.memory_ttl),
            priority: Priority::default(),
            countdown: 0,
            patrol_cursor: 0,
        }
    }

    /// Current priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Perception memory.
    #[must_use]
    pub const fn memory(&self) -> &MemoryLedger {
        &self.memory
    }

    /// Build and production rules.
    #[must_use]
    pub const fn profile(&self) -> &AiProfile {
        &self.profile
    }

    /// Count one tick down; true when a cycle is due.
    pub fn is_due(&mut self, interval: u32) -> bool {
        if self.countdown == 0 {
            self.countdown = interval.saturating_sub(1);
            true
        } else {
            self.countdown -= 1;
            false
        }
    }

    /// First half of a cycle: priority, construction, production, research.
    pub fn plan<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        self.select_priority(ctx);
        self.decide_construction(ctx);
        self.decide_production(ctx);
        self.decide_research(ctx);
    }

    /// Second half of a cycle: memory refresh and task assignment.
    pub fn direct<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let vision = ctx.faction.vision();
        self.memory
            .refresh(ctx.faction.id, &vision, ctx.snapshot, ctx.deposits, ctx.now);
        self.assign_workers(ctx);
        self.assign_scouts(ctx);
        self.assign_combat(ctx);
    }

    // ------------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------------

    /// Defense when there are workers to protect and either an enemy is
    /// remembered near a headquarters or the base has almost no protection.
    #[must_use]
    pub fn analyze(&self, faction: &Faction, config: &SimConfig) -> Priority {
        if faction.count_role(UnitRole::Worker) <= 1 {
            return Priority::Development;
        }
        let alert = units(config.hq_alert_cells.unsigned_abs() * CELL_SIZE.unsigned_abs());
        let threatened = faction
            .buildings
            .values()
            .filter(|b| b.headquarters && b.health.is_alive())
            .any(|hq| self.memory.any_enemy_unit_within(hq.footprint.center(), alert));
        let exposed = faction.count_role(UnitRole::Combat) < MIN_GARRISON
            && faction.count_building_role(BuildingRole::Defense) < 1;

        if threatened || exposed {
            Priority::Defense
        } else {
            Priority::Development
        }
    }

    fn select_priority<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let priority = self.analyze(ctx.faction, ctx.config);
        if priority != self.priority {
            tracing::info!(faction = %ctx.faction.id, ?priority, "Strategist priority changed");
            self.priority = priority;
            ctx.events.push(SimEvent::PriorityChanged {
                faction: ctx.faction.id,
                priority,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Construction and production
    // ------------------------------------------------------------------------

    fn decide_construction<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let mut blockers = SiteBlockers::capture(ctx.snapshot, ctx.deposits);

        for quota in &self.profile.buildings {
            if ctx.faction.count_buildings(quota.building) >= quota.cap {
                continue;
            }
            let Some(building_type) = ctx.catalog.building(quota.building) else {
                continue;
            };
            if !ctx.faction.ledger.can_afford(&building_type.cost) {
                continue;
            }
            let Some(footprint) = find_build_site(
                ctx.grid,
                ctx.faction.base,
                building_type.size,
                &blockers,
                ctx.config.site_search_cells,
                ctx.config.build_spacing_cells,
            ) else {
                tracing::debug!(faction = %ctx.faction.id, key = %building_type.key, "No build site found");
                continue;
            };

            let id = ctx.ids.allocate();
            match ctx
                .faction
                .start_construction(id, quota.building, building_type, footprint)
            {
                Ok(event) => {
                    blockers.add(footprint, building_type.headquarters);
                    ctx.events.push(event);
                }
                Err(shortfall) => {
                    tracing::debug!(faction = %ctx.faction.id, %shortfall, "Construction not affordable");
                }
            }
        }
    }

    fn decide_production<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let mut occupied = ctx.snapshot.occupied_cells();
        occupied.extend(ctx.faction.buildings.values().flat_map(|b| b.footprint.cells()));
        let mut used: BTreeSet<EntityId> = BTreeSet::new();

        for quota in &self.profile.units {
            let Some(unit_type) = ctx.catalog.unit(quota.unit) else {
                continue;
            };
            let factories: Vec<(EntityId, Footprint)> = ctx
                .faction
                .buildings
                .values()
                .filter(|b| b.is_operational() && b.building_type == unit_type.produced_at)
                .map(|b| (b.id, b.footprint))
                .collect();
            if factories.is_empty() {
                continue;
            }

            let relaxed = matches!(
                (self.priority, unit_type.role),
                (Priority::Development, UnitRole::Worker) | (Priority::Defense, UnitRole::Combat)
            );
            let cap = if relaxed {
                quota.limit * factories.len()
            } else {
                quota.limit
            };

            for (factory, footprint) in factories {
                if used.contains(&factory) {
                    continue;
                }
                if ctx.faction.count_units(quota.unit) >= cap
                    || ctx.faction.population().is_full()
                    || !ctx.faction.ledger.can_afford(&unit_type.cost)
                {
                    break;
                }
                let crowd = ctx
                    .faction
                    .agents
                    .values()
                    .filter(|a| a.unit_type == quota.unit)
                    .filter(|a| footprint.cell_distance(a.cell()) <= FACTORY_CROWD_CELLS)
                    .count();
                if crowd >= quota.limit {
                    continue;
                }
                let Some(cell) = find_spawn_cell(
                    ctx.grid,
                    unit_type.movement,
                    footprint,
                    &occupied,
                    ctx.config.spawn_search_cells,
                ) else {
                    continue;
                };
                if let Err(shortfall) = ctx.faction.ledger.spend(&unit_type.cost) {
                    tracing::debug!(faction = %ctx.faction.id, %shortfall, "Unit not affordable");
                    break;
                }

                let id = ctx.ids.allocate();
                let event = ctx.faction.spawn_agent(id, quota.unit, unit_type, cell);
                tracing::debug!(faction = %ctx.faction.id, agent = %id, key = %unit_type.key, %cell, "Strategist created unit");
                ctx.events.push(event);
                occupied.insert(cell);
                used.insert(factory);
            }
        }
    }

    /// While developing, queue the first affordable upgrade at every
    /// operational lab with a free slot.
    fn decide_research<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        if self.priority != Priority::Development {
            return;
        }
        let labs: Vec<EntityId> = ctx
            .faction
            .buildings
            .values()
            .filter(|b| b.is_operational() && b.role == BuildingRole::Research)
            .filter(|b| !b.research.is_full())
            .map(|b| b.id)
            .collect();

        for lab in labs {
            let faction = &*ctx.faction;
            let candidate = ctx
                .catalog
                .upgrades()
                .find(|(id, upgrade)| {
                    !faction.research.is_researched(*id)
                        && !faction.is_research_pending(*id)
                        && faction.research.prerequisites_met(upgrade)
                        && faction.ledger.can_afford(&upgrade.cost)
                })
                .map(|(id, _)| id);
            let Some(upgrade) = candidate else {
                return;
            };
            if let Err(err) = enqueue_research(ctx.faction, ctx.catalog, lab, upgrade) {
                tracing::debug!(faction = %ctx.faction.id, %lab, %err, "Research not queued");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------------

    fn assign_workers<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let task_ctx = TaskContext {
            grid: ctx.grid,
            snapshot: ctx.snapshot,
            deposits: ctx.deposits,
            config: ctx.config,
        };
        for id in ctx.faction.agents.ids() {
            let Some(agent) = ctx.faction.agents.get_mut(id) else {
                continue;
            };
            if agent.role() != UnitRole::Worker || agent.is_busy_gathering() {
                continue;
            }
            let Some(deposit) = self.memory.nearest_deposit(agent.position) else {
                continue;
            };
            if let Err(err) = agent.assign(Task::GatherAt(deposit.id), &task_ctx, ctx.rng) {
                tracing::debug!(agent = %id, %err, "Worker assignment failed");
            }
        }
    }

    fn assign_scouts<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let range = if self.memory.has_player_contact() {
            ScoutRange::Map
        } else {
            ScoutRange::Around {
                center: ctx.faction.base.center(),
            }
        };
        let task_ctx = TaskContext {
            grid: ctx.grid,
            snapshot: ctx.snapshot,
            deposits: ctx.deposits,
            config: ctx.config,
        };
        for id in ctx.faction.agents.ids() {
            let Some(agent) = ctx.faction.agents.get_mut(id) else {
                continue;
            };
            if agent.role() != UnitRole::Scout {
                continue;
            }
            let needs_orders = match agent.state {
                AgentState::Idle => true,
                AgentState::Scouting { range: current, .. } => {
                    std::mem::discriminant(&current) != std::mem::discriminant(&range)
                }
                _ => false,
            };
            if !needs_orders {
                continue;
            }
            let waypoint = range.pick(ctx.grid, ctx.config, ctx.rng).center();
            if let Err(err) = agent.assign(Task::Scout { waypoint, range }, &task_ctx, ctx.rng) {
                tracing::debug!(agent = %id, %err, "Scout assignment failed");
            }
        }
    }

    fn assign_combat<R: Rng>(&mut self, ctx: &mut StrategyContext<'_, R>) {
        let defending = self.priority == Priority::Defense && self.memory.unit_count() > 0;
        let zones = patrol_zones(ctx.faction, ctx.deposits, ctx.grid);
        let task_ctx = TaskContext {
            grid: ctx.grid,
            snapshot: ctx.snapshot,
            deposits: ctx.deposits,
            config: ctx.config,
        };

        for id in ctx.faction.agents.ids() {
            let Some(agent) = ctx.faction.agents.get_mut(id) else {
                continue;
            };
            if agent.role() != UnitRole::Combat {
                continue;
            }

            let task = if defending {
                if agent
                    .attack_target()
                    .is_some_and(|target| ctx.snapshot.is_alive(target))
                {
                    continue;
                }
                let Some(enemy) = self.memory.nearest_enemy_unit(agent.position) else {
                    continue;
                };
                Task::Attack(TargetRef::Agent(enemy.id))
            } else if agent.state == AgentState::Idle {
                let zone = zones[self.patrol_cursor % zones.len()];
                self.patrol_cursor = self.patrol_cursor.wrapping_add(1);
                Task::Patrol(zone)
            } else {
                continue;
            };

            if let Err(err) = agent.assign(task, &task_ctx, ctx.rng) {
                tracing::debug!(agent = %id, %err, "Combat assignment failed");
            }
        }
    }
}

/// Headquarters, then deposits worked by the faction's workers, else the
/// map centre. Never empty.
fn patrol_zones(faction: &Faction, deposits: &DepositField, grid: &TerrainGrid) -> Vec<PatrolZone> {
    let mut zones: Vec<PatrolZone> = faction
        .buildings
        .values()
        .filter(|b| b.headquarters && b.health.is_alive())
        .map(|hq| PatrolZone {
            kind: ZoneKind::Headquarters(hq.id),
            center: hq.footprint.center(),
        })
        .collect();

    let worked: BTreeSet<_> = faction
        .agents
        .values()
        .filter_map(|a| a.worked_deposit())
        .collect();
    zones.extend(worked.into_iter().filter_map(|id| {
        deposits.get(&id).map(|deposit| PatrolZone {
            kind: ZoneKind::Deposit(id),
            center: deposit.cell.center(),
        })
    }));

    if zones.is_empty() {
        zones.push(PatrolZone {
            kind: ZoneKind::Waypoint,
            center: grid.center_cell().center(),
        });
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MovePurpose;
    use crate::buildings::Building;
    use crate::economy::{DepositId, ResourceBundle, ResourceDeposit, ResourceKind, ResourceLedger};
    use crate::factions::{Controller, FactionId};
    use crate::terrain::{CellPos, TerrainCode};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Fixture {
        catalog: Catalog,
        grid: TerrainGrid,
        config: SimConfig,
        factions: Vec<Faction>,
        deposits: DepositField,
        ids: IdAllocator,
        rng: ChaCha8Rng,
        strategist: Strategist,
        events: TickEvents,
    }

    impl Fixture {
        fn new(starting: ResourceBundle) -> Self {
            let catalog = Catalog::standard();
            let config = SimConfig::default();
            let factions = vec![
                Faction::new(
                    FactionId(0),
                    "blue",
                    Controller::Human,
                    ResourceLedger::default(),
                    CellPos::new(30, 30),
                ),
                Faction::new(
                    FactionId(1),
                    "red",
                    Controller::Computer,
                    ResourceLedger::new(starting),
                    CellPos::new(6, 6),
                ),
            ];
            let strategist = Strategist::new(AiProfile::standard(&catalog), &config);
            let mut fixture = Self {
                catalog,
                grid: TerrainGrid::filled(40, 40, TerrainCode::Grass),
                config,
                factions,
                deposits: DepositField::new(),
                ids: IdAllocator::default(),
                rng: ChaCha8Rng::seed_from_u64(11),
                strategist,
                events: TickEvents::new(0),
            };
            fixture.place(1, "hq", CellPos::new(6, 6));
            fixture
        }

        fn place(&mut self, faction: u8, key: &str, origin: CellPos) -> EntityId {
            let type_id = self.catalog.building_id(key).unwrap();
            let building_type = self.catalog.building(type_id).unwrap();
            let id = self.ids.allocate();
            let building = Building::complete(
                id,
                FactionId(faction),
                type_id,
                building_type,
                Footprint::new(origin, building_type.size),
            );
            self.factions[faction as usize].buildings.insert(id, building);
            id
        }

        fn spawn(&mut self, faction: u8, key: &str, cell: CellPos) -> EntityId {
            let type_id = self.catalog.unit_id(key).unwrap();
            let unit_type = self.catalog.unit(type_id).unwrap();
            let id = self.ids.allocate();
            self.factions[faction as usize].spawn_agent(id, type_id, unit_type, cell);
            id
        }

        fn run<F>(&mut self, phase: F)
        where
            F: FnOnce(&mut Strategist, &mut StrategyContext<'_, ChaCha8Rng>),
        {
            let snapshot = Snapshot::capture(&self.factions, &self.deposits);
            let mut ctx = StrategyContext {
                faction: &mut self.factions[1],
                grid: &self.grid,
                catalog: &self.catalog,
                config: &self.config,
                snapshot: &snapshot,
                deposits: &self.deposits,
                ids: &mut self.ids,
                rng: &mut self.rng,
                events: &mut self.events,
                now: 0,
            };
            phase(&mut self.strategist, &mut ctx);
        }

        fn cycle(&mut self) {
            self.run(|s, ctx| s.plan(ctx));
            self.run(|s, ctx| s.direct(ctx));
        }

        fn red(&self) -> &Faction {
            &self.factions[1]
        }
    }

    #[test]
    fn test_cadence() {
        let config = SimConfig::default();
        let mut strategist = Strategist::new(AiProfile::default(), &config);
        let due: Vec<u32> = (0..61).filter(|_| strategist.is_due(30)).collect();
        assert_eq!(due.len(), 3);
    }

    #[test]
    fn test_priority_rule() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        let red = |fx: &Fixture| fx.strategist.analyze(fx.red(), &fx.config);

        fx.spawn(1, "worker", CellPos::new(9, 6));
        assert_eq!(red(&fx), Priority::Development);

        fx.spawn(1, "worker", CellPos::new(9, 7));
        assert_eq!(red(&fx), Priority::Defense);

        for x in 10..13 {
            fx.spawn(1, "soldier", CellPos::new(x, 10));
        }
        assert_eq!(red(&fx), Priority::Development);
    }

    #[test]
    fn test_enemy_near_headquarters_triggers_defense() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        fx.spawn(1, "worker", CellPos::new(9, 6));
        fx.spawn(1, "worker", CellPos::new(9, 7));
        fx.place(1, "tower", CellPos::new(12, 12));
        assert_eq!(fx.strategist.analyze(fx.red(), &fx.config), Priority::Development);

        fx.spawn(0, "soldier", CellPos::new(10, 10));
        fx.run(|s, ctx| s.direct(ctx));
        assert_eq!(fx.strategist.memory().unit_count(), 1);
        assert_eq!(fx.strategist.analyze(fx.red(), &fx.config), Priority::Defense);
    }

    #[test]
    fn test_priority_change_emits_event() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        fx.spawn(1, "worker", CellPos::new(9, 6));
        fx.spawn(1, "worker", CellPos::new(9, 7));
        fx.run(|s, ctx| s.plan(ctx));
        assert_eq!(fx.strategist.priority(), Priority::Defense);
        assert!(fx.events.events.iter().any(|e| matches!(
            e,
            SimEvent::PriorityChanged {
                priority: Priority::Defense,
                ..
            }
        )));
    }

    #[test]
    fn test_construction_respects_caps_and_spacing() {
        let mut fx = Fixture::new(ResourceBundle::new(2_000, 2_000, 2_000, 2_000));
        let tower = fx.catalog.building_id("tower").unwrap();
        fx.run(|s, ctx| s.plan(ctx));
        assert_eq!(fx.red().count_buildings(tower), 1);
        for _ in 0..5 {
            fx.run(|s, ctx| s.plan(ctx));
        }

        let red = fx.red();
        let count = |key: &str| red.count_buildings(fx.catalog.building_id(key).unwrap());
        assert_eq!(count("hq"), 1);
        assert_eq!(count("factory"), 1);
        assert_eq!(count("warehouse"), 2);
        assert_eq!(red.count_buildings(tower), 5);

        let footprints: Vec<Footprint> = red.buildings.values().map(|b| b.footprint).collect();
        for (i, a) in footprints.iter().enumerate() {
            for b in &footprints[i + 1..] {
                assert!(!a.overlaps(*b, 2), "{a:?} too close to {b:?}");
            }
        }
        let started = fx
            .events
            .events
            .iter()
            .filter(|e| matches!(e, SimEvent::ConstructionStarted { .. }))
            .count();
        assert_eq!(started, footprints.len() - 1);
    }

    #[test]
    fn test_construction_skipped_when_unaffordable() {
        let mut fx = Fixture::new(ResourceBundle::new(10, 10, 10, 10));
        fx.run(|s, ctx| s.plan(ctx));
        assert_eq!(fx.red().buildings.len(), 1);
        assert_eq!(fx.red().ledger.balances(), ResourceBundle::new(10, 10, 10, 10));
    }

    #[test]
    fn test_construction_skipped_without_site() {
        let mut fx = Fixture::new(ResourceBundle::new(500, 500, 500, 500));
        fx.grid = TerrainGrid::filled(40, 40, TerrainCode::Water);
        fx.run(|s, ctx| s.decide_construction(ctx));
        assert_eq!(fx.red().buildings.len(), 1);
        assert_eq!(fx.red().ledger.balances(), ResourceBundle::new(500, 500, 500, 500));
    }

    #[test]
    fn test_workers_created_next_to_headquarters() {
        let mut fx = Fixture::new(ResourceBundle::new(100, 100, 0, 0));
        fx.run(|s, ctx| s.decide_production(ctx));

        let worker = fx.catalog.unit_id("worker").unwrap();
        assert_eq!(fx.red().count_units(worker), 1);
        let agent = fx.red().agents.values().next().unwrap();
        let hq = Footprint::new(CellPos::new(6, 6), 2);
        assert_eq!(hq.cell_distance(agent.cell()), 1);
        assert_eq!(fx.red().ledger.balances(), ResourceBundle::new(70, 90, 0, 0));
    }

    #[test]
    fn test_worker_cap_stops_production() {
        let mut fx = Fixture::new(ResourceBundle::new(1_000, 1_000, 0, 0));
        for _ in 0..4 {
            fx.run(|s, ctx| s.decide_production(ctx));
        }
        let worker = fx.catalog.unit_id("worker").unwrap();
        assert_eq!(fx.red().count_units(worker), 3);
    }

    #[test]
    fn test_population_cap_stops_production() {
        let mut fx = Fixture::new(ResourceBundle::new(1_000, 1_000, 0, 0));
        fx.factions[1].population_cap = 2;
        for _ in 0..4 {
            fx.run(|s, ctx| s.decide_production(ctx));
        }
        let worker = fx.catalog.unit_id("worker").unwrap();
        assert_eq!(fx.red().count_units(worker), 2);
        assert_eq!(fx.red().ledger.balances(), ResourceBundle::new(940, 980, 0, 0));
    }

    #[test]
    fn test_research_queued_in_catalog_order() {
        let mut fx = Fixture::new(ResourceBundle::new(1_000, 1_000, 1_000, 1_000));
        let lab = fx.place(1, "lab", CellPos::new(20, 6));
        for _ in 0..3 {
            fx.run(|s, ctx| s.decide_research(ctx));
        }

        let queued: Vec<_> = fx
            .red()
            .buildings
            .get(lab)
            .unwrap()
            .research
            .items()
            .map(|item| item.upgrade)
            .collect();
        let wood = fx.catalog.upgrade_id("wood_gathering").unwrap();
        let stone = fx.catalog.upgrade_id("stone_gathering").unwrap();
        // The metal upgrade waits for stone to finish.
        assert_eq!(queued, vec![wood, stone]);
        assert_eq!(
            fx.red().ledger.balances(),
            ResourceBundle::new(900, 900, 900, 1_000)
        );
    }

    #[test]
    fn test_research_skipped_when_defending() {
        let mut fx = Fixture::new(ResourceBundle::new(1_000, 1_000, 1_000, 1_000));
        let lab = fx.place(1, "lab", CellPos::new(20, 6));
        fx.strategist.priority = Priority::Defense;
        fx.run(|s, ctx| s.decide_research(ctx));
        assert!(fx.red().buildings.get(lab).unwrap().research.is_empty());
    }

    #[test]
    fn test_idle_worker_sent_to_remembered_deposit() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        let id = DepositId(1);
        fx.deposits
            .insert(id, ResourceDeposit::new(id, CellPos::new(14, 6), ResourceKind::Gold, 500));
        let worker = fx.spawn(1, "worker", CellPos::new(9, 6));
        fx.run(|s, ctx| s.direct(ctx));

        let agent = fx.red().agents.get(worker).unwrap();
        assert_eq!(agent.worked_deposit(), Some(id));
    }

    #[test]
    fn test_scouts_stay_near_base_before_contact() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        let scout = fx.spawn(1, "scout", CellPos::new(9, 6));
        fx.run(|s, ctx| s.direct(ctx));

        let agent = fx.red().agents.get(scout).unwrap();
        assert!(matches!(
            agent.state,
            AgentState::Scouting {
                range: ScoutRange::Around { .. },
                ..
            }
        ));

        fx.spawn(0, "worker", CellPos::new(9, 9));
        fx.run(|s, ctx| s.direct(ctx));
        let agent = fx.red().agents.get(scout).unwrap();
        assert!(matches!(
            agent.state,
            AgentState::Scouting {
                range: ScoutRange::Map,
                ..
            }
        ));
    }

    #[test]
    fn test_idle_combat_agents_patrol_headquarters() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        let soldier = fx.spawn(1, "soldier", CellPos::new(10, 10));
        fx.run(|s, ctx| s.direct(ctx));

        let agent = fx.red().agents.get(soldier).unwrap();
        assert!(matches!(
            agent.state,
            AgentState::Patrol {
                zone: PatrolZone {
                    kind: ZoneKind::Headquarters(_),
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn test_defense_sends_combat_agents_at_remembered_enemy() {
        let mut fx = Fixture::new(ResourceBundle::ZERO);
        fx.spawn(1, "worker", CellPos::new(9, 6));
        fx.spawn(1, "worker", CellPos::new(9, 7));
        let soldier = fx.spawn(1, "soldier", CellPos::new(10, 10));
        let intruder = fx.spawn(0, "soldier", CellPos::new(14, 14));

        fx.cycle();
        fx.cycle();
        assert_eq!(fx.strategist.priority(), Priority::Defense);
        let agent = fx.red().agents.get(soldier).unwrap();
        let rallying = matches!(
            agent.state,
            AgentState::Moving {
                purpose: MovePurpose::Rally(TargetRef::Agent(target)),
                ..
            } if target == intruder
        );
        assert!(rallying, "lone soldier should rally, got {:?}", agent.state);
    }
}
