//! Unit agents and their per-tick state machine.
//!
//! Human- and computer-controlled agents share this code. Orders arrive as
//! [`Task`] values through [`Agent::assign`]; an assignment overwrites the
//! previous task. Every tick [`Agent::update`] advances the current state.
//!
//! ```text
//!            assign                 path done
//!   Idle ───────────► Moving ─────────────────► arrival hook ──► Idle
//!                      │  ▲                        │
//!                      │  └── deliver, resume ─────┤
//!                      ▼                           ▼
//!                   Attack                    Gathering ──full/empty──► Moving(to storage)
//!
//!   Patrol ──enemy sensed──► Attack       Scouting ──waypoint reached──► Scouting
//!   any ──damaged──► Retreat (workers, scouts) | Attack (combat)
//! ```
//!
//! Combat agents only commit to an assigned target once enough allies are
//! already near it; otherwise they rally close by and check again on
//! arrival.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{UnitType, UnitTypeId};
use crate::combat::{Hit, Weapon};
use crate::components::{Health, TargetRef};
use crate::config::SimConfig;
use crate::data::UnitRole;
use crate::economy::{DepositField, DepositId, ResourceKind, ResourceLedger};
use crate::error::{GameError, Result};
use crate::events::{SimEvent, TickEvents};
use crate::factions::FactionId;
use crate::math::{fixed_serde, units, unit_circle, Fixed, Vec2Fixed, ORBIT_STEPS};
use crate::pathfinding::{find_path, is_walkable, nearest_open_cell, ObstacleSet, Path, PathError};
use crate::research::ResearchState;
use crate::storage::EntityId;
use crate::terrain::{CellPos, MovementClass, TerrainGrid, CELL_SIZE};
use crate::world::Snapshot;

/// Distance from a storage footprint at which cargo can be unloaded.
pub const DELIVERY_REACH: u32 = (CELL_SIZE as u32) * 3 / 2;

const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Enough allies near the target, and more of them than enemy combatants.
fn gate_open(allies: usize, enemies: usize, config: &SimConfig) -> bool {
    allies >= config.engagement_threshold && allies > enemies
}

// ============================================================================
// Tasks
// ============================================================================

/// What a patrol orbits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneKind {
    /// A headquarters.
    Headquarters(EntityId),
    /// A deposit being worked.
    Deposit(DepositId),
    /// A free map point.
    Waypoint,
}

/// Orbit centre of a patrol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatrolZone {
    /// What the zone protects.
    pub kind: ZoneKind,
    /// Orbit centre.
    pub center: Vec2Fixed,
}

/// Where a scout picks its next waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoutRange {
    /// A ring around a point (before contact).
    Around {
        /// Ring centre.
        center: Vec2Fixed,
    },
    /// Any cell on the map (after contact).
    Map,
}

impl ScoutRange {
    /// Pick a random waypoint in range, clamped to the grid.
    pub fn pick<R: Rng>(self, grid: &TerrainGrid, config: &SimConfig, rng: &mut R) -> CellPos {
        match self {
            Self::Around { center } => {
                let step = rng.gen_range(0..ORBIT_STEPS);
                let radius = rng.gen_range(config.scout_near_min..=config.scout_near_max);
                grid.clamp(CellPos::from_world(
                    center + unit_circle(step) * units(radius),
                ))
            }
            Self::Map => CellPos::new(
                rng.gen_range(0..grid.width().max(1)) as i32,
                rng.gen_range(0..grid.height().max(1)) as i32,
            ),
        }
    }
}

/// An order for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Walk to a point.
    MoveTo(Vec2Fixed),
    /// Work a deposit until told otherwise (workers).
    GatherAt(DepositId),
    /// Attack an entity (combat agents, gated).
    Attack(TargetRef),
    /// Orbit a zone.
    Patrol(PatrolZone),
    /// Explore, starting at a waypoint.
    Scout {
        /// First waypoint.
        waypoint: Vec2Fixed,
        /// Where later waypoints are drawn from.
        range: ScoutRange,
    },
    /// Fall back to a point, ignoring further damage until arrival.
    Retreat(Vec2Fixed),
    /// Drop the current task.
    Stop,
}

/// How an accepted task started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The agent is executing the task.
    Started,
    /// Too few allies near the target; the agent moves to a rally point.
    Rallying,
}

// ============================================================================
// State
// ============================================================================

/// Carried resources of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cargo {
    /// Amount carried.
    pub carried: u32,
    /// Kind carried, if any.
    pub kind: Option<ResourceKind>,
    /// Maximum load.
    pub capacity: u32,
}

impl Cargo {
    /// Empty cargo hold.
    #[must_use]
    pub const fn empty(capacity: u32) -> Self {
        Self {
            carried: 0,
            kind: None,
            capacity,
        }
    }

    /// True when no more fits.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.carried >= self.capacity
    }
}

/// Role-specific data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleState {
    /// Gathers and delivers resources.
    Worker(Cargo),
    /// Fights.
    Combat(Weapon),
    /// Explores.
    Scout,
}

/// Why an agent is walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovePurpose {
    /// Plain move order.
    Plain,
    /// Walking to a deposit to gather.
    ToDeposit(DepositId),
    /// Taking cargo home; walks back to `resume` afterwards.
    ToStorage {
        /// Deposit to return to.
        resume: Option<DepositId>,
    },
    /// Waiting for allies near a target.
    Rally(TargetRef),
}

/// Agent state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    /// No task.
    Idle,
    /// Following a path.
    Moving {
        /// Final point.
        destination: Vec2Fixed,
        /// Arrival behaviour.
        purpose: MovePurpose,
    },
    /// Working a deposit.
    Gathering {
        /// The deposit.
        deposit: DepositId,
        /// Ticks until the next gather.
        timer: u32,
    },
    /// Orbiting a zone.
    Patrol {
        /// Orbit centre.
        zone: PatrolZone,
        /// Orbit step.
        step: u32,
        /// Ticks since the last step.
        timer: u32,
    },
    /// Fighting a target.
    Attack {
        /// Target.
        target: TargetRef,
        /// Cell the current chase path leads to.
        chase_cell: Option<CellPos>,
    },
    /// Falling back; damage is ignored until arrival.
    Retreat {
        /// Point to reach.
        destination: Vec2Fixed,
    },
    /// Exploring.
    Scouting {
        /// Current waypoint.
        waypoint: Vec2Fixed,
        /// Where new waypoints come from.
        range: ScoutRange,
    },
}

// ============================================================================
// Contexts
// ============================================================================

/// Read-only world access for task assignment.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    /// Terrain.
    pub grid: &'a TerrainGrid,
    /// Entities at the start of the phase.
    pub snapshot: &'a Snapshot,
    /// Deposits.
    pub deposits: &'a DepositField,
    /// Tuning.
    pub config: &'a SimConfig,
}

/// World access for one agent update.
#[derive(Debug)]
pub struct TickContext<'a, R> {
    /// Terrain.
    pub grid: &'a TerrainGrid,
    /// Entities at the start of the phase.
    pub snapshot: &'a Snapshot,
    /// Tuning.
    pub config: &'a SimConfig,
    /// Deposits, mutated by gathering.
    pub deposits: &'a mut DepositField,
    /// The agent's faction ledger, credited by deliveries.
    pub ledger: &'a mut ResourceLedger,
    /// The agent's faction research, read for gather amounts.
    pub research: &'a ResearchState,
    /// Shared random source.
    pub rng: &'a mut R,
    /// Hits queued for combat resolution.
    pub hits: &'a mut Vec<Hit>,
    /// Event sink.
    pub events: &'a mut TickEvents,
}

// ============================================================================
// Agent
// ============================================================================

/// A mobile unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Handle.
    pub id: EntityId,
    /// Owner.
    pub faction: FactionId,
    /// Unit type.
    pub unit_type: UnitTypeId,
    /// World position.
    pub position: Vec2Fixed,
    /// Health.
    pub health: Health,
    /// Current state.
    pub state: AgentState,
    /// Current path.
    pub path: Path,
    /// Role data.
    pub role: RoleState,
    /// World units per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Vision radius.
    #[serde(with = "fixed_serde")]
    pub vision: Fixed,
    /// Passable terrain.
    pub movement: MovementClass,
}

impl Agent {
    /// Create an idle agent of the given type.
    #[must_use]
    pub fn new(
        id: EntityId,
        faction: FactionId,
        type_id: UnitTypeId,
        unit_type: &UnitType,
        position: Vec2Fixed,
    ) -> Self {
        let role = match (unit_type.role, unit_type.attack) {
            (UnitRole::Worker, _) => RoleState::Worker(Cargo::empty(unit_type.carry_capacity)),
            (UnitRole::Combat, Some(attack)) => RoleState::Combat(Weapon::new(attack)),
            (UnitRole::Combat | UnitRole::Scout, _) => RoleState::Scout,
        };
        Self {
            id,
            faction,
            unit_type: type_id,
            position,
            health: Health::new(unit_type.max_health),
            state: AgentState::Idle,
            path: Path::default(),
            role,
            speed: unit_type.speed,
            vision: unit_type.vision,
            movement: unit_type.movement,
        }
    }

    /// Behavioural role.
    #[must_use]
    pub const fn role(&self) -> UnitRole {
        match self.role {
            RoleState::Worker(_) => UnitRole::Worker,
            RoleState::Combat(_) => UnitRole::Combat,
            RoleState::Scout => UnitRole::Scout,
        }
    }

    /// Cell the agent stands on.
    #[must_use]
    pub fn cell(&self) -> CellPos {
        CellPos::from_world(self.position)
    }

    /// Worker cargo, if a worker.
    #[must_use]
    pub const fn cargo(&self) -> Option<&Cargo> {
        match &self.role {
            RoleState::Worker(cargo) => Some(cargo),
            _ => None,
        }
    }

    /// Current attack target.
    #[must_use]
    pub const fn attack_target(&self) -> Option<TargetRef> {
        match self.state {
            AgentState::Attack { target, .. } => Some(target),
            _ => None,
        }
    }

    /// True while a worker runs its gather loop or retreats.
    #[must_use]
    pub const fn is_busy_gathering(&self) -> bool {
        matches!(
            self.state,
            AgentState::Gathering { .. }
                | AgentState::Retreat { .. }
                | AgentState::Moving {
                    purpose: MovePurpose::ToDeposit(_) | MovePurpose::ToStorage { .. },
                    ..
                }
        )
    }

    /// Deposit this worker is working, if any.
    #[must_use]
    pub const fn worked_deposit(&self) -> Option<DepositId> {
        match self.state {
            AgentState::Gathering { deposit, .. }
            | AgentState::Moving {
                purpose: MovePurpose::ToDeposit(deposit),
                ..
            } => Some(deposit),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------------

    /// Assign a task, replacing the current one.
    ///
    /// A failed assignment leaves the agent idle.
    ///
    /// # Errors
    ///
    /// - [`GameError::Path`] if no path to the destination exists
    /// - [`GameError::EntityNotFound`] / [`GameError::DepositNotFound`] for
    ///   stale targets
    /// - [`GameError::InvalidCommand`] if the task does not suit the role
    pub fn assign<R: Rng>(
        &mut self,
        task: Task,
        ctx: &TaskContext<'_>,
        rng: &mut R,
    ) -> Result<TaskOutcome> {
        self.path = Path::default();
        let result = self.start_task(task, ctx, rng);
        if let Err(err) = &result {
            tracing::debug!(agent = %self.id, ?task, %err, "Task rejected");
            self.state = AgentState::Idle;
            self.path = Path::default();
        }
        result
    }

    fn start_task<R: Rng>(
        &mut self,
        task: Task,
        ctx: &TaskContext<'_>,
        rng: &mut R,
    ) -> Result<TaskOutcome> {
        let obstacles = ctx.snapshot.obstacles();
        match task {
            Task::Stop => {
                self.state = AgentState::Idle;
            }
            Task::MoveTo(destination) => {
                self.route_to(CellPos::from_world(destination), ctx.grid, obstacles)?;
                self.state = AgentState::Moving {
                    destination,
                    purpose: MovePurpose::Plain,
                };
            }
            Task::Retreat(destination) => {
                let goal = self.approach(CellPos::from_world(destination), 3, ctx.grid, obstacles)?;
                self.route_to(goal, ctx.grid, obstacles)?;
                self.state = AgentState::Retreat { destination };
            }
            Task::GatherAt(deposit_id) => {
                if self.cargo().is_none() {
                    return Err(GameError::InvalidCommand(format!(
                        "agent {} cannot gather",
                        self.id
                    )));
                }
                let deposit = ctx
                    .deposits
                    .get(&deposit_id)
                    .filter(|d| !d.is_depleted())
                    .ok_or(GameError::DepositNotFound(deposit_id.0))?;
                let goal = self.approach_deposit(deposit.cell, ctx.grid, obstacles)?;
                self.route_to(goal, ctx.grid, obstacles)?;
                self.state = AgentState::Moving {
                    destination: deposit.cell.center(),
                    purpose: MovePurpose::ToDeposit(deposit_id),
                };
            }
            Task::Attack(target) => return self.start_attack(target, ctx, rng),
            Task::Patrol(zone) => {
                let first = zone.center + unit_circle(0) * ctx.config.patrol_radius();
                let goal = self
                    .approach(CellPos::from_world(first), 3, ctx.grid, obstacles)
                    .or_else(|_| {
                        self.approach(CellPos::from_world(zone.center), 3, ctx.grid, obstacles)
                    })?;
                self.route_to(goal, ctx.grid, obstacles)?;
                self.state = AgentState::Patrol {
                    zone,
                    step: 0,
                    timer: 0,
                };
            }
            Task::Scout { waypoint, range } => {
                let goal = self.approach(CellPos::from_world(waypoint), 3, ctx.grid, obstacles)?;
                self.route_to(goal, ctx.grid, obstacles)?;
                self.state = AgentState::Scouting { waypoint, range };
            }
        }
        Ok(TaskOutcome::Started)
    }

    /// Engagement gating: attack only when at least `engagement_threshold`
    /// allies (not counting this agent) are near the target and they
    /// outnumber the enemy combatants there. Otherwise rally nearby.
    fn start_attack<R: Rng>(
        &mut self,
        target: TargetRef,
        ctx: &TaskContext<'_>,
        rng: &mut R,
    ) -> Result<TaskOutcome> {
        if !matches!(self.role, RoleState::Combat(_)) {
            return Err(GameError::InvalidCommand(format!(
                "agent {} cannot attack",
                self.id
            )));
        }
        let target_position = ctx
            .snapshot
            .target_position(target)
            .ok_or(GameError::EntityNotFound(target.id().0))?;
        if ctx.snapshot.faction_of(target) == Some(self.faction) {
            return Err(GameError::InvalidCommand(format!(
                "agent {} cannot attack its own side",
                self.id
            )));
        }

        let (allies, enemies) = self.engagement_odds(target_position, ctx.snapshot, ctx.config);
        if gate_open(allies, enemies, ctx.config) {
            self.engage(target);
            return Ok(TaskOutcome::Started);
        }

        let distance = rng.gen_range(1..=ctx.config.rally_cells.max(1));
        let (dx, dy) = NEIGHBORS[rng.gen_range(0..NEIGHBORS.len())];
        let rally = ctx.grid.clamp(
            CellPos::from_world(target_position).offset(dx * distance, dy * distance),
        );
        let obstacles = ctx.snapshot.obstacles();
        let goal = self.approach(rally, 2, ctx.grid, obstacles)?;
        self.route_to(goal, ctx.grid, obstacles)?;
        tracing::debug!(agent = %self.id, allies, enemies, rally = %goal, "Rallying before attack");
        self.state = AgentState::Moving {
            destination: goal.center(),
            purpose: MovePurpose::Rally(target),
        };
        Ok(TaskOutcome::Rallying)
    }

    /// Allied combatants (not counting this agent) and enemy combatants
    /// within the engagement radius of a target.
    fn engagement_odds(
        &self,
        target_position: Vec2Fixed,
        snapshot: &Snapshot,
        config: &SimConfig,
    ) -> (usize, usize) {
        let radius = config.engagement_radius();
        let allies =
            snapshot.count_combatants_near(self.faction, target_position, radius, Some(self.id));
        let enemies = snapshot.count_enemy_combatants_near(self.faction, target_position, radius);
        (allies, enemies)
    }

    /// Re-check the gate for a pending target on reaching a rally point.
    ///
    /// Engages when the gate now opens; otherwise the agent idles until the
    /// next order.
    fn arrive_at_rally(&mut self, target: TargetRef, snapshot: &Snapshot, config: &SimConfig) {
        let Some(target_position) = snapshot
            .target_position(target)
            .filter(|_| snapshot.faction_of(target) != Some(self.faction))
        else {
            return;
        };
        let (allies, enemies) = self.engagement_odds(target_position, snapshot, config);
        if gate_open(allies, enemies, config) {
            tracing::debug!(agent = %self.id, ?target, allies, enemies, "Rally complete, engaging");
            self.engage(target);
        }
    }

    /// Attack a target immediately, bypassing gating.
    ///
    /// Returns false for agents that cannot fight.
    pub fn engage(&mut self, target: TargetRef) -> bool {
        if !matches!(self.role, RoleState::Combat(_)) {
            return false;
        }
        if self.attack_target() != Some(target) {
            self.path = Path::default();
            self.state = AgentState::Attack {
                target,
                chase_cell: None,
            };
        }
        true
    }

    /// React to a hit that left the agent alive.
    ///
    /// Scouts flee away from the attacker and workers retreat to storage;
    /// both ignore further hits until they arrive. Combat agents turn on the
    /// attacker. Returns true when the agent calls nearby allies for help.
    pub fn react_to_damage<R: Rng>(
        &mut self,
        attacker: TargetRef,
        attacker_position: Vec2Fixed,
        ctx: &TaskContext<'_>,
        rng: &mut R,
    ) -> bool {
        if matches!(self.state, AgentState::Retreat { .. }) {
            return false;
        }
        let obstacles = ctx.snapshot.obstacles();
        match self.role {
            RoleState::Combat(_) => {
                self.engage(attacker);
                true
            }
            RoleState::Scout => {
                let away = (self.position - attacker_position).normalize();
                let direction = if away == Vec2Fixed::ZERO {
                    unit_circle(rng.gen_range(0..ORBIT_STEPS))
                } else {
                    away
                };
                let flee = Fixed::from_num(ctx.config.flee_cells * CELL_SIZE);
                let (dx, dy) = NEIGHBORS[rng.gen_range(0..NEIGHBORS.len())];
                let cell = ctx.grid.clamp(
                    CellPos::from_world(self.position + direction * flee).offset(dx, dy),
                );
                self.retreat_to(cell, ctx.grid, obstacles);
                false
            }
            RoleState::Worker(_) => {
                if let Some(storage) = ctx.snapshot.nearest_storage(self.faction, self.position) {
                    let around = storage.footprint.center_cell();
                    let radius = storage.footprint.size + 1;
                    if let Ok(goal) = self.approach(around, radius, ctx.grid, obstacles) {
                        self.retreat_to(goal, ctx.grid, obstacles);
                    }
                }
                false
            }
        }
    }

    fn retreat_to(&mut self, cell: CellPos, grid: &TerrainGrid, obstacles: &ObstacleSet) {
        let routed = self
            .approach(cell, 3, grid, obstacles)
            .and_then(|goal| self.route_to(goal, grid, obstacles));
        match routed {
            Ok(()) => {
                self.state = AgentState::Retreat {
                    destination: cell.center(),
                };
            }
            Err(err) => tracing::debug!(agent = %self.id, %err, "No retreat route"),
        }
    }

    // ------------------------------------------------------------------------
    // Per-tick update
    // ------------------------------------------------------------------------

    /// Advance the state machine by one tick.
    pub fn update<R: Rng>(&mut self, ctx: &mut TickContext<'_, R>) {
        if let RoleState::Combat(weapon) = &mut self.role {
            weapon.tick();
        }
        let start = self.position;

        match self.state {
            AgentState::Idle => {}
            AgentState::Moving { purpose, .. } => {
                if self.follow_path(ctx.config) {
                    self.arrive(purpose, ctx);
                }
            }
            AgentState::Gathering { deposit, timer } => self.update_gathering(deposit, timer, ctx),
            AgentState::Patrol { zone, step, timer } => {
                self.update_patrol(zone, step, timer, ctx);
            }
            AgentState::Attack { target, chase_cell } => {
                self.update_attack(target, chase_cell, ctx);
            }
            AgentState::Retreat { .. } => {
                if self.follow_path(ctx.config) {
                    if self.at_storage(ctx.snapshot) {
                        self.unload(ctx);
                    }
                    self.state = AgentState::Idle;
                }
            }
            AgentState::Scouting { range, .. } => self.update_scouting(range, ctx),
        }

        if self.position != start {
            ctx.events.push(SimEvent::Moved {
                agent: self.id,
                position: self.position,
            });
        }
    }

    /// Step toward the next path cell. Returns true once the path is done.
    fn follow_path(&mut self, config: &SimConfig) -> bool {
        let Some(cell) = self.path.current() else {
            return true;
        };
        let target = cell.center();
        self.position = self.position.step_toward(target, self.speed);
        if self.position.within(target, config.arrival_threshold()) {
            self.path.advance();
        }
        self.path.is_finished()
    }

    fn arrive<R: Rng>(&mut self, purpose: MovePurpose, ctx: &mut TickContext<'_, R>) {
        self.state = AgentState::Idle;
        match purpose {
            MovePurpose::Plain => {}
            MovePurpose::Rally(target) => self.arrive_at_rally(target, ctx.snapshot, ctx.config),
            MovePurpose::ToDeposit(deposit_id) => {
                let ready = ctx.deposits.get(&deposit_id).is_some_and(|deposit| {
                    !deposit.is_depleted() && deposit.cell.chebyshev(self.cell()) <= 1
                });
                if ready {
                    self.state = AgentState::Gathering {
                        deposit: deposit_id,
                        timer: ctx.config.gather_interval,
                    };
                }
            }
            MovePurpose::ToStorage { resume } => {
                if !self.at_storage(ctx.snapshot) {
                    self.head_to_storage(resume, ctx.grid, ctx.snapshot);
                    return;
                }
                self.unload(ctx);
                if let Some(deposit) = resume.and_then(|id| ctx.deposits.get(&id)) {
                    if !deposit.is_depleted() {
                        let obstacles = ctx.snapshot.obstacles();
                        let routed = self
                            .approach_deposit(deposit.cell, ctx.grid, obstacles)
                            .and_then(|goal| self.route_to(goal, ctx.grid, obstacles));
                        if routed.is_ok() {
                            self.state = AgentState::Moving {
                                destination: deposit.cell.center(),
                                purpose: MovePurpose::ToDeposit(deposit.id),
                            };
                        }
                    }
                }
            }
        }
    }

    fn update_gathering<R: Rng>(
        &mut self,
        deposit_id: DepositId,
        timer: u32,
        ctx: &mut TickContext<'_, R>,
    ) {
        let timer = timer.saturating_sub(1);
        if timer > 0 {
            self.state = AgentState::Gathering {
                deposit: deposit_id,
                timer,
            };
            return;
        }

        let RoleState::Worker(cargo) = &mut self.role else {
            self.state = AgentState::Idle;
            return;
        };
        let Some(deposit) = ctx.deposits.get_mut(&deposit_id) else {
            self.head_to_storage(None, ctx.grid, ctx.snapshot);
            return;
        };
        if cargo.carried > 0 && cargo.kind != Some(deposit.kind) {
            self.head_to_storage(Some(deposit_id), ctx.grid, ctx.snapshot);
            return;
        }

        let room = cargo.capacity.saturating_sub(cargo.carried);
        let taken = deposit.gather(ctx.research.gather_amount(deposit.kind).min(room));
        cargo.carried += taken;
        if taken > 0 {
            cargo.kind = Some(deposit.kind);
        }

        if cargo.is_full() || deposit.is_depleted() {
            let resume = (!deposit.is_depleted()).then_some(deposit_id);
            self.head_to_storage(resume, ctx.grid, ctx.snapshot);
        } else {
            self.state = AgentState::Gathering {
                deposit: deposit_id,
                timer: ctx.config.gather_interval,
            };
        }
    }

    fn head_to_storage(&mut self, resume: Option<DepositId>, grid: &TerrainGrid, snapshot: &Snapshot) {
        self.state = AgentState::Idle;
        let Some(storage) = snapshot.nearest_storage(self.faction, self.position) else {
            tracing::debug!(agent = %self.id, "No storage to deliver to");
            return;
        };
        let obstacles = snapshot.obstacles();
        let routed = self
            .approach(
                storage.footprint.center_cell(),
                storage.footprint.size + 1,
                grid,
                obstacles,
            )
            .and_then(|goal| self.route_to(goal, grid, obstacles));
        match routed {
            Ok(()) => {
                self.state = AgentState::Moving {
                    destination: storage.footprint.center(),
                    purpose: MovePurpose::ToStorage { resume },
                };
            }
            Err(err) => tracing::debug!(agent = %self.id, %err, "No route to storage"),
        }
    }

    fn at_storage(&self, snapshot: &Snapshot) -> bool {
        let reach = units(DELIVERY_REACH);
        snapshot
            .nearest_storage(self.faction, self.position)
            .is_some_and(|storage| {
                storage.footprint.distance_squared_to(self.position) <= reach.saturating_mul(reach)
            })
    }

    fn unload<R: Rng>(&mut self, ctx: &mut TickContext<'_, R>) {
        let RoleState::Worker(cargo) = &mut self.role else {
            return;
        };
        let (Some(kind), amount) = (cargo.kind, cargo.carried) else {
            return;
        };
        if amount == 0 {
            return;
        }
        let credited = ctx.ledger.add(kind, amount);
        *cargo = Cargo::empty(cargo.capacity);
        if credited < amount {
            tracing::debug!(agent = %self.id, %kind, lost = amount - credited, "Storage full");
        }
        if credited > 0 {
            ctx.events.push(SimEvent::ResourcesDelivered {
                agent: self.id,
                faction: self.faction,
                kind,
                amount: credited,
            });
        }
    }

    fn update_patrol<R: Rng>(
        &mut self,
        zone: PatrolZone,
        step: u32,
        timer: u32,
        ctx: &mut TickContext<'_, R>,
    ) {
        if matches!(self.role, RoleState::Combat(_)) {
            if let Some(enemy) =
                ctx.snapshot
                    .nearest_enemy_agent(self.faction, self.position, self.vision)
            {
                self.engage(TargetRef::Agent(enemy.id));
                return;
            }
        }

        if !self.path.is_finished() {
            self.follow_path(ctx.config);
            return;
        }

        let mut step = step;
        let mut timer = timer + 1;
        if timer >= ctx.config.patrol_ticks_per_step {
            timer = 0;
            step = (step + 1) % ORBIT_STEPS;
        }
        let point = zone.center + unit_circle(step) * ctx.config.patrol_radius();
        let next = self.position.step_toward(point, self.speed);
        if is_walkable(
            self.movement,
            CellPos::from_world(next),
            ctx.grid,
            ctx.snapshot.obstacles(),
        ) {
            self.position = next;
        }
        self.state = AgentState::Patrol { zone, step, timer };
    }

    fn update_attack<R: Rng>(
        &mut self,
        target: TargetRef,
        chase_cell: Option<CellPos>,
        ctx: &mut TickContext<'_, R>,
    ) {
        let snapshot = ctx.snapshot;
        let hostile = snapshot
            .faction_of(target)
            .is_some_and(|faction| faction != self.faction);
        let Some(distance) = snapshot
            .distance_squared_to(target, self.position)
            .filter(|_| hostile)
        else {
            self.path = Path::default();
            self.state = AgentState::Idle;
            return;
        };

        let RoleState::Combat(weapon) = &mut self.role else {
            self.state = AgentState::Idle;
            return;
        };
        if weapon.in_range(distance) {
            self.path = Path::default();
            if let Some(damage) = weapon.try_fire(distance) {
                ctx.hits.push(Hit {
                    attacker: TargetRef::Agent(self.id),
                    attacker_faction: self.faction,
                    attacker_position: self.position,
                    target,
                    damage,
                });
            }
            self.state = AgentState::Attack {
                target,
                chase_cell: None,
            };
            return;
        }

        let (target_cell, around, radius) = match target {
            TargetRef::Agent(id) => match snapshot.agent(id) {
                Some(agent) => (agent.cell(), agent.cell(), 2),
                None => return,
            },
            TargetRef::Building(id) => match snapshot.building(id) {
                Some(building) => (
                    building.footprint.origin,
                    building.footprint.center_cell(),
                    building.footprint.size + 1,
                ),
                None => return,
            },
        };

        let mut chase_cell = chase_cell;
        if chase_cell != Some(target_cell) || self.path.is_finished() {
            let obstacles = snapshot.obstacles();
            let routed = self
                .approach(around, radius, ctx.grid, obstacles)
                .and_then(|goal| self.route_to(goal, ctx.grid, obstacles));
            chase_cell = match routed {
                Ok(()) => Some(target_cell),
                Err(err) => {
                    tracing::debug!(agent = %self.id, %err, "Chase path failed");
                    self.path = Path::default();
                    None
                }
            };
        }
        self.follow_path(ctx.config);
        self.state = AgentState::Attack { target, chase_cell };
    }

    fn update_scouting<R: Rng>(&mut self, range: ScoutRange, ctx: &mut TickContext<'_, R>) {
        if self.path.is_finished() {
            let cell = range.pick(ctx.grid, ctx.config, ctx.rng);
            let obstacles = ctx.snapshot.obstacles();
            let routed = self
                .approach(cell, 3, ctx.grid, obstacles)
                .and_then(|goal| self.route_to(goal, ctx.grid, obstacles));
            match routed {
                Ok(()) => {
                    self.state = AgentState::Scouting {
                        waypoint: cell.center(),
                        range,
                    };
                }
                Err(err) => {
                    tracing::debug!(agent = %self.id, %err, "Scout waypoint unreachable");
                    return;
                }
            }
        }
        self.follow_path(ctx.config);
    }

    // ------------------------------------------------------------------------
    // Path helpers
    // ------------------------------------------------------------------------

    fn route_to(
        &mut self,
        goal: CellPos,
        grid: &TerrainGrid,
        obstacles: &ObstacleSet,
    ) -> std::result::Result<(), PathError> {
        self.path = find_path(self.movement, self.cell(), goal, grid, obstacles)?;
        Ok(())
    }

    /// The current cell when it already touches the deposit.
    fn approach_deposit(
        &self,
        deposit: CellPos,
        grid: &TerrainGrid,
        obstacles: &ObstacleSet,
    ) -> std::result::Result<CellPos, PathError> {
        let here = self.cell();
        if here.chebyshev(deposit) == 1 && is_walkable(self.movement, here, grid, obstacles) {
            return Ok(here);
        }
        self.approach(deposit, 2, grid, obstacles)
    }

    /// `around` itself if walkable, else the nearest open cell.
    fn approach(
        &self,
        around: CellPos,
        radius: i32,
        grid: &TerrainGrid,
        obstacles: &ObstacleSet,
    ) -> std::result::Result<CellPos, PathError> {
        let around = grid.clamp(around);
        nearest_open_cell(self.movement, around, radius, grid, obstacles)
            .ok_or(PathError::GoalUnwalkable(around))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildings::{Building, Footprint};
    use crate::catalog::Catalog;
    use crate::economy::{ResourceBundle, ResourceDeposit};
    use crate::factions::{Controller, Faction};
    use crate::storage::IdAllocator;
    use crate::terrain::TerrainCode;
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
    }

    impl Fixture {
        fn new() -> Self {
            let factions = vec![
                Faction::new(
                    FactionId(0),
                    "blue",
                    Controller::Human,
                    ResourceLedger::default(),
                    CellPos::new(2, 2),
                ),
                Faction::new(
                    FactionId(1),
                    "red",
                    Controller::Computer,
                    ResourceLedger::default(),
                    CellPos::new(20, 20),
                ),
            ];
            Self {
                catalog: Catalog::standard(),
                grid: TerrainGrid::filled(32, 32, TerrainCode::Grass),
                config: SimConfig::default(),
                factions,
                deposits: DepositField::new(),
                ids: IdAllocator::default(),
                rng: ChaCha8Rng::seed_from_u64(7),
            }
        }

        fn spawn(&mut self, faction: u8, unit: &str, cell: CellPos) -> EntityId {
            let type_id = self.catalog.unit_id(unit).unwrap();
            let id = self.ids.allocate();
            let agent = Agent::new(
                id,
                FactionId(faction),
                type_id,
                self.catalog.unit(type_id).unwrap(),
                cell.center(),
            );
            self.factions[faction as usize].agents.insert(id, agent);
            id
        }

        fn build(&mut self, faction: u8, building: &str, origin: CellPos) -> EntityId {
            let type_id = self.catalog.building_id(building).unwrap();
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

        fn snapshot(&self) -> Snapshot {
            Snapshot::capture(&self.factions, &self.deposits)
        }

        fn assign(&mut self, faction: u8, id: EntityId, task: Task) -> Result<TaskOutcome> {
            let snapshot = self.snapshot();
            let ctx = TaskContext {
                grid: &self.grid,
                snapshot: &snapshot,
                deposits: &self.deposits,
                config: &self.config,
            };
            let agent = self.factions[faction as usize].agents.get_mut(id).unwrap();
            agent.assign(task, &ctx, &mut self.rng)
        }

        fn step(&mut self, faction: u8, id: EntityId) -> (Vec<Hit>, TickEvents) {
            let snapshot = self.snapshot();
            let mut hits = Vec::new();
            let mut events = TickEvents::new(0);
            let Faction {
                agents,
                ledger,
                research,
                ..
            } = &mut self.factions[faction as usize];
            let mut ctx = TickContext {
                grid: &self.grid,
                snapshot: &snapshot,
                config: &self.config,
                deposits: &mut self.deposits,
                ledger,
                research: &*research,
                rng: &mut self.rng,
                hits: &mut hits,
                events: &mut events,
            };
            agents.get_mut(id).unwrap().update(&mut ctx);
            (hits, events)
        }

        fn agent(&self, faction: u8, id: EntityId) -> &Agent {
            self.factions[faction as usize].agents.get(id).unwrap()
        }
    }

    #[test]
    fn test_move_follows_path_to_destination() {
        let mut fx = Fixture::new();
        let id = fx.spawn(0, "worker", CellPos::new(1, 1));
        fx.assign(0, id, Task::MoveTo(CellPos::new(4, 1).center()))
            .unwrap();
        assert_eq!(fx.agent(0, id).path.len(), 3);

        for _ in 0..40 {
            fx.step(0, id);
        }
        let agent = fx.agent(0, id);
        assert_eq!(agent.position, CellPos::new(4, 1).center());
        assert_eq!(agent.state, AgentState::Idle);
    }

    #[test]
    fn test_move_to_water_fails_and_stays_idle() {
        let mut fx = Fixture::new();
        fx.grid.set(CellPos::new(6, 6), TerrainCode::Water);
        let id = fx.spawn(0, "soldier", CellPos::new(1, 1));
        let err = fx
            .assign(0, id, Task::MoveTo(CellPos::new(6, 6).center()))
            .unwrap_err();
        assert!(matches!(err, GameError::Path(PathError::GoalUnwalkable(_))));
        assert_eq!(fx.agent(0, id).state, AgentState::Idle);

        fx.step(0, id);
        assert_eq!(fx.agent(0, id).position, CellPos::new(1, 1).center());
    }

    #[test]
    fn test_attack_rallies_without_enough_allies() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "worker", CellPos::new(15, 15));
        let attacker = fx.spawn(0, "soldier", CellPos::new(2, 2));
        fx.spawn(0, "soldier", CellPos::new(14, 15));
        fx.spawn(0, "soldier", CellPos::new(16, 15));

        let outcome = fx
            .assign(0, attacker, Task::Attack(TargetRef::Agent(enemy)))
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Rallying);
        let agent = fx.agent(0, attacker);
        assert!(matches!(
            agent.state,
            AgentState::Moving {
                purpose: MovePurpose::Rally(TargetRef::Agent(id)),
                ..
            } if id == enemy
        ));
        let rally = agent.path.goal().unwrap();
        let offset = rally.chebyshev(CellPos::new(15, 15));
        assert!((1..=3).contains(&offset), "rally offset {offset}");
    }

    #[test]
    fn test_attack_engages_with_enough_allies() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "worker", CellPos::new(15, 15));
        let attacker = fx.spawn(0, "soldier", CellPos::new(2, 2));
        for x in [13, 14, 16] {
            fx.spawn(0, "soldier", CellPos::new(x, 15));
        }

        let outcome = fx
            .assign(0, attacker, Task::Attack(TargetRef::Agent(enemy)))
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Started);
        assert_eq!(fx.agent(0, attacker).attack_target(), Some(TargetRef::Agent(enemy)));
    }

    #[test]
    fn test_attack_gating_counts_enemy_combatants() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "soldier", CellPos::new(15, 15));
        for x in [14, 16, 17] {
            fx.spawn(1, "soldier", CellPos::new(x, 16));
        }
        let attacker = fx.spawn(0, "soldier", CellPos::new(2, 2));
        for x in [13, 14, 16] {
            fx.spawn(0, "soldier", CellPos::new(x, 15));
        }

        let outcome = fx
            .assign(0, attacker, Task::Attack(TargetRef::Agent(enemy)))
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Rallying);
    }

    fn walk_until_arrival(fx: &mut Fixture, id: EntityId) {
        for _ in 0..400 {
            if !matches!(fx.agent(0, id).state, AgentState::Moving { .. }) {
                return;
            }
            fx.step(0, id);
        }
        panic!("agent {id} never arrived");
    }

    #[test]
    fn test_rally_arrival_engages_once_allies_gather() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "worker", CellPos::new(15, 15));
        let attacker = fx.spawn(0, "soldier", CellPos::new(10, 15));
        fx.spawn(0, "soldier", CellPos::new(14, 15));
        fx.spawn(0, "soldier", CellPos::new(16, 15));

        let outcome = fx
            .assign(0, attacker, Task::Attack(TargetRef::Agent(enemy)))
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Rallying);

        fx.spawn(0, "soldier", CellPos::new(15, 17));
        walk_until_arrival(&mut fx, attacker);
        assert_eq!(
            fx.agent(0, attacker).attack_target(),
            Some(TargetRef::Agent(enemy))
        );
    }

    #[test]
    fn test_rally_arrival_without_allies_idles() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "worker", CellPos::new(15, 15));
        let attacker = fx.spawn(0, "soldier", CellPos::new(10, 15));

        let outcome = fx
            .assign(0, attacker, Task::Attack(TargetRef::Agent(enemy)))
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Rallying);

        walk_until_arrival(&mut fx, attacker);
        assert_eq!(fx.agent(0, attacker).state, AgentState::Idle);
    }

    #[test]
    fn test_in_range_attack_queues_hit_with_cooldown() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "worker", CellPos::new(10, 10));
        let soldier = fx.spawn(0, "soldier", CellPos::new(10, 10));
        fx.factions[0]
            .agents
            .get_mut(soldier)
            .unwrap()
            .engage(TargetRef::Agent(enemy));

        let (hits, _) = fx.step(0, soldier);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].damage, 15);
        assert_eq!(hits[0].target, TargetRef::Agent(enemy));

        for _ in 0..13 {
            let (hits, _) = fx.step(0, soldier);
            assert!(hits.is_empty());
        }
        let (hits, _) = fx.step(0, soldier);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_attack_on_vanished_target_falls_back_to_idle() {
        let mut fx = Fixture::new();
        let soldier = fx.spawn(0, "soldier", CellPos::new(10, 10));
        fx.factions[0]
            .agents
            .get_mut(soldier)
            .unwrap()
            .engage(TargetRef::Agent(EntityId(999)));
        fx.step(0, soldier);
        assert_eq!(fx.agent(0, soldier).state, AgentState::Idle);
    }

    #[test]
    fn test_attack_chases_out_of_range_target() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "worker", CellPos::new(12, 10));
        let soldier = fx.spawn(0, "soldier", CellPos::new(4, 10));
        fx.factions[0]
            .agents
            .get_mut(soldier)
            .unwrap()
            .engage(TargetRef::Agent(enemy));

        let before = fx.agent(0, soldier).position;
        fx.step(0, soldier);
        let agent = fx.agent(0, soldier);
        assert!(agent.position.x > before.x);
        assert!(matches!(
            agent.state,
            AgentState::Attack { chase_cell: Some(cell), .. } if cell == CellPos::new(12, 10)
        ));
    }

    #[test]
    fn test_last_unit_of_deposit_sends_worker_home() {
        let mut fx = Fixture::new();
        fx.build(0, "hq", CellPos::new(2, 2));
        let deposit = DepositId(1);
        fx.deposits.insert(
            deposit,
            ResourceDeposit::new(deposit, CellPos::new(9, 9), ResourceKind::Gold, 1),
        );
        let worker = fx.spawn(0, "worker", CellPos::new(8, 9));

        fx.assign(0, worker, Task::GatherAt(deposit)).unwrap();
        fx.step(0, worker);
        assert!(matches!(
            fx.agent(0, worker).state,
            AgentState::Gathering { .. }
        ));

        for _ in 0..fx.config.gather_interval {
            fx.step(0, worker);
        }
        let agent = fx.agent(0, worker);
        assert_eq!(agent.cargo().unwrap().carried, 1);
        assert!(fx.deposits[&deposit].is_depleted());
        assert!(matches!(
            agent.state,
            AgentState::Moving {
                purpose: MovePurpose::ToStorage { resume: None },
                ..
            }
        ));
    }

    #[test]
    fn test_full_cargo_is_delivered_and_worker_returns() {
        let mut fx = Fixture::new();
        fx.build(0, "hq", CellPos::new(2, 2));
        let deposit = DepositId(1);
        fx.deposits.insert(
            deposit,
            ResourceDeposit::new(deposit, CellPos::new(8, 3), ResourceKind::Wood, 100),
        );
        let worker = fx.spawn(0, "worker", CellPos::new(7, 3));
        fx.assign(0, worker, Task::GatherAt(deposit)).unwrap();

        let mut delivered = 0;
        for _ in 0..400 {
            let (_, events) = fx.step(0, worker);
            for event in events.events {
                if let SimEvent::ResourcesDelivered { amount, kind, .. } = event {
                    assert_eq!(kind, ResourceKind::Wood);
                    delivered += amount;
                }
            }
            if delivered > 0 {
                break;
            }
        }
        assert_eq!(delivered, 10);
        assert_eq!(fx.factions[0].ledger.balance(ResourceKind::Wood), 10);
        assert_eq!(fx.deposits[&deposit].remaining(), 90);
        assert!(matches!(
            fx.agent(0, worker).state,
            AgentState::Moving {
                purpose: MovePurpose::ToDeposit(id),
                ..
            } if id == deposit
        ));
    }

    #[test]
    fn test_wood_upgrade_raises_gather_amount() {
        let mut fx = Fixture::new();
        let wood = fx.catalog.upgrade_id("wood_gathering").unwrap();
        let upgrade = fx.catalog.upgrade(wood).unwrap().clone();
        assert!(fx.factions[0].research.complete(wood, &upgrade));

        let deposit = DepositId(1);
        fx.deposits.insert(
            deposit,
            ResourceDeposit::new(deposit, CellPos::new(9, 9), ResourceKind::Wood, 100),
        );
        let worker = fx.spawn(0, "worker", CellPos::new(8, 9));
        fx.assign(0, worker, Task::GatherAt(deposit)).unwrap();
        fx.step(0, worker);
        for _ in 0..fx.config.gather_interval {
            fx.step(0, worker);
        }

        assert_eq!(fx.agent(0, worker).cargo().unwrap().carried, 4);
        assert_eq!(fx.deposits[&deposit].remaining(), 96);
    }

    #[test]
    fn test_delivery_beyond_storage_cap_is_lost() {
        let mut fx = Fixture::new();
        fx.build(0, "hq", CellPos::new(2, 2));
        fx.factions[0]
            .ledger
            .set_caps(ResourceBundle::new(1000, 6, 300, 200));
        let deposit = DepositId(1);
        fx.deposits.insert(
            deposit,
            ResourceDeposit::new(deposit, CellPos::new(8, 3), ResourceKind::Wood, 100),
        );
        let worker = fx.spawn(0, "worker", CellPos::new(7, 3));
        fx.assign(0, worker, Task::GatherAt(deposit)).unwrap();

        let mut delivered = Vec::new();
        for _ in 0..400 {
            let (_, events) = fx.step(0, worker);
            delivered.extend(events.events.into_iter().filter_map(|event| match event {
                SimEvent::ResourcesDelivered { amount, .. } => Some(amount),
                _ => None,
            }));
            if !delivered.is_empty() {
                break;
            }
        }
        assert_eq!(delivered, vec![6]);
        assert_eq!(fx.factions[0].ledger.balance(ResourceKind::Wood), 6);
        assert_eq!(fx.agent(0, worker).cargo().unwrap().carried, 0);
    }

    #[test]
    fn test_gather_rejected_for_non_workers_and_empty_deposits() {
        let mut fx = Fixture::new();
        let deposit = DepositId(3);
        fx.deposits.insert(
            deposit,
            ResourceDeposit::new(deposit, CellPos::new(9, 9), ResourceKind::Stone, 0),
        );
        let soldier = fx.spawn(0, "soldier", CellPos::new(1, 1));
        let worker = fx.spawn(0, "worker", CellPos::new(2, 1));

        assert!(matches!(
            fx.assign(0, soldier, Task::GatherAt(deposit)),
            Err(GameError::InvalidCommand(_))
        ));
        assert!(matches!(
            fx.assign(0, worker, Task::GatherAt(deposit)),
            Err(GameError::DepositNotFound(3))
        ));
    }

    #[test]
    fn test_combat_agent_turns_on_attacker() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "soldier", CellPos::new(10, 12));
        let soldier = fx.spawn(0, "soldier", CellPos::new(10, 10));
        let snapshot = fx.snapshot();
        let ctx = TaskContext {
            grid: &fx.grid,
            snapshot: &snapshot,
            deposits: &fx.deposits,
            config: &fx.config,
        };
        let agent = fx.factions[0].agents.get_mut(soldier).unwrap();
        let attacker_position = CellPos::new(10, 12).center();
        assert!(agent.react_to_damage(TargetRef::Agent(enemy), attacker_position, &ctx, &mut fx.rng));
        assert_eq!(agent.attack_target(), Some(TargetRef::Agent(enemy)));
    }

    #[test]
    fn test_scout_flees_away_and_ignores_further_hits() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn(1, "soldier", CellPos::new(10, 12));
        let scout = fx.spawn(0, "scout", CellPos::new(10, 10));
        let snapshot = fx.snapshot();
        let ctx = TaskContext {
            grid: &fx.grid,
            snapshot: &snapshot,
            deposits: &fx.deposits,
            config: &fx.config,
        };
        let agent = fx.factions[0].agents.get_mut(scout).unwrap();
        let attacker_position = CellPos::new(10, 12).center();

        assert!(!agent.react_to_damage(TargetRef::Agent(enemy), attacker_position, &ctx, &mut fx.rng));
        let AgentState::Retreat { destination } = agent.state else {
            panic!("scout should flee, got {:?}", agent.state);
        };
        assert!(destination.y < agent.position.y);

        let state = agent.state;
        agent.react_to_damage(TargetRef::Agent(enemy), attacker_position, &ctx, &mut fx.rng);
        assert_eq!(agent.state, state);
    }

    #[test]
    fn test_worker_retreats_to_storage() {
        let mut fx = Fixture::new();
        fx.build(0, "hq", CellPos::new(2, 2));
        let enemy = fx.spawn(1, "soldier", CellPos::new(12, 12));
        let worker = fx.spawn(0, "worker", CellPos::new(12, 10));
        let snapshot = fx.snapshot();
        let ctx = TaskContext {
            grid: &fx.grid,
            snapshot: &snapshot,
            deposits: &fx.deposits,
            config: &fx.config,
        };
        let agent = fx.factions[0].agents.get_mut(worker).unwrap();
        agent.react_to_damage(
            TargetRef::Agent(enemy),
            CellPos::new(12, 12).center(),
            &ctx,
            &mut fx.rng,
        );
        assert!(matches!(agent.state, AgentState::Retreat { .. }));
        let goal = agent.path.goal().unwrap();
        assert!(Footprint::new(CellPos::new(2, 2), 2).cell_distance(goal) <= 3);
    }

    #[test]
    fn test_patrol_switches_to_attack_on_sight() {
        let mut fx = Fixture::new();
        let soldier = fx.spawn(0, "soldier", CellPos::new(10, 10));
        let zone = PatrolZone {
            kind: ZoneKind::Waypoint,
            center: CellPos::new(10, 10).center(),
        };
        fx.assign(0, soldier, Task::Patrol(zone)).unwrap();
        for _ in 0..20 {
            fx.step(0, soldier);
        }
        assert!(matches!(fx.agent(0, soldier).state, AgentState::Patrol { .. }));

        let enemy = fx.spawn(1, "worker", CellPos::new(12, 12));
        fx.step(0, soldier);
        assert_eq!(
            fx.agent(0, soldier).attack_target(),
            Some(TargetRef::Agent(enemy))
        );
    }

    #[test]
    fn test_patrol_orbits_zone() {
        let mut fx = Fixture::new();
        let soldier = fx.spawn(0, "soldier", CellPos::new(10, 10));
        let center = CellPos::new(10, 10).center();
        let zone = PatrolZone {
            kind: ZoneKind::Waypoint,
            center,
        };
        fx.assign(0, soldier, Task::Patrol(zone)).unwrap();

        let mut steps = Vec::new();
        for _ in 0..200 {
            fx.step(0, soldier);
            if let AgentState::Patrol { step, .. } = fx.agent(0, soldier).state {
                steps.push(step);
            }
        }
        assert!(steps.windows(2).all(|w| w[1] == w[0] || w[1] == (w[0] + 1) % ORBIT_STEPS));
        let radius = fx.config.patrol_radius() + units(32);
        assert!(fx.agent(0, soldier).position.within(center, radius));
    }

    #[test]
    fn test_scout_picks_new_waypoint_on_arrival() {
        let mut fx = Fixture::new();
        let scout = fx.spawn(0, "scout", CellPos::new(10, 10));
        fx.assign(
            0,
            scout,
            Task::Scout {
                waypoint: CellPos::new(11, 10).center(),
                range: ScoutRange::Map,
            },
        )
        .unwrap();

        for _ in 0..10 {
            fx.step(0, scout);
        }
        let AgentState::Scouting { waypoint, .. } = fx.agent(0, scout).state else {
            panic!("scout left the scouting state");
        };
        assert_ne!(waypoint, CellPos::new(11, 10).center());
    }

    #[test]
    fn test_ledger_untouched_without_storage() {
        let mut fx = Fixture::new();
        let deposit = DepositId(1);
        fx.deposits.insert(
            deposit,
            ResourceDeposit::new(deposit, CellPos::new(9, 9), ResourceKind::Gold, 1),
        );
        let worker = fx.spawn(0, "worker", CellPos::new(8, 9));
        fx.assign(0, worker, Task::GatherAt(deposit)).unwrap();
        for _ in 0..=fx.config.gather_interval {
            fx.step(0, worker);
        }
        assert_eq!(fx.agent(0, worker).state, AgentState::Idle);
        assert_eq!(fx.factions[0].ledger.balances(), ResourceBundle::ZERO);
    }
}
