//! Command surface for a human-controlled faction.
//!
//! External controllers drive a faction through [`CommandSurface`]. Every
//! order is checked against faction ownership, and enemy queries only
//! return what the faction's own agents and buildings can currently see.

use crate::agent::{Task, TaskOutcome};
use crate::catalog::{BuildingTypeId, UnitTypeId, UpgradeTypeId};
use crate::components::TargetRef;
use crate::economy::ResourceBundle;
use crate::error::Result;
use crate::factions::FactionId;
use crate::math::Vec2Fixed;
use crate::simulation::Simulation;
use crate::storage::EntityId;
use crate::terrain::CellPos;

/// An enemy entity inside the faction's vision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleEnemy {
    /// Agent or building.
    pub target: TargetRef,
    /// Owner.
    pub faction: FactionId,
    /// Agent position or building centre.
    pub position: Vec2Fixed,
}

/// What a controller can do with one faction.
pub trait CommandSurface {
    /// The controlled faction.
    fn faction(&self) -> FactionId;

    /// Hand a task to one of the faction's agents.
    ///
    /// # Errors
    ///
    /// Rejected tasks leave the agent idle and report why.
    fn issue_task(&mut self, agent: EntityId, task: Task) -> Result<TaskOutcome>;

    /// Hand the same task to several agents, stopping at the first error.
    ///
    /// # Errors
    ///
    /// The first rejection.
    fn issue_tasks(&mut self, agents: &[EntityId], task: Task) -> Result<()> {
        for &agent in agents {
            self.issue_task(agent, task)?;
        }
        Ok(())
    }

    /// Order a unit at a factory.
    ///
    /// # Errors
    ///
    /// Unknown factory, wrong unit type, full queue, population cap or
    /// shortfall.
    fn enqueue_unit(&mut self, factory: EntityId, unit: UnitTypeId) -> Result<()>;

    /// Queue an upgrade at a research building.
    ///
    /// # Errors
    ///
    /// Unknown or non-research building, upgrade already researched or
    /// queued, missing prerequisite, full queue or shortfall.
    fn enqueue_research(&mut self, lab: EntityId, upgrade: UpgradeTypeId) -> Result<()>;

    /// Place a construction site.
    ///
    /// # Errors
    ///
    /// Invalid site or shortfall.
    fn queue_construction(&mut self, building: BuildingTypeId, origin: CellPos) -> Result<EntityId>;

    /// Handles of the faction's living agents.
    fn own_agents(&self) -> Vec<EntityId>;

    /// Enemy agents and buildings within the faction's vision.
    fn visible_enemies(&self) -> Vec<VisibleEnemy>;

    /// Current balances.
    fn resources(&self) -> ResourceBundle;
}

/// [`CommandSurface`] over a borrowed simulation.
#[derive(Debug)]
pub struct FactionCommands<'a> {
    sim: &'a mut Simulation,
    faction: FactionId,
}

impl<'a> FactionCommands<'a> {
    /// Control `faction` in `sim`.
    pub fn new(sim: &'a mut Simulation, faction: FactionId) -> Self {
        Self { sim, faction }
    }

    /// The underlying simulation.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        self.sim
    }
}

impl CommandSurface for FactionCommands<'_> {
    fn faction(&self) -> FactionId {
        self.faction
    }

    fn issue_task(&mut self, agent: EntityId, task: Task) -> Result<TaskOutcome> {
        self.sim
            .issue_task(self.faction, agent, task)
            .map_err(|err| {
                tracing::warn!(faction = %self.faction, %agent, ?task, %err, "Task rejected");
                err
            })
    }

    fn enqueue_unit(&mut self, factory: EntityId, unit: UnitTypeId) -> Result<()> {
        self.sim
            .enqueue_unit(self.faction, factory, unit)
            .map_err(|err| {
                tracing::warn!(faction = %self.faction, %factory, %err, "Unit order rejected");
                err
            })
    }

    fn enqueue_research(&mut self, lab: EntityId, upgrade: UpgradeTypeId) -> Result<()> {
        self.sim
            .enqueue_research(self.faction, lab, upgrade)
            .map_err(|err| {
                tracing::warn!(faction = %self.faction, %lab, %err, "Research rejected");
                err
            })
    }

    fn queue_construction(&mut self, building: BuildingTypeId, origin: CellPos) -> Result<EntityId> {
        self.sim
            .queue_construction(self.faction, building, origin)
            .map_err(|err| {
                tracing::warn!(faction = %self.faction, %origin, %err, "Construction rejected");
                err
            })
    }

    fn own_agents(&self) -> Vec<EntityId> {
        self.sim
            .faction(self.faction)
            .map(|f| {
                f.agents
                    .values()
                    .filter(|a| a.health.is_alive())
                    .map(|a| a.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn visible_enemies(&self) -> Vec<VisibleEnemy> {
        let Some(own) = self.sim.faction(self.faction) else {
            return Vec::new();
        };
        let vision = own.vision();
        let seen = |point: Vec2Fixed| vision.iter().any(|circle| circle.contains(point));
        let snapshot = self.sim.snapshot();

        let agents = snapshot
            .agents()
            .filter(|a| a.faction != self.faction && seen(a.position))
            .map(|a| VisibleEnemy {
                target: TargetRef::Agent(a.id),
                faction: a.faction,
                position: a.position,
            });
        let buildings = snapshot
            .buildings()
            .filter(|b| b.faction != self.faction && seen(b.footprint.center()))
            .map(|b| VisibleEnemy {
                target: TargetRef::Building(b.id),
                faction: b.faction,
                position: b.footprint.center(),
            });
        agents.chain(buildings).collect()
    }

    fn resources(&self) -> ResourceBundle {
        self.sim
            .faction(self.faction)
            .map(|f| f.ledger.balances())
            .unwrap_or_default()
    }
}
