//! # Skirmish Core
//!
//! Deterministic mission simulation for a real-time strategy skirmish.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - One seeded random source, owned by the simulation
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Headless batch runs
//! - Determinism testing via state hashes
//! - Scripted scenarios in tests
//!
//! ## Crate Structure
//!
//! - [`terrain`] / [`pathfinding`] - Cell grid and A* search
//! - [`economy`] / [`production`] / [`research`] / [`buildings`] - Resources, queues, upgrades, structures
//! - [`agent`] / [`combat`] - Unit behaviour and damage
//! - [`memory`] / [`strategist`] - Perception and computer opponents
//! - [`simulation`] - Core simulation loop
//! - [`commands`] - Command surface for external controllers
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod agent;
pub mod buildings;
pub mod catalog;
pub mod combat;
pub mod commands;
pub mod components;
pub mod config;
pub mod data;
pub mod economy;
pub mod error;
pub mod events;
pub mod factions;
pub mod maps;
pub mod math;
pub mod memory;
pub mod pathfinding;
pub mod production;
pub mod research;
pub mod simulation;
pub mod storage;
pub mod strategist;
pub mod terrain;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{Agent, AgentState, ScoutRange, Task, TaskOutcome};
    pub use crate::buildings::{Building, BuildingState, Footprint};
    pub use crate::catalog::{BuildingTypeId, Catalog, UnitTypeId, UpgradeTypeId};
    pub use crate::commands::{CommandSurface, FactionCommands};
    pub use crate::components::{Health, TargetRef};
    pub use crate::config::SimConfig;
    pub use crate::economy::{ResourceBundle, ResourceKind, ResourceLedger};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{DestructionCause, SimEvent, TickEvents};
    pub use crate::factions::{Controller, FactionId};
    pub use crate::maps::MissionMap;
    pub use crate::research::ResearchState;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::simulation::{FactionSetup, FactionSummary, MissionSetup, Simulation};
    pub use crate::storage::EntityId;
    pub use crate::strategist::{AiProfile, Priority};
    pub use crate::terrain::{CellPos, TerrainCode, TerrainGrid};
}
