//! Data structures for unit, building, upgrade and strategist configuration.
//!
//! All structs are designed to be deserialized from RON files.
//!
//! **Note:** This module contains no IO - it only defines data types.
//! File loading is handled by the headless runner.

mod ai_profile;
mod building_data;
mod unit_data;
mod upgrade_data;

use serde::{Deserialize, Serialize};

pub use ai_profile::{AiProfileData, BuildingCap, UnitRule};
pub use building_data::{BuildingData, BuildingRole};
pub use unit_data::{AttackData, UnitData, UnitRole};
pub use upgrade_data::{UpgradeData, UpgradeEffect};

use crate::config::TICK_RATE;
use crate::economy::{ResourceBundle, ResourceKind};
use crate::terrain::MovementClass;

/// Every unit, building and upgrade type available in a mission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogData {
    /// Unit types.
    #[serde(default)]
    pub units: Vec<UnitData>,
    /// Building types.
    #[serde(default)]
    pub buildings: Vec<BuildingData>,
    /// Research upgrades.
    #[serde(default)]
    pub upgrades: Vec<UpgradeData>,
}

impl CatalogData {
    /// The standard mission catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            units: vec![
                UnitData {
                    id: "worker".into(),
                    name: "Worker".into(),
                    role: UnitRole::Worker,
                    cost: ResourceBundle::new(30, 10, 0, 0),
                    build_ticks: 60,
                    health: 40,
                    speed: 4,
                    vision: 80,
                    attack: None,
                    movement: MovementClass::FOOT,
                    carry_capacity: 10,
                    produced_at: "hq".into(),
                },
                UnitData {
                    id: "soldier".into(),
                    name: "Soldier".into(),
                    role: UnitRole::Combat,
                    cost: ResourceBundle::new(60, 0, 0, 20),
                    build_ticks: 100,
                    health: 80,
                    speed: 4,
                    vision: 120,
                    attack: Some(AttackData {
                        damage: 15,
                        range: 28,
                        cooldown: 14,
                    }),
                    movement: MovementClass::FOOT,
                    carry_capacity: 0,
                    produced_at: "barracks".into(),
                },
                UnitData {
                    id: "tank".into(),
                    name: "Tank".into(),
                    role: UnitRole::Combat,
                    cost: ResourceBundle::new(120, 0, 0, 60),
                    build_ticks: 160,
                    health: 120,
                    speed: 3,
                    vision: 140,
                    attack: Some(AttackData {
                        damage: 30,
                        range: 40,
                        cooldown: 24,
                    }),
                    movement: MovementClass::TRACKED,
                    carry_capacity: 0,
                    produced_at: "factory".into(),
                },
                UnitData {
                    id: "scout".into(),
                    name: "Scout".into(),
                    role: UnitRole::Scout,
                    cost: ResourceBundle::new(40, 0, 0, 10),
                    build_ticks: 80,
                    health: 30,
                    speed: 7,
                    vision: 220,
                    attack: None,
                    movement: MovementClass::FOOT,
                    carry_capacity: 0,
                    produced_at: "barracks".into(),
                },
            ],
            buildings: vec![
                BuildingData {
                    id: "hq".into(),
                    name: "Headquarters".into(),
                    role: BuildingRole::Storage,
                    cost: ResourceBundle::new(100, 50, 30, 0),
                    build_ticks: 100,
                    size: 2,
                    health: 1000,
                    vision: 700,
                    attack: None,
                    queue_capacity: 5,
                    storage_bonus: ResourceBundle::new(300, 300, 300, 300),
                    population_bonus: 0,
                    headquarters: true,
                },
                BuildingData {
                    id: "barracks".into(),
                    name: "Barracks".into(),
                    role: BuildingRole::Factory,
                    cost: ResourceBundle::new(60, 40, 20, 0),
                    build_ticks: 80,
                    size: 2,
                    health: 600,
                    vision: 200,
                    attack: None,
                    queue_capacity: 5,
                    storage_bonus: ResourceBundle::ZERO,
                    population_bonus: 5,
                    headquarters: false,
                },
                BuildingData {
                    id: "warehouse".into(),
                    name: "Warehouse".into(),
                    role: BuildingRole::Storage,
                    cost: ResourceBundle::new(40, 60, 10, 0),
                    build_ticks: 60,
                    size: 2,
                    health: 400,
                    vision: 200,
                    attack: None,
                    queue_capacity: 0,
                    storage_bonus: ResourceBundle::new(200, 200, 200, 200),
                    population_bonus: 0,
                    headquarters: false,
                },
                BuildingData {
                    id: "factory".into(),
                    name: "Factory".into(),
                    role: BuildingRole::Factory,
                    cost: ResourceBundle::new(150, 80, 50, 40),
                    build_ticks: 120,
                    size: 3,
                    health: 800,
                    vision: 200,
                    attack: None,
                    queue_capacity: 3,
                    storage_bonus: ResourceBundle::ZERO,
                    population_bonus: 5,
                    headquarters: false,
                },
                BuildingData {
                    id: "tower".into(),
                    name: "Tower".into(),
                    role: BuildingRole::Defense,
                    cost: ResourceBundle::new(50, 20, 40, 15),
                    build_ticks: 60,
                    size: 1,
                    health: 300,
                    vision: 100,
                    attack: Some(AttackData {
                        damage: 20,
                        range: 160,
                        cooldown: 30,
                    }),
                    queue_capacity: 0,
                    storage_bonus: ResourceBundle::ZERO,
                    population_bonus: 0,
                    headquarters: false,
                },
                BuildingData {
                    id: "lab".into(),
                    name: "Lab".into(),
                    role: BuildingRole::Research,
                    cost: ResourceBundle::new(100, 50, 50, 30),
                    build_ticks: 160,
                    size: 2,
                    health: 500,
                    vision: 200,
                    attack: None,
                    queue_capacity: 3,
                    storage_bonus: ResourceBundle::ZERO,
                    population_bonus: 0,
                    headquarters: false,
                },
            ],
            upgrades: vec![
                UpgradeData {
                    id: "wood_gathering".into(),
                    name: "Improved Wood Gathering".into(),
                    cost: ResourceBundle::new(50, 100, 0, 0),
                    research_ticks: 30 * TICK_RATE,
                    effect: UpgradeEffect::GatherBonus {
                        kind: ResourceKind::Wood,
                        extra: 1,
                    },
                    prerequisites: Vec::new(),
                },
                UpgradeData {
                    id: "stone_gathering".into(),
                    name: "Improved Stone Gathering".into(),
                    cost: ResourceBundle::new(50, 0, 100, 0),
                    research_ticks: 30 * TICK_RATE,
                    effect: UpgradeEffect::GatherBonus {
                        kind: ResourceKind::Stone,
                        extra: 1,
                    },
                    prerequisites: Vec::new(),
                },
                UpgradeData {
                    id: "metal_gathering".into(),
                    name: "Improved Metal Gathering".into(),
                    cost: ResourceBundle::new(80, 0, 60, 40),
                    research_ticks: 40 * TICK_RATE,
                    effect: UpgradeEffect::GatherBonus {
                        kind: ResourceKind::Metal,
                        extra: 1,
                    },
                    prerequisites: vec!["stone_gathering".into()],
                },
            ],
        }
    }
}
