//! Building data structures for data-driven building definitions.

use serde::{Deserialize, Serialize};

use super::unit_data::AttackData;
use crate::economy::ResourceBundle;

/// Functional role of a building type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingRole {
    /// Accepts delivered resources.
    Storage,
    /// Produces units.
    Factory,
    /// Research facility.
    Research,
    /// Static defense.
    Defense,
}

/// Data-driven building definition.
///
/// # Example RON
///
/// ```ron
/// BuildingData(
///     id: "tower",
///     name: "Tower",
///     role: Defense,
///     cost: (gold: 50, wood: 20, stone: 40, metal: 15),
///     build_ticks: 60,
///     size: 1,
///     health: 300,
///     vision: 100,
///     attack: Some(AttackData(damage: 20, range: 160, cooldown: 30)),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingData {
    /// Unique string identifier for this building type.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Functional role.
    pub role: BuildingRole,

    /// Cost to construct.
    #[serde(default)]
    pub cost: ResourceBundle,

    /// Construction time in simulation ticks.
    pub build_ticks: u32,

    /// Footprint edge length in cells (footprints are square).
    #[serde(default = "default_size")]
    pub size: u32,

    /// Maximum health points.
    pub health: u32,

    /// Vision radius in world units.
    #[serde(default = "default_vision")]
    pub vision: u32,

    /// Attack statistics for defensive buildings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<AttackData>,

    /// Maximum number of queued orders: unit orders for factories, upgrades
    /// for research buildings (0 = no queue).
    #[serde(default)]
    pub queue_capacity: usize,

    /// Storage capacity added to the owner's resource caps while operational.
    #[serde(default, skip_serializing_if = "ResourceBundle::is_empty")]
    pub storage_bonus: ResourceBundle,

    /// Population capacity added while operational.
    #[serde(default)]
    pub population_bonus: usize,

    /// Marks the faction headquarters.
    #[serde(default)]
    pub headquarters: bool,
}

/// Default footprint size.
const fn default_size() -> u32 {
    2
}

/// Default building vision radius.
const fn default_vision() -> u32 {
    200
}
