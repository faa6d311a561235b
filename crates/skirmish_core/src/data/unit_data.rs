//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::economy::ResourceBundle;
use crate::terrain::MovementClass;

/// Behavioural role of a unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitRole {
    /// Gathers resources and carries them home.
    Worker,
    /// Fights.
    Combat,
    /// Explores; never attacks.
    Scout,
}

/// Attack statistics in whole world units and ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackData {
    /// Damage per hit.
    pub damage: u32,

    /// Attack range in world units.
    pub range: u32,

    /// Ticks between hits.
    pub cooldown: u32,
}

/// Data-driven unit definition.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "soldier",
///     name: "Soldier",
///     role: Combat,
///     cost: (gold: 60, metal: 20),
///     health: 80,
///     speed: 4,
///     vision: 120,
///     attack: Some(AttackData(damage: 15, range: 28, cooldown: 14)),
///     produced_at: "barracks",
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique string identifier for this unit type.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Behavioural role.
    pub role: UnitRole,

    /// Cost to produce.
    #[serde(default)]
    pub cost: ResourceBundle,

    /// Production time in simulation ticks.
    #[serde(default = "default_build_ticks")]
    pub build_ticks: u32,

    /// Maximum health points.
    pub health: u32,

    /// World units moved per tick.
    pub speed: u32,

    /// Vision radius in world units.
    pub vision: u32,

    /// Attack statistics (None for non-combatants).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<AttackData>,

    /// Terrain this unit may cross.
    #[serde(default)]
    pub movement: MovementClass,

    /// Cargo capacity for workers.
    #[serde(default)]
    pub carry_capacity: u32,

    /// Building type that produces this unit.
    pub produced_at: String,
}

/// Default production time: five seconds.
const fn default_build_ticks() -> u32 {
    100
}

impl UnitData {
    /// Check if this unit can engage in combat.
    #[must_use]
    pub fn is_combatant(&self) -> bool {
        self.attack.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let unit: UnitData = ron::from_str(
            r#"UnitData(
                id: "scout",
                name: "Scout",
                role: Scout,
                cost: (gold: 40, metal: 10),
                health: 30,
                speed: 7,
                vision: 220,
                produced_at: "barracks",
            )"#,
        )
        .unwrap();

        assert_eq!(unit.build_ticks, 100);
        assert_eq!(unit.movement, MovementClass::FOOT);
        assert_eq!(unit.cost, ResourceBundle::new(40, 0, 0, 10));
        assert!(!unit.is_combatant());
    }

    #[test]
    fn test_parse_tracked_combatant() {
        let unit: UnitData = ron::from_str(
            r#"UnitData(
                id: "tank",
                name: "Tank",
                role: Combat,
                health: 120,
                speed: 3,
                vision: 140,
                attack: Some(AttackData(damage: 30, range: 40, cooldown: 24)),
                movement: [Grass, Sand, Rock],
                produced_at: "factory",
            )"#,
        )
        .unwrap();

        assert!(unit.is_combatant());
        assert_eq!(unit.movement, MovementClass::TRACKED);
    }
}
