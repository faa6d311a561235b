//! Upgrade data structures for data-driven research definitions.

use serde::{Deserialize, Serialize};

use crate::economy::{ResourceBundle, ResourceKind};

/// What a completed upgrade changes for its faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeEffect {
    /// Workers gather `extra` more of `kind` per gather cycle.
    GatherBonus {
        /// Affected resource kind.
        kind: ResourceKind,
        /// Additional units per cycle.
        extra: u32,
    },
}

/// Data-driven upgrade definition, researched at a research building.
///
/// # Example RON
///
/// ```ron
/// UpgradeData(
///     id: "wood_gathering",
///     name: "Improved Wood Gathering",
///     cost: (gold: 50, wood: 100),
///     research_ticks: 600,
///     effect: GatherBonus(kind: Wood, extra: 1),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeData {
    /// Unique string identifier for this upgrade.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Cost, debited when the upgrade is queued.
    #[serde(default)]
    pub cost: ResourceBundle,

    /// Research time in simulation ticks.
    pub research_ticks: u32,

    /// Effect applied on completion.
    pub effect: UpgradeEffect,

    /// Upgrade ids that must be researched first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_without_prerequisites() {
        let data: UpgradeData = ron::from_str(
            r#"UpgradeData(
                id: "stone_gathering",
                name: "Improved Stone Gathering",
                cost: (gold: 50, stone: 100),
                research_ticks: 600,
                effect: GatherBonus(kind: Stone, extra: 1),
            )"#,
        )
        .unwrap();

        assert!(data.prerequisites.is_empty());
        assert_eq!(data.cost, ResourceBundle::new(50, 0, 100, 0));
        assert_eq!(
            data.effect,
            UpgradeEffect::GatherBonus {
                kind: ResourceKind::Stone,
                extra: 1
            }
        );
    }
}
