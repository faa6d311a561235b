//! Build and production profile for computer-controlled factions.

use serde::{Deserialize, Serialize};

/// Population cap for one building type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingCap {
    /// Building type id.
    pub building: String,
    /// Maximum built + queued count.
    pub cap: usize,
}

/// Per-factory population limit for one unit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRule {
    /// Unit type id.
    pub unit: String,
    /// Base population limit.
    pub limit: usize,
}

/// Strategist profile as stored in RON.
///
/// Rules are evaluated in listed order every strategist cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiProfileData {
    /// Buildings the strategist may construct.
    #[serde(default)]
    pub buildings: Vec<BuildingCap>,
    /// Units the strategist may create.
    #[serde(default)]
    pub units: Vec<UnitRule>,
}

impl AiProfileData {
    /// Default profile matching the standard catalog.
    #[must_use]
    pub fn standard() -> Self {
        let cap = |building: &str, cap| BuildingCap {
            building: building.to_string(),
            cap,
        };
        let rule = |unit: &str, limit| UnitRule {
            unit: unit.to_string(),
            limit,
        };
        Self {
            buildings: vec![
                cap("factory", 1),
                cap("barracks", 1),
                cap("hq", 1),
                cap("warehouse", 2),
                cap("lab", 1),
                cap("tower", 5),
            ],
            units: vec![
                rule("worker", 3),
                rule("soldier", 2),
                rule("scout", 1),
                rule("tank", 1),
            ],
        }
    }
}
