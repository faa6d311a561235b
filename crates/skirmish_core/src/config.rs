//! Tunable simulation constants.
//!
//! Durations are in ticks, distances in world units unless the field name
//! says `cells`. Every field has a default, so a RON override only needs the
//! values it changes:
//!
//! ```ron
//! SimConfig(
//!     engagement_threshold: 4,
//!     memory_ttl: 300,
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::economy::ResourceBundle;
use crate::error::{GameError, Result};
use crate::math::{units, Fixed};

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Simulation tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks per simulated second.
    pub tick_rate: u32,
    /// Ticks between strategist cycles.
    pub strategist_interval: u32,
    /// Ticks an unobserved memory entry survives.
    pub memory_ttl: u64,
    /// Allies required near a target before engaging it.
    pub engagement_threshold: usize,
    /// Radius around a target used for engagement counts.
    pub engagement_radius: u32,
    /// Radius of the one-hop call for help.
    pub help_radius: u32,
    /// Ticks between gather cycles.
    pub gather_interval: u32,
    /// Free cells required between a new building and other structures.
    pub build_spacing_cells: i32,
    /// Ring radius of the build-site search.
    pub site_search_cells: i32,
    /// Ring radius of the spawn-tile search around a factory.
    pub spawn_search_cells: i32,
    /// Orbit radius while patrolling.
    pub patrol_radius: u32,
    /// Ticks per orbit step while patrolling.
    pub patrol_ticks_per_step: u32,
    /// Distance a scout flees from its attacker.
    pub flee_cells: i32,
    /// Maximum rally offset from a gated target.
    pub rally_cells: i32,
    /// Radius around a headquarters that counts as "near" for alerts.
    pub hq_alert_cells: i32,
    /// Ticks a building stays in the damaged state.
    pub damaged_recovery: u32,
    /// Distance at which a path cell counts as reached.
    pub arrival_threshold: u32,
    /// Inner radius of pre-contact scouting.
    pub scout_near_min: u32,
    /// Outer radius of pre-contact scouting.
    pub scout_near_max: u32,
    /// Resource caps before storage buildings add theirs.
    pub base_resource_caps: ResourceBundle,
    /// Population cap before factories add theirs.
    pub base_population_cap: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            strategist_interval: TICK_RATE * 3 / 2,
            memory_ttl: u64::from(TICK_RATE) * 10,
            engagement_threshold: 3,
            engagement_radius: 160,
            help_radius: 200,
            gather_interval: TICK_RATE * 3 / 2,
            build_spacing_cells: 2,
            site_search_cells: 12,
            spawn_search_cells: 2,
            patrol_radius: 80,
            patrol_ticks_per_step: 2,
            flee_cells: 6,
            rally_cells: 2,
            hq_alert_cells: 8,
            damaged_recovery: TICK_RATE * 2,
            arrival_threshold: 2,
            scout_near_min: 200,
            scout_near_max: 300,
            base_resource_caps: ResourceBundle::new(1000, 500, 300, 200),
            base_population_cap: 10,
        }
    }
}

impl SimConfig {
    /// Parse a RON override.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "config".into(),
            message: e.to_string(),
        })
    }

    /// Convert seconds to ticks at this tick rate.
    #[must_use]
    pub fn seconds(&self, seconds: u32) -> u64 {
        u64::from(seconds) * u64::from(self.tick_rate)
    }

    /// Engagement radius as a fixed-point distance.
    #[must_use]
    pub fn engagement_radius(&self) -> Fixed {
        units(self.engagement_radius)
    }

    /// Help radius as a fixed-point distance.
    #[must_use]
    pub fn help_radius(&self) -> Fixed {
        units(self.help_radius)
    }

    /// Patrol radius as a fixed-point distance.
    #[must_use]
    pub fn patrol_radius(&self) -> Fixed {
        units(self.patrol_radius)
    }

    /// Arrival threshold as a fixed-point distance.
    #[must_use]
    pub fn arrival_threshold(&self) -> Fixed {
        units(self.arrival_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_in_ticks() {
        let config = SimConfig::default();
        assert_eq!(config.strategist_interval, 30);
        assert_eq!(config.memory_ttl, 200);
        assert_eq!(config.gather_interval, 30);
        assert_eq!(config.damaged_recovery, 40);
        assert_eq!(config.seconds(11), 220);
    }

    #[test]
    fn test_partial_override() {
        let config = SimConfig::from_ron_str("(engagement_threshold: 5, memory_ttl: 40)").unwrap();
        assert_eq!(config.engagement_threshold, 5);
        assert_eq!(config.memory_ttl, 40);
        assert_eq!(config.help_radius, SimConfig::default().help_radius);
    }

    #[test]
    fn test_limit_override() {
        let config =
            SimConfig::from_ron_str("(base_population_cap: 20, base_resource_caps: (gold: 50))")
                .unwrap();
        assert_eq!(config.base_population_cap, 20);
        assert_eq!(config.base_resource_caps, ResourceBundle::new(50, 0, 0, 0));
        assert_eq!(
            SimConfig::default().base_resource_caps,
            ResourceBundle::new(1000, 500, 300, 200)
        );
    }

    #[test]
    fn test_bad_override_is_a_parse_error() {
        assert!(matches!(
            SimConfig::from_ron_str("(engagement_threshold: \"many\")"),
            Err(GameError::DataParseError { .. })
        ));
    }
}
