//! Scenario loading and configuration.
//!
//! A scenario names a map (a built-in preset or inline terrain rows), the
//! participating factions and optional overrides for the catalog, tuning and
//! strategist profile. Scenarios are stored as RON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use skirmish_core::catalog::Catalog;
use skirmish_core::config::SimConfig;
use skirmish_core::data::{AiProfileData, CatalogData};
use skirmish_core::error::GameError;
use skirmish_core::maps::{MapData, MissionMap};
use skirmish_core::simulation::{FactionSetup, MissionSetup};
use skirmish_core::strategist::AiProfile;
use thiserror::Error;

/// Name of the scenario built into the runner.
pub const BUILTIN_SKIRMISH: &str = "skirmish_1v1";

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The scenario parsed but cannot start a mission.
    #[error("Invalid scenario: {0}")]
    InvalidScenario(#[from] GameError),
}

/// Where the terrain comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapSource {
    /// A built-in map by name (`glade`, `highlands`, `lake`).
    Preset(String),
    /// Terrain rows written into the scenario.
    Inline(MapData),
}

fn default_tick_limit() -> u64 {
    6_000
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Terrain source.
    pub map: MapSource,
    /// Default seed, used when the command line gives none.
    #[serde(default)]
    pub seed: u64,
    /// Ticks to run before stopping an undecided mission.
    #[serde(default = "default_tick_limit")]
    pub tick_limit: u64,
    /// Participants in base order.
    pub factions: Vec<FactionSetup>,
    /// Replacement unit and building types.
    #[serde(default)]
    pub catalog: Option<CatalogData>,
    /// Replacement tuning.
    #[serde(default)]
    pub config: Option<SimConfig>,
    /// Replacement strategist rules.
    #[serde(default)]
    pub ai_profile: Option<AiProfileData>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish_1v1()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario = Self::from_ron_str(&contents)?;
        tracing::debug!(path = %path.display(), name = %scenario.name, "Loaded scenario");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Resolve a command-line argument: a file path, or the built-in name.
    pub fn resolve(arg: &str) -> Result<Self, ScenarioError> {
        if arg == BUILTIN_SKIRMISH && !Path::new(arg).exists() {
            return Ok(Self::skirmish_1v1());
        }
        Self::load(arg)
    }

    /// Two computer factions on the glade preset.
    #[must_use]
    pub fn skirmish_1v1() -> Self {
        Self {
            name: "Standard 1v1 Skirmish".to_string(),
            description: "Two strategists from the standard start".to_string(),
            map: MapSource::Preset("glade".to_string()),
            seed: 0,
            tick_limit: default_tick_limit(),
            factions: vec![
                FactionSetup::computer("red"),
                FactionSetup::computer("blue"),
            ],
            catalog: None,
            config: None,
            ai_profile: None,
        }
    }

    /// Build the mission for one seed.
    ///
    /// # Errors
    ///
    /// [`ScenarioError::InvalidScenario`] when the map, catalog or profile
    /// does not resolve.
    pub fn mission_setup(&self, seed: u64) -> Result<MissionSetup, ScenarioError> {
        if self.factions.is_empty() {
            return Err(GameError::InvalidMap("scenario has no factions".into()).into());
        }

        let map = match &self.map {
            MapSource::Preset(name) => MissionMap::preset(name, seed)?,
            MapSource::Inline(data) => MissionMap::from_data(data)?,
        };
        let catalog = match &self.catalog {
            Some(data) => Catalog::from_data(data)?,
            None => Catalog::standard(),
        };
        let profile = self
            .ai_profile
            .as_ref()
            .map(|data| AiProfile::from_data(data, &catalog))
            .transpose()?;

        let mut setup = MissionSetup::new(map, self.factions.clone()).with_seed(seed);
        setup.catalog = catalog;
        setup.config = self.config.clone().unwrap_or_default();
        setup.profile = profile;
        Ok(setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::factions::Controller;
    use skirmish_core::simulation::Simulation;

    const INLINE: &str = r#"(
        name: "tiny",
        map: Inline((
            name: "tiny",
            rows: [
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
                "................",
            ],
            bases: [(1, 1), (12, 8)],
        )),
        seed: 7,
        tick_limit: 50,
        factions: [
            (name: "red", controller: Computer),
            (name: "blue", units: []),
        ],
    )"#;

    #[test]
    fn test_default_scenario() {
        let scenario = Scenario::default();
        assert_eq!(scenario.factions.len(), 2);
        assert_eq!(scenario.map, MapSource::Preset("glade".into()));
        assert!(scenario.tick_limit > 0);
    }

    #[test]
    fn test_parse_inline_scenario() {
        let scenario = Scenario::from_ron_str(INLINE).unwrap();
        assert_eq!(scenario.name, "tiny");
        assert_eq!(scenario.seed, 7);
        assert_eq!(scenario.tick_limit, 50);
        assert_eq!(scenario.factions[0].controller, Controller::Computer);
        assert_eq!(scenario.factions[0].units.len(), 3);
        assert!(scenario.factions[1].units.is_empty());
        assert!(scenario.config.is_none());
    }

    #[test]
    fn test_inline_scenario_starts() {
        let scenario = Scenario::from_ron_str(INLINE).unwrap();
        let sim = Simulation::new(scenario.mission_setup(scenario.seed).unwrap()).unwrap();
        assert_eq!(sim.factions().len(), 2);
        assert_eq!(sim.terrain().width(), 16);
    }

    #[test]
    fn test_config_override() {
        let source = INLINE.replace(
            "tick_limit: 50,",
            "tick_limit: 50, config: Some((engagement_threshold: 5)),",
        );
        let scenario = Scenario::from_ron_str(&source).unwrap();
        let setup = scenario.mission_setup(0).unwrap();
        assert_eq!(setup.config.engagement_threshold, 5);
        assert_eq!(setup.config.memory_ttl, SimConfig::default().memory_ttl);
    }

    #[test]
    fn test_unknown_preset_is_invalid() {
        let scenario = Scenario {
            map: MapSource::Preset("atlantis".into()),
            ..Scenario::default()
        };
        assert!(matches!(
            scenario.mission_setup(0),
            Err(ScenarioError::InvalidScenario(GameError::InvalidMap(_)))
        ));
    }

    #[test]
    fn test_no_factions_is_invalid() {
        let scenario = Scenario {
            factions: Vec::new(),
            ..Scenario::default()
        };
        assert!(matches!(
            scenario.mission_setup(0),
            Err(ScenarioError::InvalidScenario(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.ron");
        std::fs::write(&path, INLINE).unwrap();

        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.name, "tiny");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ron");
        assert!(matches!(
            Scenario::load(&path),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(name: ").unwrap();
        assert!(matches!(
            Scenario::load(&path),
            Err(ScenarioError::ParseError(_))
        ));
    }

    #[test]
    fn test_bundled_scenarios_start() {
        let bundled = [
            include_str!("../../../scenarios/glade_duel.ron"),
            include_str!("../../../scenarios/river_crossing.ron"),
        ];
        for source in bundled {
            let scenario = Scenario::from_ron_str(source).unwrap();
            let sim = Simulation::new(scenario.mission_setup(scenario.seed).unwrap()).unwrap();
            assert_eq!(sim.factions().len(), 2, "{}", scenario.name);
        }
    }

    #[test]
    fn test_profile_override_resolves() {
        let scenario =
            Scenario::from_ron_str(include_str!("../../../scenarios/glade_duel.ron")).unwrap();
        let setup = scenario.mission_setup(0).unwrap();
        let profile = setup.profile.unwrap();
        assert_eq!(profile.buildings.len(), 3);
        assert_eq!(profile.units.len(), 2);
        assert_eq!(setup.config.engagement_threshold, 5);
    }

    #[test]
    fn test_resolve_builtin() {
        let scenario = Scenario::resolve(BUILTIN_SKIRMISH).unwrap();
        assert_eq!(scenario, Scenario::skirmish_1v1());
    }
}
