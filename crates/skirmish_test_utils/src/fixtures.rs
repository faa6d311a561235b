//! Test fixtures and helpers.
//!
//! Pre-built missions and faction set-ups for consistent testing.

use fixed::types::I32F32;
use skirmish_core::economy::ResourceBundle;
use skirmish_core::factions::{Controller, FactionId};
use skirmish_core::maps::{DepositSpec, MissionMap};
use skirmish_core::simulation::{FactionSetup, MissionSetup, Simulation};
use skirmish_core::terrain::{CellPos, TerrainCode, TerrainGrid};

/// First faction of every fixture.
pub const RED: FactionId = FactionId(0);
/// Second faction of every fixture.
pub const BLUE: FactionId = FactionId(1);

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// All-grass map with bases in opposite corners and no deposits.
#[must_use]
pub fn open_map(size: u32) -> MissionMap {
    let far = size as i32 - 4;
    MissionMap {
        name: "open".into(),
        terrain: TerrainGrid::from_fn(size, size, |_| TerrainCode::Grass),
        deposits: Vec::new(),
        bases: vec![CellPos::new(1, 1), CellPos::new(far, far)],
    }
}

/// Add a deposit to a map.
#[must_use]
pub fn with_deposit(mut map: MissionMap, deposit: DepositSpec) -> MissionMap {
    map.deposits.push(deposit);
    map
}

/// Human faction with default balances and no starting units.
#[must_use]
pub fn bare_faction(name: &str) -> FactionSetup {
    FactionSetup {
        name: name.into(),
        controller: Controller::Human,
        starting: ResourceBundle::new(200, 150, 100, 50),
        units: Vec::new(),
    }
}

/// Two bare human factions on an open map.
///
/// # Panics
///
/// Never for the built-in catalog.
#[must_use]
pub fn duel(size: u32) -> Simulation {
    Simulation::new(MissionSetup::new(
        open_map(size),
        vec![bare_faction("red"), bare_faction("blue")],
    ))
    .expect("open map duel is valid")
}

/// Two computer factions on the glade preset.
#[must_use]
pub fn computer_skirmish(seed: u64) -> MissionSetup {
    MissionSetup::new(
        MissionMap::glade(),
        vec![
            FactionSetup::computer("red"),
            FactionSetup::computer("blue"),
        ],
    )
    .with_seed(seed)
}

/// Start a [`computer_skirmish`].
///
/// # Panics
///
/// Never for the built-in presets.
#[must_use]
pub fn start_skirmish(seed: u64) -> Simulation {
    Simulation::new(computer_skirmish(seed)).expect("glade skirmish is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_helpers() {
        assert_eq!(fixed(3), I32F32::from_num(3));
        assert_eq!(fixed_f(0.5) * fixed(2), fixed(1));
    }

    #[test]
    fn test_duel_has_two_headquarters() {
        let sim = duel(32);
        assert_eq!(sim.factions().len(), 2);
        assert_eq!(sim.faction(RED).unwrap().buildings.len(), 1);
        assert_eq!(sim.faction(BLUE).unwrap().agents.len(), 0);
    }

    #[test]
    fn test_skirmish_starts_with_workers() {
        let sim = start_skirmish(1);
        for faction in sim.factions() {
            assert_eq!(faction.agents.len(), 3);
            assert!(faction.strategist.is_some());
        }
    }
}
