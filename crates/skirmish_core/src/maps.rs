//! Mission maps: terrain, resource deposits and starting bases.
//!
//! Presets cover the standard missions; custom maps load from RON with the
//! terrain written as text rows (`.` grass, `~` water, `#` rock, `:` sand).
//!
//! # Example RON
//!
//! ```ron
//! MapData(
//!     name: "duel",
//!     rows: [
//!         "........",
//!         "..~~~~..",
//!         "........",
//!     ],
//!     bases: [(0, 0), (6, 0)],
//!     deposits: [DepositSpec(kind: Gold, cell: (x: 3, y: 2), amount: 200)],
//! )
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::economy::{DepositField, DepositId, ResourceDeposit, ResourceKind};
use crate::error::{GameError, Result};
use crate::terrain::{CellPos, TerrainCode, TerrainGrid};

/// Edge length of the preset maps in cells.
pub const PRESET_SIZE: u32 = 100;

/// A deposit placed at mission start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSpec {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Cell.
    pub cell: CellPos,
    /// Starting amount.
    pub amount: u32,
}

/// Map as stored in RON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapData {
    /// Display name.
    pub name: String,
    /// Terrain rows, top to bottom.
    pub rows: Vec<String>,
    /// Headquarters origins in faction order.
    pub bases: Vec<(i32, i32)>,
    /// Starting deposits.
    #[serde(default)]
    pub deposits: Vec<DepositSpec>,
}

/// Everything the simulation needs from a map provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionMap {
    /// Display name.
    pub name: String,
    /// Static terrain.
    pub terrain: TerrainGrid,
    /// Starting deposits.
    pub deposits: Vec<DepositSpec>,
    /// Headquarters origins; base `i` belongs to the `i`-th faction.
    pub bases: Vec<CellPos>,
}

fn deposit(kind: ResourceKind, x: i32, y: i32, amount: u32) -> DepositSpec {
    DepositSpec {
        kind,
        cell: CellPos::new(x, y),
        amount,
    }
}

/// The four standard deposits around a base, mirrored for the opponent.
fn paired_deposits(near: [(i32, i32); 4], far: [(i32, i32); 4]) -> Vec<DepositSpec> {
    const KINDS: [(ResourceKind, u32); 4] = [
        (ResourceKind::Gold, 500),
        (ResourceKind::Wood, 400),
        (ResourceKind::Stone, 300),
        (ResourceKind::Metal, 200),
    ];
    near.into_iter()
        .chain(far)
        .zip(KINDS.into_iter().cycle())
        .map(|((x, y), (kind, amount))| deposit(kind, x, y, amount))
        .collect()
}

impl MissionMap {
    /// Open glade in the middle, rock at the edges, a lake in the south and
    /// sand in the east.
    #[must_use]
    pub fn glade() -> Self {
        let terrain = TerrainGrid::from_fn(PRESET_SIZE, PRESET_SIZE, |CellPos { x, y }| {
            if x > 30 && x < 70 && y > 30 && y < 70 {
                TerrainCode::Grass
            } else if y > 85 && x > 10 && x < 90 {
                TerrainCode::Water
            } else if x < 15 || x > 85 || y < 15 || y > 85 {
                TerrainCode::Rock
            } else if x > 75 && y > 20 && y < 80 {
                TerrainCode::Sand
            } else {
                TerrainCode::Grass
            }
        });
        Self {
            name: "glade".into(),
            terrain,
            deposits: paired_deposits(
                [(25, 25), (22, 28), (35, 22), (28, 35)],
                [(75, 75), (78, 72), (65, 82), (72, 65)],
            ),
            bases: vec![CellPos::new(20, 20), CellPos::new(80, 80)],
        }
    }

    /// Rugged random terrain; the area around each base is kept clear.
    #[must_use]
    pub fn highlands(seed: u64) -> Self {
        let bases = vec![CellPos::new(20, 80), CellPos::new(80, 20)];
        let deposits = paired_deposits(
            [(30, 70), (25, 75), (35, 65), (28, 72)],
            [(70, 30), (75, 25), (65, 35), (72, 28)],
        );
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let terrain = TerrainGrid::from_fn(PRESET_SIZE, PRESET_SIZE, |cell| {
            let roll: u32 = rng.gen_range(0..100);
            let near_base = bases.iter().any(|base| base.chebyshev(cell) <= 8);
            let near_deposit = deposits.iter().any(|d| d.cell.chebyshev(cell) <= 1);
            if near_base || near_deposit {
                TerrainCode::Grass
            } else if roll < 10 {
                TerrainCode::Water
            } else if roll < 37 {
                TerrainCode::Rock
            } else if roll < 43 {
                TerrainCode::Sand
            } else {
                TerrainCode::Grass
            }
        });
        Self {
            name: "highlands".into(),
            terrain,
            deposits,
            bases,
        }
    }

    /// A lake in the centre ringed by beach, with a base in every corner.
    #[must_use]
    pub fn lake() -> Self {
        let terrain = TerrainGrid::from_fn(PRESET_SIZE, PRESET_SIZE, |CellPos { x, y }| {
            let d2 = (x - 50).pow(2) + (y - 50).pow(2);
            if d2 < 400 {
                TerrainCode::Water
            } else if d2 < 625 {
                TerrainCode::Sand
            } else if (x < 15 && y < 15) || (x > 85 && y > 85) {
                TerrainCode::Grass
            } else if x < 8 || y < 8 || x > 92 || y > 92 {
                TerrainCode::Rock
            } else {
                TerrainCode::Grass
            }
        });
        Self {
            name: "lake".into(),
            terrain,
            deposits: paired_deposits(
                [(20, 20), (15, 25), (25, 15), (18, 28)],
                [(80, 80), (85, 75), (75, 85), (82, 78)],
            ),
            bases: vec![
                CellPos::new(10, 10),
                CellPos::new(90, 90),
                CellPos::new(10, 90),
                CellPos::new(90, 10),
            ],
        }
    }

    /// Look up a preset by name.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidMap`] for unknown names.
    pub fn preset(name: &str, seed: u64) -> Result<Self> {
        match name {
            "glade" => Ok(Self::glade()),
            "highlands" => Ok(Self::highlands(seed)),
            "lake" => Ok(Self::lake()),
            other => Err(GameError::InvalidMap(format!("unknown map preset '{other}'"))),
        }
    }

    /// Build and validate a map from its RON form.
    pub fn from_data(data: &MapData) -> Result<Self> {
        let rows: Vec<&str> = data.rows.iter().map(String::as_str).collect();
        let map = Self {
            name: data.name.clone(),
            terrain: TerrainGrid::from_rows(&rows)?,
            deposits: data.deposits.clone(),
            bases: data
                .bases
                .iter()
                .map(|&(x, y)| CellPos::new(x, y))
                .collect(),
        };
        map.validate()?;
        Ok(map)
    }

    /// Parse a RON [`MapData`] document.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let data: MapData = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "map".into(),
            message: e.to_string(),
        })?;
        Self::from_data(&data)
    }

    /// Check that bases and deposits lie on the map.
    pub fn validate(&self) -> Result<()> {
        if self.bases.is_empty() {
            return Err(GameError::InvalidMap(format!("map '{}' has no bases", self.name)));
        }
        if let Some(base) = self
            .bases
            .iter()
            .find(|base| !self.terrain.in_bounds(**base))
        {
            return Err(GameError::InvalidMap(format!("base {base} is off the map")));
        }
        if let Some(spec) = self
            .deposits
            .iter()
            .find(|spec| !self.terrain.in_bounds(spec.cell))
        {
            return Err(GameError::InvalidMap(format!(
                "deposit at {} is off the map",
                spec.cell
            )));
        }
        Ok(())
    }

    /// Fresh deposits with ids `1..`.
    #[must_use]
    pub fn deposit_field(&self) -> DepositField {
        self.deposits
            .iter()
            .zip(1..)
            .map(|(spec, id)| {
                let id = DepositId(id);
                (id, ResourceDeposit::new(id, spec.cell, spec.kind, spec.amount))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::MovementClass;

    #[test]
    fn test_presets_are_valid() {
        for map in [MissionMap::glade(), MissionMap::highlands(3), MissionMap::lake()] {
            map.validate().unwrap();
            assert_eq!(map.deposits.len(), 8);
            for base in &map.bases {
                for dy in 0..2 {
                    for dx in 0..2 {
                        let cell = base.offset(dx, dy);
                        assert!(
                            map.terrain.is_passable(MovementClass::FOOT, cell),
                            "{} base cell {cell} blocked",
                            map.name
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_glade_terrain_regions() {
        let map = MissionMap::glade();
        assert_eq!(map.terrain.terrain(CellPos::new(50, 50)), Some(TerrainCode::Grass));
        assert_eq!(map.terrain.terrain(CellPos::new(50, 90)), Some(TerrainCode::Water));
        assert_eq!(map.terrain.terrain(CellPos::new(5, 50)), Some(TerrainCode::Rock));
        assert_eq!(map.terrain.terrain(CellPos::new(80, 50)), Some(TerrainCode::Sand));
    }

    #[test]
    fn test_highlands_depend_on_seed() {
        assert_eq!(MissionMap::highlands(9), MissionMap::highlands(9));
        assert_ne!(MissionMap::highlands(9).terrain, MissionMap::highlands(10).terrain);
    }

    #[test]
    fn test_deposit_field_ids() {
        let field = MissionMap::glade().deposit_field();
        let ids: Vec<u32> = field.keys().map(|id| id.0).collect();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        assert_eq!(field[&DepositId(1)].remaining(), 500);
    }

    #[test]
    fn test_map_from_ron() {
        let map = MissionMap::from_ron_str(
            r#"MapData(
                name: "duel",
                rows: ["......", "..~~..", "......"],
                bases: [(0, 0), (4, 0)],
                deposits: [DepositSpec(kind: Gold, cell: (x: 3, y: 2), amount: 200)],
            )"#,
        )
        .unwrap();
        assert_eq!(map.terrain.width(), 6);
        assert_eq!(map.terrain.terrain(CellPos::new(2, 1)), Some(TerrainCode::Water));
        assert_eq!(map.deposit_field()[&DepositId(1)].kind, ResourceKind::Gold);
    }

    #[test]
    fn test_off_map_base_rejected() {
        let err = MissionMap::from_ron_str(
            r#"MapData(name: "bad", rows: ["..", ".."], bases: [(5, 5)])"#,
        )
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidMap(_)));
        assert!(MissionMap::preset("moon", 0).is_err());
    }
}
