//! Resolved unit, building and upgrade type descriptors.
//!
//! [`CatalogData`] refers to types by string id; a [`Catalog`] resolves those
//! references once into dense numeric ids so the per-tick code never does a
//! string lookup.

use serde::{Deserialize, Serialize};

use crate::data::{AttackData, BuildingRole, CatalogData, UnitRole, UpgradeEffect};
use crate::economy::ResourceBundle;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, units, Fixed};
use crate::terrain::MovementClass;

/// Index of a unit type in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitTypeId(pub u16);

/// Index of a building type in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildingTypeId(pub u16);

/// Index of an upgrade in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpgradeTypeId(pub u16);

/// Attack statistics in simulation units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackProfile {
    /// Damage per hit.
    pub damage: u32,
    /// Attack range in world units.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Ticks between hits.
    pub cooldown: u32,
}

impl From<AttackData> for AttackProfile {
    fn from(data: AttackData) -> Self {
        Self {
            damage: data.damage,
            range: units(data.range),
            cooldown: data.cooldown,
        }
    }
}

/// A unit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    /// String id from the data file.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Behavioural role.
    pub role: UnitRole,
    /// Production cost.
    pub cost: ResourceBundle,
    /// Production time in ticks.
    pub build_ticks: u32,
    /// Maximum health.
    pub max_health: u32,
    /// World units per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Vision radius in world units.
    #[serde(with = "fixed_serde")]
    pub vision: Fixed,
    /// Attack statistics, if armed.
    pub attack: Option<AttackProfile>,
    /// Passable terrain.
    pub movement: MovementClass,
    /// Cargo capacity (workers).
    pub carry_capacity: u32,
    /// Building type that produces it.
    pub produced_at: BuildingTypeId,
}

/// A building type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingType {
    /// String id from the data file.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Functional role.
    pub role: BuildingRole,
    /// Construction cost.
    pub cost: ResourceBundle,
    /// Construction time in ticks.
    pub build_ticks: u32,
    /// Footprint edge length in cells.
    pub size: i32,
    /// Maximum health.
    pub max_health: u32,
    /// Vision radius in world units.
    #[serde(with = "fixed_serde")]
    pub vision: Fixed,
    /// Attack statistics for towers.
    pub attack: Option<AttackProfile>,
    /// Production or research queue capacity.
    pub queue_capacity: usize,
    /// Added to the owner's resource caps while operational.
    pub storage_bonus: ResourceBundle,
    /// Added to the owner's population cap while operational.
    pub population_bonus: usize,
    /// Marks the headquarters.
    pub headquarters: bool,
    /// Unit types this building produces.
    pub produces: Vec<UnitTypeId>,
}

impl BuildingType {
    /// True if the building can produce `unit`.
    #[must_use]
    pub fn can_produce(&self, unit: UnitTypeId) -> bool {
        self.produces.contains(&unit)
    }

    /// True for buildings that accept delivered resources.
    #[must_use]
    pub fn accepts_delivery(&self) -> bool {
        self.role == BuildingRole::Storage
    }

    /// True for buildings that research upgrades.
    #[must_use]
    pub fn researches(&self) -> bool {
        self.role == BuildingRole::Research
    }
}

/// An upgrade type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeType {
    /// String id from the data file.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Research cost.
    pub cost: ResourceBundle,
    /// Research time in ticks.
    pub research_ticks: u32,
    /// Effect on completion.
    pub effect: UpgradeEffect,
    /// Upgrades that must be researched first.
    pub prerequisites: Vec<UpgradeTypeId>,
}

/// All unit, building and upgrade types of a mission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Catalog {
    units: Vec<UnitType>,
    buildings: Vec<BuildingType>,
    upgrades: Vec<UpgradeType>,
}

impl Catalog {
    /// Resolve string references and validate the data.
    pub fn from_data(data: &CatalogData) -> Result<Self> {
        let mut buildings = Vec::with_capacity(data.buildings.len());
        for building in &data.buildings {
            if buildings.iter().any(|b: &BuildingType| b.key == building.id) {
                return Err(duplicate("building", &building.id));
            }
            if building.size == 0 {
                return Err(GameError::DataParseError {
                    path: format!("building '{}'", building.id),
                    message: "footprint size must be positive".into(),
                });
            }
            buildings.push(BuildingType {
                key: building.id.clone(),
                name: building.name.clone(),
                role: building.role,
                cost: building.cost,
                build_ticks: building.build_ticks,
                size: building.size as i32,
                max_health: building.health,
                vision: units(building.vision),
                attack: building.attack.map(AttackProfile::from),
                queue_capacity: building.queue_capacity,
                storage_bonus: building.storage_bonus,
                population_bonus: building.population_bonus,
                headquarters: building.headquarters,
                produces: Vec::new(),
            });
        }

        let mut unit_types = Vec::with_capacity(data.units.len());
        for (index, unit) in data.units.iter().enumerate() {
            if unit_types.iter().any(|u: &UnitType| u.key == unit.id) {
                return Err(duplicate("unit", &unit.id));
            }
            let factory = buildings
                .iter()
                .position(|b| b.key == unit.produced_at)
                .ok_or_else(|| GameError::DataParseError {
                    path: format!("unit '{}'", unit.id),
                    message: format!("produced_at references unknown building '{}'", unit.produced_at),
                })?;
            let id = UnitTypeId(index as u16);
            buildings[factory].produces.push(id);

            unit_types.push(UnitType {
                key: unit.id.clone(),
                name: unit.name.clone(),
                role: unit.role,
                cost: unit.cost,
                build_ticks: unit.build_ticks,
                max_health: unit.health,
                speed: units(unit.speed),
                vision: units(unit.vision),
                attack: unit.attack.map(AttackProfile::from),
                movement: unit.movement,
                carry_capacity: unit.carry_capacity,
                produced_at: BuildingTypeId(factory as u16),
            });
        }

        let mut upgrades = Vec::with_capacity(data.upgrades.len());
        for upgrade in &data.upgrades {
            if upgrades.iter().any(|u: &UpgradeType| u.key == upgrade.id) {
                return Err(duplicate("upgrade", &upgrade.id));
            }
            let mut prerequisites = Vec::with_capacity(upgrade.prerequisites.len());
            for key in &upgrade.prerequisites {
                let index = data
                    .upgrades
                    .iter()
                    .position(|u| &u.id == key)
                    .filter(|_| key != &upgrade.id)
                    .ok_or_else(|| GameError::DataParseError {
                        path: format!("upgrade '{}'", upgrade.id),
                        message: format!("invalid prerequisite '{key}'"),
                    })?;
                prerequisites.push(UpgradeTypeId(index as u16));
            }
            upgrades.push(UpgradeType {
                key: upgrade.id.clone(),
                name: upgrade.name.clone(),
                cost: upgrade.cost,
                research_ticks: upgrade.research_ticks,
                effect: upgrade.effect,
                prerequisites,
            });
        }

        Ok(Self {
            units: unit_types,
            buildings,
            upgrades,
        })
    }

    /// Parse a RON [`CatalogData`] document and resolve it.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let data: CatalogData = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "catalog".into(),
            message: e.to_string(),
        })?;
        Self::from_data(&data)
    }

    /// The standard mission catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_data(&CatalogData::standard()).unwrap_or_else(|err| {
            tracing::error!(%err, "standard catalog failed to resolve");
            Self::default()
        })
    }

    /// Look up a unit type.
    #[must_use]
    pub fn unit(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.units.get(id.0 as usize)
    }

    /// Look up a building type.
    #[must_use]
    pub fn building(&self, id: BuildingTypeId) -> Option<&BuildingType> {
        self.buildings.get(id.0 as usize)
    }

    /// Look up an upgrade type.
    #[must_use]
    pub fn upgrade(&self, id: UpgradeTypeId) -> Option<&UpgradeType> {
        self.upgrades.get(id.0 as usize)
    }

    /// Resolve a unit key.
    #[must_use]
    pub fn unit_id(&self, key: &str) -> Option<UnitTypeId> {
        self.units
            .iter()
            .position(|u| u.key == key)
            .map(|i| UnitTypeId(i as u16))
    }

    /// Resolve a building key.
    #[must_use]
    pub fn building_id(&self, key: &str) -> Option<BuildingTypeId> {
        self.buildings
            .iter()
            .position(|b| b.key == key)
            .map(|i| BuildingTypeId(i as u16))
    }

    /// Resolve an upgrade key.
    #[must_use]
    pub fn upgrade_id(&self, key: &str) -> Option<UpgradeTypeId> {
        self.upgrades
            .iter()
            .position(|u| u.key == key)
            .map(|i| UpgradeTypeId(i as u16))
    }

    /// Resolve an upgrade key or fail with [`GameError::UnknownType`].
    pub fn require_upgrade(&self, key: &str) -> Result<UpgradeTypeId> {
        self.upgrade_id(key)
            .ok_or_else(|| GameError::UnknownType(key.to_string()))
    }

    /// Resolve a unit key or fail with [`GameError::UnknownType`].
    pub fn require_unit(&self, key: &str) -> Result<UnitTypeId> {
        self.unit_id(key)
            .ok_or_else(|| GameError::UnknownType(key.to_string()))
    }

    /// Resolve a building key or fail with [`GameError::UnknownType`].
    pub fn require_building(&self, key: &str) -> Result<BuildingTypeId> {
        self.building_id(key)
            .ok_or_else(|| GameError::UnknownType(key.to_string()))
    }

    /// All unit types with their ids.
    pub fn units(&self) -> impl Iterator<Item = (UnitTypeId, &UnitType)> {
        self.units
            .iter()
            .enumerate()
            .map(|(i, u)| (UnitTypeId(i as u16), u))
    }

    /// All building types with their ids.
    pub fn buildings(&self) -> impl Iterator<Item = (BuildingTypeId, &BuildingType)> {
        self.buildings
            .iter()
            .enumerate()
            .map(|(i, b)| (BuildingTypeId(i as u16), b))
    }

    /// All upgrade types with their ids, in data order.
    pub fn upgrades(&self) -> impl Iterator<Item = (UpgradeTypeId, &UpgradeType)> {
        self.upgrades
            .iter()
            .enumerate()
            .map(|(i, u)| (UpgradeTypeId(i as u16), u))
    }
}

fn duplicate(kind: &str, id: &str) -> GameError {
    GameError::DataParseError {
        path: format!("{kind} '{id}'"),
        message: "duplicate id".into(),
    }
}
