//! Perception memory of a computer-controlled faction.
//!
//! The ledger remembers the last observed state of enemy agents, enemy
//! buildings and resource deposits. Entries age in simulation ticks and are
//! dropped once they have gone unobserved for longer than the TTL, or as soon
//! as the remembered entity no longer exists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::buildings::Footprint;
use crate::catalog::{BuildingTypeId, UnitTypeId};
use crate::data::UnitRole;
use crate::economy::{DepositField, DepositId, ResourceKind};
use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::storage::EntityId;
use crate::terrain::CellPos;
use crate::world::Snapshot;

/// Area seen by one agent or building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionCircle {
    /// Centre of the circle.
    pub center: Vec2Fixed,
    /// Radius in world units.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

impl VisionCircle {
    /// Create a vision circle.
    #[must_use]
    pub const fn new(center: Vec2Fixed, radius: Fixed) -> Self {
        Self { center, radius }
    }

    /// True if `point` lies inside the circle.
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        self.center.within(point, self.radius)
    }
}

/// Last observed state of an enemy agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitSighting {
    /// Handle.
    pub id: EntityId,
    /// Owner.
    pub faction: FactionId,
    /// Unit type.
    pub unit_type: UnitTypeId,
    /// Behavioural role.
    pub role: UnitRole,
    /// Position when last seen.
    pub position: Vec2Fixed,
}

/// Last observed state of an enemy building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildingSighting {
    /// Handle.
    pub id: EntityId,
    /// Owner.
    pub faction: FactionId,
    /// Building type.
    pub building_type: BuildingTypeId,
    /// Occupied cells.
    pub footprint: Footprint,
    /// Marks a headquarters.
    pub headquarters: bool,
}

/// Last observed state of a resource deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositSighting {
    /// Deposit id.
    pub id: DepositId,
    /// Deposit cell.
    pub cell: CellPos,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Remaining amount when last seen.
    pub remaining: u32,
}

/// A sighting plus the tick it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryEntry<T> {
    /// What was seen.
    pub sighting: T,
    /// Tick of the last direct observation.
    pub last_seen: u64,
}

impl<T> MemoryEntry<T> {
    /// Ticks since the last observation.
    #[must_use]
    pub const fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_seen)
    }
}

/// Per-faction memory of what has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLedger {
    units: BTreeMap<EntityId, MemoryEntry<UnitSighting>>,
    buildings: BTreeMap<EntityId, MemoryEntry<BuildingSighting>>,
    deposits: BTreeMap<DepositId, MemoryEntry<DepositSighting>>,
    ttl: u64,
    player_contact: bool,
}

impl MemoryLedger {
    /// Empty ledger with a time-to-live in ticks.
    #[must_use]
    pub const fn new(ttl: u64) -> Self {
        Self {
            units: BTreeMap::new(),
            buildings: BTreeMap::new(),
            deposits: BTreeMap::new(),
            ttl,
            player_contact: false,
        }
    }

    /// Time-to-live in ticks.
    #[must_use]
    pub const fn ttl(&self) -> u64 {
        self.ttl
    }

    /// True once any enemy agent or building has ever been seen.
    #[must_use]
    pub const fn has_player_contact(&self) -> bool {
        self.player_contact
    }

    /// Record everything inside `vision`, then prune.
    pub fn refresh(
        &mut self,
        owner: FactionId,
        vision: &[VisionCircle],
        snapshot: &Snapshot,
        deposits: &DepositField,
        now: u64,
    ) {
        let seen = |point: Vec2Fixed| vision.iter().any(|circle| circle.contains(point));

        for agent in snapshot.agents() {
            if agent.faction == owner || !seen(agent.position) {
                continue;
            }
            self.player_contact = true;
            self.units.insert(
                agent.id,
                MemoryEntry {
                    sighting: UnitSighting {
                        id: agent.id,
                        faction: agent.faction,
                        unit_type: agent.unit_type,
                        role: agent.role,
                        position: agent.position,
                    },
                    last_seen: now,
                },
            );
        }

        for building in snapshot.buildings() {
            if building.faction == owner || !seen(building.footprint.center()) {
                continue;
            }
            self.player_contact = true;
            self.buildings.insert(
                building.id,
                MemoryEntry {
                    sighting: BuildingSighting {
                        id: building.id,
                        faction: building.faction,
                        building_type: building.building_type,
                        footprint: building.footprint,
                        headquarters: building.headquarters,
                    },
                    last_seen: now,
                },
            );
        }

        for deposit in deposits.values() {
            if deposit.is_depleted() || !seen(deposit.cell.center()) {
                continue;
            }
            self.deposits.insert(
                deposit.id,
                MemoryEntry {
                    sighting: DepositSighting {
                        id: deposit.id,
                        cell: deposit.cell,
                        kind: deposit.kind,
                        remaining: deposit.remaining(),
                    },
                    last_seen: now,
                },
            );
        }

        self.prune(snapshot, deposits, now);
    }

    /// Drop expired entries and entries whose entity is gone.
    ///
    /// Idempotent: pruning again without a world change removes nothing.
    pub fn prune(&mut self, snapshot: &Snapshot, deposits: &DepositField, now: u64) {
        let ttl = self.ttl;
        self.units.retain(|id, entry| {
            entry.age(now) <= ttl && snapshot.agent(*id).is_some()
        });
        self.buildings.retain(|id, entry| {
            entry.age(now) <= ttl && snapshot.building(*id).is_some()
        });
        self.deposits.retain(|id, entry| {
            entry.age(now) <= ttl && deposits.get(id).is_some_and(|d| !d.is_depleted())
        });
    }

    /// Remembered enemy agents in handle order.
    pub fn enemy_units(&self) -> impl Iterator<Item = &UnitSighting> {
        self.units.values().map(|entry| &entry.sighting)
    }

    /// Remembered enemy buildings in handle order.
    pub fn enemy_buildings(&self) -> impl Iterator<Item = &BuildingSighting> {
        self.buildings.values().map(|entry| &entry.sighting)
    }

    /// Remembered deposits in id order.
    pub fn deposits(&self) -> impl Iterator<Item = &DepositSighting> {
        self.deposits.values().map(|entry| &entry.sighting)
    }

    /// Entry for one enemy agent.
    #[must_use]
    pub fn unit_entry(&self, id: EntityId) -> Option<&MemoryEntry<UnitSighting>> {
        self.units.get(&id)
    }

    /// Closest remembered enemy agent within `radius` of `point`.
    #[must_use]
    pub fn nearest_enemy_unit_within(
        &self,
        point: Vec2Fixed,
        radius: Fixed,
    ) -> Option<&UnitSighting> {
        let limit = radius.saturating_mul(radius);
        self.enemy_units()
            .map(|unit| (unit.position.distance_squared(point), unit))
            .filter(|(distance, _)| *distance <= limit)
            .min_by_key(|(distance, unit)| (*distance, unit.id))
            .map(|(_, unit)| unit)
    }

    /// Closest remembered enemy agent.
    #[must_use]
    pub fn nearest_enemy_unit(&self, point: Vec2Fixed) -> Option<&UnitSighting> {
        self.enemy_units()
            .min_by_key(|unit| (unit.position.distance_squared(point), unit.id))
    }

    /// True if any remembered enemy agent is within `radius` of `point`.
    #[must_use]
    pub fn any_enemy_unit_within(&self, point: Vec2Fixed, radius: Fixed) -> bool {
        self.nearest_enemy_unit_within(point, radius).is_some()
    }

    /// Closest remembered enemy building.
    #[must_use]
    pub fn nearest_enemy_building(&self, point: Vec2Fixed) -> Option<&BuildingSighting> {
        self.enemy_buildings().min_by_key(|building| {
            (building.footprint.distance_squared_to(point), building.id)
        })
    }

    /// Closest remembered deposit that still had resources.
    #[must_use]
    pub fn nearest_deposit(&self, point: Vec2Fixed) -> Option<&DepositSighting> {
        self.deposits()
            .filter(|deposit| deposit.remaining > 0)
            .min_by_key(|deposit| (deposit.cell.center().distance_squared(point), deposit.id))
    }

    /// Number of remembered enemy agents.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of remembered enemy buildings.
    #[must_use]
    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    /// Number of remembered deposits.
    #[must_use]
    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::buildings::Building;
    use crate::catalog::Catalog;
    use crate::economy::{ResourceDeposit, ResourceLedger};
    use crate::factions::{Controller, Faction};
    use crate::math::units;

    fn factions() -> Vec<Faction> {
        vec![
            Faction::new(
                FactionId(0),
                "blue",
                Controller::Human,
                ResourceLedger::default(),
                CellPos::new(0, 0),
            ),
            Faction::new(
                FactionId(1),
                "red",
                Controller::Computer,
                ResourceLedger::default(),
                CellPos::new(10, 10),
            ),
        ]
    }

    fn add_soldier(factions: &mut [Faction], faction: u8, id: u64, cell: CellPos) {
        let catalog = Catalog::standard();
        let type_id = catalog.unit_id("soldier").unwrap();
        let agent = Agent::new(
            EntityId(id),
            FactionId(faction),
            type_id,
            catalog.unit(type_id).unwrap(),
            cell.center(),
        );
        factions[faction as usize].agents.insert(EntityId(id), agent);
    }

    fn eye(cell: CellPos, radius: u32) -> Vec<VisionCircle> {
        vec![VisionCircle::new(cell.center(), units(radius))]
    }

    #[test]
    fn test_refresh_records_only_visible_enemies() {
        let mut factions = factions();
        add_soldier(&mut factions, 0, 1, CellPos::new(3, 3));
        add_soldier(&mut factions, 0, 2, CellPos::new(20, 20));
        add_soldier(&mut factions, 1, 3, CellPos::new(4, 3));
        let snapshot = Snapshot::capture(&factions, &DepositField::new());

        let mut memory = MemoryLedger::new(200);
        memory.refresh(
            FactionId(1),
            &eye(CellPos::new(4, 3), 100),
            &snapshot,
            &DepositField::new(),
            5,
        );

        assert_eq!(memory.unit_count(), 1);
        assert_eq!(memory.unit_entry(EntityId(1)).unwrap().last_seen, 5);
        assert!(memory.has_player_contact());
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut factions = factions();
        add_soldier(&mut factions, 0, 1, CellPos::new(3, 3));
        let snapshot = Snapshot::capture(&factions, &DepositField::new());
        let deposits = DepositField::new();

        let mut memory = MemoryLedger::new(200);
        memory.refresh(FactionId(1), &eye(CellPos::new(3, 3), 50), &snapshot, &deposits, 0);
        assert_eq!(memory.unit_count(), 1);

        memory.refresh(FactionId(1), &[], &snapshot, &deposits, 200);
        assert_eq!(memory.unit_count(), 1);
        assert_eq!(memory.unit_entry(EntityId(1)).unwrap().age(200), 200);

        memory.refresh(FactionId(1), &[], &snapshot, &deposits, 220);
        assert_eq!(memory.unit_count(), 0);
        assert!(memory.has_player_contact());
    }

    #[test]
    fn test_missing_entity_is_dropped_immediately() {
        let mut factions = factions();
        add_soldier(&mut factions, 0, 1, CellPos::new(3, 3));
        let deposits = DepositField::new();
        let mut memory = MemoryLedger::new(200);
        let snapshot = Snapshot::capture(&factions, &deposits);
        memory.refresh(FactionId(1), &eye(CellPos::new(3, 3), 50), &snapshot, &deposits, 0);

        factions[0].agents.schedule_removal(EntityId(1));
        factions[0].agents.flush_removals();
        let snapshot = Snapshot::capture(&factions, &deposits);
        memory.prune(&snapshot, &deposits, 1);
        assert_eq!(memory.unit_count(), 0);
    }

    #[test]
    fn test_prune_twice_is_identical() {
        let mut factions = factions();
        add_soldier(&mut factions, 0, 1, CellPos::new(3, 3));
        add_soldier(&mut factions, 0, 2, CellPos::new(6, 3));
        let deposits = DepositField::new();
        let snapshot = Snapshot::capture(&factions, &deposits);
        let mut memory = MemoryLedger::new(200);
        memory.refresh(FactionId(1), &eye(CellPos::new(3, 3), 50), &snapshot, &deposits, 0);
        memory.refresh(FactionId(1), &eye(CellPos::new(6, 3), 50), &snapshot, &deposits, 150);

        memory.prune(&snapshot, &deposits, 210);
        let once = memory.clone();
        memory.prune(&snapshot, &deposits, 210);
        assert_eq!(memory, once);
        assert_eq!(memory.unit_count(), 1);
    }

    #[test]
    fn test_deposits_remembered_until_depleted() {
        let factions = factions();
        let mut deposits = DepositField::new();
        let id = DepositId(7);
        deposits.insert(
            id,
            ResourceDeposit::new(id, CellPos::new(5, 5), ResourceKind::Stone, 3),
        );
        let snapshot = Snapshot::capture(&factions, &deposits);
        let mut memory = MemoryLedger::new(200);
        memory.refresh(FactionId(1), &eye(CellPos::new(5, 4), 64), &snapshot, &deposits, 0);

        let origin = CellPos::new(0, 0).center();
        assert_eq!(memory.nearest_deposit(origin).unwrap().id, id);
        assert!(!memory.has_player_contact());

        deposits.get_mut(&id).unwrap().gather(3);
        memory.prune(&snapshot, &deposits, 1);
        assert!(memory.nearest_deposit(origin).is_none());
    }

    #[test]
    fn test_nearest_queries_break_ties_by_handle() {
        let mut factions = factions();
        add_soldier(&mut factions, 0, 4, CellPos::new(4, 5));
        add_soldier(&mut factions, 0, 2, CellPos::new(6, 5));
        let deposits = DepositField::new();
        let snapshot = Snapshot::capture(&factions, &deposits);
        let mut memory = MemoryLedger::new(200);
        memory.refresh(FactionId(1), &eye(CellPos::new(5, 5), 100), &snapshot, &deposits, 0);

        let center = CellPos::new(5, 5).center();
        assert_eq!(memory.nearest_enemy_unit(center).unwrap().id, EntityId(2));
        assert!(memory.any_enemy_unit_within(center, units(40)));
        assert!(!memory.any_enemy_unit_within(center, units(20)));
    }

    #[test]
    fn test_enemy_building_sighting() {
        let mut factions = factions();
        let catalog = Catalog::standard();
        let hq = catalog.building_id("hq").unwrap();
        let building_type = catalog.building(hq).unwrap();
        let building = Building::complete(
            EntityId(9),
            FactionId(0),
            hq,
            building_type,
            Footprint::new(CellPos::new(2, 2), building_type.size),
        );
        factions[0].buildings.insert(EntityId(9), building);
        let deposits = DepositField::new();
        let snapshot = Snapshot::capture(&factions, &deposits);

        let mut memory = MemoryLedger::new(200);
        memory.refresh(FactionId(1), &eye(CellPos::new(6, 6), 200), &snapshot, &deposits, 0);
        let seen = memory.nearest_enemy_building(CellPos::new(6, 6).center()).unwrap();
        assert!(seen.headquarters);
        assert_eq!(memory.building_count(), 1);
    }
}
