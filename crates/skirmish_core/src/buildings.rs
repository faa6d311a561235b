//! Buildings: footprint geometry, site and spawn-tile search, and the
//! building state machine.
//!
//! ```text
//! Construction ──► Idle ◄──► Producing   (unit or research orders)
//!                   ▲ │
//!                   │ ├────► Attacking   (towers)
//!                   │ ▼
//!                 Damaged                (only entered from Idle/Damaged)
//!
//! any ──► Destroyed (terminal)
//! ```
//!
//! All calculations use fixed-point math for deterministic simulation.

use serde::{Deserialize, Serialize};

use crate::catalog::{BuildingType, BuildingTypeId, UnitTypeId, UpgradeTypeId};
use crate::combat::{Hit, Weapon};
use crate::components::{Health, TargetRef};
use crate::data::BuildingRole;
use crate::economy::DepositField;
use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::pathfinding::{is_walkable, ObstacleSet};
use crate::production::ProductionQueue;
use crate::research::ResearchQueue;
use crate::storage::EntityId;
use crate::terrain::{CellPos, MovementClass, TerrainGrid, CELL_SIZE};
use crate::world::Snapshot;

// ============================================================================
// Footprint
// ============================================================================

/// Square block of cells occupied by a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Top-left cell.
    pub origin: CellPos,
    /// Edge length in cells.
    pub size: i32,
}

impl Footprint {
    /// Create a footprint.
    #[must_use]
    pub const fn new(origin: CellPos, size: i32) -> Self {
        Self { origin, size }
    }

    /// Occupied cells, row by row.
    pub fn cells(self) -> impl Iterator<Item = CellPos> {
        (0..self.size).flat_map(move |dy| (0..self.size).map(move |dx| self.origin.offset(dx, dy)))
    }

    /// True if the cell is part of the footprint.
    #[must_use]
    pub fn contains(self, cell: CellPos) -> bool {
        self.cell_distance(cell) == 0
    }

    /// Chebyshev distance in cells from the footprint edge to `cell`
    /// (0 inside).
    #[must_use]
    pub fn cell_distance(self, cell: CellPos) -> i32 {
        let last = self.origin.offset(self.size - 1, self.size - 1);
        let dx = (self.origin.x - cell.x).max(cell.x - last.x).max(0);
        let dy = (self.origin.y - cell.y).max(cell.y - last.y).max(0);
        dx.max(dy)
    }

    /// True when this footprint grown by `gap` cells touches `other`.
    #[must_use]
    pub fn overlaps(self, other: Self, gap: i32) -> bool {
        let a_min = self.origin.offset(-gap, -gap);
        let a_max = self.origin.offset(self.size - 1 + gap, self.size - 1 + gap);
        let b_max = other.origin.offset(other.size - 1, other.size - 1);
        a_min.x <= b_max.x && other.origin.x <= a_max.x && a_min.y <= b_max.y && other.origin.y <= a_max.y
    }

    /// World position of the footprint centre.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(
            self.origin.x * CELL_SIZE + self.size * CELL_SIZE / 2,
            self.origin.y * CELL_SIZE + self.size * CELL_SIZE / 2,
        )
    }

    /// Cell containing the footprint centre.
    #[must_use]
    pub fn center_cell(self) -> CellPos {
        CellPos::from_world(self.center())
    }

    /// Squared distance from `point` to the nearest point of the footprint.
    #[must_use]
    pub fn distance_squared_to(self, point: Vec2Fixed) -> Fixed {
        let min = Vec2Fixed::from_ints(self.origin.x * CELL_SIZE, self.origin.y * CELL_SIZE);
        let max = Vec2Fixed::from_ints(
            (self.origin.x + self.size) * CELL_SIZE,
            (self.origin.y + self.size) * CELL_SIZE,
        );
        let nearest = Vec2Fixed::new(point.x.clamp(min.x, max.x), point.y.clamp(min.y, max.y));
        nearest.distance_squared(point)
    }

    /// Cells exactly `radius` cells outside the footprint, row by row.
    pub fn ring(self, radius: i32) -> impl Iterator<Item = CellPos> {
        let min = self.origin.offset(-radius, -radius);
        let span = self.size + 2 * radius;
        (0..span).flat_map(move |dy| {
            (0..span)
                .map(move |dx| min.offset(dx, dy))
                .filter(move |cell| self.cell_distance(*cell) == radius)
        })
    }
}

// ============================================================================
// Placement
// ============================================================================

/// Everything a new footprint must keep clear of.
#[derive(Debug, Clone, Default)]
pub struct SiteBlockers {
    /// Footprints of every standing building, any faction.
    pub buildings: Vec<Footprint>,
    /// Headquarters footprints; never overlapped.
    pub headquarters: Vec<Footprint>,
    /// Deposit cells.
    pub deposits: Vec<CellPos>,
}

impl SiteBlockers {
    /// Collect standing buildings and non-depleted deposits.
    #[must_use]
    pub fn capture(snapshot: &Snapshot, deposits: &DepositField) -> Self {
        let mut blockers = Self::default();
        for building in snapshot.buildings() {
            blockers.add(building.footprint, building.headquarters);
        }
        blockers.deposits = deposits
            .values()
            .filter(|deposit| !deposit.is_depleted())
            .map(|deposit| deposit.cell)
            .collect();
        blockers
    }

    /// Register a footprint placed after the capture.
    pub fn add(&mut self, footprint: Footprint, headquarters: bool) {
        self.buildings.push(footprint);
        if headquarters {
            self.headquarters.push(footprint);
        }
    }
}

/// True when a footprint may be placed here.
///
/// Every cell must be in bounds and open ground (grass or sand). The
/// footprint grown by `spacing` cells must not touch another building or a
/// deposit, and it may never overlap a headquarters.
#[must_use]
pub fn site_is_valid(
    grid: &TerrainGrid,
    footprint: Footprint,
    blockers: &SiteBlockers,
    spacing: i32,
) -> bool {
    footprint
        .cells()
        .all(|cell| grid.is_passable(MovementClass::FOOT, cell))
        && !blockers
            .headquarters
            .iter()
            .any(|hq| footprint.overlaps(*hq, 0))
        && !blockers
            .buildings
            .iter()
            .any(|other| footprint.overlaps(*other, spacing))
        && blockers
            .deposits
            .iter()
            .all(|cell| footprint.cell_distance(*cell) > spacing)
}

/// Search square rings of radius `0..=search_radius` around `base` for the
/// first valid site.
#[must_use]
pub fn find_build_site(
    grid: &TerrainGrid,
    base: CellPos,
    size: i32,
    blockers: &SiteBlockers,
    search_radius: i32,
    spacing: i32,
) -> Option<Footprint> {
    (0..=search_radius)
        .flat_map(|radius| base.ring(radius))
        .map(|origin| Footprint::new(origin, size))
        .find(|footprint| site_is_valid(grid, *footprint, blockers, spacing))
}

/// First free cell on the rings `1..=max_radius` around a footprint that the
/// movement class can stand on.
#[must_use]
pub fn find_spawn_cell(
    grid: &TerrainGrid,
    class: MovementClass,
    footprint: Footprint,
    occupied: &ObstacleSet,
    max_radius: i32,
) -> Option<CellPos> {
    (1..=max_radius)
        .flat_map(|radius| footprint.ring(radius))
        .find(|cell| is_walkable(class, *cell, grid, occupied))
}

// ============================================================================
// Building
// ============================================================================

/// Building state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingState {
    /// Site queued, not operational yet.
    Construction,
    /// Operational and doing nothing.
    Idle,
    /// Working through its production or research queue.
    Producing,
    /// Tower engaging an enemy agent.
    Attacking {
        /// Current target.
        target: EntityId,
    },
    /// Recently hit.
    Damaged {
        /// Ticks until the building returns to idle.
        remaining: u32,
    },
    /// Terminal.
    Destroyed,
}

/// Construction progress of one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstructionProgress {
    /// Ticks of work done.
    pub progress: u32,
    /// Ticks required.
    pub total: u32,
}

impl ConstructionProgress {
    /// Progress as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (self.progress.min(self.total) * 100) / self.total
        }
    }
}

/// A building entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Handle.
    pub id: EntityId,
    /// Owner.
    pub faction: FactionId,
    /// Building type.
    pub building_type: BuildingTypeId,
    /// Occupied cells.
    pub footprint: Footprint,
    /// Health.
    pub health: Health,
    /// Current state.
    pub state: BuildingState,
    /// Construction progress.
    pub construction: ConstructionProgress,
    /// Unit orders.
    pub queue: ProductionQueue,
    /// Upgrades being researched (research buildings only).
    #[serde(default)]
    pub research: ResearchQueue,
    /// Tower weapon.
    pub weapon: Option<Weapon>,
    /// Vision radius.
    #[serde(with = "fixed_serde")]
    pub vision: Fixed,
    /// Functional role.
    pub role: BuildingRole,
    /// Marks a headquarters.
    pub headquarters: bool,
}

impl Building {
    /// A freshly queued construction site.
    #[must_use]
    pub fn under_construction(
        id: EntityId,
        faction: FactionId,
        type_id: BuildingTypeId,
        building_type: &BuildingType,
        footprint: Footprint,
    ) -> Self {
        let (unit_slots, research_slots) = if building_type.researches() {
            (0, building_type.queue_capacity)
        } else {
            (building_type.queue_capacity, 0)
        };
        Self {
            id,
            faction,
            building_type: type_id,
            footprint,
            health: Health::new(building_type.max_health),
            state: BuildingState::Construction,
            construction: ConstructionProgress {
                progress: 0,
                total: building_type.build_ticks,
            },
            queue: ProductionQueue::with_max_size(unit_slots),
            research: ResearchQueue::with_max_size(research_slots),
            weapon: building_type.attack.map(Weapon::new),
            vision: building_type.vision,
            role: building_type.role,
            headquarters: building_type.headquarters,
        }
    }

    /// An operational building placed at mission start.
    #[must_use]
    pub fn complete(
        id: EntityId,
        faction: FactionId,
        type_id: BuildingTypeId,
        building_type: &BuildingType,
        footprint: Footprint,
    ) -> Self {
        let mut building = Self::under_construction(id, faction, type_id, building_type, footprint);
        building.construction.progress = building.construction.total;
        building.state = BuildingState::Idle;
        building
    }

    /// Construction finished and not destroyed.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        !matches!(
            self.state,
            BuildingState::Construction | BuildingState::Destroyed
        )
    }

    /// Advance construction by one tick.
    ///
    /// Returns `true` if construction just completed.
    pub fn tick_construction(&mut self) -> bool {
        if self.state != BuildingState::Construction {
            return false;
        }
        self.construction.progress = (self.construction.progress + 1).min(self.construction.total);
        if self.construction.progress >= self.construction.total {
            self.state = BuildingState::Idle;
            return true;
        }
        false
    }

    /// Advance the production queue and the damaged timer by one tick.
    ///
    /// Returns the unit type of a completed head item; it stays queued until
    /// the caller finds a spawn tile and calls `queue.complete()`.
    pub fn tick_operation(&mut self) -> Option<UnitTypeId> {
        if !self.is_operational() {
            return None;
        }
        if let BuildingState::Damaged { remaining } = &mut self.state {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.state = BuildingState::Idle;
            }
        }
        let busy = !self.queue.is_empty() || !self.research.is_empty();
        match self.state {
            BuildingState::Idle if busy => self.state = BuildingState::Producing,
            BuildingState::Producing if !busy => self.state = BuildingState::Idle,
            _ => {}
        }
        self.queue.advance()
    }

    /// Advance the research queue by one tick.
    ///
    /// Returns an upgrade that just finished; it has already left the queue.
    pub fn tick_research(&mut self) -> Option<UpgradeTypeId> {
        if !self.is_operational() {
            return None;
        }
        self.research.advance()
    }

    /// React to a hit that left the building standing.
    pub fn on_damaged(&mut self, recovery: u32) {
        if matches!(
            self.state,
            BuildingState::Idle | BuildingState::Damaged { .. }
        ) {
            self.state = BuildingState::Damaged {
                remaining: recovery,
            };
        }
    }

    /// Enter the terminal state.
    pub fn mark_destroyed(&mut self) {
        self.state = BuildingState::Destroyed;
    }

    /// Tower behaviour: keep or acquire the nearest enemy agent in range and
    /// fire when the cooldown allows.
    ///
    /// A damaged tower still fires but stays in its damaged state.
    pub fn update_defense(&mut self, snapshot: &Snapshot) -> Option<Hit> {
        if !self.is_operational() {
            return None;
        }
        let faction = self.faction;
        let center = self.footprint.center();
        let weapon = self.weapon.as_mut()?;
        weapon.tick();
        let range = weapon.profile.range;

        let current = match self.state {
            BuildingState::Attacking { target } => Some(target),
            _ => None,
        };
        let target = current
            .and_then(|id| snapshot.agent(id))
            .filter(|a| a.faction != faction && a.position.within(center, range))
            .or_else(|| snapshot.nearest_enemy_agent(faction, center, range));

        let Some(target) = target else {
            if current.is_some() {
                self.state = BuildingState::Idle;
            }
            return None;
        };

        if matches!(
            self.state,
            BuildingState::Idle | BuildingState::Attacking { .. }
        ) {
            self.state = BuildingState::Attacking { target: target.id };
        }

        let damage = weapon.try_fire(target.position.distance_squared(center))?;
        Some(Hit {
            attacker: TargetRef::Building(self.id),
            attacker_faction: faction,
            attacker_position: center,
            target: TargetRef::Agent(target.id),
            damage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::terrain::TerrainCode;

    fn open_grid(size: u32) -> TerrainGrid {
        TerrainGrid::filled(size, size, TerrainCode::Grass)
    }

    #[test]
    fn test_footprint_geometry() {
        let fp = Footprint::new(CellPos::new(2, 3), 2);
        let cells: Vec<_> = fp.cells().collect();
        assert_eq!(
            cells,
            vec![
                CellPos::new(2, 3),
                CellPos::new(3, 3),
                CellPos::new(2, 4),
                CellPos::new(3, 4)
            ]
        );
        assert!(fp.contains(CellPos::new(3, 4)));
        assert!(!fp.contains(CellPos::new(4, 4)));
        assert_eq!(fp.cell_distance(CellPos::new(6, 4)), 3);
        assert_eq!(fp.center(), Vec2Fixed::from_ints(96, 128));
    }

    #[test]
    fn test_footprint_distance_to_edge() {
        let fp = Footprint::new(CellPos::new(0, 0), 2);
        assert_eq!(fp.distance_squared_to(Vec2Fixed::from_ints(10, 10)), Fixed::ZERO);
        assert_eq!(
            fp.distance_squared_to(Vec2Fixed::from_ints(74, 32)),
            Fixed::from_num(100)
        );
    }

    #[test]
    fn test_footprint_ring() {
        let fp = Footprint::new(CellPos::new(5, 5), 2);
        let ring: Vec<_> = fp.ring(1).collect();
        assert_eq!(ring.len(), 12);
        assert_eq!(ring[0], CellPos::new(4, 4));
        assert!(ring.iter().all(|cell| fp.cell_distance(*cell) == 1));
        assert_eq!(fp.ring(2).count(), 20);
    }

    #[test]
    fn test_overlap_with_gap() {
        let a = Footprint::new(CellPos::new(0, 0), 2);
        let b = Footprint::new(CellPos::new(4, 0), 2);
        assert!(!a.overlaps(b, 0));
        assert!(!a.overlaps(b, 2));
        assert!(a.overlaps(b, 3));
    }

    #[test]
    fn test_site_keeps_spacing_from_deposits() {
        let grid = open_grid(20);
        let blockers = SiteBlockers {
            deposits: vec![CellPos::new(5, 5)],
            ..SiteBlockers::default()
        };
        assert!(!site_is_valid(&grid, Footprint::new(CellPos::new(6, 6), 2), &blockers, 2));
        assert!(site_is_valid(&grid, Footprint::new(CellPos::new(8, 5), 2), &blockers, 2));
    }

    #[test]
    fn test_site_rejects_rock_and_edges() {
        let mut grid = open_grid(10);
        grid.set(CellPos::new(1, 1), TerrainCode::Rock);
        let blockers = SiteBlockers::default();
        assert!(!site_is_valid(&grid, Footprint::new(CellPos::new(0, 0), 2), &blockers, 2));
        assert!(!site_is_valid(&grid, Footprint::new(CellPos::new(9, 9), 2), &blockers, 2));
        assert!(site_is_valid(&grid, Footprint::new(CellPos::new(2, 2), 2), &blockers, 2));
    }

    #[test]
    fn test_find_build_site_scans_outward() {
        let grid = open_grid(30);
        let hq = Footprint::new(CellPos::new(10, 10), 2);
        let blockers = SiteBlockers {
            buildings: vec![hq],
            headquarters: vec![hq],
            deposits: Vec::new(),
        };
        let site = find_build_site(&grid, CellPos::new(10, 10), 2, &blockers, 12, 2).unwrap();
        assert!(!site.overlaps(hq, 2));
        assert_eq!(site.origin.chebyshev(CellPos::new(10, 10)), 4);
        assert!(find_build_site(&grid, CellPos::new(10, 10), 2, &blockers, 2, 2).is_none());
    }

    #[test]
    fn test_spawn_cell_skips_occupied() {
        let grid = open_grid(10);
        let fp = Footprint::new(CellPos::new(3, 3), 2);
        let mut occupied: ObstacleSet = fp.cells().collect();
        assert_eq!(
            find_spawn_cell(&grid, MovementClass::FOOT, fp, &occupied, 2),
            Some(CellPos::new(2, 2))
        );
        occupied.insert(CellPos::new(2, 2));
        assert_eq!(
            find_spawn_cell(&grid, MovementClass::FOOT, fp, &occupied, 2),
            Some(CellPos::new(3, 2))
        );
    }

    #[test]
    fn test_state_machine() {
        let catalog = Catalog::standard();
        let type_id = catalog.building_id("barracks").unwrap();
        let building_type = catalog.building(type_id).unwrap();
        let mut building = Building::under_construction(
            EntityId(1),
            FactionId(0),
            type_id,
            building_type,
            Footprint::new(CellPos::new(0, 0), 2),
        );

        building.on_damaged(40);
        assert_eq!(building.state, BuildingState::Construction);
        assert_eq!(building.tick_operation(), None);

        for _ in 1..building_type.build_ticks {
            assert!(!building.tick_construction());
        }
        assert!(building.tick_construction());
        assert_eq!(building.state, BuildingState::Idle);
        assert!(!building.tick_construction());

        building.on_damaged(2);
        assert_eq!(building.state, BuildingState::Damaged { remaining: 2 });
        building.tick_operation();
        building.tick_operation();
        assert_eq!(building.state, BuildingState::Idle);

        let soldier = catalog.unit_id("soldier").unwrap();
        building.queue.add(soldier, 2).unwrap();
        assert_eq!(building.tick_operation(), None);
        assert_eq!(building.state, BuildingState::Producing);
        building.on_damaged(40);
        assert_eq!(building.state, BuildingState::Producing);
        assert_eq!(building.tick_operation(), Some(soldier));
        // Waits at the head until the caller spawns it.
        assert_eq!(building.tick_operation(), Some(soldier));
        building.queue.complete();
        building.tick_operation();
        assert_eq!(building.state, BuildingState::Idle);

        building.mark_destroyed();
        assert!(!building.is_operational());
    }

    #[test]
    fn test_lab_research_keeps_it_producing() {
        let catalog = Catalog::standard();
        let type_id = catalog.building_id("lab").unwrap();
        let building_type = catalog.building(type_id).unwrap();
        let mut lab = Building::under_construction(
            EntityId(3),
            FactionId(0),
            type_id,
            building_type,
            Footprint::new(CellPos::new(0, 0), 2),
        );
        assert_eq!(lab.queue.capacity(), 0);
        assert_eq!(lab.research.capacity(), 3);

        let wood = catalog.upgrade_id("wood_gathering").unwrap();
        lab.research.add(wood, 2).unwrap();
        assert_eq!(lab.tick_research(), None);
        assert_eq!(lab.research.current().unwrap().progress, 0);

        lab.construction.progress = lab.construction.total;
        lab.state = BuildingState::Idle;
        lab.tick_operation();
        assert_eq!(lab.state, BuildingState::Producing);
        assert_eq!(lab.tick_research(), None);
        assert_eq!(lab.tick_research(), Some(wood));
        assert!(lab.research.is_empty());
        lab.tick_operation();
        assert_eq!(lab.state, BuildingState::Idle);
    }
}
