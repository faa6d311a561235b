//! Static terrain grid and movement classes.
//!
//! The grid is supplied by the map provider and never changes during a
//! mission. Each cell holds a [`TerrainCode`]; a [`MovementClass`] decides
//! which codes an agent type may cross.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{Fixed, Vec2Fixed};

/// Size of one grid cell in world units.
pub const CELL_SIZE: i32 = 32;

/// Integer grid coordinates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CellPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl CellPos {
    /// Create a cell position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance in cells.
    #[must_use]
    pub fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Chebyshev (ring) distance in cells.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Offset by whole cells.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Cells at exactly `radius` Chebyshev distance, row by row.
    ///
    /// Radius 0 yields the cell itself.
    pub fn ring(self, radius: i32) -> impl Iterator<Item = Self> {
        (-radius..=radius).flat_map(move |dy| {
            (-radius..=radius)
                .filter(move |dx| dx.abs() == radius || dy.abs() == radius)
                .map(move |dx| self.offset(dx, dy))
        })
    }

    /// World position of the cell centre.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(
            self.x * CELL_SIZE + CELL_SIZE / 2,
            self.y * CELL_SIZE + CELL_SIZE / 2,
        )
    }

    /// Cell containing a world position.
    #[must_use]
    pub fn from_world(pos: Vec2Fixed) -> Self {
        let size = Fixed::from_num(CELL_SIZE);
        Self::new(
            (pos.x / size).floor().to_num::<i32>(),
            (pos.y / size).floor().to_num::<i32>(),
        )
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Terrain codes as used by mission maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainCode {
    /// Open ground.
    #[default]
    Grass = 0,
    /// Impassable for every movement class.
    Water = 1,
    /// Passable only by tracked vehicles.
    Rock = 2,
    /// Open ground.
    Sand = 3,
}

impl TerrainCode {
    /// Decode a numeric map code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Grass),
            1 => Some(Self::Water),
            2 => Some(Self::Rock),
            3 => Some(Self::Sand),
            _ => None,
        }
    }

    /// Decode a map-row character: `.` grass, `~` water, `#` rock, `:` sand.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Self::Grass),
            '~' => Some(Self::Water),
            '#' => Some(Self::Rock),
            ':' => Some(Self::Sand),
            _ => None,
        }
    }

    /// Map-row character of this code.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Grass => '.',
            Self::Water => '~',
            Self::Rock => '#',
            Self::Sand => ':',
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of terrain codes an agent type may traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<TerrainCode>", into = "Vec<TerrainCode>")]
pub struct MovementClass {
    mask: u8,
}

impl MovementClass {
    /// Infantry and light vehicles: grass and sand.
    pub const FOOT: Self = Self {
        mask: TerrainCode::Grass.bit() | TerrainCode::Sand.bit(),
    };

    /// Heavy tracked vehicles: grass, sand and rock.
    pub const TRACKED: Self = Self {
        mask: TerrainCode::Grass.bit() | TerrainCode::Sand.bit() | TerrainCode::Rock.bit(),
    };

    /// Build a class from an explicit list of codes.
    #[must_use]
    pub fn from_codes(codes: &[TerrainCode]) -> Self {
        Self {
            mask: codes.iter().fold(0, |mask, code| mask | code.bit()),
        }
    }

    /// True when agents of this class may stand on `code`.
    #[must_use]
    pub const fn allows(self, code: TerrainCode) -> bool {
        self.mask & code.bit() != 0
    }
}

impl Default for MovementClass {
    fn default() -> Self {
        Self::FOOT
    }
}

impl From<Vec<TerrainCode>> for MovementClass {
    fn from(codes: Vec<TerrainCode>) -> Self {
        Self::from_codes(&codes)
    }
}

impl From<MovementClass> for Vec<TerrainCode> {
    fn from(class: MovementClass) -> Self {
        [
            TerrainCode::Grass,
            TerrainCode::Water,
            TerrainCode::Rock,
            TerrainCode::Sand,
        ]
        .into_iter()
        .filter(|code| class.allows(*code))
        .collect()
    }
}

/// Read-only terrain grid, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainGrid {
    width: u32,
    height: u32,
    cells: Vec<TerrainCode>,
}

impl TerrainGrid {
    /// Grid of the given size filled with one terrain code.
    #[must_use]
    pub fn filled(width: u32, height: u32, code: TerrainCode) -> Self {
        Self {
            width,
            height,
            cells: vec![code; (width as usize) * (height as usize)],
        }
    }

    /// Grid whose cells are computed from their coordinates.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(CellPos) -> TerrainCode) -> Self {
        let mut cells = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                cells.push(f(CellPos::new(x, y)));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Build a grid from numeric map codes in row-major order.
    pub fn from_codes(width: u32, height: u32, codes: &[u8]) -> Result<Self> {
        if codes.len() != (width as usize) * (height as usize) {
            return Err(GameError::InvalidMap(format!(
                "expected {} terrain codes for {width}x{height}, got {}",
                (width as usize) * (height as usize),
                codes.len()
            )));
        }
        let cells = codes
            .iter()
            .map(|&code| {
                TerrainCode::from_code(code)
                    .ok_or_else(|| GameError::InvalidMap(format!("unknown terrain code {code}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a grid from text rows (see [`TerrainCode::from_char`]).
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |row| row.chars().count()) as u32;
        let mut cells = Vec::with_capacity((width as usize) * (height as usize));

        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() as u32 != width {
                return Err(GameError::InvalidMap(format!(
                    "row {y} has {} cells, expected {width}",
                    row.chars().count()
                )));
            }
            for c in row.chars() {
                let code = TerrainCode::from_char(c).ok_or_else(|| {
                    GameError::InvalidMap(format!("unknown terrain symbol '{c}' in row {y}"))
                })?;
                cells.push(code);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Cell in the middle of the map.
    #[must_use]
    pub fn center_cell(&self) -> CellPos {
        CellPos::new(self.width as i32 / 2, self.height as i32 / 2)
    }

    #[inline]
    fn index(&self, cell: CellPos) -> Option<usize> {
        if self.in_bounds(cell) {
            Some((cell.y as usize) * (self.width as usize) + (cell.x as usize))
        } else {
            None
        }
    }

    /// Check if a cell lies inside the grid.
    #[must_use]
    pub fn in_bounds(&self, cell: CellPos) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.width && (cell.y as u32) < self.height
    }

    /// Terrain code at a cell, `None` outside the grid.
    #[must_use]
    pub fn terrain(&self, cell: CellPos) -> Option<TerrainCode> {
        self.index(cell).map(|i| self.cells[i])
    }

    /// Overwrite the terrain at a cell. Used by map builders.
    pub fn set(&mut self, cell: CellPos, code: TerrainCode) -> bool {
        match self.index(cell) {
            Some(i) => {
                self.cells[i] = code;
                true
            }
            None => false,
        }
    }

    /// True when the cell is inside the grid and its terrain suits the class.
    #[must_use]
    pub fn is_passable(&self, class: MovementClass, cell: CellPos) -> bool {
        self.terrain(cell).is_some_and(|code| class.allows(code))
    }

    /// Clamp a cell into the grid.
    #[must_use]
    pub fn clamp(&self, cell: CellPos) -> CellPos {
        CellPos::new(
            cell.x.clamp(0, self.width.saturating_sub(1) as i32),
            cell.y.clamp(0, self.height.saturating_sub(1) as i32),
        )
    }
}
