//! Grid-based pathfinding using the A* algorithm.
//!
//! Four-directional, unit-cost moves with a Manhattan heuristic. The search
//! is a pure function of its inputs: the caller passes the terrain grid, the
//! agent's movement class and the obstacle set for this tick.
//!
//! # Tie-breaking
//!
//! Frontier nodes are ordered by lowest `f`, then lowest `h` (closest to the
//! goal), then lowest row, then lowest column. Identical inputs always yield
//! the identical path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::terrain::{CellPos, MovementClass, TerrainGrid};

/// Cells the search must treat as blocked in addition to terrain.
pub type ObstacleSet = HashSet<CellPos>;

/// Pathfinding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Start or goal lies outside the grid.
    #[error("cell {0} is outside the grid")]
    OutOfBounds(CellPos),

    /// The goal cell cannot be entered by this movement class.
    #[error("goal cell {0} is not walkable")]
    GoalUnwalkable(CellPos),

    /// The open set emptied before reaching the goal.
    #[error("no route from {from} to {to}")]
    NoRoute {
        /// Start cell.
        from: CellPos,
        /// Goal cell.
        to: CellPos,
    },
}

/// An ordered cell sequence plus a cursor to the next cell to enter.
///
/// The start cell is not part of the path; the last cell is the goal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Path {
    cells: Vec<CellPos>,
    cursor: usize,
}

impl Path {
    /// Wrap a cell list with the cursor at its first cell.
    #[must_use]
    pub fn new(cells: Vec<CellPos>) -> Self {
        Self { cells, cursor: 0 }
    }

    /// All cells of the path.
    #[must_use]
    pub fn cells(&self) -> &[CellPos] {
        &self.cells
    }

    /// Number of cells in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a zero-length path (start was the goal).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Index of the next cell to enter. Never exceeds [`Path::len`].
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Next cell to enter, `None` once exhausted.
    #[must_use]
    pub fn current(&self) -> Option<CellPos> {
        self.cells.get(self.cursor).copied()
    }

    /// Final cell of the path.
    #[must_use]
    pub fn goal(&self) -> Option<CellPos> {
        self.cells.last().copied()
    }

    /// Move the cursor past the current cell.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.cells.len());
    }

    /// True once every cell has been entered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.cells.len()
    }

    /// Cells still ahead of the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cells.len() - self.cursor
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AStarNode {
    cell: CellPos,
    g_score: u32,
    f_score: u32,
    h_score: u32,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse every key for min-heap behavior.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.cell.y.cmp(&self.cell.y))
            .then_with(|| other.cell.x.cmp(&self.cell.x))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cardinal moves: north, east, south, west.
const DIRECTIONS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Walkability predicate shared by the search and its callers.
#[must_use]
pub fn is_walkable(
    class: MovementClass,
    cell: CellPos,
    grid: &TerrainGrid,
    obstacles: &ObstacleSet,
) -> bool {
    grid.is_passable(class, cell) && !obstacles.contains(&cell)
}

/// Find a path from `start` to `goal`.
///
/// Returns the cells to walk through, excluding `start`. A start equal to the
/// goal yields an empty path.
///
/// # Errors
///
/// - [`PathError::OutOfBounds`] if either endpoint lies outside the grid
/// - [`PathError::GoalUnwalkable`] if the goal is blocked for this class
/// - [`PathError::NoRoute`] if the goal cannot be reached
pub fn find_path(
    class: MovementClass,
    start: CellPos,
    goal: CellPos,
    grid: &TerrainGrid,
    obstacles: &ObstacleSet,
) -> Result<Path, PathError> {
    if !grid.in_bounds(start) {
        return Err(PathError::OutOfBounds(start));
    }
    if !grid.in_bounds(goal) {
        return Err(PathError::OutOfBounds(goal));
    }
    if !is_walkable(class, goal, grid, obstacles) {
        return Err(PathError::GoalUnwalkable(goal));
    }
    if start == goal {
        return Ok(Path::default());
    }

    let width = grid.width() as usize;
    let cell_count = width * grid.height() as usize;
    let index = |cell: CellPos| (cell.y as usize) * width + (cell.x as usize);

    let mut g_score = vec![u32::MAX; cell_count];
    let mut came_from: Vec<Option<CellPos>> = vec![None; cell_count];
    let mut closed = vec![false; cell_count];
    let mut open_set = BinaryHeap::new();

    let start_h = start.manhattan(goal);
    g_score[index(start)] = 0;
    open_set.push(AStarNode {
        cell: start,
        g_score: 0,
        f_score: start_h,
        h_score: start_h,
    });

    while let Some(current) = open_set.pop() {
        let current_index = index(current.cell);
        if closed[current_index] {
            continue;
        }
        closed[current_index] = true;

        if current.cell == goal {
            return Ok(reconstruct_path(&came_from, index, start, goal));
        }

        for (dx, dy) in DIRECTIONS {
            let neighbor = current.cell.offset(dx, dy);
            if !is_walkable(class, neighbor, grid, obstacles) {
                continue;
            }
            let neighbor_index = index(neighbor);
            if closed[neighbor_index] {
                continue;
            }

            let tentative_g = current.g_score + 1;
            if tentative_g < g_score[neighbor_index] {
                g_score[neighbor_index] = tentative_g;
                came_from[neighbor_index] = Some(current.cell);

                let h = neighbor.manhattan(goal);
                open_set.push(AStarNode {
                    cell: neighbor,
                    g_score: tentative_g,
                    f_score: tentative_g + h,
                    h_score: h,
                });
            }
        }
    }

    Err(PathError::NoRoute {
        from: start,
        to: goal,
    })
}

fn reconstruct_path(
    came_from: &[Option<CellPos>],
    index: impl Fn(CellPos) -> usize,
    start: CellPos,
    goal: CellPos,
) -> Path {
    let mut cells = vec![goal];
    let mut current = goal;

    while let Some(prev) = came_from[index(current)] {
        if prev == start {
            break;
        }
        cells.push(prev);
        current = prev;
    }

    cells.reverse();
    Path::new(cells)
}

/// Nearest walkable cell to `around`, scanning square rings outward.
///
/// Within a ring cells are visited row by row, so the result is stable.
/// Used to pick an approach cell next to a deposit or a building footprint.
#[must_use]
pub fn nearest_open_cell(
    class: MovementClass,
    around: CellPos,
    max_radius: i32,
    grid: &TerrainGrid,
    obstacles: &ObstacleSet,
) -> Option<CellPos> {
    (0..=max_radius)
        .flat_map(|radius| around.ring(radius))
        .find(|cell| is_walkable(class, *cell, grid, obstacles))
}
