//! Error types for the mission simulation.

use thiserror::Error;

use crate::economy::Shortfall;
use crate::pathfinding::PathError;
use crate::production::ProductionError;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(u64),

    /// Invalid deposit reference.
    #[error("Deposit not found: {0}")]
    DepositNotFound(u32),

    /// Invalid faction reference.
    #[error("Faction not found: {0}")]
    FactionNotFound(u8),

    /// Unknown unit or building type key.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Malformed map description.
    #[error("Invalid map: {0}")]
    InvalidMap(String),

    /// Spend rejected; nothing was debited.
    #[error(transparent)]
    InsufficientResources(#[from] Shortfall),

    /// Pathfinding failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Production or construction order rejected.
    #[error(transparent)]
    Production(#[from] ProductionError),

    /// Construction site is blocked, out of bounds or unwalkable.
    #[error("Invalid build site at ({x}, {y})")]
    InvalidSite {
        /// Site column.
        x: i32,
        /// Site row.
        y: i32,
    },

    /// Command does not apply to this entity.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}
