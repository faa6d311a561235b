//! Small components shared by agents and buildings.

use serde::{Deserialize, Serialize};

use crate::storage::EntityId;

/// Health component for damageable entities.
///
/// `current` is always within `0..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Check if entity is alive.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.current > 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }

    /// Get health as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.max == 0 {
            0
        } else {
            (self.current * 100) / self.max
        }
    }
}

/// A reference to an attackable entity, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetRef {
    /// A mobile agent.
    Agent(EntityId),
    /// A building.
    Building(EntityId),
}

impl TargetRef {
    /// The entity handle regardless of kind.
    #[must_use]
    pub const fn id(self) -> EntityId {
        match self {
            Self::Agent(id) | Self::Building(id) => id,
        }
    }
}
