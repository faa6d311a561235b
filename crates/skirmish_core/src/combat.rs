//! Combat resolution.
//!
//! Attacks are range- and cooldown-gated and deal a fixed, type-specific
//! amount of damage. There is no randomness. An attacker decides to fire
//! during its own update and records a [`Hit`]; the simulation applies all
//! hits of a tick in order at one resolution point.
//!
//! Destruction happens exactly once per entity: only the hit that moves
//! health from above zero to zero reports [`DamageOutcome::Destroyed`].

use serde::{Deserialize, Serialize};

use crate::catalog::AttackProfile;
use crate::components::{Health, TargetRef};
use crate::factions::FactionId;
use crate::math::{Fixed, Vec2Fixed};

/// An attack profile plus its cooldown counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weapon {
    /// Static attack statistics.
    pub profile: AttackProfile,
    cooldown: u32,
}

impl Weapon {
    /// A weapon ready to fire.
    #[must_use]
    pub const fn new(profile: AttackProfile) -> Self {
        Self {
            profile,
            cooldown: 0,
        }
    }

    /// Ticks until the weapon can fire again.
    #[must_use]
    pub const fn cooldown(&self) -> u32 {
        self.cooldown
    }

    /// True once the cooldown has elapsed.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.cooldown == 0
    }

    /// Count the cooldown down by one tick.
    pub fn tick(&mut self) {
        self.cooldown = self.cooldown.saturating_sub(1);
    }

    /// True if a target at `distance_squared` is within range.
    #[must_use]
    pub fn in_range(&self, distance_squared: Fixed) -> bool {
        distance_squared <= self.profile.range.saturating_mul(self.profile.range)
    }

    /// Fire at a target `distance_squared` away.
    ///
    /// Returns the damage dealt and resets the cooldown, or `None` if the
    /// target is out of range or the weapon is still cooling down.
    pub fn try_fire(&mut self, distance_squared: Fixed) -> Option<u32> {
        if !self.is_ready() || !self.in_range(distance_squared) {
            return None;
        }
        self.cooldown = self.profile.cooldown;
        Some(self.profile.damage)
    }
}

/// One resolved attack waiting to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// Who fired.
    pub attacker: TargetRef,
    /// Faction of the attacker.
    pub attacker_faction: FactionId,
    /// Attacker position when firing.
    pub attacker_position: Vec2Fixed,
    /// Who is hit.
    pub target: TargetRef,
    /// Damage to apply.
    pub damage: u32,
}

/// Result of applying one hit to a health pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// The target was already at zero; nothing changed.
    AlreadyDead,
    /// The target took damage and is still alive.
    Survived {
        /// Health left.
        remaining: u32,
    },
    /// This hit brought health from above zero to zero.
    Destroyed,
}

/// Apply damage to a health pool.
pub fn apply_damage(health: &mut Health, damage: u32) -> DamageOutcome {
    if health.is_dead() {
        return DamageOutcome::AlreadyDead;
    }
    health.apply_damage(damage);
    if health.is_dead() {
        DamageOutcome::Destroyed
    } else {
        DamageOutcome::Survived {
            remaining: health.current,
        }
    }
}
