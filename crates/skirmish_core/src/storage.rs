//! Arena storage addressed by stable entity handles.
//!
//! Entities are never removed while a system may still be scanning the
//! collection. Destruction only schedules removal; the simulation flushes all
//! scheduled removals at one point at the end of each tick.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// World-unique, never reused entity handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh [`EntityId`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Next unused id.
    pub fn allocate(&mut self) -> EntityId {
        self.next += 1;
        EntityId(self.next)
    }
}

/// Entities keyed by handle, iterated in ascending handle order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<T> {
    items: BTreeMap<EntityId, T>,
    pending_removal: Vec<EntityId>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            pending_removal: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    /// Empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity under its handle.
    pub fn insert(&mut self, id: EntityId, item: T) {
        self.items.insert(id, item);
    }

    /// Get an entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.items.get(&id)
    }

    /// Get an entity mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    /// True if the handle is stored (including entities awaiting removal).
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.items.contains_key(&id)
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stable snapshot of handles in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.items.keys().copied().collect()
    }

    /// Iterate in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.items.iter().map(|(id, item)| (*id, item))
    }

    /// Iterate values in ascending handle order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Iterate values mutably in ascending handle order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }

    /// Schedule removal. Returns false if already scheduled or unknown.
    pub fn schedule_removal(&mut self, id: EntityId) -> bool {
        if !self.items.contains_key(&id) || self.pending_removal.contains(&id) {
            return false;
        }
        self.pending_removal.push(id);
        true
    }

    /// True if the handle awaits removal.
    #[must_use]
    pub fn is_pending_removal(&self, id: EntityId) -> bool {
        self.pending_removal.contains(&id)
    }

    /// Remove every scheduled entity, returning their handles.
    pub fn flush_removals(&mut self) -> Vec<EntityId> {
        let removed = std::mem::take(&mut self.pending_removal);
        for id in &removed {
            self.items.remove(id);
        }
        removed
    }
}
