//! Unit production queues.
//!
//! Every factory owns a bounded FIFO [`ProductionQueue`]. The cost of an order
//! is debited when the order is accepted, so an accepted order always
//! finishes. Orders also count against the faction's [`Population`] cap
//! while they wait. Only the head item makes progress; when it completes, the
//! simulation spawns the unit next to the factory and the queue advances.
//!
//! All calculations use integer math for deterministic simulation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buildings::Building;
use crate::catalog::{BuildingType, UnitType, UnitTypeId};
use crate::economy::{ResourceLedger, Shortfall};
use crate::storage::EntityId;

/// An item currently in a production queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductionItem {
    /// The type of unit being produced.
    pub unit_type: UnitTypeId,
    /// Current production progress in ticks.
    pub progress: u32,
    /// Total build time in ticks.
    pub total_time: u32,
}

impl ProductionItem {
    /// Create a new production item.
    #[must_use]
    pub const fn new(unit_type: UnitTypeId, total_time: u32) -> Self {
        Self {
            unit_type,
            progress: 0,
            total_time,
        }
    }

    /// Check if production is complete.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress >= self.total_time
    }

    /// Get progress as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total_time == 0 {
            100
        } else {
            (self.progress * 100) / self.total_time
        }
    }

    /// Advance production by one tick.
    pub fn tick(&mut self) {
        if self.progress < self.total_time {
            self.progress += 1;
        }
    }
}

/// Bounded FIFO of unit orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProductionQueue {
    queue: VecDeque<ProductionItem>,
    max_queue_size: usize,
}

impl ProductionQueue {
    /// Create a queue holding at most `max_queue_size` orders.
    #[must_use]
    pub fn with_max_size(max_queue_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_queue_size,
        }
    }

    /// Maximum number of orders.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_queue_size
    }

    /// Check if the queue is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.max_queue_size
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the number of items in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Orders in queue order.
    pub fn items(&self) -> impl Iterator<Item = &ProductionItem> {
        self.queue.iter()
    }

    /// Add an item to the queue.
    ///
    /// Returns `Err` if the queue is full.
    pub fn add(&mut self, unit_type: UnitTypeId, build_time: u32) -> Result<(), ProductionError> {
        if self.is_full() {
            return Err(ProductionError::QueueFull);
        }
        self.queue
            .push_back(ProductionItem::new(unit_type, build_time));
        Ok(())
    }

    /// Get the currently producing item.
    #[must_use]
    pub fn current(&self) -> Option<&ProductionItem> {
        self.queue.front()
    }

    /// Advance the head item by one tick.
    ///
    /// Returns the unit type once the head item is complete. The item stays
    /// at the head until [`ProductionQueue::complete`] removes it.
    pub fn advance(&mut self) -> Option<UnitTypeId> {
        let item = self.queue.front_mut()?;
        item.tick();
        item.is_complete().then_some(item.unit_type)
    }

    /// Complete and remove the current item.
    ///
    /// Returns the completed item if production is done.
    pub fn complete(&mut self) -> Option<ProductionItem> {
        if self.queue.front().is_some_and(ProductionItem::is_complete) {
            self.queue.pop_front()
        } else {
            None
        }
    }
}

/// Population usage of a faction: living agents plus queued unit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    /// Living agents plus queued orders.
    pub used: usize,
    /// Current population cap.
    pub cap: usize,
}

impl Population {
    /// Create a usage snapshot.
    #[must_use]
    pub const fn new(used: usize, cap: usize) -> Self {
        Self { used, cap }
    }

    /// True when no further unit fits.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.used >= self.cap
    }
}

/// Errors that can occur when ordering units, structures or upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProductionError {
    /// The production queue is full.
    #[error("Production queue is full")]
    QueueFull,
    /// Cannot afford the cost; nothing was debited.
    #[error(transparent)]
    InsufficientResources(#[from] Shortfall),
    /// The building cannot produce this unit type.
    #[error("Building cannot produce this unit type")]
    CannotProduce,
    /// The building is under construction or destroyed.
    #[error("Building is not operational")]
    NotOperational,
    /// No building with this handle belongs to the faction.
    #[error("Unknown building {0}")]
    UnknownBuilding(EntityId),
    /// Living agents plus queued orders already reach the cap.
    #[error("Population cap of {cap} reached")]
    PopulationCapReached {
        /// The cap in force.
        cap: usize,
    },
    /// The upgrade is already researched or queued.
    #[error("Upgrade already researched or queued")]
    AlreadyResearched,
    /// A prerequisite upgrade has not been researched.
    #[error("Missing prerequisite upgrade")]
    MissingPrerequisite,
}

/// Accept a unit order at a factory.
///
/// Every check runs before the debit, so a rejected order leaves both the
/// ledger and the queue untouched.
pub fn enqueue_unit(
    ledger: &mut ResourceLedger,
    population: Population,
    factory: &mut Building,
    factory_type: &BuildingType,
    unit: UnitTypeId,
    unit_type: &UnitType,
) -> Result<(), ProductionError> {
    if !factory.is_operational() {
        return Err(ProductionError::NotOperational);
    }
    if !factory_type.can_produce(unit) {
        return Err(ProductionError::CannotProduce);
    }
    if factory.queue.is_full() {
        return Err(ProductionError::QueueFull);
    }
    if population.is_full() {
        return Err(ProductionError::PopulationCapReached {
            cap: population.cap,
        });
    }
    ledger.spend(&unit_type.cost)?;
    factory.queue.add(unit, unit_type.build_ticks)?;
    tracing::debug!(
        factory = %factory.id,
        unit = %unit_type.key,
        queued = factory.queue.len(),
        "Unit order accepted"
    );
    Ok(())
}
