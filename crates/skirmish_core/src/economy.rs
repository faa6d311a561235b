//! Faction resource ledgers and map resource deposits.
//!
//! Every faction owns exactly one [`ResourceLedger`]. Spending is atomic over
//! all resource kinds: either the full cost is debited or nothing is.
//!
//! All calculations use integer math for deterministic simulation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::terrain::CellPos;

/// Kinds of resource found on mission maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Gold.
    Gold,
    /// Wood.
    Wood,
    /// Stone.
    Stone,
    /// Metal.
    Metal,
}

impl ResourceKind {
    /// Every kind, in ledger order.
    pub const ALL: [Self; 4] = [Self::Gold, Self::Wood, Self::Stone, Self::Metal];

    /// Amount a worker pulls from a deposit per gather cycle.
    #[must_use]
    pub const fn gather_amount(self) -> u32 {
        match self {
            Self::Gold => 2,
            Self::Wood => 3,
            Self::Stone | Self::Metal => 1,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Wood => "wood",
            Self::Stone => "stone",
            Self::Metal => "metal",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An amount of every resource kind. Used for costs and balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceBundle {
    /// Gold.
    pub gold: u32,
    /// Wood.
    pub wood: u32,
    /// Stone.
    pub stone: u32,
    /// Metal.
    pub metal: u32,
}

impl ResourceBundle {
    /// Create a bundle.
    #[must_use]
    pub const fn new(gold: u32, wood: u32, stone: u32, metal: u32) -> Self {
        Self {
            gold,
            wood,
            stone,
            metal,
        }
    }

    /// Empty bundle.
    pub const ZERO: Self = Self::new(0, 0, 0, 0);

    /// Amount of one kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Gold => self.gold,
            ResourceKind::Wood => self.wood,
            ResourceKind::Stone => self.stone,
            ResourceKind::Metal => self.metal,
        }
    }

    fn get_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Gold => &mut self.gold,
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Stone => &mut self.stone,
            ResourceKind::Metal => &mut self.metal,
        }
    }

    /// `(kind, amount)` pairs in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        ResourceKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }

    /// Sum over all kinds.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, amount)| u64::from(amount)).sum()
    }

    /// True when every kind is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::ZERO
    }

    /// Per-kind sum, saturating.
    #[must_use]
    pub fn saturating_add(mut self, other: &Self) -> Self {
        for (kind, amount) in other.iter() {
            let slot = self.get_mut(kind);
            *slot = slot.saturating_add(amount);
        }
        self
    }
}

/// A rejected spend: the first kind that could not be covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Insufficient resources: need {required} {kind}, have {available}")]
pub struct Shortfall {
    /// Resource kind that fell short.
    pub kind: ResourceKind,
    /// Amount required.
    pub required: u32,
    /// Amount available.
    pub available: u32,
}

/// Per-faction resource balances.
///
/// A ledger starts without storage caps. Once caps are set, income beyond
/// them is lost; balances already above a lowered cap are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceLedger {
    balances: ResourceBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caps: Option<ResourceBundle>,
}

impl ResourceLedger {
    /// Ledger with a starting balance.
    #[must_use]
    pub const fn new(starting: ResourceBundle) -> Self {
        Self {
            balances: starting,
            caps: None,
        }
    }

    /// Storage caps, or `None` while uncapped.
    #[must_use]
    pub const fn caps(&self) -> Option<ResourceBundle> {
        self.caps
    }

    /// Replace the storage caps.
    pub fn set_caps(&mut self, caps: ResourceBundle) {
        self.caps = Some(caps);
    }

    /// Current balances.
    #[must_use]
    pub const fn balances(&self) -> ResourceBundle {
        self.balances
    }

    /// Current balance of one kind.
    #[must_use]
    pub const fn balance(&self, kind: ResourceKind) -> u32 {
        self.balances.get(kind)
    }

    /// First kind the ledger cannot cover, if any.
    #[must_use]
    pub fn shortfall(&self, cost: &ResourceBundle) -> Option<Shortfall> {
        cost.iter().find_map(|(kind, required)| {
            let available = self.balances.get(kind);
            (available < required).then_some(Shortfall {
                kind,
                required,
                available,
            })
        })
    }

    /// Check if the full cost is covered.
    #[must_use]
    pub fn can_afford(&self, cost: &ResourceBundle) -> bool {
        self.shortfall(cost).is_none()
    }

    /// Debit the full cost, or nothing at all.
    pub fn spend(&mut self, cost: &ResourceBundle) -> Result<(), Shortfall> {
        if let Some(shortfall) = self.shortfall(cost) {
            return Err(shortfall);
        }
        for (kind, amount) in cost.iter() {
            *self.balances.get_mut(kind) -= amount;
        }
        Ok(())
    }

    /// Credit one kind up to its cap. Returns the amount actually credited.
    pub fn add(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let cap = self.caps.map_or(u32::MAX, |caps| caps.get(kind));
        let balance = self.balances.get_mut(kind);
        let before = *balance;
        *balance = before.saturating_add(amount).min(cap.max(before));
        *balance - before
    }
}

/// Stable identifier of a resource deposit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct DepositId(pub u32);

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deposit#{}", self.0)
    }
}

/// All deposits of a map, iterated in id order.
pub type DepositField = BTreeMap<DepositId, ResourceDeposit>;

/// A depletable, non-regenerating resource node occupying one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeposit {
    /// Identifier.
    pub id: DepositId,
    /// Grid cell.
    pub cell: CellPos,
    /// Resource kind.
    pub kind: ResourceKind,
    remaining: u32,
    max: u32,
}

impl ResourceDeposit {
    /// Create a full deposit.
    #[must_use]
    pub const fn new(id: DepositId, cell: CellPos, kind: ResourceKind, amount: u32) -> Self {
        Self {
            id,
            cell,
            kind,
            remaining: amount,
            max: amount,
        }
    }

    /// Amount left.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Amount at mission start.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// True once nothing is left.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.remaining == 0
    }

    /// Take up to `requested`, returning what was actually taken.
    pub fn gather(&mut self, requested: u32) -> u32 {
        let taken = requested.min(self.remaining);
        self.remaining -= taken;
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_is_all_or_nothing() {
        let mut ledger = ResourceLedger::new(ResourceBundle::new(100, 5, 0, 0));
        let cost = ResourceBundle::new(60, 10, 0, 0);

        let err = ledger.spend(&cost).unwrap_err();
        assert_eq!(
            err,
            Shortfall {
                kind: ResourceKind::Wood,
                required: 10,
                available: 5
            }
        );
        assert_eq!(ledger.balances(), ResourceBundle::new(100, 5, 0, 0));
    }

    #[test]
    fn test_second_spend_rejected_when_balance_runs_out() {
        let mut ledger = ResourceLedger::new(ResourceBundle::new(100, 0, 0, 0));
        let cost = ResourceBundle::new(60, 0, 0, 0);

        assert!(ledger.spend(&cost).is_ok());
        assert_eq!(ledger.balance(ResourceKind::Gold), 40);
        assert!(ledger.spend(&cost).is_err());
        assert_eq!(ledger.balance(ResourceKind::Gold), 40);
    }

    #[test]
    fn test_exact_balance_is_affordable() {
        let mut ledger = ResourceLedger::new(ResourceBundle::new(30, 10, 0, 0));
        let cost = ResourceBundle::new(30, 10, 0, 0);
        assert!(ledger.can_afford(&cost));
        ledger.spend(&cost).unwrap();
        assert_eq!(ledger.balances(), ResourceBundle::ZERO);
    }

    #[test]
    fn test_add_saturates() {
        let mut ledger = ResourceLedger::new(ResourceBundle::new(u32::MAX - 1, 0, 0, 0));
        ledger.add(ResourceKind::Gold, 10);
        ledger.add(ResourceKind::Metal, 7);
        assert_eq!(ledger.balance(ResourceKind::Gold), u32::MAX);
        assert_eq!(ledger.balance(ResourceKind::Metal), 7);
    }

    #[test]
    fn test_add_clamps_to_cap() {
        let mut ledger = ResourceLedger::new(ResourceBundle::new(990, 0, 0, 0));
        ledger.set_caps(ResourceBundle::new(1000, 500, 300, 200));

        assert_eq!(ledger.add(ResourceKind::Gold, 6), 6);
        assert_eq!(ledger.add(ResourceKind::Gold, 6), 4);
        assert_eq!(ledger.balance(ResourceKind::Gold), 1000);
        assert_eq!(ledger.add(ResourceKind::Gold, 6), 0);
        assert_eq!(ledger.add(ResourceKind::Wood, 3), 3);
    }

    #[test]
    fn test_lowered_cap_keeps_existing_balance() {
        let mut ledger = ResourceLedger::new(ResourceBundle::new(800, 0, 0, 0));
        ledger.set_caps(ResourceBundle::new(500, 500, 500, 500));

        assert_eq!(ledger.add(ResourceKind::Gold, 10), 0);
        assert_eq!(ledger.balance(ResourceKind::Gold), 800);
        ledger.spend(&ResourceBundle::new(400, 0, 0, 0)).unwrap();
        assert_eq!(ledger.add(ResourceKind::Gold, 200), 100);
        assert_eq!(ledger.balance(ResourceKind::Gold), 500);
    }

    #[test]
    fn test_bundle_saturating_add() {
        let sum = ResourceBundle::new(1000, 500, 300, 200)
            .saturating_add(&ResourceBundle::new(300, 300, 300, 300));
        assert_eq!(sum, ResourceBundle::new(1300, 800, 600, 500));
        assert!(ResourceBundle::ZERO.is_empty());
        assert!(!sum.is_empty());
    }

    #[test]
    fn test_deposit_gather_is_bounded() {
        let mut deposit =
            ResourceDeposit::new(DepositId(1), CellPos::new(3, 3), ResourceKind::Gold, 3);

        assert_eq!(deposit.gather(2), 2);
        assert_eq!(deposit.gather(2), 1);
        assert!(deposit.is_depleted());
        assert_eq!(deposit.gather(2), 0);
        assert_eq!(deposit.max(), 3);
    }

    #[test]
    fn test_bundle_total_and_iter() {
        let bundle = ResourceBundle::new(1, 2, 3, 4);
        assert_eq!(bundle.total(), 10);
        let kinds: Vec<_> = bundle.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, ResourceKind::ALL);
    }

    #[test]
    fn test_bundle_ron_defaults_missing_kinds() {
        let bundle: ResourceBundle = ron::from_str("(gold: 60, metal: 20)").unwrap();
        assert_eq!(bundle, ResourceBundle::new(60, 0, 0, 20));
    }
}
