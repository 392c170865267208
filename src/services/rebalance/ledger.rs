// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::allocation::CurrentAllocationItem;
use crate::domain::asset::{Asset, AssetId};
use crate::domain::constants::{FRACTION_SCALE, SWAP_TOLERANCE};
use crate::domain::error::AppError;
use alloy::primitives::Address;
use std::collections::BTreeMap;
use std::fmt;

/// Strategies track positions by asset id; swaps and plain tokens by address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AllocationKey {
    AssetId(AssetId),
    Address(Address),
}

impl AllocationKey {
    pub fn for_asset(asset: &Asset) -> Self {
        if asset.asset_type.is_token() {
            AllocationKey::Address(asset.address)
        } else {
            AllocationKey::AssetId(asset.id.clone())
        }
    }
}

impl fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationKey::AssetId(id) => write!(f, "{id}"),
            AllocationKey::Address(addr) => write!(f, "{addr:#x}"),
        }
    }
}

/// Running view of what the portfolio holds while steps are being planned, as
/// fractions of total portfolio value.
#[derive(Debug, Clone)]
pub struct CurrentAllocation {
    entries: BTreeMap<AllocationKey, f64>,
    /// Overdraw allowed before a spend fails; matches the netting tolerance.
    tolerance: f64,
}

impl Default for CurrentAllocation {
    fn default() -> Self {
        Self::with_tolerance(SWAP_TOLERANCE)
    }
}

impl CurrentAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            entries: BTreeMap::new(),
            tolerance: tolerance.max(0.0),
        }
    }

    pub fn fraction(&self, key: &AllocationKey) -> f64 {
        self.entries.get(key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, key: AllocationKey, fraction: f64) {
        self.entries.insert(key, fraction);
    }

    pub fn credit(&mut self, key: &AllocationKey, fraction: f64) {
        *self.entries.entry(key.clone()).or_insert(0.0) += fraction;
    }

    /// Converts a portfolio-level `fraction` into the share of the current balance
    /// under `key`, clamped to [0, 1]. Overdrawing by more than the ledger
    /// tolerance is an error.
    pub fn local_fraction(&self, key: &AllocationKey, fraction: f64) -> Result<f64, AppError> {
        let available = self.fraction(key);
        if available <= 0.0 || fraction > available + self.tolerance {
            return Err(AppError::InsufficientLedgerBalance {
                key: key.to_string(),
                required: fraction,
                available,
            });
        }
        Ok((fraction / available).clamp(0.0, 1.0))
    }

    /// Debits `fraction` from `key` and returns the fixed-point share of the live
    /// balance that represents it.
    pub fn spend(&mut self, key: &AllocationKey, fraction: f64) -> Result<u64, AppError> {
        let local = self.local_fraction(key, fraction)?;
        let entry = self.entries.entry(key.clone()).or_insert(0.0);
        *entry = (*entry - fraction).max(0.0);
        Ok(to_fixed_fraction(local))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AllocationKey, &f64)> {
        self.entries.iter()
    }

    pub fn items(&self) -> Vec<CurrentAllocationItem> {
        self.entries
            .iter()
            .map(|(key, fraction)| match key {
                AllocationKey::AssetId(id) => CurrentAllocationItem {
                    asset_id: Some(id.clone()),
                    address: None,
                    fraction: *fraction,
                },
                AllocationKey::Address(addr) => CurrentAllocationItem {
                    asset_id: None,
                    address: Some(*addr),
                    fraction: *fraction,
                },
            })
            .collect()
    }
}

/// Scales a [0, 1] share to the router's fixed-point fraction.
pub fn to_fixed_fraction(local: f64) -> u64 {
    (local.clamp(0.0, 1.0) * FRACTION_SCALE as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_returns_share_of_live_balance() {
        let key = AllocationKey::AssetId("ausdc".into());
        let mut ledger = CurrentAllocation::new();
        ledger.set(key.clone(), 0.4);

        assert_eq!(ledger.spend(&key, 0.1).unwrap(), 250_000);
        assert!((ledger.fraction(&key) - 0.3).abs() < 1e-12);
        // Whatever remains is now the whole balance.
        assert_eq!(ledger.spend(&key, 0.3).unwrap(), FRACTION_SCALE);
        assert!(ledger.fraction(&key).abs() < 1e-12);
    }

    #[test]
    fn empty_or_overdrawn_balance_is_rejected() {
        let key = AllocationKey::Address(Address::with_last_byte(9));
        let mut ledger = CurrentAllocation::new();
        assert!(matches!(
            ledger.spend(&key, 0.1),
            Err(AppError::InsufficientLedgerBalance { available, .. }) if available == 0.0
        ));

        ledger.credit(&key, 0.1);
        assert!(ledger.spend(&key, 0.2).is_err());
        // Netting dust is absorbed by clamping.
        assert_eq!(ledger.spend(&key, 0.10005).unwrap(), FRACTION_SCALE);
    }

    #[test]
    fn configured_tolerance_bounds_the_overdraw() {
        let key = AllocationKey::Address(Address::with_last_byte(1));
        let mut strict = CurrentAllocation::new();
        strict.set(key.clone(), 0.995);
        assert!(strict.spend(&key, 1.0).is_err());

        let mut loose = CurrentAllocation::with_tolerance(0.01);
        loose.set(key.clone(), 0.995);
        assert_eq!(loose.spend(&key, 1.0).unwrap(), FRACTION_SCALE);
        assert!(loose.spend(&key, 0.02).is_err());
    }

    #[test]
    fn items_report_keys_in_their_own_field() {
        let mut ledger = CurrentAllocation::new();
        ledger.set(AllocationKey::AssetId("lp".into()), 0.5);
        ledger.set(AllocationKey::Address(Address::with_last_byte(1)), 0.5);
        let items = ledger.items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| i.asset_id.as_deref() == Some("lp") && i.address.is_none()));
        assert!(items.iter().any(|i| i.address.is_some() && i.asset_id.is_none()));
    }
}
