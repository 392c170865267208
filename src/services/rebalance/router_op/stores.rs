// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::asset::AssetId;
use crate::domain::error::AppError;
use crate::services::rebalance::ledger::AllocationKey;
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Identity of a store register. Exactly one of the three forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreKey {
    AssetId(AssetId),
    Address(Address),
    TmpStoreName(String),
}

impl StoreKey {
    /// Builds a key from loosely-specified parts; exactly one must be set.
    pub fn from_parts(
        asset_id: Option<AssetId>,
        address: Option<Address>,
        tmp_store_name: Option<String>,
    ) -> Result<Self, AppError> {
        match (asset_id, address, tmp_store_name) {
            (Some(id), None, None) => Ok(StoreKey::AssetId(id)),
            (None, Some(addr), None) => Ok(StoreKey::Address(addr)),
            (None, None, Some(name)) => Ok(StoreKey::TmpStoreName(name)),
            _ => Err(AppError::Validation {
                field: "store_key".to_string(),
                message: "exactly one of assetId, address or tmpStoreName is required".to_string(),
            }),
        }
    }

    pub fn tmp(name: impl Into<String>) -> Self {
        StoreKey::TmpStoreName(name.into())
    }
}

impl From<&AllocationKey> for StoreKey {
    fn from(key: &AllocationKey) -> Self {
        match key {
            AllocationKey::AssetId(id) => StoreKey::AssetId(id.clone()),
            AllocationKey::Address(addr) => StoreKey::Address(*addr),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::AssetId(id) => write!(f, "asset:{id}"),
            StoreKey::Address(addr) => write!(f, "address:{addr:#x}"),
            StoreKey::TmpStoreName(name) => write!(f, "tmp:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStore {
    pub key: StoreKey,
    /// Raw starting value; `None` means the store starts at zero and must be
    /// written by a step before anything reads it.
    pub value: Option<U256>,
}

/// Ordered register file; indices are stable once handed out.
#[derive(Debug, Clone, Default)]
pub struct StoreFile {
    stores: Vec<DetailedStore>,
    index: HashMap<StoreKey, usize>,
}

impl StoreFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `key`, creating the store on first reference. An
    /// initial value may only accompany that first reference.
    pub fn find_or_initialize_store_idx(
        &mut self,
        key: StoreKey,
        value: Option<U256>,
    ) -> Result<usize, AppError> {
        if let Some(&idx) = self.index.get(&key) {
            if value.is_some() {
                return Err(AppError::StoreAlreadyInitialized(key.to_string()));
            }
            return Ok(idx);
        }
        let idx = self.stores.len();
        self.index.insert(key.clone(), idx);
        self.stores.push(DetailedStore { key, value });
        Ok(idx)
    }

    pub fn find(&self, key: &StoreKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&DetailedStore> {
        self.stores.get(idx)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetailedStore> {
        self.stores.iter()
    }

    /// Initial values in index order, zero for unseeded stores.
    pub fn initial_values(&self) -> Vec<U256> {
        self.stores
            .iter()
            .map(|s| s.value.unwrap_or(U256::ZERO))
            .collect()
    }

    pub fn into_stores(self) -> Vec<DetailedStore> {
        self.stores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_stable_and_value_only_on_first_reference() {
        let mut file = StoreFile::new();
        let usdc = StoreKey::Address(Address::with_last_byte(1));
        let a = file
            .find_or_initialize_store_idx(usdc.clone(), Some(U256::from(500u64)))
            .unwrap();
        let b = file
            .find_or_initialize_store_idx(StoreKey::tmp("eth-before"), None)
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(file.find_or_initialize_store_idx(usdc.clone(), None).unwrap(), 0);

        let err = file
            .find_or_initialize_store_idx(usdc, Some(U256::from(1u64)))
            .unwrap_err();
        assert!(matches!(err, AppError::StoreAlreadyInitialized(k) if k.starts_with("address:")));
        assert_eq!(file.initial_values(), vec![U256::from(500u64), U256::ZERO]);
    }

    #[test]
    fn from_parts_requires_exactly_one_identity() {
        assert_eq!(
            StoreKey::from_parts(Some("lp".into()), None, None).unwrap(),
            StoreKey::AssetId("lp".into())
        );
        assert!(StoreKey::from_parts(None, None, None).is_err());
        assert!(StoreKey::from_parts(Some("lp".into()), Some(Address::ZERO), None).is_err());
    }
}
