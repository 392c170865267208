// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::asset::AssetId;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Signed share of total portfolio value held in `asset_id`, plus claimable rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FractionAllocationItem {
    pub asset_id: AssetId,
    pub fraction: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<FractionAllocationItem>,
}

impl FractionAllocationItem {
    pub fn new(asset_id: impl Into<AssetId>, fraction: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            fraction,
            rewards: Vec::new(),
        }
    }

    pub fn with_rewards(mut self, rewards: Vec<FractionAllocationItem>) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn rewards_sum(&self) -> f64 {
        self.rewards.iter().map(|r| r.fraction).sum()
    }

    /// Adds `other` into `self`, merging reward entries by asset id.
    pub fn absorb(&mut self, other: &FractionAllocationItem) {
        self.fraction += other.fraction;
        merge_rewards(&mut self.rewards, &other.rewards);
    }
}

pub(crate) fn merge_rewards(into: &mut Vec<FractionAllocationItem>, from: &[FractionAllocationItem]) {
    for reward in from {
        match into.iter_mut().find(|r| r.asset_id == reward.asset_id) {
            Some(existing) => existing.absorb(reward),
            None => into.push(reward.clone()),
        }
    }
}

pub type FractionAllocation = Vec<FractionAllocationItem>;

/// Raw on-chain holding, used only for the portfolio's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsoluteAllocationItem {
    pub asset_id: AssetId,
    pub amount_str: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<AbsoluteAllocationItem>,
}

impl AbsoluteAllocationItem {
    pub fn new(asset_id: impl Into<AssetId>, amount_str: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            amount_str: amount_str.into(),
            rewards: Vec::new(),
        }
    }
}

/// Ledger entry; addressed by asset id (strategies) or raw address (swap routes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentAllocationItem {
    #[serde(default)]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub address: Option<Address>,
    pub fraction: f64,
}

/// One depth tier of a decomposed allocation, keyed by asset id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetLayer(BTreeMap<AssetId, FractionAllocationItem>);

impl AssetLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, asset_id: &str) -> Option<&FractionAllocationItem> {
        self.0.get(asset_id)
    }

    pub fn fraction(&self, asset_id: &str) -> f64 {
        self.0.get(asset_id).map(|i| i.fraction).unwrap_or(0.0)
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.0.contains_key(asset_id)
    }

    pub fn insert(&mut self, item: FractionAllocationItem) {
        self.0.insert(item.asset_id.clone(), item);
    }

    pub fn remove(&mut self, asset_id: &str) -> Option<FractionAllocationItem> {
        self.0.remove(asset_id)
    }

    /// Sums `item` into the existing entry for its asset, or inserts it.
    pub fn accumulate(&mut self, item: &FractionAllocationItem) {
        match self.0.entry(item.asset_id.clone()) {
            btree_map::Entry::Occupied(mut e) => e.get_mut().absorb(item),
            btree_map::Entry::Vacant(e) => {
                e.insert(item.clone());
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &AssetId> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &FractionAllocationItem> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_fraction(&self) -> f64 {
        self.0.values().map(|i| i.fraction).sum()
    }
}

impl FromIterator<FractionAllocationItem> for AssetLayer {
    fn from_iter<T: IntoIterator<Item = FractionAllocationItem>>(iter: T) -> Self {
        let mut layer = AssetLayer::new();
        for item in iter {
            layer.accumulate(&item);
        }
        layer
    }
}

/// Layered decomposition: index 0 is the swappable token layer, higher indices nest deeper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetLayers(Vec<AssetLayer>);

impl AssetLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(layers: usize) -> Self {
        Self(vec![AssetLayer::new(); layers])
    }

    pub fn from_layers(layers: Vec<AssetLayer>) -> Self {
        Self(layers)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<&AssetLayer> {
        self.0.get(index)
    }

    /// Mutable access that grows the stack as needed.
    pub fn layer_mut(&mut self, index: usize) -> &mut AssetLayer {
        if index >= self.0.len() {
            self.0.resize(index + 1, AssetLayer::new());
        }
        &mut self.0[index]
    }

    pub fn token_layer(&self) -> Option<&AssetLayer> {
        self.0.first()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AssetLayer> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<AssetLayer> {
        self.0
    }

    /// Lowest layer index an asset occupies, if any.
    pub fn shallowest_index_of(&self, asset_id: &str) -> Option<usize> {
        self.0.iter().position(|l| l.contains(asset_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_merges_fractions_and_rewards_by_id() {
        let mut layer = AssetLayer::new();
        layer.accumulate(
            &FractionAllocationItem::new("vault", 0.2)
                .with_rewards(vec![FractionAllocationItem::new("crv", 0.01)]),
        );
        layer.accumulate(
            &FractionAllocationItem::new("vault", 0.1).with_rewards(vec![
                FractionAllocationItem::new("crv", 0.02),
                FractionAllocationItem::new("cvx", 0.005),
            ]),
        );

        let merged = layer.get("vault").expect("vault entry");
        assert!((merged.fraction - 0.3).abs() < 1e-12);
        assert_eq!(merged.rewards.len(), 2);
        assert!((merged.rewards_sum() - 0.035).abs() < 1e-12);
    }

    #[test]
    fn layer_mut_grows_the_stack() {
        let mut layers = AssetLayers::new();
        layers.layer_mut(2).insert(FractionAllocationItem::new("lp", 1.0));
        assert_eq!(layers.len(), 3);
        assert_eq!(layers.shallowest_index_of("lp"), Some(2));
        assert!(layers.token_layer().is_some_and(|l| l.is_empty()));
    }
}
