// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use std::collections::HashMap;
use std::fs;

use alloy::primitives::Address;

use crate::domain::asset::{Asset, AssetId, AssetType};
use crate::domain::constants::LINKED_FRACTION_SLACK;
use crate::domain::error::AppError;

/// Read-only asset reference data.
pub trait AssetGraph: Send + Sync {
    fn get_asset_by_id(&self, asset_id: &str) -> Result<&Asset, AppError>;
    fn get_asset_by_address(&self, chain_id: u64, address: Address) -> Result<&Asset, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetGraph {
    assets: HashMap<AssetId, Asset>,
    by_address: HashMap<(u64, Address), AssetId>,
}

impl InMemoryAssetGraph {
    /// Builds a graph after checking every edge resolves and no node over-allocates.
    pub fn new(assets: Vec<Asset>) -> Result<Self, AppError> {
        let mut graph = Self::default();
        for asset in assets {
            if graph.assets.contains_key(&asset.id) {
                return Err(AppError::InvalidGraph(format!(
                    "duplicate asset id {}",
                    asset.id
                )));
            }
            graph
                .by_address
                .insert((asset.chain_id, asset.address), asset.id.clone());
            graph.assets.insert(asset.id.clone(), asset);
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Loads `[{"id": .., "chainId": .., "address": .., "decimals": .., "type": .., "linkedAssets": [..]}]`.
    pub fn load_from_file(path: &str) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read asset graph {path}: {e}")))?;
        let assets: Vec<Asset> = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Invalid asset graph JSON {path}: {e}")))?;
        let graph = Self::new(assets)?;
        tracing::info!(target: "config", path, assets = graph.len(), "Loaded asset graph");
        Ok(graph)
    }

    fn validate(&self) -> Result<(), AppError> {
        for asset in self.assets.values() {
            if asset.asset_type.is_token() && !asset.linked_assets.is_empty() {
                return Err(AppError::InvalidGraph(format!(
                    "token {} must not declare linked assets",
                    asset.id
                )));
            }
            if !asset.asset_type.is_token() && asset.linked_assets.is_empty() {
                return Err(AppError::InvalidGraph(format!(
                    "{:?} asset {} has no linked assets",
                    asset.asset_type, asset.id
                )));
            }
            let sum = asset.linked_fraction_sum();
            if sum > 1.0 + LINKED_FRACTION_SLACK {
                return Err(AppError::InvalidGraph(format!(
                    "linked fractions of {} sum to {sum} (> 1)",
                    asset.id
                )));
            }
            for link in &asset.linked_assets {
                if !self.assets.contains_key(&link.asset_id) {
                    return Err(AppError::InvalidGraph(format!(
                        "{} links unknown asset {}",
                        asset.id, link.asset_id
                    )));
                }
                if link.fraction < 0.0 {
                    return Err(AppError::InvalidGraph(format!(
                        "{} -> {} has negative fraction",
                        asset.id, link.asset_id
                    )));
                }
            }
            if asset.asset_type == AssetType::Native && asset.linked_assets.len() != 1 {
                return Err(AppError::InvalidGraph(format!(
                    "native asset {} must link exactly its wrapped token",
                    asset.id
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }
}

impl AssetGraph for InMemoryAssetGraph {
    fn get_asset_by_id(&self, asset_id: &str) -> Result<&Asset, AppError> {
        self.assets
            .get(asset_id)
            .ok_or_else(|| AppError::UnknownAsset(asset_id.to_string()))
    }

    fn get_asset_by_address(&self, chain_id: u64, address: Address) -> Result<&Asset, AppError> {
        self.by_address
            .get(&(chain_id, address))
            .and_then(|id| self.assets.get(id))
            .ok_or_else(|| AppError::UnknownAssetAddress {
                chain_id,
                address: format!("{address:#x}"),
            })
    }
}
