// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::asset::{Asset, AssetId};
use crate::domain::error::AppError;
use crate::services::rebalance::pricing::{MarketData, PoolState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Frozen market observations keyed by asset id.
///
/// ```json
/// { "tokenPrices": { "usdc": 1.0 },
///   "pools": { "univ2-usdc-weth": { "balances": [3000000, 1000], "totalSupply": 50000 } },
///   "shareRates": { "yvusdc": 1.08 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticMarketData {
    #[serde(default)]
    pub token_prices: HashMap<AssetId, f64>,
    #[serde(default)]
    pub pools: HashMap<AssetId, PoolState>,
    #[serde(default)]
    pub share_rates: HashMap<AssetId, f64>,
}

impl StaticMarketData {
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read market snapshot {}: {e}", path.display()))
        })?;
        let snapshot: Self = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("Invalid market snapshot JSON {}: {e}", path.display()))
        })?;
        tracing::info!(
            target: "config",
            path = %path.display(),
            tokens = snapshot.token_prices.len(),
            pools = snapshot.pools.len(),
            vaults = snapshot.share_rates.len(),
            "Loaded market snapshot"
        );
        Ok(snapshot)
    }

    fn missing(asset: &Asset, what: &str) -> AppError {
        AppError::PriceFetch {
            asset_id: asset.id.clone(),
            reason: format!("snapshot has no {what}"),
        }
    }
}

#[async_trait]
impl MarketData for StaticMarketData {
    async fn token_usd_price(&self, asset: &Asset) -> Result<f64, AppError> {
        self.token_prices
            .get(&asset.id)
            .copied()
            .ok_or_else(|| Self::missing(asset, "token price"))
    }

    async fn pool_state(&self, pool: &Asset, underlying: &[Asset]) -> Result<PoolState, AppError> {
        let state = self
            .pools
            .get(&pool.id)
            .cloned()
            .ok_or_else(|| Self::missing(pool, "pool state"))?;
        if state.balances.len() != underlying.len() {
            return Err(AppError::PriceFetch {
                asset_id: pool.id.clone(),
                reason: format!(
                    "snapshot lists {} balances for {} linked assets",
                    state.balances.len(),
                    underlying.len()
                ),
            });
        }
        Ok(state)
    }

    async fn share_rate(&self, vault: &Asset, _underlying: &Asset) -> Result<f64, AppError> {
        self.share_rates
            .get(&vault.id)
            .copied()
            .ok_or_else(|| Self::missing(vault, "share rate"))
    }
}
