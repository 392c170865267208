// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::parsing::{raw_to_units, units_to_raw};
use crate::domain::error::AppError;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

pub type AssetId = String;

/// Asset families the rebalancer knows how to enter and exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Token,
    Native,
    LendingDeposit,
    VaultDeposit,
    AmmLiquidity,
    StableSwapDeposit,
    BridgeDeposit,
}

impl AssetType {
    /// Token-layer leaves: directly swappable, never decomposed.
    pub fn is_token(&self) -> bool {
        matches!(self, AssetType::Token)
    }
}

/// Static decomposition edge: `fraction` of the parent's value sits in `asset_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAsset {
    pub asset_id: AssetId,
    pub fraction: f64,
}

impl LinkedAsset {
    pub fn new(asset_id: impl Into<AssetId>, fraction: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            fraction,
        }
    }
}

/// Protocol call parameters attached to a composite asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    /// Lending pool, Curve pool or bridge pool the position lives in.
    #[serde(default)]
    pub pool: Option<Address>,
    /// Router used for AMM liquidity management.
    #[serde(default)]
    pub router: Option<Address>,
    /// Incentives contract that pays out the position's rewards.
    #[serde(default)]
    pub rewards_controller: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub chain_id: u64,
    pub address: Address,
    pub decimals: u8,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub linked_assets: Vec<LinkedAsset>,
    #[serde(default)]
    pub call_params: Option<CallParams>,
}

impl Asset {
    pub fn linked_fraction_sum(&self) -> f64 {
        self.linked_assets.iter().map(|l| l.fraction).sum()
    }

    pub fn params(&self) -> CallParams {
        self.call_params.clone().unwrap_or_default()
    }

    pub fn require_pool(&self) -> Result<Address, AppError> {
        self.params()
            .pool
            .ok_or_else(|| AppError::precondition(&self.id, "missing callParams.pool"))
    }

    pub fn require_router(&self) -> Result<Address, AppError> {
        self.params()
            .router
            .ok_or_else(|| AppError::precondition(&self.id, "missing callParams.router"))
    }

    /// Single-underlying strategies (lending, vault, bridge, native) need exactly one link.
    pub fn single_linked(&self) -> Result<&LinkedAsset, AppError> {
        match self.linked_assets.as_slice() {
            [only] => Ok(only),
            other => Err(AppError::precondition(
                &self.id,
                format!("expected exactly one linked asset, found {}", other.len()),
            )),
        }
    }

    /// Raw on-chain integer to whole units, e.g. 1_500_000 with 6 decimals -> 1.5.
    pub fn to_units(&self, raw: U256) -> f64 {
        raw_to_units(raw, self.decimals)
    }

    pub fn to_raw(&self, units: f64) -> U256 {
        units_to_raw(units, self.decimals)
    }
}
