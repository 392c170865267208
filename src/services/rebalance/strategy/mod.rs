// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod native;
pub mod pooled;
pub mod rewards;
pub mod single;
pub mod token;

pub use pooled::PoolKind;
pub use single::SingleKind;

use crate::domain::allocation::FractionAllocationItem;
use crate::domain::asset::{Asset, AssetType, LinkedAsset};
use crate::domain::error::AppError;
use crate::infrastructure::data::asset_graph::AssetGraph;
use crate::services::rebalance::layers::LinkedAssetSource;
use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
use crate::services::rebalance::pricing::{PriceBook, RequestTree};
use crate::services::rebalance::protocols::IERC20;
use crate::services::rebalance::router_op::{
    CallInput, PatchedCall, RouterOperation, StoreKey, StoreOperation, magic_value,
};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;

/// Which half of the pipeline a step is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Withdraw, unwrap and harvest.
    Negative,
    /// Wrap and deposit.
    Positive,
}

/// Read-only inputs shared by every generated step of one rebalance.
pub struct StepContext<'a> {
    pub graph: &'a dyn AssetGraph,
    pub prices: &'a PriceBook,
    /// Owner of every position and recipient of every call.
    pub holder: Address,
    pub deadline: U256,
}

impl StepContext<'_> {
    pub fn links(&self) -> PricedLinks<'_> {
        PricedLinks {
            graph: self.graph,
            prices: self.prices,
        }
    }
}

/// Step generator per asset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Token,
    Native,
    Single(SingleKind),
    Pooled(PoolKind),
}

impl Strategy {
    pub fn for_asset(asset: &Asset) -> Self {
        match asset.asset_type {
            AssetType::Token => Strategy::Token,
            AssetType::Native => Strategy::Native,
            AssetType::LendingDeposit => Strategy::Single(SingleKind::Lending),
            AssetType::VaultDeposit => Strategy::Single(SingleKind::Vault),
            AssetType::BridgeDeposit => Strategy::Single(SingleKind::Bridge),
            AssetType::AmmLiquidity => Strategy::Pooled(PoolKind::Amm),
            AssetType::StableSwapDeposit => Strategy::Pooled(PoolKind::StableSwap),
        }
    }

    /// Observations needed to price `asset`, with one subtree per linked asset.
    /// Recursion past `max_depth` is reported as a cycle.
    pub fn fetch_price_data(
        &self,
        asset: &Asset,
        graph: &dyn AssetGraph,
        depth: usize,
        max_depth: usize,
    ) -> Result<RequestTree, AppError> {
        if depth > max_depth {
            return Err(AppError::CyclicDecomposition {
                asset_id: asset.id.clone(),
                depth: max_depth,
            });
        }
        let requests = match self {
            Strategy::Token => return Ok(token::request_tree(asset)),
            Strategy::Native => Vec::new(),
            Strategy::Single(kind) => kind.price_requests(),
            Strategy::Pooled(_) => pooled::price_requests(),
        };
        let mut children = Vec::with_capacity(asset.linked_assets.len());
        for link in &asset.linked_assets {
            let child = graph.get_asset_by_id(&link.asset_id)?;
            children.push(
                Strategy::for_asset(child).fetch_price_data(child, graph, depth + 1, max_depth)?,
            );
        }
        Ok(RequestTree::node(asset.id.clone(), requests, children))
    }

    /// USD value of one whole unit of `asset`.
    pub fn get_price(
        &self,
        asset: &Asset,
        graph: &dyn AssetGraph,
        book: &PriceBook,
        depth: usize,
    ) -> Result<f64, AppError> {
        match self {
            Strategy::Token => token::price(asset, book),
            Strategy::Native => {
                let link = asset.single_linked()?;
                book.price_at(&link.asset_id, graph, depth + 1)
            }
            Strategy::Single(kind) => kind.price(asset, graph, book, depth),
            Strategy::Pooled(_) => pooled::price(asset, graph, book, depth),
        }
    }

    /// Decomposition of `asset`; pools answer with their current value split.
    pub fn get_linked_assets(
        &self,
        asset: &Asset,
        graph: &dyn AssetGraph,
        book: &PriceBook,
    ) -> Result<Vec<LinkedAsset>, AppError> {
        match self {
            Strategy::Pooled(_) => pooled::linked_by_value(asset, graph, book),
            _ => Ok(asset.linked_assets.clone()),
        }
    }

    /// Emits the steps that move `item.fraction` of the portfolio into (positive)
    /// or out of (negative) `item`'s asset, updating the ledger to match.
    pub fn generate_step(
        &self,
        item: &FractionAllocationItem,
        pass: Pass,
        ctx: &StepContext<'_>,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let asset = ctx.graph.get_asset_by_id(&item.asset_id)?;
        let before = op.len();
        match pass {
            Pass::Negative => {
                if item.rewards_sum() < 0.0 {
                    rewards::harvest(asset, &item.rewards, ctx, ledger, op)?;
                }
                if item.fraction < 0.0 {
                    self.exit(asset, -item.fraction, ctx, ledger, op)?;
                }
            }
            Pass::Positive => {
                if item.fraction > 0.0 {
                    self.enter(asset, item.fraction, ctx, ledger, op)?;
                }
            }
        }
        tracing::debug!(
            target: "strategy",
            asset = %asset.id,
            strategy = ?self,
            pass = ?pass,
            fraction = item.fraction,
            steps = op.len() - before,
            "Generated steps"
        );
        Ok(())
    }

    fn enter(
        &self,
        asset: &Asset,
        amount: f64,
        ctx: &StepContext<'_>,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        match self {
            Strategy::Token => Ok(()),
            Strategy::Native => native::enter(asset, amount, ctx, ledger, op),
            Strategy::Single(kind) => kind.enter(asset, amount, ctx, ledger, op),
            Strategy::Pooled(kind) => kind.enter(asset, amount, ctx, ledger, op),
        }
    }

    fn exit(
        &self,
        asset: &Asset,
        amount: f64,
        ctx: &StepContext<'_>,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        match self {
            Strategy::Token => Ok(()),
            Strategy::Native => native::exit(asset, amount, ctx, ledger, op),
            Strategy::Single(kind) => kind.exit(asset, amount, ctx, ledger, op),
            Strategy::Pooled(kind) => kind.exit(asset, amount, ctx, ledger, op),
        }
    }
}

/// Layer-builder source that decomposes pools by their priced value split, so
/// layering and step generation agree on the same fractions.
pub struct PricedLinks<'a> {
    pub graph: &'a dyn AssetGraph,
    pub prices: &'a PriceBook,
}

impl LinkedAssetSource for PricedLinks<'_> {
    fn asset(&self, asset_id: &str) -> Result<&Asset, AppError> {
        self.graph.get_asset_by_id(asset_id)
    }

    fn linked_assets(&self, asset: &Asset) -> Result<Vec<LinkedAsset>, AppError> {
        Strategy::for_asset(asset).get_linked_assets(asset, self.graph, self.prices)
    }
}

/// Store holding `asset`'s live balance.
pub(crate) fn store_of(op: &mut RouterOperation, asset: &Asset) -> Result<usize, AppError> {
    op.find_or_initialize_store_idx(StoreKey::from(&AllocationKey::for_asset(asset)), None)
}

/// `token.approve(spender, store * fraction)` without debiting the store.
pub(crate) fn approve(
    op: &mut RouterOperation,
    token: Address,
    spender: Address,
    store: usize,
    fraction: u64,
) -> Result<usize, AppError> {
    let encoded = IERC20::approveCall {
        spender,
        amount: magic_value(0)?,
    }
    .abi_encode();
    op.add_patched_call(PatchedCall::new(token, encoded).input(CallInput::Read { store, fraction }))
}

/// Overwrites `store` with `token.balanceOf(holder)`.
pub(crate) fn sync_balance(
    op: &mut RouterOperation,
    token: Address,
    holder: Address,
    store: usize,
) -> Result<usize, AppError> {
    let encoded = IERC20::balanceOfCall { owner: holder }.abi_encode();
    op.add_patched_call(
        PatchedCall::new(token, encoded).result(StoreOperation::retrieve_assign(store, 0)),
    )
}
