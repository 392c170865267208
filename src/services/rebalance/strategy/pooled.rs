// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Multi-asset pools whose split moves with the market: Uniswap V2 style pairs and
//! Curve style stable pools.

use super::{StepContext, approve, store_of};
use crate::domain::asset::{Asset, LinkedAsset};
use crate::domain::constants::FRACTION_SCALE;
use crate::domain::error::AppError;
use crate::infrastructure::data::asset_graph::AssetGraph;
use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
use crate::services::rebalance::pricing::{PriceBook, PriceRequest};
use crate::services::rebalance::protocols::{ICurvePool2, ICurvePool3, UniV2Router};
use crate::services::rebalance::router_op::{
    CallInput, PatchedCall, RouterOperation, StoreKey, StoreOperation, magic_value,
};
use alloy::primitives::U256;
use alloy::sol_types::SolCall;

const WORD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Two-token constant-product pair managed through its router.
    Amm,
    /// Curve pool with two or three coins.
    StableSwap,
}

pub(super) fn price_requests() -> Vec<PriceRequest> {
    vec![PriceRequest::PoolState]
}

/// Value of one LP unit: reserves priced out, divided by supply.
pub(super) fn price(
    asset: &Asset,
    graph: &dyn AssetGraph,
    book: &PriceBook,
    depth: usize,
) -> Result<f64, AppError> {
    let state = book.pool_state(&asset.id)?;
    let reserves = reserve_values(asset, graph, book, depth)?;
    Ok(reserves.iter().sum::<f64>() / state.total_supply)
}

/// Current value split of the pool, summing to exactly 1.
pub(super) fn linked_by_value(
    asset: &Asset,
    graph: &dyn AssetGraph,
    book: &PriceBook,
) -> Result<Vec<LinkedAsset>, AppError> {
    let values = reserve_values(asset, graph, book, 0)?;
    let total: f64 = values.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(AppError::PriceFetch {
            asset_id: asset.id.clone(),
            reason: "pool reserves hold no value".to_string(),
        });
    }

    let mut links: Vec<LinkedAsset> = asset
        .linked_assets
        .iter()
        .zip(&values)
        .map(|(link, value)| LinkedAsset::new(link.asset_id.clone(), value / total))
        .collect();
    // First entry absorbs the rounding residue.
    let rest: f64 = links.iter().skip(1).map(|l| l.fraction).sum();
    if let Some(first) = links.first_mut() {
        first.fraction = 1.0 - rest;
    }
    Ok(links)
}

fn reserve_values(
    asset: &Asset,
    graph: &dyn AssetGraph,
    book: &PriceBook,
    depth: usize,
) -> Result<Vec<f64>, AppError> {
    let state = book.pool_state(&asset.id)?;
    if state.balances.len() != asset.linked_assets.len() {
        return Err(AppError::precondition(
            &asset.id,
            format!(
                "{} reserves for {} linked assets",
                state.balances.len(),
                asset.linked_assets.len()
            ),
        ));
    }
    asset
        .linked_assets
        .iter()
        .zip(&state.balances)
        .map(|(link, balance)| Ok(balance * book.price_at(&link.asset_id, graph, depth + 1)?))
        .collect()
}

/// Underlying leg of a pool position, resolved against the ledger and stores.
struct Leg<'a> {
    asset: &'a Asset,
    fraction: f64,
    store: usize,
}

impl PoolKind {
    fn legs<'a>(
        &self,
        asset: &Asset,
        ctx: &StepContext<'a>,
        op: &mut RouterOperation,
    ) -> Result<Vec<Leg<'a>>, AppError> {
        let links = linked_by_value(asset, ctx.graph, ctx.prices)?;
        let supported = match self {
            PoolKind::Amm => links.len() == 2,
            PoolKind::StableSwap => matches!(links.len(), 2 | 3),
        };
        if !supported {
            return Err(AppError::precondition(
                &asset.id,
                format!("{self:?} pool cannot have {} linked assets", links.len()),
            ));
        }
        links
            .into_iter()
            .map(|link| {
                let underlying = ctx.graph.get_asset_by_id(&link.asset_id)?;
                Ok(Leg {
                    asset: underlying,
                    fraction: link.fraction,
                    store: store_of(op, underlying)?,
                })
            })
            .collect()
    }

    pub(super) fn enter(
        &self,
        asset: &Asset,
        amount: f64,
        ctx: &StepContext<'_>,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let legs = self.legs(asset, ctx, op)?;
        let spender = match self {
            PoolKind::Amm => asset.require_router()?,
            PoolKind::StableSwap => asset.require_pool()?,
        };
        let lp_store = store_of(op, asset)?;

        let mut locals = Vec::with_capacity(legs.len());
        for leg in &legs {
            let local = ledger.spend(&AllocationKey::for_asset(leg.asset), amount * leg.fraction)?;
            approve(op, leg.asset.address, spender, leg.store, local)?;
            locals.push(local);
        }

        match self {
            PoolKind::Amm => {
                let encoded = UniV2Router::addLiquidityCall {
                    tokenA: legs[0].asset.address,
                    tokenB: legs[1].asset.address,
                    amountADesired: magic_value(0)?,
                    amountBDesired: magic_value(1)?,
                    amountAMin: U256::ZERO,
                    amountBMin: U256::ZERO,
                    to: ctx.holder,
                    deadline: ctx.deadline,
                }
                .abi_encode();
                // The router may take less than offered; only the used amounts
                // leave the token stores.
                let mut call = PatchedCall::new(spender, encoded);
                let mut used = Vec::with_capacity(2);
                for (i, (leg, local)) in legs.iter().zip(&locals).enumerate() {
                    call = call.input(CallInput::Read {
                        store: leg.store,
                        fraction: *local,
                    });
                    let tmp = op.find_or_initialize_store_idx(
                        StoreKey::tmp(format!("{}:used:{i}", asset.id)),
                        None,
                    )?;
                    call = call.result(StoreOperation::retrieve_assign(tmp, i * WORD));
                    used.push(tmp);
                }
                call = call.result(StoreOperation::retrieve_add(lp_store, 2 * WORD));
                for (leg, tmp) in legs.iter().zip(used) {
                    call = call.result(StoreOperation::subtract_store(
                        leg.store,
                        tmp,
                        FRACTION_SCALE,
                    ));
                }
                op.add_patched_call(call)?;
            }
            PoolKind::StableSwap => {
                let encoded = match legs.len() {
                    2 => ICurvePool2::add_liquidityCall {
                        amounts: [magic_value(0)?, magic_value(1)?],
                        min_mint_amount: U256::ZERO,
                    }
                    .abi_encode(),
                    _ => ICurvePool3::add_liquidityCall {
                        amounts: [magic_value(0)?, magic_value(1)?, magic_value(2)?],
                        min_mint_amount: U256::ZERO,
                    }
                    .abi_encode(),
                };
                let mut call = PatchedCall::new(spender, encoded);
                for (leg, local) in legs.iter().zip(&locals) {
                    call = call.input(CallInput::Spend {
                        store: leg.store,
                        fraction: *local,
                    });
                }
                op.add_patched_call(call.result(StoreOperation::retrieve_add(lp_store, 0)))?;
            }
        }

        ledger.credit(&AllocationKey::for_asset(asset), amount);
        Ok(())
    }

    pub(super) fn exit(
        &self,
        asset: &Asset,
        amount: f64,
        ctx: &StepContext<'_>,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let legs = self.legs(asset, ctx, op)?;
        let local = ledger.spend(&AllocationKey::for_asset(asset), amount)?;
        let lp_store = store_of(op, asset)?;
        let burn = CallInput::Spend {
            store: lp_store,
            fraction: local,
        };

        let mut call = match self {
            PoolKind::Amm => {
                let router = asset.require_router()?;
                approve(op, asset.address, router, lp_store, local)?;
                let encoded = UniV2Router::removeLiquidityCall {
                    tokenA: legs[0].asset.address,
                    tokenB: legs[1].asset.address,
                    liquidity: magic_value(0)?,
                    amountAMin: U256::ZERO,
                    amountBMin: U256::ZERO,
                    to: ctx.holder,
                    deadline: ctx.deadline,
                }
                .abi_encode();
                PatchedCall::new(router, encoded)
            }
            PoolKind::StableSwap => {
                let pool = asset.require_pool()?;
                let encoded = match legs.len() {
                    2 => ICurvePool2::remove_liquidityCall {
                        amount: magic_value(0)?,
                        min_amounts: [U256::ZERO; 2],
                    }
                    .abi_encode(),
                    _ => ICurvePool3::remove_liquidityCall {
                        amount: magic_value(0)?,
                        min_amounts: [U256::ZERO; 3],
                    }
                    .abi_encode(),
                };
                PatchedCall::new(pool, encoded)
            }
        }
        .input(burn);

        for (i, leg) in legs.iter().enumerate() {
            call = call.result(StoreOperation::retrieve_add(leg.store, i * WORD));
            ledger.credit(&AllocationKey::for_asset(leg.asset), amount * leg.fraction);
        }
        op.add_patched_call(call)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Pass, Strategy};
    use super::*;
    use crate::domain::allocation::FractionAllocationItem;
    use crate::domain::asset::AssetType;
    use crate::services::rebalance::router_op::StoreOpType;
    use alloy::primitives::Address;

    fn usdc_key() -> AllocationKey {
        AllocationKey::Address(Address::repeat_byte(1))
    }

    #[test]
    fn lp_prices_from_reserves_and_supply() {
        let g = graph();
        let book = prices();
        // (3_000_000 * 1 + 1_000 * 2_000) / 50_000
        assert!((book.price("univ2-usdc-weth", &g).unwrap() - 100.0).abs() < 1e-9);
        assert!((book.price("crv-usdc-dai", &g).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn value_split_sums_to_exactly_one() {
        let g = graph();
        let mut book = prices();
        book.insert_token_price("dai", 0.999_7);
        let crv = g.get_asset_by_id("crv-usdc-dai").unwrap();
        let split = linked_by_value(crv, &g, &book).unwrap();
        assert!((split.iter().map(|l| l.fraction).sum::<f64>() - 1.0).abs() < 1e-15);
        assert!(split[0].fraction > 0.75);
    }

    #[test]
    fn empty_pool_cannot_be_decomposed() {
        let g = graph();
        let mut book = prices();
        book.insert_pool_state(
            "crv-usdc-dai",
            crate::services::rebalance::pricing::PoolState {
                balances: vec![0.0, 0.0],
                total_supply: 1.0,
            },
        );
        let crv = g.get_asset_by_id("crv-usdc-dai").unwrap();
        assert!(matches!(
            linked_by_value(crv, &g, &book),
            Err(AppError::PriceFetch { .. })
        ));
    }

    #[test]
    fn add_liquidity_debits_only_what_the_router_used() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        let usdc = hold(&g, &mut op, &mut ledger, "usdc", 0.6);
        let weth = hold(&g, &mut op, &mut ledger, "weth", 0.4);

        Strategy::Pooled(PoolKind::Amm)
            .generate_step(
                &FractionAllocationItem::new("univ2-usdc-weth", 0.5),
                Pass::Positive,
                &ctx(&g, &book),
                &mut ledger,
                &mut op,
            )
            .unwrap();

        assert_eq!(op.len(), 3);
        let add = &op.steps()[2].store_operations;
        let kinds: Vec<StoreOpType> = add.iter().map(|o| o.op_type).collect();
        assert_eq!(
            kinds,
            vec![
                StoreOpType::AssignCall,
                StoreOpType::AssignCall,
                StoreOpType::RetrieveResultAssign,
                StoreOpType::RetrieveResultAssign,
                StoreOpType::RetrieveResultAdd,
                StoreOpType::SubtractStoreFromStore,
                StoreOpType::SubtractStoreFromStore,
            ]
        );
        assert_eq!(add[0].store_number, usdc);
        assert_eq!(add[1].store_number, weth);
        assert_eq!(add[4].offset, 64);
        assert_eq!(add[5].store_number, usdc);
        assert_eq!(add[5].secondary_store_number, Some(add[2].store_number));

        // 0.5 split 60/40 against balances of 0.6 and 0.4.
        assert!((ledger.fraction(&usdc_key()) - 0.3).abs() < 1e-12);
        assert!(
            (ledger.fraction(&AllocationKey::AssetId("univ2-usdc-weth".into())) - 0.5).abs()
                < 1e-12
        );
        assert!(op.validate().is_ok());
    }

    #[test]
    fn remove_liquidity_returns_both_legs() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        hold(&g, &mut op, &mut ledger, "univ2-usdc-weth", 0.5);

        Strategy::Pooled(PoolKind::Amm)
            .generate_step(
                &FractionAllocationItem::new("univ2-usdc-weth", -0.25),
                Pass::Negative,
                &ctx(&g, &book),
                &mut ledger,
                &mut op,
            )
            .unwrap();

        assert_eq!(op.len(), 2);
        let remove = &op.steps()[1];
        assert_eq!(remove.step_address, Address::repeat_byte(0x90));
        let offsets: Vec<usize> = remove.store_operations[1..].iter().map(|o| o.offset).collect();
        assert_eq!(offsets, vec![0, 32]);
        assert!((ledger.fraction(&usdc_key()) - 0.15).abs() < 1e-12);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn curve_deposit_spends_every_coin() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        hold(&g, &mut op, &mut ledger, "usdc", 0.75);
        hold(&g, &mut op, &mut ledger, "dai", 0.25);

        Strategy::Pooled(PoolKind::StableSwap)
            .generate_step(
                &FractionAllocationItem::new("crv-usdc-dai", 1.0),
                Pass::Positive,
                &ctx(&g, &book),
                &mut ledger,
                &mut op,
            )
            .unwrap();

        let add = &op.steps()[2];
        assert_eq!(add.step_address, Address::repeat_byte(0xa0));
        assert!(add.store_operations[..2]
            .iter()
            .all(|o| o.op_type == StoreOpType::AssignCallSubtract && o.fraction == FRACTION_SCALE));
        assert_eq!(add.store_operations[2].op_type, StoreOpType::RetrieveResultAdd);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn amm_rejects_three_legged_pools() {
        let g = crate::infrastructure::data::asset_graph::InMemoryAssetGraph::new(vec![
            asset("a", 1, AssetType::Token, &[], None),
            asset("b", 2, AssetType::Token, &[], None),
            asset("c", 3, AssetType::Token, &[], None),
            asset(
                "tri",
                4,
                AssetType::AmmLiquidity,
                &[("a", 0.4), ("b", 0.3), ("c", 0.3)],
                pool_params(0x40),
            ),
        ])
        .unwrap();
        let mut book = PriceBook::new();
        for id in ["a", "b", "c"] {
            book.insert_token_price(id, 1.0);
        }
        book.insert_pool_state(
            "tri",
            crate::services::rebalance::pricing::PoolState {
                balances: vec![1.0, 1.0, 1.0],
                total_supply: 1.0,
            },
        );
        let tri = g.get_asset_by_id("tri").unwrap();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        assert!(matches!(
            PoolKind::Amm.enter(tri, 0.1, &ctx(&g, &book), &mut ledger, &mut op),
            Err(AppError::StrategyPrecondition { .. })
        ));
    }
}
