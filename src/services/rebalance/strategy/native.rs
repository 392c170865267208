// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Network-native asset, moved in and out through its wrapped token.

use super::{StepContext, store_of, sync_balance};
use crate::domain::asset::Asset;
use crate::domain::constants::MULTICALL3;
use crate::domain::error::AppError;
use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
use crate::services::rebalance::protocols::{IMulticall3, IWETH};
use crate::services::rebalance::router_op::{
    CallInput, CallValue, PatchedCall, RouterOperation, StoreOperation, magic_value,
};
use alloy::sol_types::SolCall;

/// Wrapped -> native: `withdraw`, then read the holder's native balance back.
pub(super) fn enter(
    asset: &Asset,
    amount: f64,
    ctx: &StepContext<'_>,
    ledger: &mut CurrentAllocation,
    op: &mut RouterOperation,
) -> Result<(), AppError> {
    let link = asset.single_linked()?;
    let wrapped = ctx.graph.get_asset_by_id(&link.asset_id)?;
    let wrapped_key = AllocationKey::for_asset(wrapped);

    let local = ledger.spend(&wrapped_key, amount * link.fraction)?;
    let wrapped_store = store_of(op, wrapped)?;
    let native_store = store_of(op, asset)?;

    let withdraw = IWETH::withdrawCall {
        wad: magic_value(0)?,
    }
    .abi_encode();
    op.add_patched_call(PatchedCall::new(wrapped.address, withdraw).input(CallInput::Spend {
        store: wrapped_store,
        fraction: local,
    }))?;

    let balance = IMulticall3::getEthBalanceCall { addr: ctx.holder }.abi_encode();
    op.add_patched_call(
        PatchedCall::new(MULTICALL3, balance)
            .result(StoreOperation::retrieve_assign(native_store, 0)),
    )?;

    ledger.credit(&AllocationKey::for_asset(asset), amount);
    Ok(())
}

/// Native -> wrapped: payable `deposit` funded from the native store.
pub(super) fn exit(
    asset: &Asset,
    amount: f64,
    ctx: &StepContext<'_>,
    ledger: &mut CurrentAllocation,
    op: &mut RouterOperation,
) -> Result<(), AppError> {
    let link = asset.single_linked()?;
    let wrapped = ctx.graph.get_asset_by_id(&link.asset_id)?;

    let local = ledger.spend(&AllocationKey::for_asset(asset), amount)?;
    let native_store = store_of(op, asset)?;
    let wrapped_store = store_of(op, wrapped)?;

    let deposit = IWETH::depositCall {}.abi_encode();
    op.add_patched_call(PatchedCall::new(wrapped.address, deposit).value(CallValue {
        store_number: native_store,
        fraction: local,
        subtract: true,
    }))?;
    sync_balance(op, wrapped.address, ctx.holder, wrapped_store)?;

    ledger.credit(&AllocationKey::for_asset(wrapped), amount * link.fraction);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Pass, Strategy};
    use crate::domain::allocation::FractionAllocationItem;
    use crate::domain::constants::FRACTION_SCALE;
    use crate::infrastructure::data::asset_graph::AssetGraph;
    use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
    use crate::services::rebalance::router_op::{RouterOperation, StoreOpType};

    #[test]
    fn unwrapping_native_funds_deposit_from_the_native_store() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        let eth_store = hold(&g, &mut op, &mut ledger, "eth", 0.4);

        Strategy::Native
            .generate_step(
                &FractionAllocationItem::new("eth", -0.1),
                Pass::Negative,
                &ctx(&g, &book),
                &mut ledger,
                &mut op,
            )
            .unwrap();

        assert_eq!(op.len(), 2);
        let deposit = &op.steps()[0];
        let value = deposit.call_value.as_ref().unwrap();
        assert_eq!(value.store_number, eth_store);
        assert_eq!(value.fraction, FRACTION_SCALE / 4);
        assert!(value.subtract);
        assert!(deposit.store_operations.is_empty());
        assert_eq!(
            op.steps()[1].store_operations[0].op_type,
            StoreOpType::RetrieveResultAssign
        );

        let weth = g.get_asset_by_id("weth").unwrap();
        assert!((ledger.fraction(&AllocationKey::for_asset(weth)) - 0.1).abs() < 1e-12);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn wrapping_back_spends_the_wrapped_store() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        let weth_store = hold(&g, &mut op, &mut ledger, "weth", 0.2);

        Strategy::Native
            .generate_step(
                &FractionAllocationItem::new("eth", 0.2),
                Pass::Positive,
                &ctx(&g, &book),
                &mut ledger,
                &mut op,
            )
            .unwrap();

        let withdraw = &op.steps()[0].store_operations[0];
        assert_eq!(withdraw.op_type, StoreOpType::AssignCallSubtract);
        assert_eq!(withdraw.store_number, weth_store);
        assert_eq!(withdraw.fraction, FRACTION_SCALE);
        assert!((ledger.fraction(&AllocationKey::AssetId("eth".into())) - 0.2).abs() < 1e-12);
        assert!(op.validate().is_ok());
    }
}
