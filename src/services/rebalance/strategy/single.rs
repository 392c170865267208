// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Positions backed by exactly one underlying asset: lending receipts, ERC4626
//! vault shares and bridge liquidity.

use super::{StepContext, approve, store_of, sync_balance};
use crate::domain::asset::Asset;
use crate::domain::error::AppError;
use crate::infrastructure::data::asset_graph::AssetGraph;
use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
use crate::services::rebalance::pricing::{PriceBook, PriceRequest};
use crate::services::rebalance::protocols::{IAaveV3Pool, IERC4626, IStargatePool};
use crate::services::rebalance::router_op::{
    CallInput, PatchedCall, RouterOperation, StoreOperation, magic_value,
};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleKind {
    /// Aave-style pool; the receipt token rebases 1:1 with the underlying.
    Lending,
    /// ERC4626 vault; shares convert at a moving rate.
    Vault,
    /// Stargate-style pool; LP is minted 1:1 in local decimals.
    Bridge,
}

impl SingleKind {
    pub(super) fn price_requests(&self) -> Vec<PriceRequest> {
        match self {
            SingleKind::Vault => vec![PriceRequest::ShareRate],
            SingleKind::Lending | SingleKind::Bridge => Vec::new(),
        }
    }

    pub(super) fn price(
        &self,
        asset: &Asset,
        graph: &dyn AssetGraph,
        book: &PriceBook,
        depth: usize,
    ) -> Result<f64, AppError> {
        let link = asset.single_linked()?;
        let underlying = book.price_at(&link.asset_id, graph, depth + 1)?;
        match self {
            SingleKind::Vault => Ok(book.share_rate(&asset.id)? * underlying),
            SingleKind::Lending | SingleKind::Bridge => Ok(underlying),
        }
    }

    /// Contract that pulls the underlying on deposit.
    fn spender(&self, asset: &Asset) -> Result<Address, AppError> {
        match self {
            SingleKind::Lending | SingleKind::Bridge => asset.require_pool(),
            SingleKind::Vault => Ok(asset.address),
        }
    }

    pub(super) fn enter(
        &self,
        asset: &Asset,
        amount: f64,
        ctx: &StepContext<'_>,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let link = asset.single_linked()?;
        let underlying = ctx.graph.get_asset_by_id(&link.asset_id)?;
        let spender = self.spender(asset)?;

        let local = ledger.spend(&AllocationKey::for_asset(underlying), amount * link.fraction)?;
        let from = store_of(op, underlying)?;
        let to = store_of(op, asset)?;

        approve(op, underlying.address, spender, from, local)?;
        let spend = CallInput::Spend {
            store: from,
            fraction: local,
        };
        match self {
            SingleKind::Lending => {
                let supply = IAaveV3Pool::supplyCall {
                    asset: underlying.address,
                    amount: magic_value(0)?,
                    onBehalfOf: ctx.holder,
                    referralCode: 0,
                }
                .abi_encode();
                op.add_patched_call(PatchedCall::new(spender, supply).input(spend))?;
                // supply() returns nothing; read the minted receipt back.
                sync_balance(op, asset.address, ctx.holder, to)?;
            }
            SingleKind::Vault => {
                let deposit = IERC4626::depositCall {
                    assets: magic_value(0)?,
                    receiver: ctx.holder,
                }
                .abi_encode();
                op.add_patched_call(
                    PatchedCall::new(asset.address, deposit)
                        .input(spend)
                        .result(StoreOperation::retrieve_add(to, 0)),
                )?;
            }
            SingleKind::Bridge => {
                let deposit = IStargatePool::depositCall {
                    receiver: ctx.holder,
                    amountLD: magic_value(0)?,
                }
                .abi_encode();
                op.add_patched_call(
                    PatchedCall::new(spender, deposit)
                        .input(spend)
                        .result(StoreOperation::retrieve_add(to, 0)),
                )?;
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
        let link = asset.single_linked()?;
        let underlying = ctx.graph.get_asset_by_id(&link.asset_id)?;

        let local = ledger.spend(&AllocationKey::for_asset(asset), amount)?;
        let from = store_of(op, asset)?;
        let to = store_of(op, underlying)?;
        let spend = CallInput::Spend {
            store: from,
            fraction: local,
        };

        let (target, encoded) = match self {
            SingleKind::Lending => (
                asset.require_pool()?,
                IAaveV3Pool::withdrawCall {
                    asset: underlying.address,
                    amount: magic_value(0)?,
                    to: ctx.holder,
                }
                .abi_encode(),
            ),
            SingleKind::Vault => (
                asset.address,
                IERC4626::redeemCall {
                    shares: magic_value(0)?,
                    receiver: ctx.holder,
                    owner: ctx.holder,
                }
                .abi_encode(),
            ),
            SingleKind::Bridge => (
                asset.require_pool()?,
                IStargatePool::redeemCall {
                    amountLD: magic_value(0)?,
                    receiver: ctx.holder,
                }
                .abi_encode(),
            ),
        };
        // All three return the underlying amount paid out as the first word.
        op.add_patched_call(
            PatchedCall::new(target, encoded)
                .input(spend)
                .result(StoreOperation::retrieve_add(to, 0)),
        )?;

        ledger.credit(&AllocationKey::for_asset(underlying), amount * link.fraction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Pass, Strategy};
    use super::*;
    use crate::domain::allocation::FractionAllocationItem;
    use crate::domain::constants::FRACTION_SCALE;
    use crate::services::rebalance::router_op::StoreOpType;

    fn run(
        asset_id: &str,
        fraction: f64,
        pass: Pass,
        held: &[(&str, f64)],
    ) -> (RouterOperation, CurrentAllocation) {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        for (id, f) in held {
            hold(&g, &mut op, &mut ledger, id, *f);
        }
        let asset = g.get_asset_by_id(asset_id).unwrap();
        Strategy::for_asset(asset)
            .generate_step(
                &FractionAllocationItem::new(asset_id, fraction),
                pass,
                &ctx(&g, &book),
                &mut ledger,
                &mut op,
            )
            .unwrap();
        (op, ledger)
    }

    #[test]
    fn vault_price_applies_share_rate() {
        let g = graph();
        let book = prices();
        assert!((book.price("yvusdc", &g).unwrap() - 1.1).abs() < 1e-12);
        assert!((book.price("ausdc", &g).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lending_supply_is_approved_then_synced() {
        let (op, ledger) = run("ausdc", 0.25, Pass::Positive, &[("usdc", 0.5)]);
        assert_eq!(op.len(), 3);

        let approve = &op.steps()[0].store_operations[0];
        assert_eq!(approve.op_type, StoreOpType::AssignCall);
        assert_eq!(approve.fraction, FRACTION_SCALE / 2);
        let supply = &op.steps()[1];
        assert_eq!(supply.step_address, Address::repeat_byte(0x60));
        assert_eq!(supply.store_operations[0].op_type, StoreOpType::AssignCallSubtract);
        assert_eq!(
            op.steps()[2].store_operations[0].op_type,
            StoreOpType::RetrieveResultAssign
        );

        assert!((ledger.fraction(&AllocationKey::AssetId("ausdc".into())) - 0.25).abs() < 1e-12);
        assert!(
            (ledger.fraction(&AllocationKey::Address(Address::repeat_byte(1))) - 0.25).abs()
                < 1e-12
        );
        assert!(op.validate().is_ok());
    }

    #[test]
    fn vault_redeem_credits_underlying_from_return_data() {
        let (op, ledger) = run("yvusdc", -0.1, Pass::Negative, &[("yvusdc", 0.1)]);
        assert_eq!(op.len(), 1);
        let redeem = &op.steps()[0];
        assert_eq!(redeem.step_address, Address::repeat_byte(7));
        assert_eq!(redeem.store_operations[0].fraction, FRACTION_SCALE);
        assert_eq!(redeem.store_operations[1].op_type, StoreOpType::RetrieveResultAdd);
        assert!(
            (ledger.fraction(&AllocationKey::Address(Address::repeat_byte(1))) - 0.1).abs()
                < 1e-12
        );
        assert!(op.validate().is_ok());
    }

    #[test]
    fn bridge_without_pool_is_a_precondition_error() {
        let g = graph();
        let book = prices();
        let mut asset = g.get_asset_by_id("s*usdc").unwrap().clone();
        asset.call_params = None;
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        hold(&g, &mut op, &mut ledger, "usdc", 0.5);
        assert!(matches!(
            SingleKind::Bridge.enter(&asset, 0.1, &ctx(&g, &book), &mut ledger, &mut op),
            Err(AppError::StrategyPrecondition { .. })
        ));
    }

    #[test]
    fn overdrawn_withdrawal_is_rejected() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        hold(&g, &mut op, &mut ledger, "ausdc", 0.05);
        let ausdc = g.get_asset_by_id("ausdc").unwrap();
        assert!(matches!(
            SingleKind::Lending.exit(ausdc, 0.2, &ctx(&g, &book), &mut ledger, &mut op),
            Err(AppError::InsufficientLedgerBalance { .. })
        ));
    }
}
