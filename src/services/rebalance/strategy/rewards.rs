// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use super::{StepContext, store_of};
use crate::domain::allocation::FractionAllocationItem;
use crate::domain::asset::Asset;
use crate::domain::error::AppError;
use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
use crate::services::rebalance::protocols::IAaveRewardsController;
use crate::services::rebalance::router_op::{PatchedCall, RouterOperation, StoreOperation};
use alloy::primitives::U256;
use alloy::sol_types::SolCall;

/// Claims every reward of `position` whose delta is negative. Claims are
/// all-or-nothing on-chain, so the whole accrued amount lands in the reward
/// token's store and the ledger is credited with the claimed delta.
pub(super) fn harvest(
    position: &Asset,
    rewards: &[FractionAllocationItem],
    ctx: &StepContext<'_>,
    ledger: &mut CurrentAllocation,
    op: &mut RouterOperation,
) -> Result<(), AppError> {
    let controller = position
        .params()
        .rewards_controller
        .ok_or_else(|| AppError::precondition(&position.id, "missing callParams.rewardsController"))?;

    for reward in rewards.iter().filter(|r| r.fraction < 0.0) {
        let token = ctx.graph.get_asset_by_id(&reward.asset_id)?;
        let store = store_of(op, token)?;
        let claim = IAaveRewardsController::claimRewardsCall {
            assets: vec![position.address],
            amount: U256::MAX,
            to: ctx.holder,
            reward: token.address,
        }
        .abi_encode();
        op.add_patched_call(
            PatchedCall::new(controller, claim).result(StoreOperation::retrieve_add(store, 0)),
        )?;
        ledger.credit(&AllocationKey::for_asset(token), -reward.fraction);
        tracing::debug!(
            target: "strategy",
            position = %position.id,
            reward = %token.id,
            fraction = -reward.fraction,
            "Harvesting reward"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Pass, Strategy};
    use super::*;
    use crate::infrastructure::data::asset_graph::AssetGraph;

    #[test]
    fn harvest_only_item_claims_without_withdrawing() {
        let g = graph();
        let book = prices();
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        hold(&g, &mut op, &mut ledger, "ausdc", 0.3);

        let item = FractionAllocationItem::new("ausdc", 0.0)
            .with_rewards(vec![FractionAllocationItem::new("stkaave", -0.02)]);
        let ausdc = g.get_asset_by_id("ausdc").unwrap();
        Strategy::for_asset(ausdc)
            .generate_step(&item, Pass::Negative, &ctx(&g, &book), &mut ledger, &mut op)
            .unwrap();

        assert_eq!(op.len(), 1);
        let claim = &op.steps()[0];
        assert_eq!(claim.step_address, alloy::primitives::Address::repeat_byte(0xcc));
        let decoded = IAaveRewardsController::claimRewardsCall::abi_decode(&claim.step_encoded_call)
            .unwrap();
        assert_eq!(decoded.assets, vec![ausdc.address]);
        assert_eq!(decoded.to, HOLDER);

        let stkaave = g.get_asset_by_id("stkaave").unwrap();
        assert!((ledger.fraction(&AllocationKey::for_asset(stkaave)) - 0.02).abs() < 1e-12);
        assert!((ledger.fraction(&AllocationKey::for_asset(ausdc)) - 0.3).abs() < 1e-12);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn positions_without_controller_cannot_harvest() {
        let g = graph();
        let book = prices();
        let vault = g.get_asset_by_id("yvusdc").unwrap();
        let rewards = vec![FractionAllocationItem::new("stkaave", -0.01)];
        let mut ledger = CurrentAllocation::new();
        let mut op = RouterOperation::new();
        assert!(matches!(
            harvest(vault, &rewards, &ctx(&g, &book), &mut ledger, &mut op),
            Err(AppError::StrategyPrecondition { .. })
        ));
    }
}
