// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::services::rebalance::protocols::{UniV2Router, UniV3Router};
use crate::services::rebalance::router_op::{
    CallInput, PatchedCall, RouterOperation, StoreOperation, magic_value,
};
use crate::services::rebalance::strategy::approve;
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, U160, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;

const BPS_DENOM: u64 = 10_000;

/// Venue a route executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Exchange {
    UniswapV2 { router: Address },
    UniswapV3 { router: Address, fee: u32 },
}

/// A concrete way to turn `path[0]` into `path[last]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub exchange: Exchange,
    pub path: Vec<Address>,
    /// Raw input the quote was made for; the executed input comes from a store.
    pub amount_in: U256,
    pub quoted_output: U256,
    /// Fixed at build time from the quote and the slippage budget.
    pub min_output: U256,
}

impl Route {
    pub fn new(
        exchange: Exchange,
        path: Vec<Address>,
        amount_in: U256,
        quoted_output: U256,
        slippage_bps: u32,
    ) -> Self {
        Self {
            exchange,
            path,
            amount_in,
            quoted_output,
            min_output: apply_slippage(quoted_output, slippage_bps),
        }
    }

    /// Same route re-anchored on a simulated output.
    pub fn with_quote(mut self, output: U256, slippage_bps: u32) -> Self {
        self.quoted_output = output;
        self.min_output = apply_slippage(output, slippage_bps);
        self
    }

    pub fn token_in(&self) -> Option<Address> {
        self.path.first().copied()
    }

    pub fn token_out(&self) -> Option<Address> {
        self.path.last().copied()
    }
}

/// `quoted * (10000 - bps) / 10000`, rounding down.
pub fn apply_slippage(quoted: U256, slippage_bps: u32) -> U256 {
    let keep = U256::from(BPS_DENOM - u64::from(slippage_bps).min(BPS_DENOM));
    let denom = U256::from(BPS_DENOM);
    match quoted.checked_mul(keep) {
        Some(scaled) => scaled / denom,
        None => quoted / denom * keep,
    }
}

/// Store wiring for one swap.
#[derive(Debug, Clone, Copy)]
pub struct SwapLegs {
    pub from_store: usize,
    pub to_store: usize,
    /// Share of `from_store`'s live balance to sell.
    pub fraction: u64,
    pub recipient: Address,
    pub deadline: U256,
}

impl Exchange {
    pub fn router(&self) -> Address {
        match self {
            Exchange::UniswapV2 { router } | Exchange::UniswapV3 { router, .. } => *router,
        }
    }

    /// Appends `approve` plus the swap; the received amount is added to
    /// `legs.to_store`. Returns the swap step's index.
    pub fn build_swap_output(
        &self,
        route: &Route,
        legs: &SwapLegs,
        op: &mut RouterOperation,
    ) -> Result<usize, AppError> {
        let (Some(token_in), Some(token_out)) = (route.token_in(), route.token_out()) else {
            return Err(invalid_path(route));
        };
        if route.path.len() < 2 {
            return Err(invalid_path(route));
        }

        let (encoded, output_offset) = match self {
            Exchange::UniswapV2 { .. } => {
                let call = UniV2Router::swapExactTokensForTokensCall {
                    amountIn: magic_value(0)?,
                    amountOutMin: route.min_output,
                    path: route.path.clone(),
                    to: legs.recipient,
                    deadline: legs.deadline,
                };
                // uint256[] return: offset word, length word, then one amount per hop.
                (call.abi_encode(), 64 + 32 * (route.path.len() - 1))
            }
            Exchange::UniswapV3 { fee, .. } => {
                if route.path.len() != 2 {
                    return Err(invalid_path(route));
                }
                let call = UniV3Router::exactInputSingleCall {
                    params: UniV3Router::ExactInputSingleParams {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        fee: U24::from(*fee),
                        recipient: legs.recipient,
                        deadline: legs.deadline,
                        amountIn: magic_value(0)?,
                        amountOutMinimum: route.min_output,
                        sqrtPriceLimitX96: U160::ZERO,
                    },
                };
                (call.abi_encode(), 0)
            }
        };

        approve(op, token_in, self.router(), legs.from_store, legs.fraction)?;
        let step = op.add_patched_call(
            PatchedCall::new(self.router(), encoded)
                .input(CallInput::Spend {
                    store: legs.from_store,
                    fraction: legs.fraction,
                })
                .result(StoreOperation::retrieve_add(legs.to_store, output_offset)),
        )?;
        tracing::debug!(
            target: "routing",
            exchange = ?self,
            token_in = %token_in,
            token_out = %token_out,
            hops = route.path.len() - 1,
            min_output = %route.min_output,
            "Built swap step"
        );
        Ok(step)
    }
}

fn invalid_path(route: &Route) -> AppError {
    AppError::Validation {
        field: "route.path".to_string(),
        message: format!(
            "{:?} cannot execute a {}-token path",
            route.exchange,
            route.path.len()
        ),
    }
}
