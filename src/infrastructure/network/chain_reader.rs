// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::parsing::raw_to_units;
use crate::common::retry::retry_async_when;
use crate::domain::asset::{Asset, AssetType};
use crate::network::price_feed::PriceFeed;
use crate::network::provider::HttpProvider;
use crate::services::rebalance::pricing::{MarketData, PoolState};
use crate::services::rebalance::protocols::{
    ICurvePool2, IERC20, IERC4626, UniV2Router, UniV3Quoter, UniswapV2Pair,
};
use crate::services::rebalance::routing::{Exchange, Route, RouteSimulator};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, U160, U256};
use async_trait::async_trait;
use std::time::Duration;

fn rpc_error(what: &str, target: Address, e: alloy::contract::Error) -> AppError {
    AppError::Connection(format!("{what} on {target:#x} failed: {e}"))
}

/// Token prices from the HTTP feed, everything else read from chain.
#[derive(Clone)]
pub struct LiveMarketData {
    provider: HttpProvider,
    feed: PriceFeed,
}

impl LiveMarketData {
    pub fn new(provider: HttpProvider, feed: PriceFeed) -> Self {
        Self { provider, feed }
    }

    async fn v2_pool_state(&self, pool: &Asset, underlying: &[Asset]) -> Result<PoolState, AppError> {
        let [first, second] = underlying else {
            return Err(AppError::precondition(&pool.id, "AMM pair needs exactly two linked assets"));
        };
        let pair = UniswapV2Pair::new(pool.address, self.provider.clone());
        let token0 = pair
            .token0()
            .call()
            .await
            .map_err(|e| rpc_error("token0", pool.address, e))?;
        let reserves = pair
            .getReserves()
            .call()
            .await
            .map_err(|e| rpc_error("getReserves", pool.address, e))?;
        let supply = pair
            .totalSupply()
            .call()
            .await
            .map_err(|e| rpc_error("totalSupply", pool.address, e))?;

        let (r0, r1) = (
            U256::from(reserves.reserve0.to::<u128>()),
            U256::from(reserves.reserve1.to::<u128>()),
        );
        let (first_raw, second_raw) = order_reserves(token0, first.address, r0, r1);
        Ok(PoolState {
            balances: vec![
                raw_to_units(first_raw, first.decimals),
                raw_to_units(second_raw, second.decimals),
            ],
            total_supply: raw_to_units(supply, pool.decimals),
        })
    }

    async fn curve_pool_state(
        &self,
        pool: &Asset,
        underlying: &[Asset],
    ) -> Result<PoolState, AppError> {
        let swap = pool.params().pool.unwrap_or(pool.address);
        let contract = ICurvePool2::new(swap, self.provider.clone());
        let mut balances = Vec::with_capacity(underlying.len());
        for (i, coin) in underlying.iter().enumerate() {
            let raw = contract
                .balances(U256::from(i))
                .call()
                .await
                .map_err(|e| rpc_error("balances", swap, e))?;
            balances.push(raw_to_units(raw, coin.decimals));
        }
        let supply = IERC20::new(pool.address, self.provider.clone())
            .totalSupply()
            .call()
            .await
            .map_err(|e| rpc_error("totalSupply", pool.address, e))?;
        Ok(PoolState {
            balances,
            total_supply: raw_to_units(supply, pool.decimals),
        })
    }
}

/// Pair reserves reordered to follow the pool's declared link order.
fn order_reserves(token0: Address, first: Address, r0: U256, r1: U256) -> (U256, U256) {
    if token0 == first { (r0, r1) } else { (r1, r0) }
}

#[async_trait]
impl MarketData for LiveMarketData {
    async fn token_usd_price(&self, asset: &Asset) -> Result<f64, AppError> {
        let quote = self.feed.get_price(asset.chain_id, asset.address).await?;
        tracing::debug!(target: "pricing", asset = %asset.id, price = quote.price, source = %quote.source, "Token price");
        Ok(quote.price)
    }

    async fn pool_state(&self, pool: &Asset, underlying: &[Asset]) -> Result<PoolState, AppError> {
        match pool.asset_type {
            AssetType::AmmLiquidity => self.v2_pool_state(pool, underlying).await,
            AssetType::StableSwapDeposit => self.curve_pool_state(pool, underlying).await,
            other => Err(AppError::precondition(
                &pool.id,
                format!("{other:?} has no pool state"),
            )),
        }
    }

    async fn share_rate(&self, vault: &Asset, underlying: &Asset) -> Result<f64, AppError> {
        let one_share = U256::from(10u64).pow(U256::from(vault.decimals));
        let assets = IERC4626::new(vault.address, self.provider.clone())
            .convertToAssets(one_share)
            .call()
            .await
            .map_err(|e| rpc_error("convertToAssets", vault.address, e))?;
        Ok(raw_to_units(assets, underlying.decimals))
    }
}

/// Asks the venues themselves what a route returns. Reverts mean the route
/// would not execute; transport errors are retried.
#[derive(Clone)]
pub struct OnchainQuoteSimulator {
    provider: HttpProvider,
    v3_quoter: Option<Address>,
    attempts: usize,
    backoff: Duration,
}

impl OnchainQuoteSimulator {
    pub fn new(
        provider: HttpProvider,
        v3_quoter: Option<Address>,
        attempts: usize,
        backoff: Duration,
    ) -> Self {
        Self {
            provider,
            v3_quoter,
            attempts: attempts.max(1),
            backoff,
        }
    }

    async fn quote_once(&self, route: &Route) -> Result<Option<U256>, AppError> {
        let result = match route.exchange {
            Exchange::UniswapV2 { router } => UniV2Router::new(router, self.provider.clone())
                .getAmountsOut(route.amount_in, route.path.clone())
                .call()
                .await
                .map(|amounts| amounts.last().copied()),
            Exchange::UniswapV3 { fee, .. } => {
                let (Some(quoter), [token_in, token_out]) = (self.v3_quoter, route.path.as_slice())
                else {
                    return Ok(None);
                };
                UniV3Quoter::new(quoter, self.provider.clone())
                    .quoteExactInputSingle(
                        *token_in,
                        *token_out,
                        U24::from(fee),
                        route.amount_in,
                        U160::ZERO,
                    )
                    .call()
                    .await
                    .map(Some)
            }
        };
        match result {
            Ok(output) => Ok(output.filter(|o| !o.is_zero())),
            Err(e) if e.as_revert_data().is_some() => {
                tracing::debug!(target: "routing", exchange = ?route.exchange, error = %e, "Quote reverted");
                Ok(None)
            }
            Err(e) => Err(rpc_error("quote", route.exchange.router(), e)),
        }
    }
}

#[async_trait]
impl RouteSimulator for OnchainQuoteSimulator {
    async fn simulate(&self, route: &Route) -> Result<Option<U256>, AppError> {
        retry_async_when(
            |_| self.quote_once(route),
            self.attempts,
            self.backoff,
            AppError::is_retryable,
        )
        .await
    }
}
