// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod exchange;
pub mod selection;

pub use exchange::{Exchange, Route, SwapLegs, apply_slippage};
pub use selection::{QuoteSimulator, RouteSimulator, SimulatedRoute, select_route};

use crate::domain::asset::Asset;
use crate::domain::error::AppError;
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;

/// One netted swap, valued in USD.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub sell: Asset,
    pub buy: Asset,
    pub notional_usd: f64,
    pub sell_price: f64,
    pub buy_price: f64,
}

impl SwapRequest {
    pub fn is_valid(&self) -> bool {
        [self.notional_usd, self.sell_price, self.buy_price]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Proposes candidate routes for a swap.
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    async fn calculate_path(&self, request: &SwapRequest) -> Result<Vec<Route>, AppError>;
}

/// Configured venues split by protocol, each list ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSet {
    pub v2: Vec<Address>,
    pub v3: Vec<Address>,
    pub v3_quoter: Option<Address>,
}

impl RouterSet {
    /// Classifies a `name -> address` map by name: `*quoter*` is the V3 quoter,
    /// `*v3*` a V3 swap router, anything else a V2 style router.
    pub fn from_named(routers: &HashMap<String, Address>) -> Self {
        let mut named: Vec<(&String, &Address)> = routers.iter().collect();
        named.sort();
        let mut set = RouterSet::default();
        for (name, address) in named {
            let name = name.to_ascii_lowercase();
            if name.contains("quoter") {
                set.v3_quoter.get_or_insert(*address);
            } else if name.contains("v3") {
                set.v3.push(*address);
            } else {
                set.v2.push(*address);
            }
        }
        set
    }
}

/// Direct and wrapped-native two-hop routes on every configured router, quoted
/// from oracle prices.
#[derive(Debug, Clone)]
pub struct DirectRouteAggregator {
    routers: RouterSet,
    fee_tiers: Vec<u32>,
    wrapped_native: Address,
    slippage_bps: u32,
}

impl DirectRouteAggregator {
    pub fn new(
        routers: RouterSet,
        fee_tiers: Vec<u32>,
        wrapped_native: Address,
        slippage_bps: u32,
    ) -> Self {
        Self {
            routers,
            fee_tiers,
            wrapped_native,
            slippage_bps,
        }
    }

    pub fn routes_for(&self, request: &SwapRequest) -> Vec<Route> {
        if !request.is_valid() {
            return Vec::new();
        }
        let amount_in = request.sell.to_raw(request.notional_usd / request.sell_price);
        let quoted = request.buy.to_raw(request.notional_usd / request.buy_price);
        if amount_in.is_zero() || quoted.is_zero() {
            return Vec::new();
        }

        let (sell, buy) = (request.sell.address, request.buy.address);
        let route = |exchange, path| Route::new(exchange, path, amount_in, quoted, self.slippage_bps);
        let mut routes = Vec::new();
        for router in &self.routers.v2 {
            let exchange = Exchange::UniswapV2 { router: *router };
            routes.push(route(exchange, vec![sell, buy]));
            if sell != self.wrapped_native && buy != self.wrapped_native {
                routes.push(route(exchange, vec![sell, self.wrapped_native, buy]));
            }
        }
        for router in &self.routers.v3 {
            for fee in &self.fee_tiers {
                let exchange = Exchange::UniswapV3 {
                    router: *router,
                    fee: *fee,
                };
                routes.push(route(exchange, vec![sell, buy]));
            }
        }
        routes
    }
}

#[async_trait]
impl SwapAggregator for DirectRouteAggregator {
    async fn calculate_path(&self, request: &SwapRequest) -> Result<Vec<Route>, AppError> {
        let routes = self.routes_for(request);
        tracing::debug!(
            target: "routing",
            sell = %request.sell.id,
            buy = %request.buy.id,
            notional_usd = request.notional_usd,
            candidates = routes.len(),
            "Proposed routes"
        );
        Ok(routes)
    }
}
