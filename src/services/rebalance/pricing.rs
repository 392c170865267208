// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::rate_limit::{SharedLimiter, acquire};
use crate::common::retry::retry_async_when;
use crate::domain::asset::{Asset, AssetId};
use crate::domain::constants::DEFAULT_MAX_LAYER_DEPTH;
use crate::domain::error::AppError;
use crate::infrastructure::data::asset_graph::AssetGraph;
use crate::services::rebalance::strategy::Strategy;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Pool reserves in whole units, aligned with the pool's linked assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    pub balances: Vec<f64>,
    pub total_supply: f64,
}

/// Raw market observations the strategies price from.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// USD price of one whole unit of a token-layer asset.
    async fn token_usd_price(&self, asset: &Asset) -> Result<f64, AppError>;

    /// Reserves of `pool`; `underlying` is its linked assets in declaration order.
    async fn pool_state(&self, pool: &Asset, underlying: &[Asset]) -> Result<PoolState, AppError>;

    /// Whole units of `underlying` redeemable for one whole share of `vault`.
    async fn share_rate(&self, vault: &Asset, underlying: &Asset) -> Result<f64, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceRequest {
    TokenPrice,
    PoolState,
    ShareRate,
}

/// What has to be fetched to price an asset, nested along its decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTree {
    pub asset_id: AssetId,
    pub requests: Vec<PriceRequest>,
    pub children: Vec<RequestTree>,
}

impl RequestTree {
    pub fn node(
        asset_id: impl Into<AssetId>,
        requests: Vec<PriceRequest>,
        children: Vec<RequestTree>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            requests,
            children,
        }
    }

    /// Every distinct (asset, request) pair in the tree, parents before children.
    pub fn flatten(&self) -> Vec<(AssetId, PriceRequest)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect(&mut seen, &mut out);
        out
    }

    fn collect(
        &self,
        seen: &mut HashSet<(AssetId, PriceRequest)>,
        out: &mut Vec<(AssetId, PriceRequest)>,
    ) {
        for request in &self.requests {
            let key = (self.asset_id.clone(), *request);
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        for child in &self.children {
            child.collect(seen, out);
        }
    }
}

/// Fetched observations plus the assets whose fetch failed.
#[derive(Debug, Clone)]
pub struct PriceBook {
    token_prices: HashMap<AssetId, f64>,
    pool_states: HashMap<AssetId, PoolState>,
    share_rates: HashMap<AssetId, f64>,
    failed: Vec<AssetId>,
    max_depth: usize,
}

impl Default for PriceBook {
    fn default() -> Self {
        Self {
            token_prices: HashMap::new(),
            pool_states: HashMap::new(),
            share_rates: HashMap::new(),
            failed: Vec::new(),
            max_depth: DEFAULT_MAX_LAYER_DEPTH,
        }
    }
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deepest decomposition priced before a cycle is assumed.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn insert_token_price(&mut self, asset_id: impl Into<AssetId>, price: f64) {
        self.token_prices.insert(asset_id.into(), price);
    }

    pub fn insert_pool_state(&mut self, asset_id: impl Into<AssetId>, state: PoolState) {
        self.pool_states.insert(asset_id.into(), state);
    }

    pub fn insert_share_rate(&mut self, asset_id: impl Into<AssetId>, rate: f64) {
        self.share_rates.insert(asset_id.into(), rate);
    }

    pub fn mark_failed(&mut self, asset_id: impl Into<AssetId>) {
        let id = asset_id.into();
        if !self.failed.contains(&id) {
            self.failed.push(id);
        }
    }

    pub fn failed(&self) -> &[AssetId] {
        &self.failed
    }

    /// Any failed fetch makes the book unusable for step generation.
    pub fn ensure_complete(&self) -> Result<(), AppError> {
        if self.failed.is_empty() {
            return Ok(());
        }
        Err(AppError::PricesUnavailable {
            failed: self.failed.clone(),
        })
    }

    fn missing(asset_id: &str, what: &str) -> AppError {
        AppError::PriceFetch {
            asset_id: asset_id.to_string(),
            reason: format!("{what} not fetched"),
        }
    }

    pub fn token_price(&self, asset_id: &str) -> Result<f64, AppError> {
        self.token_prices
            .get(asset_id)
            .copied()
            .ok_or_else(|| Self::missing(asset_id, "token price"))
    }

    pub fn pool_state(&self, asset_id: &str) -> Result<&PoolState, AppError> {
        self.pool_states
            .get(asset_id)
            .ok_or_else(|| Self::missing(asset_id, "pool state"))
    }

    pub fn share_rate(&self, asset_id: &str) -> Result<f64, AppError> {
        self.share_rates
            .get(asset_id)
            .copied()
            .ok_or_else(|| Self::missing(asset_id, "share rate"))
    }

    /// USD value of one whole unit of `asset_id`.
    pub fn price(&self, asset_id: &str, graph: &dyn AssetGraph) -> Result<f64, AppError> {
        self.price_at(asset_id, graph, 0)
    }

    pub(crate) fn price_at(
        &self,
        asset_id: &str,
        graph: &dyn AssetGraph,
        depth: usize,
    ) -> Result<f64, AppError> {
        if depth > self.max_depth {
            return Err(AppError::CyclicDecomposition {
                asset_id: asset_id.to_string(),
                depth: self.max_depth,
            });
        }
        let asset = graph.get_asset_by_id(asset_id)?;
        Strategy::for_asset(asset).get_price(asset, graph, self, depth)
    }
}

/// Request trees for every asset in `asset_ids`.
pub fn build_request_trees(
    graph: &dyn AssetGraph,
    asset_ids: &[AssetId],
    max_depth: usize,
) -> Result<Vec<RequestTree>, AppError> {
    asset_ids
        .iter()
        .map(|id| {
            let asset = graph.get_asset_by_id(id)?;
            Strategy::for_asset(asset).fetch_price_data(asset, graph, 0, max_depth)
        })
        .collect()
}

enum Fetched {
    Price(f64),
    Pool(PoolState),
    Rate(f64),
}

/// Runs every request of a set of trees concurrently, each throttled, retried
/// and bounded by a deadline. Failures are recorded per asset instead of aborting
/// sibling requests.
pub struct PriceFetcher {
    market: Arc<dyn MarketData>,
    limiter: SharedLimiter,
    attempts: usize,
    backoff: Duration,
    timeout: Duration,
}

impl PriceFetcher {
    pub fn new(
        market: Arc<dyn MarketData>,
        limiter: SharedLimiter,
        attempts: usize,
        backoff: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            market,
            limiter,
            attempts: attempts.max(1),
            backoff,
            timeout,
        }
    }

    pub async fn fetch(
        &self,
        trees: &[RequestTree],
        graph: &dyn AssetGraph,
    ) -> Result<PriceBook, AppError> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for tree in trees {
            for (asset_id, request) in tree.flatten() {
                if !seen.insert((asset_id.clone(), request)) {
                    continue;
                }
                let asset = graph.get_asset_by_id(&asset_id)?.clone();
                let underlying = asset
                    .linked_assets
                    .iter()
                    .map(|l| graph.get_asset_by_id(&l.asset_id).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                jobs.push((asset, underlying, request));
            }
        }

        tracing::info!(target: "pricing", requests = jobs.len(), "Fetching market data");
        let results = join_all(
            jobs.iter()
                .map(|(asset, underlying, request)| self.fetch_one(asset, underlying, *request)),
        )
        .await;

        let mut book = PriceBook::new();
        for ((asset, _, request), result) in jobs.iter().zip(results) {
            match result {
                Ok(Fetched::Price(p)) => book.insert_token_price(asset.id.clone(), p),
                Ok(Fetched::Pool(state)) => book.insert_pool_state(asset.id.clone(), state),
                Ok(Fetched::Rate(r)) => book.insert_share_rate(asset.id.clone(), r),
                Err(e) => {
                    tracing::warn!(
                        target: "pricing",
                        asset = %asset.id,
                        request = ?request,
                        error = %e,
                        "Market data request failed"
                    );
                    book.mark_failed(asset.id.clone());
                }
            }
        }
        Ok(book)
    }

    async fn fetch_one(
        &self,
        asset: &Asset,
        underlying: &[Asset],
        request: PriceRequest,
    ) -> Result<Fetched, AppError> {
        let millis = self.timeout.as_millis() as u64;
        retry_async_when(
            |_| async move {
                acquire(&self.limiter).await;
                let call = async {
                    match request {
                        PriceRequest::TokenPrice => {
                            self.market.token_usd_price(asset).await.map(Fetched::Price)
                        }
                        PriceRequest::PoolState => self
                            .market
                            .pool_state(asset, underlying)
                            .await
                            .map(Fetched::Pool),
                        PriceRequest::ShareRate => {
                            let inner = underlying.first().ok_or_else(|| {
                                AppError::precondition(&asset.id, "vault has no underlying asset")
                            })?;
                            self.market.share_rate(asset, inner).await.map(Fetched::Rate)
                        }
                    }
                };
                let fetched = tokio::time::timeout(self.timeout, call)
                    .await
                    .map_err(|_| AppError::Timeout {
                        operation: format!("{request:?} for {}", asset.id),
                        millis,
                    })??;
                sanity_check(asset, fetched)
            },
            self.attempts,
            self.backoff,
            AppError::is_retryable,
        )
        .await
    }
}

fn sanity_check(asset: &Asset, fetched: Fetched) -> Result<Fetched, AppError> {
    let problem = match &fetched {
        Fetched::Price(p) | Fetched::Rate(p) if !p.is_finite() || *p <= 0.0 => {
            Some("non-positive or non-finite value")
        }
        Fetched::Pool(state) if state.balances.len() != asset.linked_assets.len() => {
            Some("pool balances do not match linked assets")
        }
        Fetched::Pool(state) if !state.total_supply.is_finite() || state.total_supply <= 0.0 => {
            Some("pool has no supply")
        }
        _ => None,
    };
    match problem {
        Some(reason) => Err(AppError::PriceFetch {
            asset_id: asset.id.clone(),
            reason: reason.to_string(),
        }),
        None => Ok(fetched),
    }
}
