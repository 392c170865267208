// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::services::rebalance::routing::exchange::Route;
use alloy::primitives::U256;
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;

/// Estimates what a route would actually deliver.
#[async_trait]
pub trait RouteSimulator: Send + Sync {
    /// Raw output of `route`, or `None` when it would not execute.
    async fn simulate(&self, route: &Route) -> Result<Option<U256>, AppError>;
}

/// Trusts the quote the route was built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteSimulator;

#[async_trait]
impl RouteSimulator for QuoteSimulator {
    async fn simulate(&self, route: &Route) -> Result<Option<U256>, AppError> {
        Ok((!route.quoted_output.is_zero()).then_some(route.quoted_output))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedRoute {
    pub route: Route,
    pub output: U256,
}

/// Simulates every candidate concurrently, each under `timeout`, and keeps the
/// highest output. Ties go to the earlier candidate.
pub async fn select_route(
    simulator: &dyn RouteSimulator,
    routes: Vec<Route>,
    timeout: Duration,
    from: &str,
    to: &str,
) -> Result<SimulatedRoute, AppError> {
    if routes.is_empty() {
        return Err(AppError::NoRoute {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let results = join_all(
        routes
            .iter()
            .map(|route| tokio::time::timeout(timeout, simulator.simulate(route))),
    )
    .await;

    let mut best: Option<(usize, U256)> = None;
    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(Some(output))) if !output.is_zero() => {
                if best.is_none_or(|(_, top)| output > top) {
                    best = Some((idx, output));
                }
            }
            Ok(Ok(_)) => {
                tracing::debug!(target: "routing", candidate = idx, from, to, "Route simulated to nothing");
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "routing", candidate = idx, from, to, error = %e, "Route simulation failed");
            }
            Err(_) => {
                tracing::warn!(
                    target: "routing",
                    candidate = idx,
                    from,
                    to,
                    timeout_ms = timeout.as_millis() as u64,
                    "Route simulation timed out"
                );
            }
        }
    }

    let (idx, output) = best.ok_or_else(|| AppError::AllSimulationsFailed {
        from: from.to_string(),
        to: to.to_string(),
        candidates: routes.len(),
    })?;
    tracing::info!(
        target: "routing",
        from,
        to,
        candidates = routes.len(),
        chosen = idx,
        output = %output,
        "Selected route"
    );
    let mut routes = routes;
    Ok(SimulatedRoute {
        route: routes.swap_remove(idx),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rebalance::routing::exchange::Exchange;
    use alloy::primitives::Address;

    fn route(router: u8, quoted: u64) -> Route {
        Route::new(
            Exchange::UniswapV2 {
                router: Address::repeat_byte(router),
            },
            vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            U256::from(1_000u64),
            U256::from(quoted),
            0,
        )
    }

    /// Router byte picks the behaviour: 0xee errors, 0xdd hangs, otherwise the quote.
    struct Scripted;

    #[async_trait]
    impl RouteSimulator for Scripted {
        async fn simulate(&self, route: &Route) -> Result<Option<U256>, AppError> {
            match route.exchange.router().0[0] {
                0xee => Err(AppError::Connection("fork unavailable".into())),
                0xdd => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Some(U256::MAX))
                }
                _ => QuoteSimulator.simulate(route).await,
            }
        }
    }

    #[tokio::test]
    async fn highest_output_wins_and_ties_keep_order() {
        let chosen = select_route(
            &Scripted,
            vec![route(1, 90), route(2, 120), route(3, 120), route(4, 0)],
            Duration::from_millis(200),
            "usdc",
            "dai",
        )
        .await
        .unwrap();
        assert_eq!(chosen.output, U256::from(120u64));
        assert_eq!(chosen.route.exchange.router(), Address::repeat_byte(2));
    }

    #[tokio::test]
    async fn failed_and_slow_candidates_are_excluded() {
        let chosen = select_route(
            &Scripted,
            vec![route(0xee, 500), route(0xdd, 500), route(5, 10)],
            Duration::from_millis(50),
            "usdc",
            "dai",
        )
        .await
        .unwrap();
        assert_eq!(chosen.route.exchange.router(), Address::repeat_byte(5));
    }

    #[tokio::test]
    async fn all_failures_are_fatal() {
        let err = select_route(
            &Scripted,
            vec![route(0xee, 1), route(7, 0)],
            Duration::from_millis(50),
            "usdc",
            "dai",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::AllSimulationsFailed { candidates: 2, .. }));

        assert!(matches!(
            select_route(&Scripted, Vec::new(), Duration::from_millis(50), "usdc", "dai").await,
            Err(AppError::NoRoute { .. })
        ));
    }
}
