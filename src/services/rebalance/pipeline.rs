// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::parsing::parse_raw_amount;
use crate::domain::allocation::{
    AbsoluteAllocationItem, AssetLayers, FractionAllocationItem,
};
use crate::domain::asset::AssetId;
use crate::domain::constants::{
    DEFAULT_MAX_LAYER_DEPTH, MASS_BALANCE_TOLERANCE, SWAP_TOLERANCE,
};
use crate::domain::error::AppError;
use crate::infrastructure::data::asset_graph::AssetGraph;
use crate::services::rebalance::layers::{
    LayerBuilder, RewardDiffMode, diff_asset_layers, restructure_layers_by_depth,
    token_layer_mass,
};
use crate::services::rebalance::ledger::{AllocationKey, CurrentAllocation};
use crate::services::rebalance::netting::{SwapInstruction, SwapPlan, net_swaps};
use crate::services::rebalance::pricing::{PriceBook, PriceFetcher, build_request_trees};
use crate::services::rebalance::router_op::{RouterOperation, StoreKey};
use crate::services::rebalance::routing::{
    RouteSimulator, SwapAggregator, SwapLegs, SwapRequest, select_route,
};
use crate::services::rebalance::strategy::{Pass, StepContext, Strategy, store_of};
use crate::services::rebalance::time_utils::deadline_after;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Everything the orchestrator needs, resolved once at start-up.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chain_id: u64,
    /// Owner of the portfolio and recipient of every call.
    pub holder: Address,
    pub swap_tolerance: f64,
    pub mass_balance_tolerance: f64,
    pub max_layer_depth: usize,
    pub reward_diff_mode: RewardDiffMode,
    pub simulation_timeout: Duration,
    pub slippage_bps: u32,
    pub deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            holder: Address::ZERO,
            swap_tolerance: SWAP_TOLERANCE,
            mass_balance_tolerance: MASS_BALANCE_TOLERANCE,
            max_layer_depth: DEFAULT_MAX_LAYER_DEPTH,
            reward_diff_mode: RewardDiffMode::default(),
            simulation_timeout: Duration::from_millis(5_000),
            slippage_bps: 50,
            deadline_secs: 1_200,
        }
    }
}

/// Current raw holdings plus the target split.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    /// Checked against the configured chain when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub current: Vec<AbsoluteAllocationItem>,
    pub target: Vec<FractionAllocationItem>,
}

/// Holdings expressed as fractions of their total USD value.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioValuation {
    pub allocation: Vec<FractionAllocationItem>,
    pub total_value: f64,
}

/// Values every raw amount (rewards included) and divides by the portfolio total.
pub fn to_fraction_allocation(
    items: &[AbsoluteAllocationItem],
    graph: &dyn AssetGraph,
    prices: &PriceBook,
) -> Result<PortfolioValuation, AppError> {
    let value_of = |item: &AbsoluteAllocationItem| -> Result<f64, AppError> {
        let asset = graph.get_asset_by_id(&item.asset_id)?;
        let raw = parse_raw_amount(&item.amount_str)?;
        Ok(asset.to_units(raw) * prices.price(&item.asset_id, graph)?)
    };

    let mut valued = Vec::with_capacity(items.len());
    let mut total = 0.0;
    for item in items {
        let value = value_of(item)?;
        let rewards = item
            .rewards
            .iter()
            .map(|r| Ok((r.asset_id.clone(), value_of(r)?)))
            .collect::<Result<Vec<_>, AppError>>()?;
        total += value + rewards.iter().map(|(_, v)| v).sum::<f64>();
        valued.push((item.asset_id.clone(), value, rewards));
    }
    if !total.is_finite() || total <= 0.0 {
        return Err(AppError::Validation {
            field: "current".to_string(),
            message: format!("portfolio total value is {total}"),
        });
    }

    let allocation = valued
        .into_iter()
        .map(|(asset_id, value, rewards)| {
            FractionAllocationItem::new(asset_id, value / total).with_rewards(
                rewards
                    .into_iter()
                    .map(|(id, v)| FractionAllocationItem::new(id, v / total))
                    .collect(),
            )
        })
        .collect();
    Ok(PortfolioValuation {
        allocation,
        total_value: total,
    })
}

/// Synchronous core: layering, diffing, netting and the two strategy passes.
pub struct StepPipeline<'a> {
    config: &'a PipelineConfig,
    ctx: StepContext<'a>,
}

impl<'a> StepPipeline<'a> {
    pub fn new(config: &'a PipelineConfig, ctx: StepContext<'a>) -> Self {
        Self { config, ctx }
    }

    pub fn context(&self) -> &StepContext<'a> {
        &self.ctx
    }

    /// Layered `target - current`, each asset relocated to its shallowest layer.
    /// The token layer must net to zero.
    pub fn layered_delta(
        &self,
        current: &[FractionAllocationItem],
        target: &[FractionAllocationItem],
    ) -> Result<AssetLayers, AppError> {
        let links = self.ctx.links();
        let builder = LayerBuilder::new(&links).with_max_depth(self.config.max_layer_depth);
        let current_layers = builder.construct_asset_layers(current)?;
        let target_layers = builder.construct_asset_layers(target)?;

        let delta = restructure_layers_by_depth(&diff_asset_layers(
            &target_layers,
            &current_layers,
            self.config.reward_diff_mode,
        ));
        let mass = token_layer_mass(&delta);
        if mass.abs() > self.config.mass_balance_tolerance {
            return Err(AppError::MassImbalance {
                phase: "layer diff".to_string(),
                residual: mass,
            });
        }
        tracing::info!(
            target: "pipeline",
            layers = delta.len(),
            current_layers = current_layers.len(),
            target_layers = target_layers.len(),
            token_mass = mass,
            "Computed layered delta"
        );
        Ok(delta)
    }

    /// Outermost layer first, down to layer 1: withdrawals and harvests.
    pub fn negative_pass(
        &self,
        delta: &AssetLayers,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let before = op.len();
        for index in (1..delta.len()).rev() {
            let Some(layer) = delta.layer(index) else {
                continue;
            };
            for item in layer.values() {
                if item.fraction < 0.0 || item.rewards_sum() < 0.0 {
                    self.generate(item, Pass::Negative, index, ledger, op)?;
                }
            }
        }
        tracing::info!(target: "pipeline", steps = op.len() - before, "Negative pass done");
        Ok(())
    }

    /// Layer 1 outwards: deposits, inner positions before their wrappers.
    pub fn positive_pass(
        &self,
        delta: &AssetLayers,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let before = op.len();
        for (index, layer) in delta.iter().enumerate().skip(1) {
            for item in layer.values().filter(|i| i.fraction > 0.0) {
                self.generate(item, Pass::Positive, index, ledger, op)?;
            }
        }
        tracing::info!(target: "pipeline", steps = op.len() - before, "Positive pass done");
        Ok(())
    }

    /// Nets the token layer and rejects anything left over beyond tolerance.
    pub fn net_token_layer(&self, delta: &AssetLayers) -> Result<SwapPlan, AppError> {
        let plan = match delta.token_layer() {
            Some(tokens) => net_swaps(tokens, self.config.swap_tolerance),
            None => SwapPlan::default(),
        };
        plan.ensure_settled(self.config.swap_tolerance)?;
        Ok(plan)
    }

    fn generate(
        &self,
        item: &FractionAllocationItem,
        pass: Pass,
        layer: usize,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        let asset = self.ctx.graph.get_asset_by_id(&item.asset_id)?;
        tracing::debug!(
            target: "pipeline",
            asset = %asset.id,
            layer,
            fraction = item.fraction,
            pass = ?pass,
            "Generating step"
        );
        Strategy::for_asset(asset).generate_step(item, pass, &self.ctx, ledger, op)
    }
}

/// Store and ledger state for the current holdings: one seeded store per held
/// asset with its raw amount, one ledger entry with its fraction.
pub fn seed_holdings(
    items: &[AbsoluteAllocationItem],
    valuation: &PortfolioValuation,
    graph: &dyn AssetGraph,
    tolerance: f64,
) -> Result<(RouterOperation, CurrentAllocation), AppError> {
    let mut raw: BTreeMap<&str, U256> = BTreeMap::new();
    for item in items {
        let amount = parse_raw_amount(&item.amount_str)?;
        let entry = raw.entry(item.asset_id.as_str()).or_insert(U256::ZERO);
        *entry = entry.saturating_add(amount);
    }

    let mut op = RouterOperation::new();
    let mut ledger = CurrentAllocation::with_tolerance(tolerance);
    for (asset_id, amount) in raw {
        let asset = graph.get_asset_by_id(asset_id)?;
        let key = AllocationKey::for_asset(asset);
        op.find_or_initialize_store_idx(StoreKey::from(&key), Some(amount))?;
    }
    for item in &valuation.allocation {
        let asset = graph.get_asset_by_id(&item.asset_id)?;
        ledger.credit(&AllocationKey::for_asset(asset), item.fraction);
    }
    Ok((op, ledger))
}

/// What a rebalance produced: the validated operation plus the swaps it routed.
#[derive(Debug, Clone)]
pub struct RebalanceOutcome {
    pub operation: RouterOperation,
    pub swaps: Vec<SwapInstruction>,
    pub total_value: f64,
}

/// Full request handler: prices, plans, routes and validates.
pub struct Rebalancer {
    graph: Arc<dyn AssetGraph>,
    fetcher: PriceFetcher,
    aggregator: Arc<dyn SwapAggregator>,
    simulator: Arc<dyn RouteSimulator>,
    config: PipelineConfig,
}

impl Rebalancer {
    pub fn new(
        graph: Arc<dyn AssetGraph>,
        fetcher: PriceFetcher,
        aggregator: Arc<dyn SwapAggregator>,
        simulator: Arc<dyn RouteSimulator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            graph,
            fetcher,
            aggregator,
            simulator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn rebalance(&self, request: &RebalanceRequest) -> Result<RebalanceOutcome, AppError> {
        let graph = self.graph.as_ref();
        self.check_target(&request.target)?;
        let asset_ids = self.involved_assets(request)?;

        tracing::info!(
            target: "pipeline",
            chain_id = self.config.chain_id,
            holdings = request.current.len(),
            targets = request.target.len(),
            assets = asset_ids.len(),
            "Rebalance started"
        );
        let trees = build_request_trees(graph, &asset_ids, self.config.max_layer_depth)?;
        let prices = self
            .fetcher
            .fetch(&trees, graph)
            .await?
            .with_max_depth(self.config.max_layer_depth);
        prices.ensure_complete()?;

        let valuation = to_fraction_allocation(&request.current, graph, &prices)?;
        let (mut op, mut ledger) =
            seed_holdings(&request.current, &valuation, graph, self.config.swap_tolerance)?;

        let pipeline = StepPipeline::new(
            &self.config,
            StepContext {
                graph,
                prices: &prices,
                holder: self.config.holder,
                deadline: deadline_after(self.config.deadline_secs),
            },
        );
        let delta = pipeline.layered_delta(&valuation.allocation, &request.target)?;

        pipeline.negative_pass(&delta, &mut ledger, &mut op)?;
        let plan = pipeline.net_token_layer(&delta)?;
        self.route_swaps(&plan, pipeline.context(), valuation.total_value, &mut ledger, &mut op)
            .await?;
        pipeline.positive_pass(&delta, &mut ledger, &mut op)?;

        op.validate()?;
        tracing::info!(
            target: "pipeline",
            steps = op.len(),
            stores = op.stores().len(),
            swaps = plan.swaps.len(),
            total_value_usd = valuation.total_value,
            "Rebalance planned"
        );
        Ok(RebalanceOutcome {
            operation: op,
            swaps: plan.swaps,
            total_value: valuation.total_value,
        })
    }

    async fn route_swaps(
        &self,
        plan: &SwapPlan,
        ctx: &StepContext<'_>,
        total_value: f64,
        ledger: &mut CurrentAllocation,
        op: &mut RouterOperation,
    ) -> Result<(), AppError> {
        for swap in &plan.swaps {
            let sell = ctx.graph.get_asset_by_id(&swap.from)?;
            let buy = ctx.graph.get_asset_by_id(&swap.to)?;
            let request = SwapRequest {
                sell: sell.clone(),
                buy: buy.clone(),
                notional_usd: swap.fraction * total_value,
                sell_price: ctx.prices.price(&sell.id, ctx.graph)?,
                buy_price: ctx.prices.price(&buy.id, ctx.graph)?,
            };
            let candidates = self.aggregator.calculate_path(&request).await?;
            let chosen = select_route(
                self.simulator.as_ref(),
                candidates,
                self.config.simulation_timeout,
                &sell.id,
                &buy.id,
            )
            .await?;
            let route = chosen.route.with_quote(chosen.output, self.config.slippage_bps);

            let sell_key = AllocationKey::for_asset(sell);
            let fraction = ledger.spend(&sell_key, swap.fraction)?;
            let legs = SwapLegs {
                from_store: store_of(op, sell)?,
                to_store: store_of(op, buy)?,
                fraction,
                recipient: ctx.holder,
                deadline: ctx.deadline,
            };
            route.exchange.build_swap_output(&route, &legs, op)?;
            ledger.credit(&AllocationKey::for_asset(buy), swap.fraction);
        }
        tracing::info!(target: "pipeline", swaps = plan.swaps.len(), "Swap phase done");
        Ok(())
    }

    /// Target fractions, rewards included, must describe the whole portfolio.
    fn check_target(&self, target: &[FractionAllocationItem]) -> Result<(), AppError> {
        let sum: f64 = target.iter().map(|i| i.fraction + i.rewards_sum()).sum();
        if (sum - 1.0).abs() > self.config.mass_balance_tolerance {
            return Err(AppError::Validation {
                field: "target".to_string(),
                message: format!("fractions sum to {sum}, expected 1"),
            });
        }
        Ok(())
    }

    fn involved_assets(&self, request: &RebalanceRequest) -> Result<Vec<AssetId>, AppError> {
        if let Some(chain_id) = request.chain_id.filter(|c| *c != self.config.chain_id) {
            return Err(AppError::Validation {
                field: "chainId".to_string(),
                message: format!("request targets chain {chain_id}, configured for {}", self.config.chain_id),
            });
        }
        let mut ids = BTreeSet::new();
        for item in &request.current {
            ids.insert(item.asset_id.clone());
            ids.extend(item.rewards.iter().map(|r| r.asset_id.clone()));
        }
        for item in &request.target {
            ids.insert(item.asset_id.clone());
            ids.extend(item.rewards.iter().map(|r| r.asset_id.clone()));
        }
        for id in &ids {
            let asset = self.graph.get_asset_by_id(id)?;
            if asset.chain_id != self.config.chain_id {
                return Err(AppError::Validation {
                    field: "chainId".to_string(),
                    message: format!(
                        "{id} lives on chain {}, rebalancing chain {}",
                        asset.chain_id, self.config.chain_id
                    ),
                });
            }
        }
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rebalance::strategy::test_support::{HOLDER, graph, prices};

    fn config() -> PipelineConfig {
        PipelineConfig {
            holder: HOLDER,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn valuation_includes_rewards_in_total() {
        let g = graph();
        let book = prices();
        let items = vec![
            AbsoluteAllocationItem::new("usdc", "750000000000000000000"),
            AbsoluteAllocationItem {
                rewards: vec![AbsoluteAllocationItem::new("stkaave", "2500000000000000000")],
                ..AbsoluteAllocationItem::new("ausdc", "0xd8d726b7177a80000")
            },
        ];
        // 750 usdc + 250 ausdc (0xd8d7.. = 250e18) + 2.5 stkaave at 100.
        let valuation = to_fraction_allocation(&items, &g, &book).unwrap();
        assert!((valuation.total_value - 1_250.0).abs() < 1e-9);
        assert!((valuation.allocation[0].fraction - 0.6).abs() < 1e-12);
        assert!((valuation.allocation[1].fraction - 0.2).abs() < 1e-12);
        assert!((valuation.allocation[1].rewards_sum() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn empty_portfolio_is_rejected() {
        let g = graph();
        let book = prices();
        let items = vec![AbsoluteAllocationItem::new("usdc", "0")];
        assert!(matches!(
            to_fraction_allocation(&items, &g, &book),
            Err(AppError::Validation { field, .. }) if field == "current"
        ));
    }

    #[test]
    fn seeding_merges_repeated_holdings() {
        let g = graph();
        let items = vec![
            AbsoluteAllocationItem::new("usdc", "100"),
            AbsoluteAllocationItem::new("usdc", "50"),
            AbsoluteAllocationItem::new("yvusdc", "10"),
        ];
        let valuation = PortfolioValuation {
            allocation: vec![
                FractionAllocationItem::new("usdc", 0.5),
                FractionAllocationItem::new("usdc", 0.25),
                FractionAllocationItem::new("yvusdc", 0.25),
            ],
            total_value: 1.0,
        };
        let (op, ledger) = seed_holdings(&items, &valuation, &g, SWAP_TOLERANCE).unwrap();
        assert_eq!(op.stores().len(), 2);
        assert!(op.stores().iter().any(|s| s.value == Some(U256::from(150u64))));
        assert!(
            (ledger.fraction(&AllocationKey::Address(Address::repeat_byte(1))) - 0.75).abs()
                < 1e-12
        );
    }

    #[test]
    fn vault_to_lending_migration_unwinds_then_deposits() {
        let g = graph();
        let book = prices();
        let cfg = config();
        let pipeline = StepPipeline::new(
            &cfg,
            StepContext {
                graph: &g,
                prices: &book,
                holder: HOLDER,
                deadline: U256::from(1_900_000_000u64),
            },
        );
        let current = vec![FractionAllocationItem::new("yvusdc", 1.0)];
        let target = vec![FractionAllocationItem::new("ausdc", 1.0)];
        let delta = pipeline.layered_delta(&current, &target).unwrap();
        assert_eq!(delta.len(), 2);
        assert!(delta.token_layer().unwrap().fraction("usdc").abs() < 1e-12);

        let mut op = RouterOperation::new();
        let mut ledger = CurrentAllocation::new();
        let vault = g.get_asset_by_id("yvusdc").unwrap();
        ledger.set(AllocationKey::for_asset(vault), 1.0);
        op.find_or_initialize_store_idx(
            StoreKey::AssetId("yvusdc".into()),
            Some(U256::from(1_000u64)),
        )
        .unwrap();

        pipeline.negative_pass(&delta, &mut ledger, &mut op).unwrap();
        assert_eq!(op.len(), 1);
        assert!(pipeline.net_token_layer(&delta).unwrap().swaps.is_empty());
        pipeline.positive_pass(&delta, &mut ledger, &mut op).unwrap();
        // redeem, approve, supply, balance sync
        assert_eq!(op.len(), 4);
        assert!(op.validate().is_ok());
        assert!((ledger.fraction(&AllocationKey::AssetId("ausdc".into())) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unbalanced_target_is_a_mass_imbalance() {
        let g = graph();
        let book = prices();
        let cfg = config();
        let pipeline = StepPipeline::new(
            &cfg,
            StepContext {
                graph: &g,
                prices: &book,
                holder: HOLDER,
                deadline: U256::ZERO,
            },
        );
        let err = pipeline
            .layered_delta(
                &[FractionAllocationItem::new("usdc", 1.0)],
                &[FractionAllocationItem::new("dai", 0.9)],
            )
            .unwrap_err();
        assert!(matches!(err, AppError::MassImbalance { phase, .. } if phase == "layer diff"));
    }

    #[test]
    fn configured_swap_tolerance_carries_into_deposits() {
        let g = graph();
        let book = prices();
        let cfg = PipelineConfig {
            swap_tolerance: 0.01,
            ..config()
        };
        let pipeline = StepPipeline::new(
            &cfg,
            StepContext {
                graph: &g,
                prices: &book,
                holder: HOLDER,
                deadline: U256::from(1_900_000_000u64),
            },
        );
        let current = vec![
            FractionAllocationItem::new("usdc", 0.995),
            FractionAllocationItem::new("weth", 0.005),
        ];
        let delta = pipeline
            .layered_delta(&current, &[FractionAllocationItem::new("ausdc", 1.0)])
            .unwrap();

        let items = vec![
            AbsoluteAllocationItem::new("usdc", "995000000000000000000"),
            AbsoluteAllocationItem::new("weth", "2487500000000000"),
        ];
        let valuation = PortfolioValuation {
            allocation: current,
            total_value: 1_000.0,
        };
        let (mut op, mut ledger) =
            seed_holdings(&items, &valuation, &g, cfg.swap_tolerance).unwrap();

        pipeline.negative_pass(&delta, &mut ledger, &mut op).unwrap();
        // The weth remainder is dust under the configured tolerance.
        assert!(pipeline.net_token_layer(&delta).unwrap().swaps.is_empty());
        pipeline.positive_pass(&delta, &mut ledger, &mut op).unwrap();
        assert!(op.validate().is_ok());
        assert!((ledger.fraction(&AllocationKey::AssetId("ausdc".into())) - 1.0).abs() < 1e-12);
    }
}
