// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::Parser;
use oxidity_rebalancer::app::config::{GlobalSettings, SimulationBackend};
use oxidity_rebalancer::app::logging::setup_logging;
use oxidity_rebalancer::common::rate_limit::per_second;
use oxidity_rebalancer::domain::constants::{UNISWAP_V3_FEE_TIERS, wrapped_native_for_chain};
use oxidity_rebalancer::domain::error::AppError;
use oxidity_rebalancer::infrastructure::data::asset_graph::InMemoryAssetGraph;
use oxidity_rebalancer::infrastructure::data::snapshot::StaticMarketData;
use oxidity_rebalancer::infrastructure::network::chain_reader::{
    LiveMarketData, OnchainQuoteSimulator,
};
use oxidity_rebalancer::infrastructure::network::price_feed::PriceFeed;
use oxidity_rebalancer::infrastructure::network::provider::ConnectionFactory;
use oxidity_rebalancer::services::rebalance::pricing::{MarketData, PriceFetcher};
use oxidity_rebalancer::services::rebalance::routing::{
    DirectRouteAggregator, QuoteSimulator, RouteSimulator, RouterSet,
};
use oxidity_rebalancer::services::rebalance::{RebalanceRequest, Rebalancer};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "oxidity rebalancer")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Rebalance request JSON: `{ "current": [...], "target": [...] }`
    #[arg(long)]
    request: String,

    /// Price from a frozen market snapshot instead of the network
    #[arg(long)]
    snapshot: Option<String>,

    /// Chain to rebalance on (default: first configured chain)
    #[arg(long)]
    chain: Option<u64>,

    /// Write the program here instead of stdout
    #[arg(long)]
    out: Option<String>,

    /// Include ABI-encoded `execute` calldata in the output
    #[arg(long, default_value_t = false)]
    encode: bool,
}

fn read_request(path: &str) -> Result<RebalanceRequest, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read request {path}: {e}")))?;
    serde_json::from_str(&raw).map_err(|e| AppError::Validation {
        field: "request".to_string(),
        message: format!("{path}: {e}"),
    })
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(&settings.log_level, settings.log_json);

    let chain_id = cli
        .chain
        .or_else(|| settings.chains.first().copied())
        .ok_or_else(|| AppError::Config("No chain selected; pass --chain or set CHAINS".into()))?;
    let pipeline_config = settings.pipeline_config(chain_id)?;

    let graph = Arc::new(InMemoryAssetGraph::load_from_file(
        &settings.asset_graph_path()?,
    )?);
    let request = read_request(&cli.request)?;

    // Only the live paths need an RPC endpoint.
    let backend = settings.simulation_backend_value()?;
    let provider = if cli.snapshot.is_none() || backend == SimulationBackend::Onchain {
        Some(ConnectionFactory::http(&settings.get_http_provider(chain_id)?)?)
    } else {
        None
    };

    let market: Arc<dyn MarketData> = match (&cli.snapshot, &provider) {
        (Some(path), _) => {
            let resolved = settings.data_dir().require(path, "market snapshot")?;
            Arc::new(StaticMarketData::load_from_file(&resolved)?)
        }
        (None, Some(provider)) => Arc::new(LiveMarketData::new(
            provider.clone(),
            PriceFeed::new(&settings.price_api_url, settings.coingecko_api_key.clone())?,
        )),
        (None, None) => return Err(AppError::Config("No market data source".into())),
    };
    let fetcher = PriceFetcher::new(
        market,
        per_second(settings.price_requests_per_second),
        settings.price_fetch_attempts,
        settings.price_fetch_backoff(),
        settings.price_fetch_timeout(),
    );

    let routers = RouterSet::from_named(&settings.routers_for_chain(chain_id)?);
    tracing::info!(
        target: "config",
        chain_id,
        v2_routers = routers.v2.len(),
        v3_routers = routers.v3.len(),
        quoter = routers.v3_quoter.is_some(),
        backend = ?backend,
        "Routing venues selected"
    );
    let simulator: Arc<dyn RouteSimulator> = match (backend, provider) {
        (SimulationBackend::Onchain, Some(provider)) => Arc::new(OnchainQuoteSimulator::new(
            provider,
            routers.v3_quoter,
            settings.price_fetch_attempts,
            settings.price_fetch_backoff(),
        )),
        _ => Arc::new(QuoteSimulator),
    };
    let aggregator = Arc::new(DirectRouteAggregator::new(
        routers,
        UNISWAP_V3_FEE_TIERS.to_vec(),
        wrapped_native_for_chain(chain_id),
        pipeline_config.slippage_bps,
    ));

    let rebalancer = Rebalancer::new(graph, fetcher, aggregator, simulator, pipeline_config);
    let outcome = rebalancer.rebalance(&request).await?;
    let program = outcome.operation.into_program()?;

    let calldata = if cli.encode {
        Some(program.encode_execute_call()?)
    } else {
        None
    };
    let router = settings.router_address_for_chain(chain_id).ok();
    let body = serde_json::json!({
        "chainId": chain_id,
        "router": router,
        "totalValueUsd": outcome.total_value,
        "swaps": outcome.swaps,
        "program": program,
        "calldata": calldata,
    });
    let rendered = serde_json::to_string_pretty(&body)
        .map_err(|e| AppError::Unknown(anyhow::anyhow!("serialize program: {e}")))?;

    match cli.out {
        Some(path) => {
            std::fs::write(&path, rendered)
                .map_err(|e| AppError::Config(format!("Failed to write {path}: {e}")))?;
            tracing::info!(target: "pipeline", path = %path, steps = program.len(), "Program written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
