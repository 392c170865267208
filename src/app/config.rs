// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::data_path::DataDir;
use crate::domain::constants::{
    self, DEFAULT_LOG_LEVEL, DEFAULT_MAX_LAYER_DEPTH, MASS_BALANCE_TOLERANCE, SWAP_TOLERANCE,
};
use crate::domain::error::AppError;
use crate::network::price_feed::DEFAULT_PRICE_API_URL;
use crate::services::rebalance::layers::RewardDiffMode;
use crate::services::rebalance::pipeline::PipelineConfig;
use alloy::primitives::Address;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_chain", deserialize_with = "deserialize_chain_list")]
    pub chains: Vec<u64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_false")]
    pub log_json: bool,

    // Identity
    /// Owner of the rebalanced portfolio; every emitted call pays out to it.
    pub wallet_address: Address,
    /// Chain id -> on-chain program interpreter.
    pub router_addresses: Option<HashMap<String, String>>,

    // Network
    pub http_providers: Option<HashMap<String, String>>,
    /// Chain id -> { name -> router }, merged over the built-in venues.
    pub exchange_routers_by_chain: Option<HashMap<String, HashMap<String, String>>>,
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
    pub coingecko_api_key: Option<String>,
    #[serde(default = "default_price_fetch_attempts")]
    pub price_fetch_attempts: usize,
    #[serde(default = "default_price_fetch_backoff_ms")]
    pub price_fetch_backoff_ms: u64,
    #[serde(default = "default_price_fetch_timeout_ms")]
    pub price_fetch_timeout_ms: u64,
    #[serde(default = "default_price_requests_per_second")]
    pub price_requests_per_second: u32,

    // Routing
    #[serde(default = "default_sim_backend")]
    pub simulation_backend: String, // "quote" or "onchain"
    #[serde(default = "default_simulation_timeout_ms")]
    pub simulation_timeout_ms: u64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    // Planning
    #[serde(default = "default_swap_tolerance")]
    pub swap_tolerance: f64,
    #[serde(default = "default_mass_balance_tolerance")]
    pub mass_balance_tolerance: f64,
    #[serde(default = "default_max_layer_depth")]
    pub max_layer_depth: usize,
    #[serde(default)]
    pub reward_diff_mode: RewardDiffMode,

    // Data
    pub data_dir: Option<String>,
    pub asset_graph_path: Option<String>,
}

/// How candidate routes are scored before one is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationBackend {
    /// Trust the oracle-derived quote.
    Quote,
    /// Ask the venues through `eth_call`.
    Onchain,
}

// Defaults
fn default_chain() -> Vec<u64> {
    Vec::new()
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_price_api_url() -> String {
    DEFAULT_PRICE_API_URL.to_string()
}
fn default_price_fetch_attempts() -> usize {
    3
}
fn default_price_fetch_backoff_ms() -> u64 {
    250
}
fn default_price_fetch_timeout_ms() -> u64 {
    5_000
}
fn default_price_requests_per_second() -> u32 {
    10
}
fn default_sim_backend() -> String {
    "quote".to_string()
}
fn default_simulation_timeout_ms() -> u64 {
    5_000
}
fn default_slippage_bps() -> u32 {
    50
}
fn default_deadline_secs() -> u64 {
    1_200
}
fn default_swap_tolerance() -> f64 {
    SWAP_TOLERANCE
}
fn default_mass_balance_tolerance() -> f64 {
    MASS_BALANCE_TOLERANCE
}
fn default_max_layer_depth() -> usize {
    DEFAULT_MAX_LAYER_DEPTH
}

fn deserialize_chain_list<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};
    use std::fmt;

    struct ChainVisitor;

    impl<'de> Visitor<'de> for ChainVisitor {
        type Value = Vec<u64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence of chain ids or a string with comma-separated ids")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            parse_chain_list(v).map_err(E::custom)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(elem) = seq.next_element::<u64>()? {
                out.push(elem);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(ChainVisitor)
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let selected_config = resolve_config_path(path);
        let mut builder = Config::builder();

        if let Some(ref selected_path) = selected_config {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > selected profile file.
        builder = builder.add_source(Environment::default());

        let mut settings: GlobalSettings = builder.build()?.try_deserialize()?;

        // Allow CHAINS env to be comma/space separated string (e.g. "1,137")
        if let Ok(chains_str) = std::env::var("CHAINS") {
            settings.chains = parse_chain_list(&chains_str)?;
        }

        // Basic Validation
        if settings.wallet_address == Address::ZERO {
            return Err(AppError::Config("WALLET_ADDRESS is missing".to_string()));
        }
        tracing::debug!(
            target: "config",
            file = selected_config.as_deref().unwrap_or("<none>"),
            chains = ?settings.chains,
            "Settings loaded"
        );

        Ok(settings)
    }

    fn data_dir_value(&self) -> Option<String> {
        std::env::var("DATA_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.data_dir
                    .as_ref()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
    }

    pub fn data_dir(&self) -> DataDir {
        DataDir::new(self.data_dir_value().as_deref())
    }

    fn resolve_path_setting(
        &self,
        env_key: &str,
        configured: Option<&str>,
        default_path: &str,
        what: &str,
    ) -> Result<String, AppError> {
        let raw = std::env::var(env_key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                configured
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| default_path.to_string());
        let resolved = self.data_dir().require(&raw, what)?;
        Ok(resolved.to_string_lossy().to_string())
    }

    /// Asset graph JSON; must exist.
    pub fn asset_graph_path(&self) -> Result<String, AppError> {
        self.resolve_path_setting(
            "ASSET_GRAPH_PATH",
            self.asset_graph_path.as_deref(),
            "data/assets.json",
            "asset graph",
        )
    }

    /// Helper to get RPC URL for a specific chain
    pub fn get_http_provider(&self, chain_id: u64) -> Result<String, AppError> {
        // Try looking for explicit map
        if let Some(urls) = &self.http_providers
            && let Some(url) = urls.get(&chain_id.to_string())
        {
            return Ok(url.clone());
        }

        // Fallback to env var convention: http_provider_1, http_provider_137, then generic http_provider
        let candidates = [
            format!("http_provider_{}", chain_id),
            "http_provider".to_string(),
        ];
        for key in candidates {
            if let Ok(v) = std::env::var(&key) {
                let trimmed = v.trim();
                if !trimmed.is_empty() {
                    return Ok(trimmed.to_string());
                }
            }
        }

        Err(AppError::Config(format!(
            "No RPC URL found for chain {}",
            chain_id
        )))
    }

    /// Program interpreter deployed on `chain_id`.
    pub fn router_address_for_chain(&self, chain_id: u64) -> Result<Address, AppError> {
        let raw = self
            .router_addresses
            .as_ref()
            .and_then(|m| m.get(&chain_id.to_string()))
            .ok_or_else(|| AppError::Config(format!("No router address for chain {chain_id}")))?;
        Address::from_str(raw.trim())
            .map_err(|_| AppError::InvalidAddress(format!("router_addresses:{chain_id} -> {raw}")))
    }

    /// Built-in venues for the chain, overridden and extended by configured ones.
    pub fn routers_for_chain(&self, chain_id: u64) -> Result<HashMap<String, Address>, AppError> {
        let mut out = constants::default_routers_for_chain(chain_id);

        if let Some(map) = self
            .exchange_routers_by_chain
            .as_ref()
            .and_then(|m| m.get(&chain_id.to_string()))
        {
            let parsed = parse_address_map(map, "exchange_routers_by_chain")?;
            out.extend(parsed);
        }

        Ok(out)
    }

    pub fn simulation_backend_value(&self) -> Result<SimulationBackend, AppError> {
        match self.simulation_backend.trim().to_ascii_lowercase().as_str() {
            "quote" | "" => Ok(SimulationBackend::Quote),
            "onchain" | "on_chain" | "eth_call" => Ok(SimulationBackend::Onchain),
            other => Err(AppError::Config(format!(
                "Unknown simulation_backend '{other}' (expected quote or onchain)"
            ))),
        }
    }

    pub fn price_fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.price_fetch_backoff_ms)
    }

    /// Per-request deadline, never below 100ms.
    pub fn price_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.price_fetch_timeout_ms.max(100))
    }

    /// Plain pipeline parameters for one chain; nothing downstream reads settings again.
    pub fn pipeline_config(&self, chain_id: u64) -> Result<PipelineConfig, AppError> {
        if !self.chains.is_empty() && !self.chains.contains(&chain_id) {
            return Err(AppError::Config(format!(
                "Chain {chain_id} is not enabled (chains = {:?})",
                self.chains
            )));
        }
        for (field, value) in [
            ("swap_tolerance", self.swap_tolerance),
            ("mass_balance_tolerance", self.mass_balance_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AppError::Config(format!("{field} must be positive, got {value}")));
            }
        }
        if self.max_layer_depth == 0 {
            return Err(AppError::Config("max_layer_depth must be at least 1".into()));
        }
        if self.slippage_bps > 10_000 {
            return Err(AppError::Config(format!(
                "slippage_bps {} exceeds 10000",
                self.slippage_bps
            )));
        }

        Ok(PipelineConfig {
            chain_id,
            holder: self.wallet_address,
            swap_tolerance: self.swap_tolerance,
            mass_balance_tolerance: self.mass_balance_tolerance,
            max_layer_depth: self.max_layer_depth,
            reward_diff_mode: self.reward_diff_mode,
            simulation_timeout: Duration::from_millis(self.simulation_timeout_ms.max(1)),
            slippage_bps: self.slippage_bps,
            deadline_secs: self.deadline_secs,
        })
    }
}

fn resolve_config_path(path: Option<&str>) -> Option<String> {
    if let Some(path) = path {
        return Some(path.to_string());
    }
    detect_active_config_file()
}

fn detect_active_config_file() -> Option<String> {
    // Check common config.*.toml files first
    let priority_files = [
        "config.prod.toml",
        "config.dev.toml",
        "config.testnet.toml",
        "config.example.toml",
        "config.toml",
    ];

    for file in priority_files.iter() {
        if let Some(true) = config_has_active_flag(file) {
            return Some((*file).to_string());
        }
    }

    // Fallback: scan current dir for config.*.toml with THIS_ACTIVE = true
    if let Ok(entries) = fs::read_dir(".") {
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.starts_with("config.")
                && name.ends_with(".toml")
                && let Some(true) = config_has_active_flag(name)
            {
                return Some(name.to_string());
            }
        }
    }

    None
}

fn config_has_active_flag(path: &str) -> Option<bool> {
    let p = Path::new(path);
    if !p.exists() {
        return None;
    }

    Config::builder()
        .add_source(File::from(p))
        .build()
        .ok()?
        .get_bool("THIS_ACTIVE")
        .ok()
}

fn parse_chain_list(raw: &str) -> Result<Vec<u64>, AppError> {
    let cleaned = raw.trim_matches(|c| c == '`' || c == '"' || c == '\'');
    let mut out = Vec::new();
    for part in cleaned.split(|c: char| c == ',' || c.is_whitespace()) {
        let p = part.trim();
        if p.is_empty() {
            continue;
        }
        let id: u64 = p
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid chain id '{}'", p)))?;
        out.push(id);
    }
    if out.is_empty() {
        return Err(AppError::Config("CHAINS env is empty".into()));
    }
    Ok(out)
}

fn parse_address_map(
    raw: &HashMap<String, String>,
    field: &str,
) -> Result<HashMap<String, Address>, AppError> {
    raw.iter()
        .map(|(k, v)| {
            Address::from_str(v.trim())
                .map(|addr| (k.to_ascii_lowercase(), addr))
                .map_err(|_| AppError::InvalidAddress(format!("{field}:{k} -> {v}")))
        })
        .collect()
}
