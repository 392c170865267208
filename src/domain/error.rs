// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Unknown asset id {0}")]
    UnknownAsset(String),

    #[error("Unknown asset address {address} on chain {chain_id}")]
    UnknownAssetAddress { chain_id: u64, address: String },

    #[error("Decomposition of {asset_id} exceeded depth {depth} (cyclic linked assets?)")]
    CyclicDecomposition { asset_id: String, depth: usize },

    #[error("Invalid asset graph: {0}")]
    InvalidGraph(String),

    #[error("Strategy precondition failed for {asset_id}: {reason}")]
    StrategyPrecondition { asset_id: String, reason: String },

    #[error("Insufficient ledger balance for {key}. Required: {required}, Available: {available}")]
    InsufficientLedgerBalance {
        key: String,
        required: f64,
        available: f64,
    },

    #[error("Magic sentinel #{index} not found in encoded call")]
    SentinelNotFound { index: usize },

    #[error("Magic sentinel #{index} found {occurrences} times; expected exactly one")]
    DuplicateSentinel { index: usize, occurrences: usize },

    #[error("Store {0} already initialized; value can only be provided on first reference")]
    StoreAlreadyInitialized(String),

    #[error("Invalid store operation in step {step}: {reason}")]
    InvalidStoreOperation { step: usize, reason: String },

    #[error("Price fetch failed for {asset_id}: {reason}")]
    PriceFetch { asset_id: String, reason: String },

    #[error("Prices unavailable for {} asset(s): {}", failed.len(), failed.join(", "))]
    PricesUnavailable { failed: Vec<String> },

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("No route found from {from} to {to}")]
    NoRoute { from: String, to: String },

    #[error("All {candidates} route simulations failed for {from} -> {to}")]
    AllSimulationsFailed {
        from: String,
        to: String,
        candidates: usize,
    },

    #[error("Mass imbalance during {phase}: residual {residual}")]
    MassImbalance { phase: String, residual: f64 },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Address {0} is invalid or not checksummed")]
    InvalidAddress(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    pub fn precondition(asset_id: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::StrategyPrecondition {
            asset_id: asset_id.into(),
            reason: reason.into(),
        }
    }

    /// Graph, precondition, relocation and imbalance errors abort the request outright;
    /// only I/O failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Connection(_)
                | AppError::ApiCall { .. }
                | AppError::Timeout { .. }
                | AppError::PriceFetch { .. }
        )
    }
}
