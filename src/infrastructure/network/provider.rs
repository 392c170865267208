// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::RootProvider;
use url::Url;

/// Read-only JSON-RPC client for pool state, share rates and quotes.
pub type HttpProvider = RootProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;
        tracing::debug!(target: "config", host = url.host_str().unwrap_or(""), "Using HTTP provider");
        Ok(RootProvider::new_http(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(ConnectionFactory::http("not a url"), Err(AppError::Config(_))));
    }

    #[test]
    fn accepts_local_node() {
        assert!(ConnectionFactory::http("http://127.0.0.1:8545").is_ok());
    }
}
