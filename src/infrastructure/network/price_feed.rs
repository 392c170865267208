// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::domain::constants::{
    CHAIN_ARBITRUM, CHAIN_BSC, CHAIN_ETHEREUM, CHAIN_OPTIMISM, CHAIN_POLYGON,
};
use alloy::primitives::Address;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const CACHE_TTL: u64 = 60; // Cache prices for 60 seconds
const STALE_CACHE_GRACE_SECS: u64 = 900; // Accept up to 15m old cache on failures
const HTTP_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_PRICE_API_URL: &str = "https://coins.llama.fi";
const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Clone, Debug, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct LlamaCoin {
    price: f64,
}

#[derive(Debug, Deserialize)]
struct LlamaPriceResponse {
    #[serde(default)]
    coins: HashMap<String, LlamaCoin>,
}

/// USD token prices keyed by `(chain, contract)`: a coin-price API first,
/// CoinGecko contract lookup second, stale cache last.
#[derive(Clone)]
pub struct PriceFeed {
    client: Client,
    base_url: String,
    coingecko_key: Option<String>,
    // Map: "chain:address" -> (quote, fetched at)
    cache: Arc<RwLock<HashMap<String, (PriceQuote, Instant)>>>,
}

impl PriceFeed {
    pub fn new(base_url: &str, coingecko_key: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            coingecko_key,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn get_price(&self, chain_id: u64, token: Address) -> Result<PriceQuote, AppError> {
        let Some(slug) = llama_chain_slug(chain_id) else {
            return Err(AppError::Config(format!("No price API slug for chain {chain_id}")));
        };
        let key = coin_key(slug, token);

        if let Some(quote) = self.cached_if_fresh(&key).await {
            return Ok(quote);
        }

        match self.try_llama(&key).await {
            Ok(Some(quote)) => {
                self.store_cache(&key, quote.clone()).await;
                return Ok(quote);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(target: "pricing", coin = %key, error = %e, "Primary price API failed")
            }
        }

        if let Some(quote) = self.try_coingecko(chain_id, token).await? {
            self.store_cache(&key, quote.clone()).await;
            return Ok(quote);
        }

        // Soft-fail: serve stale cache if available instead of hard error
        if let Some((quote, age)) = self.cached_any(&key).await {
            tracing::warn!(target: "pricing", coin = %key, age_secs = age.as_secs(), "Serving stale price");
            let mut stale = quote;
            stale.source = format!("cache_stale_{}s", age.as_secs());
            return Ok(stale);
        }

        Err(AppError::PriceFetch {
            asset_id: key,
            reason: "no price source answered".to_string(),
        })
    }

    async fn try_llama(&self, key: &str) -> Result<Option<PriceQuote>, AppError> {
        let url = format!("{}/prices/current/{}", self.base_url, key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Price API request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AppError::ApiCall {
                provider: "llama".into(),
                status: resp.status().as_u16(),
            });
        }
        let parsed: LlamaPriceResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Connection(format!("Price API decode failed: {}", e)))?;
        Ok(parse_llama(parsed, key))
    }

    async fn try_coingecko(
        &self,
        chain_id: u64,
        token: Address,
    ) -> Result<Option<PriceQuote>, AppError> {
        let Some(platform) = coingecko_platform(chain_id) else {
            return Ok(None);
        };
        let contract = format!("{token:#x}");
        let url = format!(
            "{COINGECKO_API_URL}/simple/token_price/{platform}?contract_addresses={contract}&vs_currencies=usd"
        );
        let mut req = self.client.get(&url);
        if let Some(key) = &self.coingecko_key {
            req = req.header("x-cg-pro-api-key", key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("CoinGecko request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::Connection(format!("CoinGecko decode failed: {}", e)))?;
        Ok(parse_coingecko(&parsed, &contract))
    }

    async fn store_cache(&self, key: &str, price: PriceQuote) {
        let mut write_guard = self.cache.write().await;
        write_guard.insert(key.to_string(), (price, Instant::now()));
    }

    async fn cached_if_fresh(&self, key: &str) -> Option<PriceQuote> {
        let read_guard = self.cache.read().await;
        read_guard
            .get(key)
            .and_then(|(quote, ts)| (ts.elapsed().as_secs() < CACHE_TTL).then(|| quote.clone()))
    }

    async fn cached_any(&self, key: &str) -> Option<(PriceQuote, Duration)> {
        let read_guard = self.cache.read().await;
        read_guard
            .get(key)
            .map(|(quote, ts)| (quote.clone(), ts.elapsed()))
            .filter(|(_, age)| age.as_secs() < STALE_CACHE_GRACE_SECS)
    }
}

fn coin_key(slug: &str, token: Address) -> String {
    format!("{slug}:{token:#x}")
}

fn parse_llama(parsed: LlamaPriceResponse, key: &str) -> Option<PriceQuote> {
    parsed
        .coins
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, coin)| coin.price)
        .filter(|p| p.is_finite() && *p > 0.0)
        .map(|price| PriceQuote {
            price,
            source: "llama".into(),
        })
}

fn parse_coingecko(parsed: &serde_json::Value, contract: &str) -> Option<PriceQuote> {
    parsed
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(contract))
        .and_then(|(_, v)| v.get("usd"))
        .and_then(|v| v.as_f64())
        .filter(|p| p.is_finite() && *p > 0.0)
        .map(|price| PriceQuote {
            price,
            source: "coingecko".into(),
        })
}

pub fn llama_chain_slug(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ETHEREUM => Some("ethereum"),
        CHAIN_OPTIMISM => Some("optimism"),
        CHAIN_BSC => Some("bsc"),
        CHAIN_POLYGON => Some("polygon"),
        CHAIN_ARBITRUM => Some("arbitrum"),
        _ => None,
    }
}

fn coingecko_platform(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ETHEREUM => Some("ethereum"),
        CHAIN_OPTIMISM => Some("optimistic-ethereum"),
        CHAIN_BSC => Some("binance-smart-chain"),
        CHAIN_POLYGON => Some("polygon-pos"),
        CHAIN_ARBITRUM => Some("arbitrum-one"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::WETH_MAINNET;

    #[test]
    fn coin_keys_are_lowercase_hex() {
        assert_eq!(
            coin_key("ethereum", WETH_MAINNET),
            "ethereum:0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        );
        assert_eq!(llama_chain_slug(42161), Some("arbitrum"));
        assert_eq!(llama_chain_slug(5), None);
    }

    #[test]
    fn parses_llama_payload_case_insensitively() {
        let body = serde_json::json!({
            "coins": {
                "ethereum:0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2": {
                    "decimals": 18, "symbol": "WETH", "price": 2450.5, "timestamp": 1, "confidence": 0.99
                }
            }
        });
        let parsed: LlamaPriceResponse = serde_json::from_value(body).unwrap();
        let quote = parse_llama(parsed, &coin_key("ethereum", WETH_MAINNET)).unwrap();
        assert_eq!(quote.price, 2450.5);
        assert_eq!(quote.source, "llama");
    }

    #[test]
    fn rejects_missing_and_non_positive_prices() {
        let empty: LlamaPriceResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(parse_llama(empty, "ethereum:0x00").is_none());

        let body = serde_json::json!({ "0xabc": { "usd": 0.0 } });
        assert!(parse_coingecko(&body, "0xabc").is_none());
        let body = serde_json::json!({ "0xabc": { "usd": 1.0001 } });
        assert_eq!(parse_coingecko(&body, "0xABC").unwrap().price, 1.0001);
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_network() {
        let feed = PriceFeed::new("http://127.0.0.1:1", None).unwrap();
        let key = coin_key("ethereum", WETH_MAINNET);
        feed.store_cache(
            &key,
            PriceQuote {
                price: 2000.0,
                source: "llama".into(),
            },
        )
        .await;
        let quote = feed.get_price(1, WETH_MAINNET).await.unwrap();
        assert_eq!(quote.price, 2000.0);
    }

    #[tokio::test]
    async fn unsupported_chain_is_a_config_error() {
        let feed = PriceFeed::new(DEFAULT_PRICE_API_URL, None).unwrap();
        assert!(matches!(
            feed.get_price(5, WETH_MAINNET).await,
            Err(AppError::Config(_))
        ));
    }
}
