// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, B256, address, b256};
use lazy_static::lazy_static;
use std::collections::HashMap;

// Common assets
pub const WETH_MAINNET: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const WETH_OPTIMISM: Address = address!("4200000000000000000000000000000000000006");
pub const WETH_ARBITRUM: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");
pub const WETH_POLYGON: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");
pub const WBNB_BSC: Address = address!("BB4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");

/// Multicall3 is deployed at the same address on every supported chain.
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

// =============================================================================
// NETWORK CONSTANTS
// =============================================================================

pub const CHAIN_ETHEREUM: u64 = 1;
pub const CHAIN_OPTIMISM: u64 = 10;
pub const CHAIN_BSC: u64 = 56;
pub const CHAIN_POLYGON: u64 = 137;
pub const CHAIN_ARBITRUM: u64 = 42161;

// =============================================================================
// REBALANCE CONSTANTS
// =============================================================================

/// Fixed-point scale for store-operation fractions (1.0 == 1_000_000).
pub const FRACTION_SCALE: u64 = 1_000_000;

/// Residual magnitude below which the swap netter treats a fraction as settled.
pub const SWAP_TOLERANCE: f64 = 0.0001;

/// Allowed |Σ delta| on the token layer before a diff is rejected as unbalanced.
pub const MASS_BALANCE_TOLERANCE: f64 = 1e-6;

/// Recursion bound for linked-asset decomposition; deeper graphs are treated as cyclic.
pub const DEFAULT_MAX_LAYER_DEPTH: usize = 16;

/// Linked-asset fractions must sum to at most 1 (within this slack).
pub const LINKED_FRACTION_SLACK: f64 = 1e-9;

pub const UNISWAP_V3_FEE_TIERS: [u32; 3] = [500, 3_000, 10_000];

/// Pre-generated 32-byte placeholders substituted for not-yet-known amounts in
/// calldata. They are located and zeroed again by `router_op::magic`.
pub const MAGIC_VALUES: [B256; 12] = [
    b256!("039b01792655452b2f65aa596c5bf62a651ff3053f5567ba544648c6cd74e425"),
    b256!("fc76a0e0bda0771253e8ea8cc8b9364c8754a4911f039fbd075cc2300cc7003f"),
    b256!("4e6b6fbb1ffb1fff95a37baf39b2289864ac39837101d1ea9fec7fa818b0fd82"),
    b256!("33fef7d52b05de548e0a7175742a63b213b210fecddde6acb1832dde23bbe74d"),
    b256!("89d5298835e29ea14c1c2a0fc6c2783235ae6c21afc219e8ab1c18d1f036807f"),
    b256!("868f033080f0784f0635cf1225dce009135facbabb19407e9e6d185e15f3571f"),
    b256!("85e48b94d5e682c4047a1b8115888d504518355aeed2b81a3fdc8b9fe2294275"),
    b256!("d628e14a578fbacc5d26ac965bc2c376f3ab1519cceee25a85c154cecd141670"),
    b256!("4dde6273c2e264cc4f32e84ec3409bdf1f0bfc8a1f5d4367abcd0f6b293c0e9a"),
    b256!("5b96beb30f7617956a0cd6925e4f56548d4b9b3f426383c164570c42d73e9250"),
    b256!("0519e27976bb955b5e146df7a9052543e103d96a54745f1eb5e95dc575bfc8e8"),
    b256!("7e6a7e1d40d8ff703e7eede225dc65d5b0f06a829aed849e242409719c9de399"),
];

lazy_static! {
    // -------------------------
    // DEX Routers used for rebalance swaps
    // -------------------------

    pub static ref DEX_ROUTERS_MAINNET: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();

        // Uniswap
        m.insert("uniswap_v2_router02", address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"));
        m.insert("uniswap_v3_swaprouter", address!("E592427A0AEce92De3Edee1F18E0157C05861564"));
        m.insert("uniswap_v3_quoter", address!("b27308f9F90D607463bb33eA1BeBb41C27CE5AB6"));

        // Sushi
        m.insert("sushiswap_router", address!("d9e1cE17f2641f24aE83637ab66a2cca9C378B9F"));

        m
    };

    pub static ref DEX_ROUTERS_OPTIMISM: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();

        m.insert("uniswap_v3_swaprouter", address!("E592427A0AEce92De3Edee1F18E0157C05861564"));
        m.insert("uniswap_v3_quoter", address!("b27308f9F90D607463bb33eA1BeBb41C27CE5AB6"));

        // Sushi (NOTE: NOT 1b02... on OP)
        m.insert("sushiswap_router", address!("2abf469074dc0b54d793850807e6eb5faf2625b1"));

        m
    };

    pub static ref DEX_ROUTERS_ARBITRUM: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();

        m.insert("uniswap_v3_swaprouter", address!("E592427A0AEce92De3Edee1F18E0157C05861564"));
        m.insert("uniswap_v3_quoter", address!("b27308f9F90D607463bb33eA1BeBb41C27CE5AB6"));
        m.insert("sushiswap_router", address!("1b02dA8Cb0d097eB8D57A175b88c7D8b47997506"));

        m
    };

    pub static ref DEX_ROUTERS_POLYGON: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();

        m.insert("uniswap_v3_swaprouter", address!("E592427A0AEce92De3Edee1F18E0157C05861564"));
        m.insert("uniswap_v3_quoter", address!("b27308f9F90D607463bb33eA1BeBb41C27CE5AB6"));
        m.insert("sushiswap_router", address!("1b02dA8Cb0d097eB8D57A175b88c7D8b47997506"));
        m.insert("quickswap_v2_router", address!("a5E0829CaCED8fFDD4De3c43696c57F7D7A678ff"));

        m
    };

    pub static ref DEX_ROUTERS_BSC: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();

        // PancakeSwap (UniV2-style)
        m.insert("pancakeswap_v2_router", address!("10ED43C718714eb63d5aA57B78B54704E256024E"));

        m
    };

    pub static ref DEX_ROUTERS_BY_CHAIN: HashMap<u64, &'static HashMap<&'static str, Address>> = {
        let mut m = HashMap::new();
        m.insert(CHAIN_ETHEREUM, &*DEX_ROUTERS_MAINNET);
        m.insert(CHAIN_OPTIMISM, &*DEX_ROUTERS_OPTIMISM);
        m.insert(CHAIN_ARBITRUM, &*DEX_ROUTERS_ARBITRUM);
        m.insert(CHAIN_POLYGON, &*DEX_ROUTERS_POLYGON);
        m.insert(CHAIN_BSC, &*DEX_ROUTERS_BSC);
        m
    };

    pub static ref WRAPPED_NATIVE_BY_CHAIN: HashMap<u64, Address> = {
        let mut m = HashMap::new();
        m.insert(CHAIN_ETHEREUM, WETH_MAINNET);
        m.insert(CHAIN_OPTIMISM, WETH_OPTIMISM);
        m.insert(CHAIN_ARBITRUM, WETH_ARBITRUM);
        m.insert(CHAIN_POLYGON, WETH_POLYGON);
        m.insert(CHAIN_BSC, WBNB_BSC);
        m
    };
}

// =============================================================================
// LOGGING DEFAULTS
// =============================================================================

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub fn default_routers_for_chain(chain_id: u64) -> HashMap<String, Address> {
    DEX_ROUTERS_BY_CHAIN
        .get(&chain_id)
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<String, Address>>()
        })
        .unwrap_or_default()
}

pub fn wrapped_native_for_chain(chain_id: u64) -> Address {
    WRAPPED_NATIVE_BY_CHAIN
        .get(&chain_id)
        .copied()
        .unwrap_or(WETH_MAINNET)
}
