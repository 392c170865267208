// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::U256;

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Raw on-chain amount, decimal (`"1500000"`) or hex (`"0x16e360"`).
pub fn parse_raw_amount(s: &str) -> Result<U256, AppError> {
    let trimmed = s.trim();
    let parsed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        U256::from_str_radix(strip_0x(trimmed), 16)
    } else {
        U256::from_str_radix(trimmed, 10)
    };
    parsed.map_err(|e| AppError::Validation {
        field: "amountStr".to_string(),
        message: format!("{trimmed:?} is not a raw integer amount: {e}"),
    })
}

/// Raw integer to whole units. Lossy above 2^53 but prices are f64 anyway.
pub fn raw_to_units(raw: U256, decimals: u8) -> f64 {
    let num = raw.to_string().parse::<f64>().unwrap_or(0.0);
    num / 10f64.powi(decimals as i32)
}

/// Whole units to a raw integer, truncating below one base unit. Negative and
/// non-finite inputs become zero.
pub fn units_to_raw(units: f64, decimals: u8) -> U256 {
    if !units.is_finite() || units <= 0.0 {
        return U256::ZERO;
    }
    let scaled = units * 10f64.powi(decimals as i32);
    if scaled < u128::MAX as f64 {
        return U256::from(scaled.floor() as u128);
    }
    // Beyond u128: go through the decimal string representation.
    U256::from_str_radix(&format!("{:.0}", scaled.floor()), 10).unwrap_or(U256::MAX)
}
