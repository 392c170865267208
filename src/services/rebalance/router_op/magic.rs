// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::MAGIC_VALUES;
use crate::domain::error::AppError;
use alloy::primitives::U256;

/// Sentinel `index` as a `uint256` argument for ABI encoding.
pub fn magic_value(index: usize) -> Result<U256, AppError> {
    MAGIC_VALUES
        .get(index)
        .map(|m| U256::from_be_bytes(m.0))
        .ok_or_else(|| AppError::Validation {
            field: "magic_index".to_string(),
            message: format!("only {} sentinels available", MAGIC_VALUES.len()),
        })
}

fn occurrences(haystack: &[u8], needle: &[u8; 32]) -> Vec<usize> {
    haystack
        .windows(32)
        .enumerate()
        .filter_map(|(pos, w)| (w == needle).then_some(pos))
        .collect()
}

/// Locates sentinels `0..count` in `encoded`, zeroes them and returns the patched
/// bytes plus one offset per sentinel. Each sentinel must appear exactly once.
pub fn get_magic_offsets(encoded: &[u8], count: usize) -> Result<(Vec<u8>, Vec<usize>), AppError> {
    let (patched, all) = get_all_magic_offsets(encoded, count)?;
    let mut offsets = Vec::with_capacity(count);
    for (index, found) in all.into_iter().enumerate() {
        match found.as_slice() {
            [] => return Err(AppError::SentinelNotFound { index }),
            [only] => offsets.push(*only),
            many => {
                return Err(AppError::DuplicateSentinel {
                    index,
                    occurrences: many.len(),
                });
            }
        }
    }
    Ok((patched, offsets))
}

/// Like [`get_magic_offsets`] but tolerates repeated sentinels, reporting every
/// position. Used when one amount feeds several argument slots.
pub fn get_all_magic_offsets(
    encoded: &[u8],
    count: usize,
) -> Result<(Vec<u8>, Vec<Vec<usize>>), AppError> {
    if count > MAGIC_VALUES.len() {
        return Err(AppError::Validation {
            field: "magic_count".to_string(),
            message: format!("requested {count}, only {} available", MAGIC_VALUES.len()),
        });
    }
    let mut patched = encoded.to_vec();
    let mut all = Vec::with_capacity(count);
    for (index, magic) in MAGIC_VALUES.iter().take(count).enumerate() {
        let found = occurrences(encoded, &magic.0);
        if found.is_empty() {
            return Err(AppError::SentinelNotFound { index });
        }
        for &pos in &found {
            patched[pos..pos + 32].fill(0);
        }
        all.push(found);
    }
    Ok((patched, all))
}
