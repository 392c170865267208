// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

pub type SharedLimiter = Arc<DefaultDirectRateLimiter>;

/// Token bucket shared by every outbound request of one collaborator. Zero is
/// treated as one request per second.
pub fn per_second(requests: u32) -> SharedLimiter {
    let rate = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rate)))
}

/// Waits for a token; callers block rather than fail when the bucket is empty.
pub async fn acquire(limiter: &SharedLimiter) {
    limiter.until_ready().await;
}
