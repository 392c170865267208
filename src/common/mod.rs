// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

pub mod data_path;
pub mod parsing;
pub mod rate_limit;
pub mod retry;

// Adapters import the error type through here.
pub use crate::domain::error;
