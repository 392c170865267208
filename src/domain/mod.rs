// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod allocation;
pub mod asset;
pub mod constants;
pub mod error;
