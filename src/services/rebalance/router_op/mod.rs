// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod magic;
pub mod operation;
pub mod program;
pub mod stores;

pub use magic::{get_all_magic_offsets, get_magic_offsets, magic_value};
pub use operation::{
    CallInput, CallValue, DetailedStep, PatchedCall, RouterOperation, StoreOpType, StoreOperation,
};
pub use program::RouterProgram;
pub use stores::{DetailedStore, StoreFile, StoreKey};
