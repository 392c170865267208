// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::asset::Asset;
use crate::domain::error::AppError;
use crate::services::rebalance::pricing::{PriceBook, PriceRequest, RequestTree};

/// Leaf of every decomposition: priced directly, never entered or exited.
pub(super) fn request_tree(asset: &Asset) -> RequestTree {
    RequestTree::node(asset.id.clone(), vec![PriceRequest::TokenPrice], Vec::new())
}

pub(super) fn price(asset: &Asset, book: &PriceBook) -> Result<f64, AppError> {
    book.token_price(&asset.id)
}
