// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod builder;
pub mod diff;

pub use builder::{
    LayerBuilder, LinkedAssetSource, StaticLinks, combine_asset_layers,
    restructure_layers_by_depth,
};
pub use diff::{RewardDiffMode, diff_asset_layers, token_layer_mass};
