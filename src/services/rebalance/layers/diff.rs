// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::allocation::{AssetLayer, AssetLayers, FractionAllocationItem};
use serde::Deserialize;

/// How reward lists of the same position are paired when diffing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardDiffMode {
    /// Pair rewards with the same asset id; unmatched entries diff against zero.
    #[default]
    #[serde(alias = "asset_id")]
    ByAssetId,
    /// Pair rewards by list position.
    Positional,
}

/// `future - current` per (layer index, asset id). Missing layers and missing
/// entries count as zero; the output has `max(len)` layers.
pub fn diff_asset_layers(
    future: &AssetLayers,
    current: &AssetLayers,
    mode: RewardDiffMode,
) -> AssetLayers {
    let depth = future.len().max(current.len());
    let empty = AssetLayer::new();
    let mut out = AssetLayers::with_depth(depth);

    for index in 0..depth {
        let f = future.layer(index).unwrap_or(&empty);
        let c = current.layer(index).unwrap_or(&empty);
        let target = out.layer_mut(index);
        for asset_id in f.keys().chain(c.keys().filter(|id| !f.contains(id))) {
            target.insert(diff_item(asset_id, f.get(asset_id), c.get(asset_id), mode));
        }
    }
    out
}

fn diff_item(
    asset_id: &str,
    future: Option<&FractionAllocationItem>,
    current: Option<&FractionAllocationItem>,
    mode: RewardDiffMode,
) -> FractionAllocationItem {
    let fraction = future.map_or(0.0, |i| i.fraction) - current.map_or(0.0, |i| i.fraction);
    let rewards = diff_rewards(
        future.map_or(&[][..], |i| i.rewards.as_slice()),
        current.map_or(&[][..], |i| i.rewards.as_slice()),
        mode,
    );
    FractionAllocationItem::new(asset_id, fraction).with_rewards(rewards)
}

fn diff_rewards(
    future: &[FractionAllocationItem],
    current: &[FractionAllocationItem],
    mode: RewardDiffMode,
) -> Vec<FractionAllocationItem> {
    match mode {
        RewardDiffMode::Positional => (0..future.len().max(current.len()))
            .filter_map(|i| {
                let f = future.get(i);
                let c = current.get(i);
                let asset_id = f.or(c)?.asset_id.as_str();
                Some(diff_item(asset_id, f, c, mode))
            })
            .collect(),
        RewardDiffMode::ByAssetId => {
            let mut ids: Vec<&str> = future.iter().map(|r| r.asset_id.as_str()).collect();
            for reward in current {
                if !ids.contains(&reward.asset_id.as_str()) {
                    ids.push(&reward.asset_id);
                }
            }
            ids.into_iter()
                .map(|id| {
                    diff_item(
                        id,
                        future.iter().find(|r| r.asset_id == id),
                        current.iter().find(|r| r.asset_id == id),
                        mode,
                    )
                })
                .collect()
        }
    }
}

/// Net change of the token layer; zero for a mass-conserving diff.
pub fn token_layer_mass(delta: &AssetLayers) -> f64 {
    delta.token_layer().map_or(0.0, AssetLayer::total_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rebalance::layers::builder::combine_asset_layers;

    fn layers(entries: &[&[(&str, f64)]]) -> AssetLayers {
        AssetLayers::from_layers(
            entries
                .iter()
                .map(|layer| {
                    layer
                        .iter()
                        .map(|(id, f)| FractionAllocationItem::new(*id, *f))
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn diff_with_self_is_all_zero() {
        let a = layers(&[&[("usdc", 0.6), ("weth", 0.4)], &[("ausdc", 0.6)]]);
        let delta = diff_asset_layers(&a, &a, RewardDiffMode::default());
        assert_eq!(delta.len(), 2);
        assert!(
            delta
                .iter()
                .flat_map(|l| l.values())
                .all(|i| i.fraction == 0.0)
        );
    }

    #[test]
    fn missing_entries_and_layers_count_as_zero() {
        let future = layers(&[&[("usdc", 1.0)]]);
        let current = layers(&[&[("weth", 0.5), ("usdc", 0.5)], &[("ausdc", 0.5)]]);
        let delta = diff_asset_layers(&future, &current, RewardDiffMode::ByAssetId);

        assert_eq!(delta.len(), 2);
        assert!((delta.layer(0).unwrap().fraction("usdc") - 0.5).abs() < 1e-12);
        assert!((delta.layer(0).unwrap().fraction("weth") + 0.5).abs() < 1e-12);
        assert!((delta.layer(1).unwrap().fraction("ausdc") + 0.5).abs() < 1e-12);
        assert!(token_layer_mass(&delta).abs() < 1e-12);
    }

    #[test]
    fn diff_is_linear() {
        let a = layers(&[&[("usdc", 0.2), ("weth", 0.8)]]);
        let b = layers(&[&[("usdc", 0.5), ("dai", 0.5)]]);
        let c = layers(&[&[("weth", 0.3), ("dai", 0.7)], &[("ausdc", 0.1)]]);

        let direct = diff_asset_layers(&a, &c, RewardDiffMode::ByAssetId);
        let via_b = combine_asset_layers(
            &diff_asset_layers(&a, &b, RewardDiffMode::ByAssetId),
            &diff_asset_layers(&b, &c, RewardDiffMode::ByAssetId),
        );

        assert_eq!(direct.len(), via_b.len());
        for (lhs, rhs) in direct.iter().zip(via_b.iter()) {
            for id in lhs.keys().chain(rhs.keys()) {
                assert!(
                    (lhs.fraction(id) - rhs.fraction(id)).abs() < 1e-12,
                    "{id}: {} vs {}",
                    lhs.fraction(id),
                    rhs.fraction(id)
                );
            }
        }
    }

    #[test]
    fn consolidating_small_positions_into_one() {
        let current = layers(&[&[
            ("72c7", 0.375),
            ("c1dd", 0.2658),
            ("459b", 0.2187),
            ("48f0", 0.096),
            ("85d4", 0.0254),
            ("8bcd", 0.0191),
        ]]);
        let future = layers(&[&[
            ("72c7", 0.375),
            ("c1dd", 0.2658),
            ("459b", 0.2187),
            ("8bcd", 0.1405),
        ]]);
        let delta = diff_asset_layers(&future, &current, RewardDiffMode::ByAssetId);
        let tokens = delta.token_layer().unwrap();

        assert_eq!(delta.len(), 1);
        assert_eq!(tokens.len(), 6);
        for (id, expected) in [
            ("72c7", 0.0),
            ("c1dd", 0.0),
            ("459b", 0.0),
            ("8bcd", 0.1214),
            ("48f0", -0.096),
            ("85d4", -0.0254),
        ] {
            assert!(
                (tokens.fraction(id) - expected).abs() < 1e-10,
                "{id}: {}",
                tokens.fraction(id)
            );
        }
    }

    #[test]
    fn rewards_pair_by_id_or_position() {
        let future = AssetLayers::from_layers(vec![
            AssetLayer::new(),
            [FractionAllocationItem::new("ausdc", 0.5).with_rewards(vec![
                FractionAllocationItem::new("op", 0.0),
                FractionAllocationItem::new("aave", 0.0),
            ])]
            .into_iter()
            .collect(),
        ]);
        let current = AssetLayers::from_layers(vec![
            AssetLayer::new(),
            [FractionAllocationItem::new("ausdc", 0.5).with_rewards(vec![
                FractionAllocationItem::new("aave", 0.02),
                FractionAllocationItem::new("op", 0.01),
            ])]
            .into_iter()
            .collect(),
        ]);

        let by_id = diff_asset_layers(&future, &current, RewardDiffMode::ByAssetId);
        let rewards = &by_id.layer(1).unwrap().get("ausdc").unwrap().rewards;
        assert_eq!(rewards[0].asset_id, "op");
        assert!((rewards[0].fraction + 0.01).abs() < 1e-12);
        assert!((rewards[1].fraction + 0.02).abs() < 1e-12);

        let positional = diff_asset_layers(&future, &current, RewardDiffMode::Positional);
        let rewards = &positional.layer(1).unwrap().get("ausdc").unwrap().rewards;
        // Positional pairing keeps the future entry's id and subtracts whatever sits opposite.
        assert_eq!(rewards[0].asset_id, "op");
        assert!((rewards[0].fraction + 0.02).abs() < 1e-12);
    }
}
