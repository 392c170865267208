// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::allocation::{AssetLayers, FractionAllocationItem};
use crate::domain::asset::{Asset, LinkedAsset};
use crate::domain::constants::DEFAULT_MAX_LAYER_DEPTH;
use crate::domain::error::AppError;
use crate::infrastructure::data::asset_graph::AssetGraph;

/// Where the builder gets decomposition edges from. Pools whose ratio moves on-chain
/// answer with a price-derived split instead of the static graph entry.
pub trait LinkedAssetSource {
    fn asset(&self, asset_id: &str) -> Result<&Asset, AppError>;
    fn linked_assets(&self, asset: &Asset) -> Result<Vec<LinkedAsset>, AppError>;
}

/// Static decomposition straight from the asset graph.
pub struct StaticLinks<'a, G: AssetGraph + ?Sized>(pub &'a G);

impl<G: AssetGraph + ?Sized> LinkedAssetSource for StaticLinks<'_, G> {
    fn asset(&self, asset_id: &str) -> Result<&Asset, AppError> {
        self.0.get_asset_by_id(asset_id)
    }

    fn linked_assets(&self, asset: &Asset) -> Result<Vec<LinkedAsset>, AppError> {
        Ok(asset.linked_assets.clone())
    }
}

pub struct LayerBuilder<'a, S: LinkedAssetSource + ?Sized> {
    source: &'a S,
    max_depth: usize,
}

impl<'a, S: LinkedAssetSource + ?Sized> LayerBuilder<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            max_depth: DEFAULT_MAX_LAYER_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Expands a flat allocation into layers (index 0 = tokens), merging items and
    /// pulling every asset to the shallowest layer it occupies.
    pub fn construct_asset_layers(
        &self,
        allocation: &[FractionAllocationItem],
    ) -> Result<AssetLayers, AppError> {
        let mut combined = AssetLayers::new();
        for item in allocation {
            let tree = self.layers_for_item(item)?;
            combined = combine_asset_layers(&combined, &tree);
            for reward in &item.rewards {
                // Claimable rewards are part of current exposure once harvested.
                let reward_tree = self.layers_for_item(&FractionAllocationItem::new(
                    reward.asset_id.clone(),
                    reward.fraction,
                ))?;
                combined = combine_asset_layers(&combined, &reward_tree);
            }
        }
        let restructured = restructure_layers_by_depth(&combined);
        tracing::debug!(
            target: "layers",
            items = allocation.len(),
            layers = restructured.len(),
            "Constructed asset layers"
        );
        Ok(restructured)
    }

    /// Depth of the deepest leaf below `asset_id`; tokens are depth 0.
    pub fn max_layer_depth(&self, asset_id: &str) -> Result<usize, AppError> {
        self.max_layer_depth_inner(asset_id, 0)
    }

    fn max_layer_depth_inner(&self, asset_id: &str, depth: usize) -> Result<usize, AppError> {
        self.guard(asset_id, depth)?;
        let asset = self.source.asset(asset_id)?;
        if asset.asset_type.is_token() {
            return Ok(0);
        }
        let links = self.linked_nonempty(asset)?;
        let mut deepest = 0;
        for link in &links {
            deepest = deepest.max(self.max_layer_depth_inner(&link.asset_id, depth + 1)?);
        }
        Ok(deepest + 1)
    }

    fn layers_for_item(&self, item: &FractionAllocationItem) -> Result<AssetLayers, AppError> {
        let max_layer = self.max_layer_depth(&item.asset_id)?;
        // Root-relative while accumulating: root at 0, tokens at `max_layer`.
        let mut from_root = AssetLayers::with_depth(max_layer + 1);
        self.accumulate_layers_up_to_max(item, 0, max_layer, &mut from_root)?;

        let mut layers = from_root.into_inner();
        layers.reverse();
        Ok(AssetLayers::from_layers(layers))
    }

    fn accumulate_layers_up_to_max(
        &self,
        item: &FractionAllocationItem,
        layer_number: usize,
        max_layer: usize,
        layers: &mut AssetLayers,
    ) -> Result<(), AppError> {
        self.guard(&item.asset_id, layer_number)?;
        let asset = self.source.asset(&item.asset_id)?;
        if asset.asset_type.is_token() {
            layers.layer_mut(max_layer).accumulate(item);
            return Ok(());
        }

        layers.layer_mut(layer_number).accumulate(item);
        for link in self.linked_nonempty(asset)? {
            let child = FractionAllocationItem::new(link.asset_id, item.fraction * link.fraction);
            self.accumulate_layers_up_to_max(&child, layer_number + 1, max_layer, layers)?;
        }
        Ok(())
    }

    fn linked_nonempty(&self, asset: &Asset) -> Result<Vec<LinkedAsset>, AppError> {
        let links = self.source.linked_assets(asset)?;
        if links.is_empty() {
            return Err(AppError::InvalidGraph(format!(
                "{:?} asset {} has no linked assets",
                asset.asset_type, asset.id
            )));
        }
        Ok(links)
    }

    fn guard(&self, asset_id: &str, depth: usize) -> Result<(), AppError> {
        if depth > self.max_depth {
            return Err(AppError::CyclicDecomposition {
                asset_id: asset_id.to_string(),
                depth: self.max_depth,
            });
        }
        Ok(())
    }
}

/// Element-wise sum per (layer, asset id).
pub fn combine_asset_layers(a: &AssetLayers, b: &AssetLayers) -> AssetLayers {
    let mut out = AssetLayers::with_depth(a.len().max(b.len()));
    for source in [a, b] {
        for (index, layer) in source.iter().enumerate() {
            let target = out.layer_mut(index);
            for item in layer.values() {
                target.accumulate(item);
            }
        }
    }
    out
}

/// Moves every asset to the lowest layer index it occupies anywhere in `layers`,
/// summing the relocated entries.
pub fn restructure_layers_by_depth(layers: &AssetLayers) -> AssetLayers {
    let mut out = AssetLayers::with_depth(layers.len().max(1));
    for layer in layers.iter() {
        for item in layer.values() {
            let target = layers.shallowest_index_of(&item.asset_id).unwrap_or(0);
            out.layer_mut(target).accumulate(item);
        }
    }

    let mut trimmed = out.into_inner();
    while trimmed.len() > 1 && trimmed.last().is_some_and(|l| l.is_empty()) {
        trimmed.pop();
    }
    AssetLayers::from_layers(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::AssetType;
    use crate::infrastructure::data::asset_graph::InMemoryAssetGraph;
    use alloy::primitives::Address;

    fn asset(id: &str, byte: u8, asset_type: AssetType, links: &[(&str, f64)]) -> Asset {
        Asset {
            id: id.into(),
            chain_id: 1,
            address: Address::from([byte; 20]),
            decimals: 18,
            asset_type,
            linked_assets: links.iter().map(|(id, f)| LinkedAsset::new(*id, *f)).collect(),
            call_params: None,
        }
    }

    fn graph() -> InMemoryAssetGraph {
        InMemoryAssetGraph::new(vec![
            asset("usdc", 1, AssetType::Token, &[]),
            asset("weth", 2, AssetType::Token, &[]),
            asset("ausdc", 3, AssetType::LendingDeposit, &[("usdc", 1.0)]),
            asset("yv-ausdc", 4, AssetType::VaultDeposit, &[("ausdc", 1.0)]),
            asset("lp", 5, AssetType::AmmLiquidity, &[("yv-ausdc", 0.5), ("weth", 0.5)]),
        ])
        .expect("graph")
    }

    #[test]
    fn max_layer_depth_counts_nesting() {
        let g = graph();
        let links = StaticLinks(&g);
        let builder = LayerBuilder::new(&links);
        assert_eq!(builder.max_layer_depth("usdc").unwrap(), 0);
        assert_eq!(builder.max_layer_depth("ausdc").unwrap(), 1);
        assert_eq!(builder.max_layer_depth("lp").unwrap(), 3);
    }

    #[test]
    fn tokens_land_in_layer_zero_and_composites_at_their_depth() {
        let g = graph();
        let links = StaticLinks(&g);
        let layers = LayerBuilder::new(&links)
            .construct_asset_layers(&[FractionAllocationItem::new("lp", 0.8)])
            .expect("layers");

        assert_eq!(layers.len(), 4);
        let tokens = layers.token_layer().expect("token layer");
        assert!((tokens.fraction("usdc") - 0.4).abs() < 1e-12);
        assert!((tokens.fraction("weth") - 0.4).abs() < 1e-12);
        assert!((layers.layer(1).unwrap().fraction("ausdc") - 0.4).abs() < 1e-12);
        assert!((layers.layer(2).unwrap().fraction("yv-ausdc") - 0.4).abs() < 1e-12);
        assert!((layers.layer(3).unwrap().fraction("lp") - 0.8).abs() < 1e-12);
    }

    #[test]
    fn shared_positions_move_to_shallowest_layer() {
        let g = graph();
        let links = StaticLinks(&g);
        // "yv-ausdc" sits at layer 2 under the LP and also at layer 2 on its own,
        // while "ausdc" is held directly at layer 1 and nested at layer 1.
        let layers = LayerBuilder::new(&links)
            .construct_asset_layers(&[
                FractionAllocationItem::new("lp", 0.5),
                FractionAllocationItem::new("yv-ausdc", 0.25),
                FractionAllocationItem::new("ausdc", 0.25),
            ])
            .expect("layers");

        assert_eq!(layers.shallowest_index_of("ausdc"), Some(1));
        assert!((layers.layer(1).unwrap().fraction("ausdc") - 0.75).abs() < 1e-12);
        assert!((layers.layer(2).unwrap().fraction("yv-ausdc") - 0.5).abs() < 1e-12);
        assert!((layers.token_layer().unwrap().total_fraction() - 1.0).abs() < 1e-12);
        for (index, layer) in layers.iter().enumerate() {
            for id in layer.keys() {
                assert_eq!(layers.shallowest_index_of(id), Some(index), "{id} duplicated");
            }
        }
    }

    #[test]
    fn rewards_stay_attached_and_expand_into_token_layer() {
        let g = graph();
        let links = StaticLinks(&g);
        let item = FractionAllocationItem::new("ausdc", 0.9)
            .with_rewards(vec![FractionAllocationItem::new("weth", 0.1)]);
        let layers = LayerBuilder::new(&links)
            .construct_asset_layers(&[item])
            .expect("layers");

        let position = layers.layer(1).unwrap().get("ausdc").expect("position");
        assert!((position.rewards_sum() - 0.1).abs() < 1e-12);
        assert!((layers.token_layer().unwrap().fraction("weth") - 0.1).abs() < 1e-12);
        assert!((layers.token_layer().unwrap().total_fraction() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cyclic_graph_is_rejected() {
        let g = InMemoryAssetGraph::new(vec![
            asset("a", 1, AssetType::VaultDeposit, &[("b", 1.0)]),
            asset("b", 2, AssetType::VaultDeposit, &[("a", 1.0)]),
        ])
        .expect("edges resolve");
        let links = StaticLinks(&g);
        let err = LayerBuilder::new(&links)
            .with_max_depth(8)
            .construct_asset_layers(&[FractionAllocationItem::new("a", 1.0)])
            .unwrap_err();
        assert!(matches!(err, AppError::CyclicDecomposition { depth: 8, .. }));
    }

    #[test]
    fn unknown_asset_is_a_graph_error() {
        let g = graph();
        let links = StaticLinks(&g);
        let err = LayerBuilder::new(&links)
            .construct_asset_layers(&[FractionAllocationItem::new("ghost", 1.0)])
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownAsset(id) if id == "ghost"));
    }
}
