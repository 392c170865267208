// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::allocation::AssetLayer;
use crate::domain::asset::AssetId;
use crate::domain::error::AppError;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstruction {
    pub from: AssetId,
    pub to: AssetId,
    /// Share of total portfolio value moved.
    pub fraction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwapPlan {
    pub swaps: Vec<SwapInstruction>,
    /// Whatever each non-zero delta had left after matching.
    pub residual: BTreeMap<AssetId, f64>,
}

impl SwapPlan {
    pub fn max_residual(&self) -> f64 {
        self.residual.values().fold(0.0, |acc, r| acc.max(r.abs()))
    }

    /// A balanced token layer nets down to dust; anything larger means the diff leaked mass.
    pub fn ensure_settled(&self, tolerance: f64) -> Result<(), AppError> {
        let worst = self.max_residual();
        if worst > tolerance {
            return Err(AppError::MassImbalance {
                phase: "swap netting".to_string(),
                residual: worst,
            });
        }
        Ok(())
    }
}

/// Greedily pairs positive deltas (buys) with negative ones (sells) in key order.
/// Each pairing moves `min(|buy|, |sell|)` and zeroes at least one side, so the loop
/// emits at most `buys + sells - 1` swaps.
pub fn net_swaps(token_delta: &AssetLayer, tolerance: f64) -> SwapPlan {
    let mut buys: Vec<(AssetId, f64)> = Vec::new();
    let mut sells: Vec<(AssetId, f64)> = Vec::new();
    for item in token_delta.values() {
        if item.fraction > 0.0 {
            buys.push((item.asset_id.clone(), item.fraction));
        } else if item.fraction < 0.0 {
            sells.push((item.asset_id.clone(), item.fraction));
        }
    }

    let mut swaps = Vec::new();
    for (to, want) in buys.iter_mut() {
        for (from, have) in sells.iter_mut() {
            if *want <= tolerance {
                break;
            }
            if -*have <= tolerance {
                continue;
            }
            let amount = want.min(-*have);
            *want -= amount;
            *have += amount;
            swaps.push(SwapInstruction {
                from: from.clone(),
                to: to.clone(),
                fraction: amount,
            });
        }
    }

    let residual = buys.into_iter().chain(sells).collect();
    let plan = SwapPlan { swaps, residual };
    tracing::debug!(
        target: "netting",
        swaps = plan.swaps.len(),
        max_residual = plan.max_residual(),
        "Netted token layer"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::FractionAllocationItem;

    fn layer(entries: &[(&str, f64)]) -> AssetLayer {
        entries
            .iter()
            .map(|(id, f)| FractionAllocationItem::new(*id, *f))
            .collect()
    }

    #[test]
    fn matches_buys_against_sells_in_order() {
        let plan = net_swaps(&layer(&[("A", 0.30), ("B", -0.20), ("C", -0.15)]), 1e-9);

        assert_eq!(plan.swaps.len(), 2);
        assert_eq!((plan.swaps[0].from.as_str(), plan.swaps[0].to.as_str()), ("B", "A"));
        assert!((plan.swaps[0].fraction - 0.20).abs() < 1e-12);
        assert_eq!((plan.swaps[1].from.as_str(), plan.swaps[1].to.as_str()), ("C", "A"));
        assert!((plan.swaps[1].fraction - 0.10).abs() < 1e-12);
        assert!((plan.residual["C"] + 0.05).abs() < 1e-12);
        assert!(plan.residual["A"].abs() < 1e-12);
        assert!(plan.ensure_settled(0.0001).is_err());
    }

    #[test]
    fn balanced_layer_settles_within_tolerance() {
        let plan = net_swaps(
            &layer(&[
                ("A", 0.1214),
                ("B", -0.096),
                ("C", -0.0254),
                ("D", 0.0),
                ("E", 0.05),
                ("F", -0.05),
            ]),
            0.0001,
        );
        assert!(plan.swaps.len() <= 3);
        assert!(plan.max_residual() <= 0.0001);
        assert!(plan.ensure_settled(0.0001).is_ok());
        assert!(!plan.residual.contains_key("D"));
        let moved: f64 = plan.swaps.iter().map(|s| s.fraction).sum();
        assert!((moved - 0.1714).abs() < 1e-9);
    }

    #[test]
    fn dust_is_not_swapped() {
        let plan = net_swaps(&layer(&[("A", 0.00005), ("B", -0.00005)]), 0.0001);
        assert!(plan.swaps.is_empty());
        assert!(plan.ensure_settled(0.0001).is_ok());
    }
}
