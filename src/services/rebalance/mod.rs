// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod layers;
pub mod ledger;
pub mod netting;
pub mod pipeline;
pub mod pricing;
pub mod protocols;
pub mod router_op;
pub mod routing;
pub mod strategy;
pub mod time_utils;

pub use pipeline::{
    PipelineConfig, PortfolioValuation, RebalanceOutcome, RebalanceRequest, Rebalancer,
    StepPipeline, to_fraction_allocation,
};
