// Copyright 2025 Irreducible Inc.

//! Conditional-computation networks with learned, stochastic routing.
//!
//! A network is a tree of [`condnet_layers::Layer`]s. At every layer with more than one sink a
//! router decides, per sample, which subtree processes the layer output: stochastically while
//! training and deterministically at evaluation. Three variants are provided:
//!
//! - [`SrNet`] routes every sample through every layer.
//! - [`DsNet`] uses decision smoothing: routers mix their branches through a softmax and are
//!   trained directly on the bias-corrected error of the layers they route to.
//! - [`CrNet`] uses cost regression: routers predict the downstream cost of each branch, route to
//!   the cheapest one and are trained to regress onto the realized or optimal cost.
//!
//! Training and evaluation go through the [`Network`] trait every variant implements.
//!
//! Running error statistics correct each layer's error for the gap between training and
//! validation performance; see [`RunningStats`].

mod error;
mod hypers;
mod lr;
mod nets;
mod objective;
mod router;
pub mod routing;
mod stats;
mod tree;

pub use error::Error;
pub use hypers::{CrHypers, DsHypers, SrHypers};
pub use lr::{minimize_expected, StepReport, TrainStep};
pub use nets::{CrNet, DsNet, Network, Runtime, SrNet};
pub use objective::Objective;
pub use router::{linear_router, Router, RouterContext, RouterGen};
pub use routing::{BranchPolicy, CostEstimates, CrRouting, PathProbabilities, RoutedNode, Routing};
pub use stats::{RunningStats, StatVar};
pub use tree::{LayerTree, Placeholders, Tree, TreeNode};
