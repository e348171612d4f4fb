// Copyright 2025 Irreducible Inc.

//! Layers that can be linked into a conditional-computation tree.
//!
//! A [`Layer`] adds its operations to a [`condnet_graph::GraphBuilder`] and reports the nodes the
//! routing engine reads: the output, a per-sample error signal, a modeling cost and an operation
//! count. The layers here are a small reference set; anything implementing [`Layer`] can be used.

mod chain;
mod error;
mod layer;
mod lin_trans;
mod rect;
mod squared_error;

pub use chain::Chain;
pub use error::Error;
pub use layer::{Layer, LayerOutputs};
pub use lin_trans::LinTrans;
pub use rect::Rect;
pub use squared_error::SquaredError;
