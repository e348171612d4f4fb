// Copyright 2025 Irreducible Inc.

//! A small symbolic computation graph over dense `f32` matrices.
//!
//! Using the graph happens in two phases:
//!
//! 1. A [`GraphBuilder`] records operations over symbolic [`NodeId`]s, checking shapes as nodes are
//!    added, and is frozen into an immutable [`Graph`].
//! 2. A [`Session`] owns the concrete parameter and statistic values for a graph and executes it
//!    against a [`Feed`] of placeholder values, computes reverse-mode gradients and applies
//!    [`Optimizer`] steps.
//!
//! Nodes may only reference nodes created before them, so node order is a topological order of the
//! DAG and both evaluation and differentiation are single linear sweeps.

mod autodiff;
mod builder;
mod error;
mod feed;
mod node;
mod optimizer;
mod session;
mod shape;
mod tensor;

pub use autodiff::Gradients;
pub use builder::*;
pub use error::*;
pub use feed::*;
pub use node::*;
pub use optimizer::*;
pub use session::*;
pub use shape::*;
pub use tensor::*;
