// Copyright 2025 Irreducible Inc.

use std::fmt::Debug;

use auto_impl::auto_impl;
use condnet_graph::{GraphBuilder, NodeId};

use crate::error::Error;

/// Nodes a linked layer exposes to the network around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerOutputs {
	/// Output forwarded to the layer's sinks and router.
	pub x: NodeId,
	/// Per-sample error signal, shape `(batch, 1)`.
	pub c_err: NodeId,
	/// Scalar modeling cost, e.g. a weight penalty.
	pub c_mod: NodeId,
	/// Operations spent per sample, either a `(batch, 1)` column or a scalar shared by every
	/// sample.
	pub n_ops: NodeId,
}

/// A unit of computation in a network.
///
/// `link` is called exactly once per layer and network. Parameters the layer declares are
/// attributed to it by the caller, which also opens a namespace for their names.
#[auto_impl(&, Box)]
pub trait Layer: Debug {
	fn link(
		&self,
		builder: &mut GraphBuilder,
		input: NodeId,
		target: Option<NodeId>,
		mode: NodeId,
	) -> Result<LayerOutputs, Error>;
}
