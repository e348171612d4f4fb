// Copyright 2025 Irreducible Inc.

use std::ops::Range;

use condnet_graph::{GraphBuilder, NodeId, ParamId};
use condnet_layers::{Chain, Layer, LayerOutputs, LinTrans};
use condnet_utils::ensure;
use getset::CopyGetters;

use crate::{error::Error, tree::TreeNode};

/// What a router generator knows about the layer it routes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterContext {
	/// Arena index of the routed layer.
	pub layer: usize,
	/// Number of branches the router must score.
	pub n_sinks: usize,
	/// Width of the layer output the router reads.
	pub input_width: usize,
	pub depth: usize,
}

/// Builds the router of a branching layer.
pub trait RouterGen {
	fn generate(&self, context: &RouterContext) -> Box<dyn Layer>;
}

impl<F> RouterGen for F
where
	F: Fn(&RouterContext) -> Box<dyn Layer>,
{
	fn generate(&self, context: &RouterContext) -> Box<dyn Layer> {
		self(context)
	}
}

/// Scores the branches with a single affine map of the layer output.
pub fn linear_router(context: &RouterContext) -> Box<dyn Layer> {
	Box::new(LinTrans::new(context.n_sinks))
}

/// A linked router.
#[derive(Debug, Clone, PartialEq, CopyGetters)]
pub struct Router {
	/// Branch scores in `x`, one column per sink. The identity router of a non-branching layer
	/// forwards the layer output and scores nothing.
	#[get_copy = "pub"]
	outputs: LayerOutputs,
	#[get_copy = "pub"]
	n_branches: usize,
	params: Range<usize>,
}

impl Router {
	pub fn params(&self) -> impl Iterator<Item = ParamId> {
		self.params.clone().map(ParamId::new)
	}

	/// Score of branch `index`, as a per-sample column.
	pub(crate) fn score(&self, builder: &mut GraphBuilder, index: usize) -> Result<NodeId, Error> {
		Ok(builder.column(self.outputs.x, index)?)
	}
}

/// Links the router of layer `index`: the identity for fewer than two sinks, otherwise whatever
/// `router_gen` builds, checked to score every sink.
pub(crate) fn link_router(
	builder: &mut GraphBuilder,
	index: usize,
	node: &TreeNode,
	mode: NodeId,
	router_gen: &dyn RouterGen,
) -> Result<Router, Error> {
	let input = node.outputs().x;
	let n_sinks = node.sinks().len();
	let layer: Box<dyn Layer> = if n_sinks < 2 {
		Box::new(Chain::identity())
	} else {
		router_gen.generate(&RouterContext {
			layer: index,
			n_sinks,
			input_width: builder.shape(input)?.cols,
			depth: node.depth(),
		})
	};

	builder.push_namespace(format!("router{index}"));
	let first_param = builder.n_params();
	let outputs = layer.link(builder, input, None, mode)?;
	let params = first_param..builder.n_params();
	builder.pop_namespace()?;

	let n_branches = if n_sinks < 2 { 0 } else { n_sinks };
	if n_branches > 0 {
		let scores = builder.shape(outputs.x)?;
		ensure!(
			scores.cols == n_sinks,
			Error::RouterBranchMismatch {
				layer: index,
				expected: n_sinks,
				actual: scores.cols,
			}
		);
	}
	let c_mod = builder.shape(outputs.c_mod)?;
	ensure!(
		c_mod.is_scalar(),
		Error::InvalidLayerOutput {
			layer: index,
			what: "router modeling cost",
			shape: c_mod,
		}
	);

	Ok(Router {
		outputs,
		n_branches,
		params,
	})
}
