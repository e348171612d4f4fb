// Copyright 2025 Irreducible Inc.

use std::ops::Range;

use condnet_graph::{GraphBuilder, NodeId, ParamId};
use condnet_layers::{Layer, LayerOutputs};
use condnet_utils::ensure;
use getset::{CopyGetters, Getters};
use tracing::debug;

use crate::error::Error;

/// A layer together with the subtrees its output feeds.
#[derive(Debug)]
pub struct LayerTree {
	layer: Box<dyn Layer>,
	sinks: Vec<LayerTree>,
}

impl LayerTree {
	pub fn leaf(layer: impl Layer + 'static) -> Self {
		Self {
			layer: Box::new(layer),
			sinks: Vec::new(),
		}
	}

	pub fn node(layer: impl Layer + 'static, sinks: impl IntoIterator<Item = LayerTree>) -> Self {
		Self {
			layer: Box::new(layer),
			sinks: sinks.into_iter().collect(),
		}
	}

	/// Appends a sink.
	pub fn with_sink(mut self, sink: LayerTree) -> Self {
		self.sinks.push(sink);
		self
	}
}

/// The placeholders every layer of a network shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholders {
	/// Network input, `(batch, x0_width)`.
	pub x0: NodeId,
	/// Target, `(batch, y_width)`.
	pub y: NodeId,
	pub mode: NodeId,
}

impl Placeholders {
	pub(crate) fn new(builder: &mut GraphBuilder, x0_width: usize, y_width: usize) -> Self {
		Self {
			x0: builder.placeholder("x0", x0_width),
			y: builder.placeholder("y", y_width),
			mode: builder.mode(),
		}
	}
}

/// A linked layer.
#[derive(Debug, Getters, CopyGetters)]
pub struct TreeNode {
	#[get_copy = "pub"]
	outputs: LayerOutputs,
	/// Arena indices of the sinks, in declaration order.
	#[get = "pub"]
	sinks: Vec<usize>,
	#[get_copy = "pub"]
	parent: Option<usize>,
	#[get_copy = "pub"]
	depth: usize,
	params: Range<usize>,
}

impl TreeNode {
	/// Parameters declared while linking the layer.
	pub fn params(&self) -> impl Iterator<Item = ParamId> {
		self.params.clone().map(ParamId::new)
	}

	pub fn is_leaf(&self) -> bool {
		self.sinks.is_empty()
	}
}

/// Arena of linked layers in depth-first pre-order; the root has index 0.
///
/// A parent always precedes its descendants, so iterating the arena backwards visits every
/// node after all of its sinks.
#[derive(Debug)]
pub struct Tree {
	nodes: Vec<TreeNode>,
}

impl Tree {
	/// Links every layer of `layers` exactly once. The root reads `input`, every other layer its
	/// parent's output.
	pub fn link(
		builder: &mut GraphBuilder,
		layers: LayerTree,
		input: NodeId,
		target: Option<NodeId>,
		mode: NodeId,
	) -> Result<Self, Error> {
		let mut tree = Self { nodes: Vec::new() };
		let mut linker = Linker {
			builder,
			target,
			mode,
		};
		linker.link_subtree(&mut tree.nodes, layers, input, None, 0)?;
		debug!(layers = tree.nodes.len(), leaves = tree.leaves().count(), "linked layer tree");
		Ok(tree)
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn node(&self, index: usize) -> Option<&TreeNode> {
		self.nodes.get(index)
	}

	/// All layers in depth-first pre-order with their arena indices.
	pub fn layers(&self) -> impl Iterator<Item = (usize, &TreeNode)> {
		self.nodes.iter().enumerate()
	}

	pub fn leaves(&self) -> impl Iterator<Item = (usize, &TreeNode)> {
		self.layers().filter(|(_, node)| node.is_leaf())
	}
}

struct Linker<'a> {
	builder: &'a mut GraphBuilder,
	target: Option<NodeId>,
	mode: NodeId,
}

impl Linker<'_> {
	fn link_subtree(
		&mut self,
		nodes: &mut Vec<TreeNode>,
		subtree: LayerTree,
		input: NodeId,
		parent: Option<usize>,
		depth: usize,
	) -> Result<usize, Error> {
		let index = nodes.len();
		let LayerTree { layer, sinks } = subtree;

		self.builder.push_namespace(format!("layer{index}"));
		let first_param = self.builder.n_params();
		let outputs = layer.link(self.builder, input, self.target, self.mode)?;
		let params = first_param..self.builder.n_params();
		self.builder.pop_namespace()?;
		self.check_outputs(index, &outputs)?;

		nodes.push(TreeNode {
			outputs,
			sinks: Vec::with_capacity(sinks.len()),
			parent,
			depth,
			params,
		});
		for sink in sinks {
			let sink_index = self.link_subtree(nodes, sink, outputs.x, Some(index), depth + 1)?;
			nodes[index].sinks.push(sink_index);
		}
		Ok(index)
	}

	fn check_outputs(&self, layer: usize, outputs: &LayerOutputs) -> Result<(), Error> {
		let c_err = self.builder.shape(outputs.c_err)?;
		ensure!(
			c_err.is_per_sample_like(),
			Error::InvalidLayerOutput {
				layer,
				what: "per-sample error",
				shape: c_err,
			}
		);
		let c_mod = self.builder.shape(outputs.c_mod)?;
		ensure!(
			c_mod.is_scalar(),
			Error::InvalidLayerOutput {
				layer,
				what: "modeling cost",
				shape: c_mod,
			}
		);
		let n_ops = self.builder.shape(outputs.n_ops)?;
		ensure!(
			n_ops.is_per_sample_like(),
			Error::InvalidLayerOutput {
				layer,
				what: "per-sample operation count",
				shape: n_ops,
			}
		);
		Ok(())
	}
}
