// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, NodeId};

use crate::{
	error::Error,
	routing::{CrRouting, PathProbabilities, Routing},
	tree::Tree,
};

/// The scalar training cost of a network and its per-sample parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Objective {
	/// Batch mean of the sum of the per-sample parts.
	pub cost: NodeId,
	/// `Σ p_tr·c_gen`; the plain error sum under static routing.
	pub c_gen: NodeId,
	/// `Σ p_tr·k_cpt·n_ops`.
	pub c_cpt: NodeId,
	/// Layer and router modeling costs weighted by path probability.
	pub c_mod: NodeId,
	/// `Σ p_tr·c_cre`, cost regression only.
	pub c_cre: Option<NodeId>,
}

/// How modeling costs are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelingWeight {
	/// By `p_tr`, with gradients flowing into the routing.
	PathProbability,
	/// By `p_tr` treated as a constant.
	FrozenPathProbability,
}

struct NodeTerms {
	p_tr: NodeId,
	c_gen: NodeId,
	n_ops: NodeId,
	c_mod: Vec<NodeId>,
	c_cre: Option<NodeId>,
}

/// `mean(Σ c_err + c_mod + k_cpt·n_ops)` with every layer reached with probability one.
pub(crate) fn static_routing(
	builder: &mut GraphBuilder,
	tree: &Tree,
	paths: PathProbabilities,
	k_cpt: f32,
) -> Result<Objective, Error> {
	let nodes = tree
		.layers()
		.map(|(_, node)| NodeTerms {
			p_tr: paths.p_tr,
			c_gen: node.outputs().c_err,
			n_ops: node.outputs().n_ops,
			c_mod: vec![node.outputs().c_mod],
			c_cre: None,
		})
		.collect();
	assemble(builder, nodes, k_cpt, ModelingWeight::PathProbability)
}

/// Decision smoothing: modeling costs do not train the routers.
pub(crate) fn decision_smoothing(
	builder: &mut GraphBuilder,
	tree: &Tree,
	routing: &Routing,
	k_cpt: f32,
) -> Result<Objective, Error> {
	let nodes = routed_terms(tree, routing, None);
	assemble(builder, nodes, k_cpt, ModelingWeight::FrozenPathProbability)
}

/// Cost regression: adds the router regression losses.
pub(crate) fn cost_regression(
	builder: &mut GraphBuilder,
	tree: &Tree,
	routing: &CrRouting,
	k_cpt: f32,
) -> Result<Objective, Error> {
	let nodes = routed_terms(tree, routing.routing(), Some(routing));
	assemble(builder, nodes, k_cpt, ModelingWeight::PathProbability)
}

fn routed_terms(
	tree: &Tree,
	routing: &Routing,
	cost_regression: Option<&CrRouting>,
) -> Vec<NodeTerms> {
	tree.layers()
		.zip(routing.nodes())
		.map(|((index, node), routed)| NodeTerms {
			p_tr: routed.p_tr(),
			c_gen: routed.c_gen(),
			n_ops: node.outputs().n_ops,
			c_mod: vec![node.outputs().c_mod, routed.router().outputs().c_mod],
			c_cre: cost_regression
				.and_then(|routing| routing.estimate(index))
				.map(|estimate| estimate.c_cre),
		})
		.collect()
}

fn assemble(
	builder: &mut GraphBuilder,
	nodes: Vec<NodeTerms>,
	k_cpt: f32,
	modeling: ModelingWeight,
) -> Result<Objective, Error> {
	let mut c_gen = Vec::with_capacity(nodes.len());
	let mut c_cpt = Vec::with_capacity(nodes.len());
	let mut c_mod = Vec::with_capacity(nodes.len());
	let mut c_cre = Vec::new();

	for node in nodes {
		c_gen.push(builder.mul(node.p_tr, node.c_gen)?);
		let compute = builder.scale(node.n_ops, k_cpt)?;
		c_cpt.push(builder.mul(node.p_tr, compute)?);

		let weight = match modeling {
			ModelingWeight::PathProbability => node.p_tr,
			ModelingWeight::FrozenPathProbability => builder.stop_gradient(node.p_tr)?,
		};
		let modeling_cost = builder.sum(node.c_mod)?;
		c_mod.push(builder.mul(weight, modeling_cost)?);

		if let Some(regression) = node.c_cre {
			c_cre.push(builder.mul(node.p_tr, regression)?);
		}
	}

	let c_gen = builder.sum(c_gen)?;
	let c_cpt = builder.sum(c_cpt)?;
	let c_mod = builder.sum(c_mod)?;
	let c_cre = if c_cre.is_empty() {
		None
	} else {
		Some(builder.sum(c_cre)?)
	};

	let total = builder.sum([c_gen, c_cpt, c_mod].into_iter().chain(c_cre))?;
	Ok(Objective {
		cost: builder.reduce_mean(total)?,
		c_gen,
		c_cpt,
		c_mod,
		c_cre,
	})
}
