// Copyright 2025 Irreducible Inc.

//! Propagation of path probabilities down a linked tree.
//!
//! Every layer gets a training-time path probability `p_tr`, an evaluation-time path probability
//! `p_ev`, running error statistics and a generalization cost `c_gen`. Layers with at least two
//! sinks also get a router and a pair of branch policies that split their path probabilities
//! among the sinks. Decision smoothing and cost regression differ only in how the router scores
//! become branch policies; cost regression additionally estimates downstream costs, see
//! [`CrRouting`].

mod cr;
mod ds;

use condnet_graph::{Assign, GraphBuilder, NodeId};
use getset::{CopyGetters, Getters};
use tracing::debug;

pub use self::cr::{CostEstimates, CrRouting};
pub(crate) use self::cr::estimate_costs;
use crate::{
	error::Error,
	router::{link_router, Router, RouterGen},
	stats::RunningStats,
	tree::Tree,
};

/// Training-time and evaluation-time probabilities, per sample, that a layer is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathProbabilities {
	pub p_tr: NodeId,
	pub p_ev: NodeId,
}

/// Per-branch probabilities of a branching layer, one column per sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchPolicy {
	pub pi_tr: NodeId,
	pub pi_ev: NodeId,
}

/// Routing record of one layer.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct RoutedNode {
	#[get_copy = "pub"]
	paths: PathProbabilities,
	#[get_copy = "pub"]
	c_gen: NodeId,
	#[get_copy = "pub"]
	stats: RunningStats,
	#[get = "pub"]
	router: Router,
	/// `None` for layers with fewer than two sinks, which pass their probabilities through.
	#[get_copy = "pub"]
	policy: Option<BranchPolicy>,
}

impl RoutedNode {
	pub fn p_tr(&self) -> NodeId {
		self.paths.p_tr
	}

	pub fn p_ev(&self) -> NodeId {
		self.paths.p_ev
	}
}

/// Routing records of a tree, indexed like the tree's arena.
#[derive(Debug, Clone)]
pub struct Routing {
	nodes: Vec<RoutedNode>,
}

impl Routing {
	pub fn nodes(&self) -> &[RoutedNode] {
		&self.nodes
	}

	pub fn node(&self, index: usize) -> Option<&RoutedNode> {
		self.nodes.get(index)
	}

	/// Statistics updates applied on every training batch.
	pub fn train_updates(&self) -> Vec<Assign> {
		self.nodes
			.iter()
			.flat_map(|node| node.stats.update_tr)
			.collect()
	}

	/// Statistics updates applied on every validation batch.
	pub fn validation_updates(&self) -> Vec<Assign> {
		self.nodes
			.iter()
			.flat_map(|node| node.stats.update_vl)
			.collect()
	}
}

/// How router scores turn into branch probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
	/// Soft mixture over the scores, exploit the highest.
	DecisionSmoothing,
	/// Scores are predicted costs, exploit the lowest.
	CostRegression,
}

pub(crate) struct RouteOptions<'a> {
	pub router_gen: &'a dyn RouterGen,
	pub mode: NodeId,
	pub epsilon: f32,
	pub lambda: f32,
	pub policy: Policy,
}

/// Routes `root` probabilities from the root of `tree` to every layer.
pub(crate) fn route(
	builder: &mut GraphBuilder,
	tree: &Tree,
	root: PathProbabilities,
	options: &RouteOptions,
) -> Result<Routing, Error> {
	// Parents precede their sinks in the arena, so every entry is set before it is read.
	let mut incoming = vec![root; tree.len()];
	let mut nodes = Vec::with_capacity(tree.len());

	for (index, node) in tree.layers() {
		let paths = incoming[index];
		let c_err = node.outputs().c_err;

		builder.push_namespace(format!("layer{index}"));
		let stats = RunningStats::link(builder, paths.p_tr, c_err, options.lambda)?;
		let c_gen = stats.generalization_cost(builder, c_err)?;
		builder.pop_namespace()?;

		let router = link_router(builder, index, node, options.mode, options.router_gen)?;
		let policy = if router.n_branches() > 0 {
			let scores = router.outputs().x;
			let n_branches = router.n_branches();
			let policy = match options.policy {
				Policy::DecisionSmoothing => {
					ds::branch_policy(builder, scores, n_branches, options.epsilon)?
				}
				Policy::CostRegression => {
					cr::branch_policy(builder, scores, n_branches, options.epsilon)?
				}
			};
			for (branch, &sink) in node.sinks().iter().enumerate() {
				let pi_tr = builder.column(policy.pi_tr, branch)?;
				let pi_ev = builder.column(policy.pi_ev, branch)?;
				incoming[sink] = PathProbabilities {
					p_tr: builder.mul(paths.p_tr, pi_tr)?,
					p_ev: builder.mul(paths.p_ev, pi_ev)?,
				};
			}
			Some(policy)
		} else {
			for &sink in node.sinks() {
				incoming[sink] = paths;
			}
			None
		};

		nodes.push(RoutedNode {
			paths,
			c_gen,
			stats,
			router,
			policy,
		});
	}

	debug!(
		policy = ?options.policy,
		routers = nodes.iter().filter(|node| node.policy.is_some()).count(),
		"routed layer tree"
	);
	Ok(Routing { nodes })
}
