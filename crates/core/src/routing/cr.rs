// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, NodeId};

use super::{BranchPolicy, Routing};
use crate::{error::Error, hypers::CrHypers, tree::Tree};

/// `π_ev = onehot(argmin(scores))`, `π_tr = ε/n + (1 − ε)·π_ev`.
///
/// Neither depends differentiably on the scores; routers learn from the regression loss alone.
pub(super) fn branch_policy(
	builder: &mut GraphBuilder,
	scores: NodeId,
	n_branches: usize,
	epsilon: f32,
) -> Result<BranchPolicy, Error> {
	let pi_ev = builder.one_hot_argmin(scores)?;
	let mixed = builder.scale(pi_ev, 1.0 - epsilon)?;
	Ok(BranchPolicy {
		pi_tr: builder.offset(mixed, epsilon / n_branches as f32)?,
		pi_ev,
	})
}

/// Per-sample cost estimates of the subtree rooted at a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimates {
	/// Cost of the subtree under the evaluation policy.
	pub c_ev: NodeId,
	/// Cost of the subtree under the best branch choices.
	pub c_opt: NodeId,
	/// Router regression loss; a constant zero for layers without a router.
	pub c_cre: NodeId,
}

/// Cost regression routing: the shared routing records plus cost estimates.
#[derive(Debug, Clone)]
pub struct CrRouting {
	routing: Routing,
	estimates: Vec<CostEstimates>,
}

impl CrRouting {
	pub fn routing(&self) -> &Routing {
		&self.routing
	}

	pub fn estimates(&self) -> &[CostEstimates] {
		&self.estimates
	}

	pub fn estimate(&self, index: usize) -> Option<&CostEstimates> {
		self.estimates.get(index)
	}
}

/// Computes cost estimates bottom-up.
///
/// A layer without a router adds its own cost to the sum of its sinks' estimates. A routed layer
/// uses its generalization cost, adds the estimate of the branch the evaluation policy picks (or
/// the cheapest branch for `c_opt`) and regresses each branch score onto that branch's estimate.
pub(crate) fn estimate_costs(
	builder: &mut GraphBuilder,
	tree: &Tree,
	routing: Routing,
	hypers: &CrHypers,
) -> Result<CrRouting, Error> {
	let mut estimates: Vec<Option<CostEstimates>> = vec![None; tree.len()];

	for (index, node) in tree.layers().collect::<Vec<_>>().into_iter().rev() {
		let routed = &routing.nodes[index];
		let compute = builder.scale(node.outputs().n_ops, hypers.k_cpt)?;
		// Sinks follow their parent in the arena and were estimated already.
		let sinks = node
			.sinks()
			.iter()
			.filter_map(|&sink| estimates[sink])
			.collect::<Vec<_>>();

		let estimate = match routed.policy() {
			None => {
				let own = builder.add(node.outputs().c_err, compute)?;
				let c_ev = builder.sum(std::iter::once(own).chain(sinks.iter().map(|s| s.c_ev)))?;
				let c_opt =
					builder.sum(std::iter::once(own).chain(sinks.iter().map(|s| s.c_opt)))?;
				CostEstimates {
					c_ev,
					c_opt,
					c_cre: builder.constant(0.0),
				}
			}
			Some(policy) => {
				let own = builder.add(routed.c_gen(), compute)?;

				let mut realized = vec![own];
				let mut regression = Vec::with_capacity(sinks.len());
				let mut best = None;
				for (branch, sink) in sinks.iter().enumerate() {
					let pi_ev = builder.column(policy.pi_ev, branch)?;
					realized.push(builder.mul(pi_ev, sink.c_ev)?);

					best = Some(match best {
						None => sink.c_opt,
						Some(best) => builder.minimum(best, sink.c_opt)?,
					});

					let target = if hypers.optimistic {
						sink.c_opt
					} else {
						sink.c_ev
					};
					let target = builder.stop_gradient(target)?;
					let score = routed.router().score(builder, branch)?;
					let residual = builder.sub(score, target)?;
					let squared = builder.square(residual)?;
					let pi_tr = builder.column(policy.pi_tr, branch)?;
					regression.push(builder.mul(pi_tr, squared)?);
				}

				let c_ev = builder.sum(realized)?;
				let c_opt = match best {
					Some(best) => builder.add(own, best)?,
					None => own,
				};
				let regression = builder.sum(regression)?;
				CostEstimates {
					c_ev,
					c_opt,
					c_cre: builder.scale(regression, hypers.k_cre)?,
				}
			}
		};
		estimates[index] = Some(estimate);
	}

	Ok(CrRouting {
		routing,
		estimates: estimates.into_iter().flatten().collect(),
	})
}
