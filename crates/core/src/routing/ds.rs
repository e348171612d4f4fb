// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, NodeId};

use super::BranchPolicy;
use crate::error::Error;

/// `π_tr = ε/n + (1 − ε)·softmax(scores)`, `π_ev = onehot(argmax(scores))`.
pub(super) fn branch_policy(
	builder: &mut GraphBuilder,
	scores: NodeId,
	n_branches: usize,
	epsilon: f32,
) -> Result<BranchPolicy, Error> {
	let soft = builder.softmax_rows(scores)?;
	let mixed = builder.scale(soft, 1.0 - epsilon)?;
	Ok(BranchPolicy {
		pi_tr: builder.offset(mixed, epsilon / n_branches as f32)?,
		pi_ev: builder.one_hot_argmax(scores)?,
	})
}
