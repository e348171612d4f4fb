// Copyright 2025 Irreducible Inc.

use condnet_graph::{Optimizer, ParamId};
use getset::Getters;
use tracing::instrument;

use super::{Network, Runtime, Scaffold};
use crate::{
	error::Error,
	hypers::SrHypers,
	lr::TrainStep,
	objective::{self, Objective},
	routing::PathProbabilities,
	tree::{LayerTree, Tree},
};

/// A statically routed network: every sample visits every layer.
///
/// Minimizes the batch mean of `Σ c_err + c_mod + k_cpt·n_ops` over all layers with plain
/// optimizer steps.
#[derive(Debug, Getters)]
pub struct SrNet<O> {
	#[get = "pub"]
	hypers: SrHypers,
	#[get = "pub"]
	tree: Tree,
	/// The same probability-one paths for every layer.
	#[get = "pub"]
	routing: Vec<PathProbabilities>,
	#[get = "pub"]
	objective: Objective,
	runtime: Runtime<O>,
}

impl<O: Optimizer> SrNet<O> {
	#[instrument(skip_all, name = "SrNet::new")]
	pub fn new(
		x0_width: usize,
		y_width: usize,
		optimizer: O,
		hypers: SrHypers,
		layers: LayerTree,
	) -> Result<Self, Error> {
		hypers.validate()?;
		let mut scaffold = Scaffold::new(x0_width, y_width, layers)?;
		let objective = objective::static_routing(
			&mut scaffold.builder,
			&scaffold.tree,
			scaffold.root,
			hypers.k_cpt,
		)?;
		let routing = vec![scaffold.root; scaffold.tree.len()];
		let train_step = TrainStep::plain(
			objective.cost,
			Vec::new(),
			(0..scaffold.builder.n_params()).map(ParamId::new),
		);
		let (tree, runtime) = scaffold.finish(train_step, Vec::new(), optimizer, hypers.seed);
		Ok(Self {
			hypers,
			tree,
			routing,
			objective,
			runtime,
		})
	}
}

impl<O: Optimizer> Network for SrNet<O> {
	type Optimizer = O;

	const NAME: &'static str = "SrNet";

	fn runtime(&self) -> &Runtime<O> {
		&self.runtime
	}

	fn runtime_mut(&mut self) -> &mut Runtime<O> {
		&mut self.runtime
	}
}
