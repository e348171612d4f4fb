// Copyright 2025 Irreducible Inc.

use condnet_graph::{Feed, Optimizer, Tensor};
use getset::Getters;
use tracing::instrument;

use super::{Network, Runtime, Scaffold};
use crate::{
	error::Error,
	hypers::DsHypers,
	lr::minimize_expected,
	objective::{self, Objective},
	router::RouterGen,
	routing::{route, Policy, RouteOptions, Routing},
	tree::{LayerTree, Tree},
};

/// A decision smoothing network.
///
/// Routers mix their branches with a softmax during training and follow the highest score at
/// evaluation. The objective sums, per layer, the path-weighted generalization cost, compute
/// cost and modeling cost, where modeling costs do not propagate into the routing.
#[derive(Debug, Getters)]
pub struct DsNet<O> {
	#[get = "pub"]
	hypers: DsHypers,
	#[get = "pub"]
	tree: Tree,
	#[get = "pub"]
	routing: Routing,
	#[get = "pub"]
	objective: Objective,
	runtime: Runtime<O>,
}

impl<O: Optimizer> DsNet<O> {
	#[instrument(skip_all, name = "DsNet::new")]
	pub fn new(
		x0_width: usize,
		y_width: usize,
		router_gen: impl RouterGen,
		optimizer: O,
		hypers: DsHypers,
		layers: LayerTree,
	) -> Result<Self, Error> {
		hypers.validate()?;
		let mut scaffold = Scaffold::new(x0_width, y_width, layers)?;
		let routing = route(
			&mut scaffold.builder,
			&scaffold.tree,
			scaffold.root,
			&RouteOptions {
				router_gen: &router_gen,
				mode: scaffold.placeholders.mode,
				epsilon: hypers.epsilon,
				lambda: hypers.lambda,
				policy: Policy::DecisionSmoothing,
			},
		)?;
		let objective = objective::decision_smoothing(
			&mut scaffold.builder,
			&scaffold.tree,
			&routing,
			hypers.k_cpt,
		)?;
		let train_step = minimize_expected(
			&mut scaffold.builder,
			&scaffold.tree,
			&routing,
			objective.cost,
			routing.train_updates(),
			1.0,
		)?;
		let (tree, runtime) =
			scaffold.finish(train_step, routing.validation_updates(), optimizer, hypers.seed);
		Ok(Self {
			hypers,
			tree,
			routing,
			objective,
			runtime,
		})
	}

	/// Updates the validation statistics. Returns the number of statistics written.
	#[instrument(skip_all, name = "DsNet::validate")]
	pub fn validate(&mut self, x0: &Tensor, y: &Tensor, feed: &Feed) -> Result<usize, Error> {
		self.runtime.validate(x0, y, feed)
	}
}

impl<O: Optimizer> Network for DsNet<O> {
	type Optimizer = O;

	const NAME: &'static str = "DsNet";

	fn runtime(&self) -> &Runtime<O> {
		&self.runtime
	}

	fn runtime_mut(&mut self) -> &mut Runtime<O> {
		&mut self.runtime
	}
}
