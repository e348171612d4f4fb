// Copyright 2025 Irreducible Inc.

use condnet_graph::{Feed, Optimizer, Tensor};
use getset::Getters;
use tracing::instrument;

use super::{Network, Runtime, Scaffold};
use crate::{
	error::Error,
	hypers::CrHypers,
	lr::minimize_expected,
	objective::{self, Objective},
	router::RouterGen,
	routing::{estimate_costs, route, CrRouting, Policy, RouteOptions},
	tree::{LayerTree, Tree},
};

/// A cost regression network.
///
/// Routers predict the downstream cost of each branch, are trained to regress onto it and route
/// to the cheapest branch, exploring uniformly with probability `epsilon` during training. Router
/// learning rates are scaled by `1 / k_cre`.
#[derive(Debug, Getters)]
pub struct CrNet<O> {
	#[get = "pub"]
	hypers: CrHypers,
	#[get = "pub"]
	tree: Tree,
	#[get = "pub"]
	routing: CrRouting,
	#[get = "pub"]
	objective: Objective,
	runtime: Runtime<O>,
}

impl<O: Optimizer> CrNet<O> {
	#[instrument(skip_all, name = "CrNet::new")]
	pub fn new(
		x0_width: usize,
		y_width: usize,
		router_gen: impl RouterGen,
		optimizer: O,
		hypers: CrHypers,
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
				policy: Policy::CostRegression,
			},
		)?;
		let routing = estimate_costs(&mut scaffold.builder, &scaffold.tree, routing, &hypers)?;
		let objective = objective::cost_regression(
			&mut scaffold.builder,
			&scaffold.tree,
			&routing,
			hypers.k_cpt,
		)?;
		let train_step = minimize_expected(
			&mut scaffold.builder,
			&scaffold.tree,
			routing.routing(),
			objective.cost,
			routing.routing().train_updates(),
			1.0 / hypers.k_cre,
		)?;
		let (tree, runtime) = scaffold.finish(
			train_step,
			routing.routing().validation_updates(),
			optimizer,
			hypers.seed,
		);
		Ok(Self {
			hypers,
			tree,
			routing,
			objective,
			runtime,
		})
	}

	/// Updates the validation statistics. Returns the number of statistics written.
	#[instrument(skip_all, name = "CrNet::validate")]
	pub fn validate(&mut self, x0: &Tensor, y: &Tensor, feed: &Feed) -> Result<usize, Error> {
		self.runtime.validate(x0, y, feed)
	}
}

impl<O: Optimizer> Network for CrNet<O> {
	type Optimizer = O;

	const NAME: &'static str = "CrNet";

	fn runtime(&self) -> &Runtime<O> {
		&self.runtime
	}

	fn runtime_mut(&mut self) -> &mut Runtime<O> {
		&mut self.runtime
	}
}
