// Copyright 2025 Irreducible Inc.

use condnet_graph::{Assign, Feed, GraphBuilder, NodeId, Optimizer, ParamId, Session};
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::{error::Error, routing::Routing, tree::Tree};

/// Gradient step on a scalar cost, preceded by statistics updates.
#[derive(Debug, Clone)]
pub struct TrainStep {
	cost: NodeId,
	prerequisites: Vec<Assign>,
	scaling: Vec<ParamScale>,
}

/// Learning rate multiplier of a parameter; `None` leaves its gradient as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParamScale {
	param: ParamId,
	scale: Option<NodeId>,
}

/// Outcome of one [`TrainStep::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
	/// Cost of the batch before the update.
	pub cost: f32,
	/// Parameters the optimizer updated.
	pub updated: Vec<ParamId>,
	/// Statistics written by the prerequisite updates.
	pub stats_written: usize,
}

/// Builds a train step that normalizes learning rates by how much of the batch reaches each
/// layer.
///
/// The gradient of every parameter declared by a layer is multiplied by
/// `1 / sqrt(mean(p_tr²))` of that layer, and additionally by `lr_routing_scale` for parameters
/// of the layer's router. Parameters without a gradient, or whose layer no sample reached, are
/// left alone.
pub fn minimize_expected(
	builder: &mut GraphBuilder,
	tree: &Tree,
	routing: &Routing,
	cost: NodeId,
	prerequisites: Vec<Assign>,
	lr_routing_scale: f32,
) -> Result<TrainStep, Error> {
	let mut scaling = Vec::with_capacity(builder.n_params());
	for ((_, node), routed) in tree.layers().zip_eq(routing.nodes()) {
		let squared = builder.square(routed.p_tr())?;
		let mean_squared = builder.reduce_mean(squared)?;
		let norm = builder.sqrt(mean_squared)?;
		let one = builder.constant(1.0);
		let layer_scale = builder.div(one, norm)?;
		scaling.extend(node.params().map(|param| ParamScale {
			param,
			scale: Some(layer_scale),
		}));

		let mut router_params = routed.router().params().peekable();
		if router_params.peek().is_some() {
			let router_scale = builder.scale(layer_scale, lr_routing_scale)?;
			scaling.extend(router_params.map(|param| ParamScale {
				param,
				scale: Some(router_scale),
			}));
		}
	}
	scaling.sort_by_key(|entry| entry.param);
	Ok(TrainStep {
		cost,
		prerequisites,
		scaling,
	})
}

impl TrainStep {
	/// A step applying the raw gradients of `params`.
	pub fn plain(
		cost: NodeId,
		prerequisites: Vec<Assign>,
		params: impl IntoIterator<Item = ParamId>,
	) -> Self {
		Self {
			cost,
			prerequisites,
			scaling: params
				.into_iter()
				.map(|param| ParamScale { param, scale: None })
				.collect(),
		}
	}

	pub fn cost(&self) -> NodeId {
		self.cost
	}

	pub fn prerequisites(&self) -> &[Assign] {
		&self.prerequisites
	}

	/// Applies the prerequisites, then differentiates the cost against the updated statistics and
	/// hands the scaled gradients to `optimizer`.
	#[instrument(skip_all, level = "debug")]
	pub fn run<O: Optimizer + ?Sized>(
		&self,
		session: &mut Session,
		optimizer: &mut O,
		feed: &Feed,
	) -> Result<StepReport, Error> {
		let stats_written = session.assign(&self.prerequisites, feed)?;

		let targets = std::iter::once(self.cost)
			.chain(self.scaling.iter().filter_map(|entry| entry.scale))
			.unique()
			.collect::<Vec<_>>();
		let evaluation = session.evaluate(&targets, feed)?;
		let cost_value = evaluation.get(self.cost)?;
		let cost = cost_value
			.scalar_value()
			.ok_or(condnet_graph::Error::NonScalarCost(cost_value.dims()))?;
		let gradients = session.gradients(&evaluation, self.cost)?;

		let mut scaled = Vec::with_capacity(self.scaling.len());
		for entry in &self.scaling {
			let Some(gradient) = gradients.get(entry.param) else {
				continue;
			};
			let factor = match entry.scale {
				Some(scale) => evaluation.get(scale)?.scalar_value().unwrap_or(f32::NAN),
				None => 1.0,
			};
			if !factor.is_finite() {
				debug!(
					param = entry.param.index(),
					factor, "skipping parameter of unvisited layer"
				);
				continue;
			}
			scaled.push((entry.param, gradient.mapv(|g| g * factor)));
		}
		session.apply_gradients(optimizer, &scaled)?;

		Ok(StepReport {
			cost,
			updated: scaled.into_iter().map(|(param, _)| param).collect(),
			stats_written,
		})
	}
}
