// Copyright 2025 Irreducible Inc.

mod cr;
mod ds;
mod sr;

use std::sync::Arc;

use condnet_graph::{Assign, Feed, GraphBuilder, Mode, NodeId, Optimizer, Session, Tensor};
use tracing::{debug, instrument};

pub use self::{cr::CrNet, ds::DsNet, sr::SrNet};
use crate::{
	error::Error,
	lr::{StepReport, TrainStep},
	routing::PathProbabilities,
	tree::{LayerTree, Placeholders, Tree},
};

/// Graph under construction with the tree linked to the network placeholders.
struct Scaffold {
	builder: GraphBuilder,
	placeholders: Placeholders,
	tree: Tree,
	/// Probability one for every sample.
	root: PathProbabilities,
}

impl Scaffold {
	fn new(x0_width: usize, y_width: usize, layers: LayerTree) -> Result<Self, Error> {
		let mut builder = GraphBuilder::new();
		let placeholders = Placeholders::new(&mut builder, x0_width, y_width);
		let tree = Tree::link(
			&mut builder,
			layers,
			placeholders.x0,
			Some(placeholders.y),
			placeholders.mode,
		)?;
		let ones = builder.ones_like(placeholders.x0)?;
		Ok(Self {
			builder,
			placeholders,
			tree,
			root: PathProbabilities {
				p_tr: ones,
				p_ev: ones,
			},
		})
	}

	/// Freezes the graph and starts a session.
	fn finish<O>(
		self,
		train_step: TrainStep,
		validation_updates: Vec<Assign>,
		optimizer: O,
		seed: u64,
	) -> (Tree, Runtime<O>) {
		let graph = Arc::new(self.builder.build());
		debug!(
			nodes = graph.nodes().len(),
			params = graph.params().len(),
			stats = graph.stats().len(),
			"network graph ready"
		);
		let runtime = Runtime {
			placeholders: self.placeholders,
			session: Session::with_seed(graph, seed),
			optimizer,
			train_step,
			validation_updates,
		};
		(self.tree, runtime)
	}
}

/// Execution state shared by all network variants.
#[derive(Debug)]
pub struct Runtime<O> {
	placeholders: Placeholders,
	session: Session,
	optimizer: O,
	train_step: TrainStep,
	validation_updates: Vec<Assign>,
}

impl<O: Optimizer> Runtime<O> {
	/// Binds the batch, then applies `overrides` on top.
	fn feed(&self, x0: &Tensor, y: &Tensor, mode: Option<Mode>, overrides: &Feed) -> Feed {
		let mut feed = Feed::new()
			.with(self.placeholders.x0, x0.clone())
			.with(self.placeholders.y, y.clone());
		if let Some(mode) = mode {
			feed = feed.with_mode(mode);
		}
		feed.overridden_by(overrides)
	}

	fn train(&mut self, x0: &Tensor, y: &Tensor, overrides: &Feed) -> Result<StepReport, Error> {
		let feed = self.feed(x0, y, Some(Mode::Train), overrides);
		let report = self
			.train_step
			.run(&mut self.session, &mut self.optimizer, &feed)?;
		debug!(cost = report.cost, updated = report.updated.len(), "train step");
		Ok(report)
	}

	fn validate(&mut self, x0: &Tensor, y: &Tensor, overrides: &Feed) -> Result<usize, Error> {
		let feed = self.feed(x0, y, None, overrides);
		Ok(self.session.assign(&self.validation_updates, &feed)?)
	}

	fn eval(
		&self,
		targets: &[NodeId],
		x0: &Tensor,
		y: &Tensor,
		overrides: &Feed,
	) -> Result<Vec<Tensor>, Error> {
		let feed = self.feed(x0, y, None, overrides);
		Ok(self.session.run(targets, &feed)?)
	}
}

/// Execution entry points shared by all network variants.
///
/// Every call binds `x0` and `y` to the network placeholders; entries of `feed` override them
/// and may bind any other node.
pub trait Network {
	type Optimizer: Optimizer;

	/// Short name used in tracing spans.
	const NAME: &'static str;

	fn runtime(&self) -> &Runtime<Self::Optimizer>;

	fn runtime_mut(&mut self) -> &mut Runtime<Self::Optimizer>;

	fn placeholders(&self) -> Placeholders {
		self.runtime().placeholders
	}

	fn session(&self) -> &Session {
		&self.runtime().session
	}

	fn session_mut(&mut self) -> &mut Session {
		&mut self.runtime_mut().session
	}

	/// Updates the training statistics, if any, then takes one gradient step in training mode.
	#[instrument(skip_all, fields(net = Self::NAME))]
	fn train(&mut self, x0: &Tensor, y: &Tensor, feed: &Feed) -> Result<StepReport, Error> {
		self.runtime_mut().train(x0, y, feed)
	}

	/// Evaluates `targets` under the mode bound in `feed`, evaluation by default.
	#[instrument(skip_all, fields(net = Self::NAME))]
	fn eval(
		&self,
		targets: &[NodeId],
		x0: &Tensor,
		y: &Tensor,
		feed: &Feed,
	) -> Result<Vec<Tensor>, Error> {
		self.runtime().eval(targets, x0, y, feed)
	}
}
