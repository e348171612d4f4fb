// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use condnet_utils::{bail, ensure};
use itertools::Itertools;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, instrument};

use crate::{
	autodiff::{self, Gradients},
	builder::Graph,
	error::Error,
	feed::Feed,
	node::{Assign, Init, Node, NodeId, Op, ParamId, ParamSpec, StatId},
	optimizer::Optimizer,
	tensor::Tensor,
};

/// Concrete state of a [`Graph`]: parameter tensors and statistic values.
///
/// A session executes the graph against feeds. Nothing but the parameters and statistics
/// survives between calls.
#[derive(Debug, Clone)]
pub struct Session {
	graph: Arc<Graph>,
	params: Vec<Tensor>,
	stats: Vec<f32>,
}

impl Session {
	/// Creates a session with freshly initialized parameters.
	pub fn new(graph: Arc<Graph>, rng: &mut impl Rng) -> Self {
		let params = graph
			.params()
			.iter()
			.map(|spec| init_param(spec, rng))
			.collect();
		let stats = graph.stats().iter().map(|spec| spec.init).collect();
		Self {
			graph,
			params,
			stats,
		}
	}

	pub fn with_seed(graph: Arc<Graph>, seed: u64) -> Self {
		Self::new(graph, &mut StdRng::seed_from_u64(seed))
	}

	pub fn graph(&self) -> &Graph {
		&self.graph
	}

	pub fn param(&self, id: ParamId) -> Option<&Tensor> {
		self.params.get(id.index())
	}

	pub fn set_param(&mut self, id: ParamId, value: Tensor) -> Result<(), Error> {
		let spec = self
			.graph
			.params()
			.get(id.index())
			.ok_or(Error::UnknownParam(id))?;
		ensure!(
			value.dims() == (spec.rows, spec.cols),
			Error::ParamShapeMismatch {
				name: spec.name.clone(),
				expected: (spec.rows, spec.cols),
				actual: value.dims(),
			}
		);
		self.params[id.index()] = value;
		Ok(())
	}

	pub fn stat(&self, id: StatId) -> Option<f32> {
		self.stats.get(id.index()).copied()
	}

	pub fn set_stat(&mut self, id: StatId, value: f32) -> Result<(), Error> {
		let slot = self
			.stats
			.get_mut(id.index())
			.ok_or(Error::UnknownStat(id))?;
		*slot = value;
		Ok(())
	}

	/// Computes the values of `targets`.
	pub fn run(&self, targets: &[NodeId], feed: &Feed) -> Result<Vec<Tensor>, Error> {
		let evaluation = self.evaluate(targets, feed)?;
		targets
			.iter()
			.map(|&target| evaluation.get(target).cloned())
			.collect()
	}

	/// Computes `targets` and every node they depend on, keeping all intermediate values.
	pub fn evaluate(&self, targets: &[NodeId], feed: &Feed) -> Result<Evaluation, Error> {
		let nodes = self.graph.nodes();

		let mut needed = vec![false; nodes.len()];
		let mut stack = Vec::with_capacity(targets.len());
		for &target in targets {
			self.graph.node(target)?;
			stack.push(target);
		}
		while let Some(id) = stack.pop() {
			if needed[id.index()] {
				continue;
			}
			needed[id.index()] = true;
			if !feed.contains(id) {
				stack.extend(nodes[id.index()].op.inputs());
			}
		}

		let mut evaluation = Evaluation {
			values: vec![None; nodes.len()],
			fed: vec![false; nodes.len()],
			batch_size: None,
		};
		for (index, node) in nodes.iter().enumerate() {
			if !needed[index] {
				continue;
			}
			let id = NodeId(index);
			let value = match feed.get(id) {
				Some(value) => {
					ensure!(
						node.shape.admits(value),
						Error::FeedShapeMismatch {
							node: id,
							expected: node.shape,
							actual: value.dims(),
						}
					);
					evaluation.fed[index] = true;
					value.clone()
				}
				None => self.compute(node, &evaluation, feed)?,
			};
			if node.shape.is_batched() {
				evaluation.observe_batch(value.rows())?;
			}
			evaluation.values[index] = Some(value);
		}
		Ok(evaluation)
	}

	fn compute(&self, node: &Node, evaluation: &Evaluation, feed: &Feed) -> Result<Tensor, Error> {
		let value = |id: NodeId| evaluation.get(id);
		let tensor = match &node.op {
			Op::Placeholder { name } => bail!(Error::MissingFeed { name: name.clone() }),
			Op::Mode => Tensor::scalar(feed.mode().flag()),
			Op::Const(constant) => Tensor::scalar(*constant),
			Op::FillLike { like, value: fill } => Tensor::full(value(*like)?.rows(), 1, *fill),
			Op::Param(id) => self
				.params
				.get(id.index())
				.cloned()
				.ok_or(Error::UnknownParam(*id))?,
			Op::Stat(id) => Tensor::scalar(self.stat(*id).ok_or(Error::UnknownStat(*id))?),
			Op::Add(lhs, rhs) => value(*lhs)?.add(value(*rhs)?)?,
			Op::Sub(lhs, rhs) => value(*lhs)?.sub(value(*rhs)?)?,
			Op::Mul(lhs, rhs) => value(*lhs)?.mul(value(*rhs)?)?,
			Op::Div(lhs, rhs) => value(*lhs)?.div(value(*rhs)?)?,
			Op::Minimum(lhs, rhs) => {
				value(*lhs)?.zip_map(value(*rhs)?, |a, b| if b < a { b } else { a })?
			}
			Op::Square(x) => value(*x)?.mapv(|a| a * a),
			Op::Sqrt(x) => value(*x)?.mapv(f32::sqrt),
			Op::Exp(x) => value(*x)?.mapv(f32::exp),
			Op::Log(x) => value(*x)?.mapv(f32::ln),
			Op::Relu(x) => value(*x)?.mapv(|a| a.max(0.0)),
			Op::MatMul(lhs, rhs) => value(*lhs)?.matmul(value(*rhs)?)?,
			Op::SoftmaxRows(x) => value(*x)?.softmax_rows(),
			Op::OneHotArgMax(x) => value(*x)?.one_hot_argmax(),
			Op::OneHotArgMin(x) => value(*x)?.one_hot_argmin(),
			Op::Column(x, index) => value(*x)?.column_at(*index)?,
			Op::RowSum(x) => value(*x)?.row_sums(),
			Op::ReduceSum(x) => Tensor::scalar(value(*x)?.sum()),
			Op::ReduceMean(x) => Tensor::scalar(value(*x)?.mean().unwrap_or(f32::NAN)),
			Op::StopGradient(x) => value(*x)?.clone(),
		};
		Ok(tensor)
	}

	/// Reverse-mode gradients of the scalar `cost` with respect to every parameter.
	pub fn gradients(&self, evaluation: &Evaluation, cost: NodeId) -> Result<Gradients, Error> {
		autodiff::gradients(&self.graph, evaluation, cost)
	}

	/// Applies a group of statistic assignments.
	///
	/// All values are computed before any statistic is written. An assignment whose value is not
	/// finite is skipped. Returns the number of statistics written.
	#[instrument(skip_all, level = "debug")]
	pub fn assign(&mut self, updates: &[Assign], feed: &Feed) -> Result<usize, Error> {
		if updates.is_empty() {
			return Ok(0);
		}
		let targets = updates.iter().map(|update| update.value).collect::<Vec<_>>();
		let evaluation = self.evaluate(&targets, feed)?;
		let values = updates
			.iter()
			.map(|update| {
				let tensor = evaluation.get(update.value)?;
				tensor
					.scalar_value()
					.ok_or(Error::NonScalarCost(tensor.dims()))
			})
			.collect::<Result<Vec<_>, _>>()?;

		let mut written = 0;
		for (update, value) in updates.iter().zip_eq(values) {
			let slot = self
				.stats
				.get_mut(update.stat.index())
				.ok_or(Error::UnknownStat(update.stat))?;
			if value.is_finite() {
				*slot = value;
				written += 1;
			} else {
				debug!(
					stat = %self.graph.stats()[update.stat.index()].name,
					value,
					"skipping non-finite statistics update"
				);
			}
		}
		Ok(written)
	}

	/// Hands each `(parameter, gradient)` pair to the optimizer.
	pub fn apply_gradients<O: Optimizer + ?Sized>(
		&mut self,
		optimizer: &mut O,
		gradients: &[(ParamId, Tensor)],
	) -> Result<(), Error> {
		for (id, gradient) in gradients {
			let param = self
				.params
				.get_mut(id.index())
				.ok_or(Error::UnknownParam(*id))?;
			ensure!(
				param.dims() == gradient.dims(),
				Error::ParamShapeMismatch {
					name: self.graph.params()[id.index()].name.clone(),
					expected: param.dims(),
					actual: gradient.dims(),
				}
			);
			optimizer.apply(*id, param, gradient);
		}
		Ok(())
	}
}

fn init_param(spec: &ParamSpec, rng: &mut impl Rng) -> Tensor {
	match spec.init {
		Init::Zeros => Tensor::zeros(spec.rows, spec.cols),
		Init::Constant(value) => Tensor::full(spec.rows, spec.cols, value),
		Init::GlorotUniform => {
			let fan = spec.rows + spec.cols;
			if fan == 0 {
				return Tensor::zeros(spec.rows, spec.cols);
			}
			let limit = (6.0 / fan as f32).sqrt();
			Array2::from_shape_simple_fn((spec.rows, spec.cols), || rng.gen_range(-limit..=limit))
				.into()
		}
	}
}

/// Values computed by one [`Session::evaluate`] call.
#[derive(Debug, Clone)]
pub struct Evaluation {
	values: Vec<Option<Tensor>>,
	fed: Vec<bool>,
	batch_size: Option<usize>,
}

impl Evaluation {
	pub fn get(&self, id: NodeId) -> Result<&Tensor, Error> {
		self.values
			.get(id.index())
			.and_then(Option::as_ref)
			.ok_or(Error::NotEvaluated(id))
	}

	/// Whether the node's value came from the feed instead of being computed.
	pub fn is_fed(&self, id: NodeId) -> bool {
		self.fed.get(id.index()).copied().unwrap_or(false)
	}

	fn observe_batch(&mut self, rows: usize) -> Result<(), Error> {
		match self.batch_size {
			None => self.batch_size = Some(rows),
			Some(first) if first != rows => bail!(Error::BatchSizeMismatch {
				first,
				second: rows,
			}),
			Some(_) => {}
		}
		Ok(())
	}
}
