// Copyright 2025 Irreducible Inc.

use condnet_utils::ensure;
use ndarray::Array2;
use tracing::instrument;

use crate::{
	builder::Graph,
	error::Error,
	node::{NodeId, Op, ParamId},
	session::Evaluation,
	tensor::Tensor,
};

/// Gradients of a scalar with respect to the parameters of a graph.
///
/// A parameter without a differentiable path to the differentiated node has no entry, which is
/// different from an entry of zeros.
#[derive(Debug, Clone, Default)]
pub struct Gradients {
	by_param: Vec<Option<Tensor>>,
}

impl Gradients {
	pub fn get(&self, id: ParamId) -> Option<&Tensor> {
		self.by_param.get(id.index()).and_then(Option::as_ref)
	}

	pub fn into_vec(self) -> Vec<(ParamId, Tensor)> {
		self.by_param
			.into_iter()
			.enumerate()
			.filter_map(|(index, gradient)| gradient.map(|g| (ParamId::new(index), g)))
			.collect()
	}
}

#[instrument(skip_all, level = "debug")]
pub(crate) fn gradients(
	graph: &Graph,
	evaluation: &Evaluation,
	cost: NodeId,
) -> Result<Gradients, Error> {
	let cost_value = evaluation.get(cost)?;
	ensure!(cost_value.dims() == (1, 1), Error::NonScalarCost(cost_value.dims()));

	let nodes = &graph.nodes()[..=cost.index()];

	// Whether a node depends differentiably on any parameter. Fed nodes are constants.
	let mut reaches_param = vec![false; nodes.len()];
	for (index, node) in nodes.iter().enumerate() {
		reaches_param[index] = !evaluation.is_fed(NodeId(index))
			&& match node.op {
				Op::Param(_) => true,
				_ => node
					.op
					.differentiable_inputs()
					.iter()
					.any(|input| reaches_param[input.index()]),
			};
	}

	let mut by_param = vec![None; graph.params().len()];
	let mut adjoints: Vec<Option<Tensor>> = vec![None; nodes.len()];
	adjoints[cost.index()] = Some(Tensor::scalar(1.0));

	for index in (0..nodes.len()).rev() {
		if !reaches_param[index] {
			continue;
		}
		let Some(adjoint) = adjoints[index].take() else {
			continue;
		};
		let op = &nodes[index].op;
		if let Op::Param(param) = op {
			accumulate(&mut by_param[param.index()], adjoint)?;
			continue;
		}
		let output = evaluation.get(NodeId(index))?;
		for (input, contribution) in vector_jacobian_products(op, output, &adjoint, evaluation)? {
			if reaches_param[input.index()] {
				accumulate(&mut adjoints[input.index()], contribution)?;
			}
		}
	}

	Ok(Gradients { by_param })
}

fn accumulate(slot: &mut Option<Tensor>, contribution: Tensor) -> Result<(), Error> {
	*slot = Some(match slot.take() {
		Some(existing) => existing.add(&contribution)?,
		None => contribution,
	});
	Ok(())
}

/// Pulls the adjoint `g` of an operation's output back to its differentiable inputs.
fn vector_jacobian_products(
	op: &Op,
	output: &Tensor,
	g: &Tensor,
	evaluation: &Evaluation,
) -> Result<Vec<(NodeId, Tensor)>, Error> {
	let value = |id: NodeId| evaluation.get(id);
	let unbroadcast = |id: NodeId, t: Tensor| -> Result<(NodeId, Tensor), Error> {
		let (rows, cols) = evaluation.get(id)?.dims();
		Ok((id, t.reduce_to(rows, cols)?))
	};

	let products = match *op {
		Op::Add(lhs, rhs) => vec![unbroadcast(lhs, g.clone())?, unbroadcast(rhs, g.clone())?],
		Op::Sub(lhs, rhs) => vec![unbroadcast(lhs, g.clone())?, unbroadcast(rhs, g.mapv(|v| -v))?],
		Op::Mul(lhs, rhs) => vec![
			unbroadcast(lhs, g.mul(value(rhs)?)?)?,
			unbroadcast(rhs, g.mul(value(lhs)?)?)?,
		],
		Op::Div(lhs, rhs) => {
			let b = value(rhs)?;
			vec![
				unbroadcast(lhs, g.div(b)?)?,
				unbroadcast(rhs, g.mul(output)?.div(b)?.mapv(|v| -v))?,
			]
		}
		Op::Minimum(lhs, rhs) => {
			// 1 where the lhs was selected, matching the forward tie-break.
			let picks_lhs =
				value(lhs)?.zip_map(value(rhs)?, |a, b| if b < a { 0.0 } else { 1.0 })?;
			vec![
				unbroadcast(lhs, g.mul(&picks_lhs)?)?,
				unbroadcast(rhs, g.zip_map(&picks_lhs, |g, m| g * (1.0 - m))?)?,
			]
		}
		Op::Square(x) => vec![(x, g.zip_map(value(x)?, |g, a| 2.0 * a * g)?)],
		Op::Sqrt(x) => vec![(x, g.zip_map(output, |g, s| g / (2.0 * s))?)],
		Op::Exp(x) => vec![(x, g.mul(output)?)],
		Op::Log(x) => vec![(x, g.div(value(x)?)?)],
		Op::Relu(x) => vec![(x, g.zip_map(value(x)?, |g, a| if a > 0.0 { g } else { 0.0 })?)],
		Op::MatMul(lhs, rhs) => vec![
			(lhs, g.matmul(&value(rhs)?.transpose())?),
			(rhs, value(lhs)?.transpose().matmul(g)?),
		],
		Op::SoftmaxRows(x) => {
			let weighted = g.mul(output)?.row_sums();
			vec![(x, g.sub(&weighted)?.mul(output)?)]
		}
		Op::Column(x, index) => {
			let mut scattered = Array2::zeros(value(x)?.raw_dim());
			scattered.column_mut(index).assign(&g.array().column(0));
			vec![(x, Tensor::from(scattered))]
		}
		Op::RowSum(x) | Op::ReduceSum(x) => {
			let (rows, cols) = value(x)?.dims();
			vec![(x, g.broadcast_to(rows, cols)?)]
		}
		Op::ReduceMean(x) => {
			let (rows, cols) = value(x)?.dims();
			let count = (rows * cols).max(1) as f32;
			vec![(x, g.mapv(|v| v / count).broadcast_to(rows, cols)?)]
		}
		Op::Placeholder { .. }
		| Op::Mode
		| Op::Const(_)
		| Op::FillLike { .. }
		| Op::Param(_)
		| Op::Stat(_)
		| Op::OneHotArgMax(_)
		| Op::OneHotArgMin(_)
		| Op::StopGradient(_) => vec![],
	};
	Ok(products)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::{builder::GraphBuilder, feed::Feed, node::Init, session::Session};

	fn inputs() -> Tensor {
		Tensor::from_rows(&[[1.0f32, 2.0], [-0.5, 0.7], [0.2, -1.0]]).unwrap()
	}

	/// Central differences of the cost with respect to every entry of `param`.
	fn numeric_gradient(
		session: &mut Session,
		feed: &Feed,
		cost: NodeId,
		param: ParamId,
	) -> Tensor {
		let eps = 1e-2;
		let original = session.param(param).unwrap().clone();
		let mut gradient = Tensor::zeros(original.rows(), original.cols());
		for (index, _) in original.indexed_iter() {
			let mut shifted = original.clone();
			shifted.array_mut()[index] += eps;
			session.set_param(param, shifted.clone()).unwrap();
			let plus = session.run(&[cost], feed).unwrap()[0].scalar_value().unwrap();
			shifted.array_mut()[index] -= 2.0 * eps;
			session.set_param(param, shifted).unwrap();
			let minus = session.run(&[cost], feed).unwrap()[0].scalar_value().unwrap();
			gradient.array_mut()[index] = (plus - minus) / (2.0 * eps);
		}
		session.set_param(param, original).unwrap();
		gradient
	}

	#[test]
	fn test_matches_finite_differences() {
		let mut builder = GraphBuilder::new();
		let x = builder.placeholder("x", 2);
		let w = builder.param("w", 2, 2, Init::Zeros);
		let b = builder.param("b", 1, 2, Init::Zeros);
		let xw = builder.matmul(x, w).unwrap();
		let h = builder.add(xw, b).unwrap();

		let probs = builder.softmax_rows(h).unwrap();
		let weighted = builder.mul(probs, x).unwrap();
		let per_sample = builder.row_sum(weighted).unwrap();
		let first = builder.reduce_mean(per_sample).unwrap();

		let h0 = builder.column(h, 0).unwrap();
		let h0_sq = builder.square(h0).unwrap();
		let shifted = builder.offset(h0_sq, 1.0).unwrap();
		let logs = builder.log(shifted).unwrap();
		let second = builder.reduce_sum(logs).unwrap();

		let h1 = builder.column(h, 1).unwrap();
		let e = builder.exp(h1).unwrap();
		let root = builder.sqrt(e).unwrap();
		let ratio = builder.div(root, shifted).unwrap();
		let third = builder.reduce_mean(ratio).unwrap();

		let cost = builder.sum([first, second, third]).unwrap();
		let graph = Arc::new(builder.build());
		let w_id = graph.param_by_name("w").unwrap();
		let b_id = graph.param_by_name("b").unwrap();

		let mut session = Session::with_seed(graph, 0);
		session
			.set_param(w_id, Tensor::from_rows(&[[0.3f32, -0.2], [0.1, 0.4]]).unwrap())
			.unwrap();
		session
			.set_param(b_id, Tensor::from_rows(&[[0.05f32, -0.1]]).unwrap())
			.unwrap();

		let feed = Feed::new().with(x, inputs());
		let evaluation = session.evaluate(&[cost], &feed).unwrap();
		let gradients = session.gradients(&evaluation, cost).unwrap();

		for id in [w_id, b_id] {
			let expected = numeric_gradient(&mut session, &feed, cost, id);
			let actual = gradients.get(id).unwrap();
			assert_eq!(actual.dims(), expected.dims());
			for (a, e) in actual.iter().zip(expected.iter()) {
				assert!((a - e).abs() < 1e-2, "analytic {a} vs numeric {e}");
			}
		}
	}

	#[test]
	fn test_stop_gradient_blocks_backward_pass() {
		let mut builder = GraphBuilder::new();
		let w = builder.param("w", 1, 1, Init::Constant(3.0));
		let frozen = builder.stop_gradient(w).unwrap();
		let product = builder.mul(frozen, w).unwrap();
		let cost = builder.reduce_sum(product).unwrap();
		let graph = Arc::new(builder.build());
		let session = Session::with_seed(graph.clone(), 0);

		let evaluation = session.evaluate(&[cost], &Feed::new()).unwrap();
		assert_eq!(evaluation.get(cost).unwrap(), &Tensor::scalar(9.0));
		let gradients = session.gradients(&evaluation, cost).unwrap();
		let w_id = graph.param_by_name("w").unwrap();
		assert_eq!(gradients.get(w_id), Some(&Tensor::scalar(3.0)));
	}

	#[test]
	fn test_unreachable_param_has_no_gradient() {
		let mut builder = GraphBuilder::new();
		let used = builder.param("used", 1, 1, Init::Constant(2.0));
		let blocked = builder.param("blocked", 1, 1, Init::Constant(5.0));
		builder.param("unused", 1, 1, Init::Zeros);
		let frozen = builder.stop_gradient(blocked).unwrap();
		let picked = builder.one_hot_argmax(used).unwrap();
		let sum = builder.sum([used, frozen, picked]).unwrap();
		let cost = builder.reduce_sum(sum).unwrap();
		let graph = Arc::new(builder.build());
		let session = Session::with_seed(graph.clone(), 0);

		let evaluation = session.evaluate(&[cost], &Feed::new()).unwrap();
		let gradients = session.gradients(&evaluation, cost).unwrap();
		assert_eq!(
			gradients.get(graph.param_by_name("used").unwrap()),
			Some(&Tensor::scalar(1.0))
		);
		assert_eq!(gradients.get(graph.param_by_name("blocked").unwrap()), None);
		assert_eq!(gradients.get(graph.param_by_name("unused").unwrap()), None);
		assert_eq!(gradients.into_vec().len(), 1);
	}

	#[test]
	fn test_fed_node_is_a_constant() {
		let mut builder = GraphBuilder::new();
		let w = builder.param("w", 1, 1, Init::Constant(2.0));
		let squared = builder.square(w).unwrap();
		let cost = builder.reduce_sum(squared).unwrap();
		let graph = Arc::new(builder.build());
		let session = Session::with_seed(graph.clone(), 0);

		let feed = Feed::new().with(squared, Tensor::scalar(1.0));
		let evaluation = session.evaluate(&[cost], &feed).unwrap();
		let gradients = session.gradients(&evaluation, cost).unwrap();
		assert_eq!(gradients.get(graph.param_by_name("w").unwrap()), None);
	}

	#[test]
	fn test_minimum_routes_to_selected_operand() {
		let mut builder = GraphBuilder::new();
		let a = builder.param("a", 1, 2, Init::Zeros);
		let b = builder.param("b", 1, 2, Init::Zeros);
		let smaller = builder.minimum(a, b).unwrap();
		let cost = builder.reduce_sum(smaller).unwrap();
		let graph = Arc::new(builder.build());
		let a_id = graph.param_by_name("a").unwrap();
		let b_id = graph.param_by_name("b").unwrap();
		let mut session = Session::with_seed(graph, 0);
		session
			.set_param(a_id, Tensor::from_rows(&[[1.0f32, 0.0]]).unwrap())
			.unwrap();
		session
			.set_param(b_id, Tensor::from_rows(&[[0.0f32, 0.0]]).unwrap())
			.unwrap();

		let evaluation = session.evaluate(&[cost], &Feed::new()).unwrap();
		let gradients = session.gradients(&evaluation, cost).unwrap();
		assert_eq!(gradients.get(a_id), Some(&Tensor::from_rows(&[[0.0f32, 1.0]]).unwrap()));
		assert_eq!(gradients.get(b_id), Some(&Tensor::from_rows(&[[1.0f32, 0.0]]).unwrap()));
	}
}
