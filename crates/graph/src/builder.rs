// Copyright 2025 Irreducible Inc.

use condnet_utils::{bail, ensure};
use getset::Getters;
use tracing::debug;

use crate::{
	error::Error,
	node::{Assign, Init, Node, NodeId, Op, ParamId, ParamSpec, StatId, StatSpec},
	shape::{Dim, Shape},
};

/// Records a computation graph, checking shapes as nodes are added.
///
/// Every method that adds a node returns its [`NodeId`]. Ids are handed out in creation order and
/// an operation can only reference existing nodes, so the recorded graph is acyclic and sorted.
#[derive(Debug, Default)]
pub struct GraphBuilder {
	nodes: Vec<Node>,
	params: Vec<ParamSpec>,
	stats: Vec<StatSpec>,
	namespace_path: Vec<String>,
}

impl GraphBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Freezes the graph.
	pub fn build(self) -> Graph {
		debug!(
			nodes = self.nodes.len(),
			params = self.params.len(),
			stats = self.stats.len(),
			"built computation graph"
		);
		Graph {
			nodes: self.nodes,
			params: self.params,
			stats: self.stats,
		}
	}

	pub fn push_namespace(&mut self, name: impl ToString) {
		self.namespace_path.push(name.to_string());
	}

	pub fn pop_namespace(&mut self) -> Result<(), Error> {
		self.namespace_path
			.pop()
			.map(|_| ())
			.ok_or(Error::NamespaceUnderflow)
	}

	fn scoped_name(&self, name: &str) -> String {
		self.namespace_path
			.iter()
			.map(String::as_str)
			.chain(std::iter::once(name))
			.collect::<Vec<_>>()
			.join("/")
	}

	/// Number of parameters created so far. Parameters created between two calls form a
	/// contiguous range of [`ParamId`]s.
	pub fn n_params(&self) -> usize {
		self.params.len()
	}

	pub fn shape(&self, id: NodeId) -> Result<Shape, Error> {
		self.nodes
			.get(id.0)
			.map(|node| node.shape)
			.ok_or(Error::UnknownNode(id))
	}

	fn push(&mut self, op: Op, shape: Shape) -> NodeId {
		self.nodes.push(Node { op, shape });
		NodeId(self.nodes.len() - 1)
	}

	/// A batched input with `cols` features per sample.
	pub fn placeholder(&mut self, name: &str, cols: usize) -> NodeId {
		let name = self.scoped_name(name);
		self.push(Op::Placeholder { name }, Shape::batch(cols))
	}

	pub fn mode(&mut self) -> NodeId {
		self.push(Op::Mode, Shape::SCALAR)
	}

	pub fn constant(&mut self, value: f32) -> NodeId {
		self.push(Op::Const(value), Shape::SCALAR)
	}

	/// A column with one `value` per row of `like`.
	pub fn fill_like(&mut self, like: NodeId, value: f32) -> Result<NodeId, Error> {
		let rows = self.shape(like)?.rows;
		Ok(self.push(Op::FillLike { like, value }, Shape { rows, cols: 1 }))
	}

	pub fn ones_like(&mut self, like: NodeId) -> Result<NodeId, Error> {
		self.fill_like(like, 1.0)
	}

	pub fn zeros_like(&mut self, like: NodeId) -> Result<NodeId, Error> {
		self.fill_like(like, 0.0)
	}

	/// Declares a trainable `(rows, cols)` parameter and returns the node reading it.
	pub fn param(&mut self, name: &str, rows: usize, cols: usize, init: Init) -> NodeId {
		let id = ParamId::new(self.params.len());
		self.params.push(ParamSpec {
			name: self.scoped_name(name),
			rows,
			cols,
			init,
		});
		self.push(Op::Param(id), Shape::fixed(rows, cols))
	}

	/// Declares a scalar statistic and returns its handle and the node reading it.
	pub fn stat(&mut self, name: &str, init: f32) -> (StatId, NodeId) {
		let id = StatId(self.stats.len());
		self.stats.push(StatSpec {
			name: self.scoped_name(name),
			init,
		});
		(id, self.push(Op::Stat(id), Shape::SCALAR))
	}

	/// Describes writing the scalar `value` into `stat`.
	pub fn assign(&self, stat: StatId, value: NodeId) -> Result<Assign, Error> {
		let shape = self.shape(value)?;
		ensure!(
			shape.is_scalar(),
			Error::UnexpectedShape {
				op: "assign",
				expected: "scalar",
				actual: shape,
			}
		);
		ensure!(stat.0 < self.stats.len(), Error::UnknownStat(stat));
		Ok(Assign { stat, value })
	}

	fn elementwise(
		&mut self,
		op: &'static str,
		lhs: NodeId,
		rhs: NodeId,
		make: fn(NodeId, NodeId) -> Op,
	) -> Result<NodeId, Error> {
		let (lhs_shape, rhs_shape) = (self.shape(lhs)?, self.shape(rhs)?);
		let Some(shape) = lhs_shape.broadcast(rhs_shape) else {
			bail!(Error::ShapeMismatch {
				op,
				lhs: lhs_shape,
				rhs: rhs_shape,
			});
		};
		Ok(self.push(make(lhs, rhs), shape))
	}

	pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, Error> {
		self.elementwise("add", lhs, rhs, Op::Add)
	}

	pub fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, Error> {
		self.elementwise("sub", lhs, rhs, Op::Sub)
	}

	pub fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, Error> {
		self.elementwise("mul", lhs, rhs, Op::Mul)
	}

	pub fn div(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, Error> {
		self.elementwise("div", lhs, rhs, Op::Div)
	}

	pub fn minimum(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, Error> {
		self.elementwise("minimum", lhs, rhs, Op::Minimum)
	}

	/// `x * factor` for a constant factor.
	pub fn scale(&mut self, x: NodeId, factor: f32) -> Result<NodeId, Error> {
		let factor = self.constant(factor);
		self.mul(x, factor)
	}

	/// `x + offset` for a constant offset.
	pub fn offset(&mut self, x: NodeId, offset: f32) -> Result<NodeId, Error> {
		let offset = self.constant(offset);
		self.add(x, offset)
	}

	/// Adds up all terms, or returns a constant zero for an empty sum.
	pub fn sum(&mut self, terms: impl IntoIterator<Item = NodeId>) -> Result<NodeId, Error> {
		let mut terms = terms.into_iter();
		let Some(first) = terms.next() else {
			return Ok(self.constant(0.0));
		};
		terms.try_fold(first, |acc, term| self.add(acc, term))
	}

	fn unary(&mut self, x: NodeId, make: fn(NodeId) -> Op) -> Result<NodeId, Error> {
		let shape = self.shape(x)?;
		Ok(self.push(make(x), shape))
	}

	pub fn square(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::Square)
	}

	pub fn sqrt(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::Sqrt)
	}

	pub fn exp(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::Exp)
	}

	pub fn log(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::Log)
	}

	pub fn relu(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::Relu)
	}

	pub fn softmax_rows(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::SoftmaxRows)
	}

	pub fn one_hot_argmax(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::OneHotArgMax)
	}

	pub fn one_hot_argmin(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::OneHotArgMin)
	}

	pub fn stop_gradient(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.unary(x, Op::StopGradient)
	}

	pub fn matmul(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId, Error> {
		let (lhs_shape, rhs_shape) = (self.shape(lhs)?, self.shape(rhs)?);
		ensure!(
			rhs_shape.rows == Dim::Fixed(lhs_shape.cols),
			Error::ShapeMismatch {
				op: "matmul",
				lhs: lhs_shape,
				rhs: rhs_shape,
			}
		);
		let shape = Shape {
			rows: lhs_shape.rows,
			cols: rhs_shape.cols,
		};
		Ok(self.push(Op::MatMul(lhs, rhs), shape))
	}

	/// Column `index` of `x` as a column vector.
	pub fn column(&mut self, x: NodeId, index: usize) -> Result<NodeId, Error> {
		let shape = self.shape(x)?;
		ensure!(
			index < shape.cols,
			Error::ColumnOutOfRange {
				index,
				cols: shape.cols,
			}
		);
		Ok(self.push(
			Op::Column(x, index),
			Shape {
				rows: shape.rows,
				cols: 1,
			},
		))
	}

	pub fn row_sum(&mut self, x: NodeId) -> Result<NodeId, Error> {
		let rows = self.shape(x)?.rows;
		Ok(self.push(Op::RowSum(x), Shape { rows, cols: 1 }))
	}

	pub fn reduce_sum(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.shape(x)?;
		Ok(self.push(Op::ReduceSum(x), Shape::SCALAR))
	}

	pub fn reduce_mean(&mut self, x: NodeId) -> Result<NodeId, Error> {
		self.shape(x)?;
		Ok(self.push(Op::ReduceMean(x), Shape::SCALAR))
	}
}

/// An immutable computation graph.
#[derive(Debug, Clone, Getters)]
pub struct Graph {
	#[get = "pub"]
	nodes: Vec<Node>,
	#[get = "pub"]
	params: Vec<ParamSpec>,
	#[get = "pub"]
	stats: Vec<StatSpec>,
}

impl Graph {
	pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
		self.nodes.get(id.0).ok_or(Error::UnknownNode(id))
	}

	pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
		self.params
			.iter()
			.position(|spec| spec.name == name)
			.map(ParamId::new)
	}

	pub fn stat_by_name(&self, name: &str) -> Option<StatId> {
		self.stats
			.iter()
			.position(|spec| spec.name == name)
			.map(StatId)
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_namespaced_names() {
		let mut builder = GraphBuilder::new();
		builder.push_namespace("layer0");
		builder.push_namespace("router");
		builder.param("w", 2, 3, Init::Zeros);
		builder.pop_namespace().unwrap();
		builder.stat("mu_tr", 0.0);
		builder.pop_namespace().unwrap();
		assert_matches!(builder.pop_namespace(), Err(Error::NamespaceUnderflow));

		let graph = builder.build();
		assert_eq!(graph.param_by_name("layer0/router/w"), Some(ParamId::new(0)));
		assert!(graph.stat_by_name("layer0/mu_tr").is_some());
	}

	#[test]
	fn test_shapes_are_checked() {
		let mut builder = GraphBuilder::new();
		let x = builder.placeholder("x", 3);
		let w = builder.param("w", 3, 2, Init::GlorotUniform);
		let h = builder.matmul(x, w).unwrap();
		assert_eq!(builder.shape(h).unwrap(), Shape::batch(2));

		assert_matches!(builder.matmul(h, w), Err(Error::ShapeMismatch { op: "matmul", .. }));
		assert_matches!(builder.add(x, h), Err(Error::ShapeMismatch { op: "add", .. }));
		assert_matches!(builder.column(h, 2), Err(Error::ColumnOutOfRange { index: 2, cols: 2 }));
	}

	#[test]
	fn test_assign_requires_scalar() {
		let mut builder = GraphBuilder::new();
		let x = builder.placeholder("x", 1);
		let (stat, _) = builder.stat("mean", 0.0);
		assert_matches!(builder.assign(stat, x), Err(Error::UnexpectedShape { .. }));
		let mean = builder.reduce_mean(x).unwrap();
		assert_eq!(builder.assign(stat, mean).unwrap(), Assign { stat, value: mean });
	}

	#[test]
	fn test_empty_sum_is_zero_constant() {
		let mut builder = GraphBuilder::new();
		let zero = builder.sum([]).unwrap();
		assert_eq!(builder.build().node(zero).unwrap().op, Op::Const(0.0));
	}
}
