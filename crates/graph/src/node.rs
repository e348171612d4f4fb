// Copyright 2025 Irreducible Inc.

use crate::shape::Shape;

/// Handle of a node in a [`crate::Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
	pub const fn index(self) -> usize {
		self.0
	}
}

/// Handle of a trainable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
	pub const fn new(index: usize) -> Self {
		Self(index)
	}

	pub const fn index(self) -> usize {
		self.0
	}
}

/// Handle of a non-trainable scalar variable that persists across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatId(pub(crate) usize);

impl StatId {
	pub const fn index(self) -> usize {
		self.0
	}
}

/// How a parameter is initialized when a session is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
	Zeros,
	Constant(f32),
	/// Uniform on `±sqrt(6 / (fan_in + fan_out))`.
	GlorotUniform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
	pub name: String,
	pub rows: usize,
	pub cols: usize,
	pub init: Init,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatSpec {
	pub name: String,
	pub init: f32,
}

/// A deferred write of a scalar node's value into a statistic.
///
/// A group of assignments is applied atomically: all values are computed against the current
/// statistics before any of them is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assign {
	pub stat: StatId,
	pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
	/// A value supplied through a [`crate::Feed`] on every run.
	Placeholder { name: String },
	/// 1 in training mode, 0 otherwise.
	Mode,
	Const(f32),
	/// A `(rows of like, 1)` column filled with `value`.
	FillLike { like: NodeId, value: f32 },
	Param(ParamId),
	Stat(StatId),
	Add(NodeId, NodeId),
	Sub(NodeId, NodeId),
	Mul(NodeId, NodeId),
	Div(NodeId, NodeId),
	Minimum(NodeId, NodeId),
	Square(NodeId),
	Sqrt(NodeId),
	Exp(NodeId),
	Log(NodeId),
	Relu(NodeId),
	MatMul(NodeId, NodeId),
	SoftmaxRows(NodeId),
	OneHotArgMax(NodeId),
	OneHotArgMin(NodeId),
	Column(NodeId, usize),
	RowSum(NodeId),
	ReduceSum(NodeId),
	ReduceMean(NodeId),
	/// Identity when evaluating, blocks gradients when differentiating.
	StopGradient(NodeId),
}

impl Op {
	/// Nodes this operation reads.
	pub fn inputs(&self) -> Vec<NodeId> {
		match self {
			Self::Placeholder { .. }
			| Self::Mode
			| Self::Const(_)
			| Self::Param(_)
			| Self::Stat(_) => vec![],
			Self::FillLike { like, .. } => vec![*like],
			Self::Add(lhs, rhs)
			| Self::Sub(lhs, rhs)
			| Self::Mul(lhs, rhs)
			| Self::Div(lhs, rhs)
			| Self::Minimum(lhs, rhs)
			| Self::MatMul(lhs, rhs) => vec![*lhs, *rhs],
			Self::Square(x)
			| Self::Sqrt(x)
			| Self::Exp(x)
			| Self::Log(x)
			| Self::Relu(x)
			| Self::SoftmaxRows(x)
			| Self::OneHotArgMax(x)
			| Self::OneHotArgMin(x)
			| Self::Column(x, _)
			| Self::RowSum(x)
			| Self::ReduceSum(x)
			| Self::ReduceMean(x)
			| Self::StopGradient(x) => vec![*x],
		}
	}

	/// Inputs through which gradients propagate.
	///
	/// `FillLike` only reads the row count of its input and the one-hot selections are piecewise
	/// constant, so none of them pass gradients.
	pub fn differentiable_inputs(&self) -> Vec<NodeId> {
		match self {
			Self::FillLike { .. }
			| Self::OneHotArgMax(_)
			| Self::OneHotArgMin(_)
			| Self::StopGradient(_) => vec![],
			_ => self.inputs(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
	pub op: Op,
	pub shape: Shape,
}
