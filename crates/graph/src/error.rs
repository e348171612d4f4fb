// Copyright 2025 Irreducible Inc.

use crate::{
	node::{NodeId, ParamId, StatId},
	shape::Shape,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("tensor data has length {actual}, expected {expected}")]
	IncorrectDataLength { expected: usize, actual: usize },
	#[error("cannot broadcast shapes {lhs:?} and {rhs:?}")]
	IncompatibleShapes { lhs: (usize, usize), rhs: (usize, usize) },
	#[error("matrix product of {lhs:?} and {rhs:?} is undefined")]
	IncompatibleMatMul { lhs: (usize, usize), rhs: (usize, usize) },
	#[error("{op}: cannot combine symbolic shapes {lhs:?} and {rhs:?}")]
	ShapeMismatch {
		op: &'static str,
		lhs: Shape,
		rhs: Shape,
	},
	#[error("{op}: expected a {expected} operand, got shape {actual:?}")]
	UnexpectedShape {
		op: &'static str,
		expected: &'static str,
		actual: Shape,
	},
	#[error("column {index} is out of range for a node with {cols} columns")]
	ColumnOutOfRange { index: usize, cols: usize },
	#[error("node {0:?} does not belong to this graph")]
	UnknownNode(NodeId),
	#[error("parameter {0:?} does not belong to this graph")]
	UnknownParam(ParamId),
	#[error("statistic {0:?} does not belong to this graph")]
	UnknownStat(StatId),
	#[error("no value fed for placeholder {name}")]
	MissingFeed { name: String },
	#[error("value fed for {node:?} has shape {actual:?}, expected {expected:?}")]
	FeedShapeMismatch {
		node: NodeId,
		expected: Shape,
		actual: (usize, usize),
	},
	#[error("inconsistent batch sizes within one run: {first} and {second}")]
	BatchSizeMismatch { first: usize, second: usize },
	#[error("node {0:?} was not computed in this evaluation")]
	NotEvaluated(NodeId),
	#[error("the differentiated node must be a scalar, got shape {0:?}")]
	NonScalarCost((usize, usize)),
	#[error("parameter {name} has shape {expected:?}, got {actual:?}")]
	ParamShapeMismatch {
		name: String,
		expected: (usize, usize),
		actual: (usize, usize),
	},
	#[error("namespace stack is empty")]
	NamespaceUnderflow,
}
