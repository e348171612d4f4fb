// Copyright 2025 Irreducible Inc.

use crate::tensor::Tensor;

/// The row dimension of a symbolic value.
///
/// Values computed from placeholders have one row per sample, the number of which is only known
/// when the graph is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
	Batch,
	Fixed(usize),
}

impl Dim {
	fn broadcast(self, other: Self) -> Option<Self> {
		match (self, other) {
			(lhs, rhs) if lhs == rhs => Some(lhs),
			(Self::Fixed(1), rhs) => Some(rhs),
			(lhs, Self::Fixed(1)) => Some(lhs),
			_ => None,
		}
	}
}

/// Symbolic shape of a node: a row dimension and a fixed number of columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
	pub rows: Dim,
	pub cols: usize,
}

impl Shape {
	pub const SCALAR: Self = Self::fixed(1, 1);

	/// One value per sample.
	pub const PER_SAMPLE: Self = Self::batch(1);

	pub const fn batch(cols: usize) -> Self {
		Self {
			rows: Dim::Batch,
			cols,
		}
	}

	pub const fn fixed(rows: usize, cols: usize) -> Self {
		Self {
			rows: Dim::Fixed(rows),
			cols,
		}
	}

	pub fn is_scalar(&self) -> bool {
		*self == Self::SCALAR
	}

	pub fn is_batched(&self) -> bool {
		self.rows == Dim::Batch
	}

	/// Whether the value is either a per-sample column or a scalar that broadcasts to one.
	pub fn is_per_sample_like(&self) -> bool {
		self.cols == 1 && matches!(self.rows, Dim::Batch | Dim::Fixed(1))
	}

	/// The shape of an elementwise combination of `self` and `other`, if they broadcast.
	pub fn broadcast(self, other: Self) -> Option<Self> {
		let rows = self.rows.broadcast(other.rows)?;
		let cols = match (self.cols, other.cols) {
			(lhs, rhs) if lhs == rhs => lhs,
			(1, rhs) => rhs,
			(lhs, 1) => lhs,
			_ => return None,
		};
		Some(Self { rows, cols })
	}

	/// Checks a concrete tensor against this shape.
	///
	/// Batched rows match any row count; the caller is responsible for checking that all batched
	/// values of a run agree on it.
	pub fn admits(&self, tensor: &Tensor) -> bool {
		let rows_ok = match self.rows {
			Dim::Batch => true,
			Dim::Fixed(rows) => tensor.rows() == rows,
		};
		rows_ok && tensor.cols() == self.cols
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_broadcast_per_sample_with_scalar() {
		assert_eq!(Shape::PER_SAMPLE.broadcast(Shape::SCALAR), Some(Shape::PER_SAMPLE));
		assert_eq!(Shape::SCALAR.broadcast(Shape::batch(3)), Some(Shape::batch(3)));
	}

	#[test]
	fn test_broadcast_bias_row() {
		assert_eq!(Shape::batch(4).broadcast(Shape::fixed(1, 4)), Some(Shape::batch(4)));
	}

	#[test]
	fn test_broadcast_rejects_mismatch() {
		assert_eq!(Shape::batch(4).broadcast(Shape::batch(3)), None);
		assert_eq!(Shape::batch(1).broadcast(Shape::fixed(2, 1)), None);
	}

	#[test]
	fn test_admits() {
		let tensor = Tensor::zeros(5, 2);
		assert!(Shape::batch(2).admits(&tensor));
		assert!(!Shape::batch(3).admits(&tensor));
		assert!(!Shape::fixed(4, 2).admits(&tensor));
	}
}
