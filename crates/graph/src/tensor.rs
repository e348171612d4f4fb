// Copyright 2025 Irreducible Inc.

use std::ops::Deref;

use condnet_utils::ensure;
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::error::Error;

/// A dense `f32` matrix.
///
/// Per-sample quantities are `(batch, 1)` columns and scalars are `(1, 1)`. Elementwise binary
/// operations broadcast any dimension of size 1, and report incompatible shapes as errors
/// instead of panicking.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor(Array2<f32>);

impl Tensor {
	pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, Error> {
		let actual = data.len();
		Array2::from_shape_vec((rows, cols), data)
			.map(Self)
			.map_err(|_| Error::IncorrectDataLength {
				expected: rows * cols,
				actual,
			})
	}

	pub fn full(rows: usize, cols: usize, value: f32) -> Self {
		Self(Array2::from_elem((rows, cols), value))
	}

	pub fn zeros(rows: usize, cols: usize) -> Self {
		Self(Array2::zeros((rows, cols)))
	}

	pub fn scalar(value: f32) -> Self {
		Self::full(1, 1, value)
	}

	/// A `(values.len(), 1)` column.
	pub fn column(values: Vec<f32>) -> Self {
		Self(Array1::from(values).insert_axis(Axis(1)))
	}

	/// Builds a matrix from equally long rows.
	pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, Error> {
		let cols = rows.first().map_or(0, |row| row.as_ref().len());
		let mut data = Vec::with_capacity(rows.len() * cols);
		for row in rows {
			let row = row.as_ref();
			ensure!(
				row.len() == cols,
				Error::IncorrectDataLength {
					expected: cols,
					actual: row.len(),
				}
			);
			data.extend_from_slice(row);
		}
		Self::new(rows.len(), cols, data)
	}

	pub fn rows(&self) -> usize {
		self.0.nrows()
	}

	pub fn cols(&self) -> usize {
		self.0.ncols()
	}

	pub fn dims(&self) -> (usize, usize) {
		self.0.dim()
	}

	pub fn array(&self) -> &Array2<f32> {
		&self.0
	}

	pub fn array_mut(&mut self) -> &mut Array2<f32> {
		&mut self.0
	}

	/// The single value of a `(1, 1)` tensor.
	pub fn scalar_value(&self) -> Option<f32> {
		(self.dims() == (1, 1)).then(|| self.0[[0, 0]])
	}

	pub fn is_finite(&self) -> bool {
		self.0.iter().all(|value| value.is_finite())
	}

	pub fn mapv(&self, f: impl FnMut(f32) -> f32) -> Self {
		Self(self.0.mapv(f))
	}

	pub fn add(&self, other: &Self) -> Result<Self, Error> {
		self.check_broadcast(other)?;
		Ok(Self(&self.0 + &other.0))
	}

	pub fn sub(&self, other: &Self) -> Result<Self, Error> {
		self.check_broadcast(other)?;
		Ok(Self(&self.0 - &other.0))
	}

	pub fn mul(&self, other: &Self) -> Result<Self, Error> {
		self.check_broadcast(other)?;
		Ok(Self(&self.0 * &other.0))
	}

	pub fn div(&self, other: &Self) -> Result<Self, Error> {
		self.check_broadcast(other)?;
		Ok(Self(&self.0 / &other.0))
	}

	/// Combines two tensors elementwise with `f`, broadcasting like the arithmetic operations.
	pub fn zip_map(&self, other: &Self, mut f: impl FnMut(f32, f32) -> f32) -> Result<Self, Error> {
		let (lhs, rhs) = self.co_broadcast(other)?;
		Ok(Self(Zip::from(&lhs).and(&rhs).map_collect(|&a, &b| f(a, b))))
	}

	fn check_broadcast(&self, other: &Self) -> Result<(), Error> {
		self.co_broadcast(other).map(|_| ())
	}

	fn co_broadcast<'a>(
		&'a self,
		other: &'a Self,
	) -> Result<(ArrayView2<'a, f32>, ArrayView2<'a, f32>), Error> {
		let incompatible = || Error::IncompatibleShapes {
			lhs: self.dims(),
			rhs: other.dims(),
		};
		let rows = broadcast_dim(self.rows(), other.rows()).ok_or_else(incompatible)?;
		let cols = broadcast_dim(self.cols(), other.cols()).ok_or_else(incompatible)?;
		let lhs = self.0.broadcast((rows, cols)).ok_or_else(incompatible)?;
		let rhs = other.0.broadcast((rows, cols)).ok_or_else(incompatible)?;
		Ok((lhs, rhs))
	}

	/// Expands the tensor to `(rows, cols)` by repeating dimensions of size 1.
	pub fn broadcast_to(&self, rows: usize, cols: usize) -> Result<Self, Error> {
		self.0
			.broadcast((rows, cols))
			.map(|view| Self(view.to_owned()))
			.ok_or(Error::IncompatibleShapes {
				lhs: self.dims(),
				rhs: (rows, cols),
			})
	}

	/// Sums the tensor down to `(rows, cols)`, the inverse of broadcasting to the current shape.
	pub fn reduce_to(&self, rows: usize, cols: usize) -> Result<Self, Error> {
		ensure!(
			(rows == self.rows() || rows == 1) && (cols == self.cols() || cols == 1),
			Error::IncompatibleShapes {
				lhs: self.dims(),
				rhs: (rows, cols),
			}
		);
		let mut out = self.0.clone();
		if rows != out.nrows() {
			out = out.sum_axis(Axis(0)).insert_axis(Axis(0));
		}
		if cols != out.ncols() {
			out = out.sum_axis(Axis(1)).insert_axis(Axis(1));
		}
		Ok(Self(out))
	}

	pub fn matmul(&self, other: &Self) -> Result<Self, Error> {
		ensure!(
			self.cols() == other.rows(),
			Error::IncompatibleMatMul {
				lhs: self.dims(),
				rhs: other.dims(),
			}
		);
		Ok(Self(self.0.dot(&other.0)))
	}

	pub fn transpose(&self) -> Self {
		Self(self.0.t().to_owned())
	}

	/// Per-row sums as a `(rows, 1)` column.
	pub fn row_sums(&self) -> Self {
		Self(self.0.sum_axis(Axis(1)).insert_axis(Axis(1)))
	}

	/// Column `index` as a `(rows, 1)` column.
	pub fn column_at(&self, index: usize) -> Result<Self, Error> {
		ensure!(
			index < self.cols(),
			Error::ColumnOutOfRange {
				index,
				cols: self.cols(),
			}
		);
		Ok(Self(self.0.column(index).to_owned().insert_axis(Axis(1))))
	}

	/// Numerically stable softmax of every row.
	pub fn softmax_rows(&self) -> Self {
		let mut out = self.0.clone();
		for mut row in out.rows_mut() {
			let max = row.fold(f32::NEG_INFINITY, |acc, &value| acc.max(value));
			row.mapv_inplace(|value| (value - max).exp());
			let total = row.sum();
			row /= total;
		}
		Self(out)
	}

	/// One-hot encoding of the largest entry of each row; the first index wins ties.
	pub fn one_hot_argmax(&self) -> Self {
		self.one_hot_by(|candidate, best| candidate > best)
	}

	/// One-hot encoding of the smallest entry of each row; the first index wins ties.
	pub fn one_hot_argmin(&self) -> Self {
		self.one_hot_by(|candidate, best| candidate < best)
	}

	fn one_hot_by(&self, better: impl Fn(f32, f32) -> bool) -> Self {
		let picks = self.0.map_axis(Axis(1), |row| {
			row.indexed_iter()
				.fold(None, |best, (index, &value)| match best {
					Some((_, best_value)) if !better(value, best_value) => best,
					_ => Some((index, value)),
				})
				.map(|(index, _)| index)
		});
		let mut out = Array2::zeros(self.0.raw_dim());
		for (row, pick) in picks.iter().enumerate() {
			if let Some(col) = *pick {
				out[[row, col]] = 1.0;
			}
		}
		Self(out)
	}
}

impl Deref for Tensor {
	type Target = Array2<f32>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl From<Array2<f32>> for Tensor {
	fn from(array: Array2<f32>) -> Self {
		Self(array)
	}
}

fn broadcast_dim(lhs: usize, rhs: usize) -> Option<usize> {
	match (lhs, rhs) {
		(lhs, rhs) if lhs == rhs => Some(lhs),
		(1, rhs) => Some(rhs),
		(lhs, 1) => Some(lhs),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use itertools::izip;
	use proptest::prelude::*;

	use super::*;

	fn small_tensor(rows: usize, cols: usize) -> impl Strategy<Value = Tensor> {
		prop::collection::vec(-8i8..8, rows * cols).prop_map(move |values| {
			Tensor::new(rows, cols, values.into_iter().map(f32::from).collect())
				.expect("length matches dims")
		})
	}

	fn matmul_operands() -> impl Strategy<Value = (Tensor, Tensor)> {
		(1usize..5, 1usize..5, 1usize..5)
			.prop_flat_map(|(n, k, m)| (small_tensor(n, k), small_tensor(k, m)))
	}

	#[test]
	fn test_new_checks_length() {
		assert_matches!(
			Tensor::new(2, 2, vec![1.0; 3]),
			Err(Error::IncorrectDataLength {
				expected: 4,
				actual: 3
			})
		);
		assert_matches!(
			Tensor::from_rows(&[vec![1.0f32, 2.0], vec![3.0]]),
			Err(Error::IncorrectDataLength {
				expected: 2,
				actual: 1
			})
		);
	}

	#[test]
	fn test_arithmetic_broadcasts_column_and_row() {
		let column = Tensor::column(vec![1.0, 2.0]);
		let row = Tensor::new(1, 3, vec![10.0, 20.0, 30.0]).unwrap();
		let sum = column.add(&row).unwrap();
		assert_eq!(sum, Tensor::from_rows(&[[11.0f32, 21.0, 31.0], [12.0, 22.0, 32.0]]).unwrap());

		let wide = Tensor::zeros(2, 3);
		assert_matches!(wide.mul(&Tensor::zeros(3, 1)), Err(Error::IncompatibleShapes { .. }));
		assert_matches!(
			wide.zip_map(&Tensor::zeros(2, 2), f32::max),
			Err(Error::IncompatibleShapes { .. })
		);
	}

	#[test]
	fn test_reduce_to_inverts_broadcast() {
		let scalar = Tensor::scalar(2.0);
		let expanded = scalar.broadcast_to(3, 2).unwrap();
		assert_eq!(expanded.reduce_to(1, 1).unwrap(), Tensor::scalar(12.0));
		assert_eq!(expanded.reduce_to(3, 1).unwrap(), Tensor::column(vec![4.0; 3]));
		assert_matches!(expanded.reduce_to(2, 2), Err(Error::IncompatibleShapes { .. }));
	}

	#[test]
	fn test_matmul() {
		let a = Tensor::from_rows(&[[1.0f32, 2.0], [3.0, 4.0]]).unwrap();
		let b = Tensor::from_rows(&[[5.0f32], [6.0]]).unwrap();
		assert_eq!(a.matmul(&b).unwrap(), Tensor::column(vec![17.0, 39.0]));
		assert_matches!(b.matmul(&b), Err(Error::IncompatibleMatMul { .. }));
	}

	#[test]
	fn test_softmax_rows_sum_to_one() {
		let scores = Tensor::from_rows(&[[1.0f32, 2.0, 3.0], [1000.0, 1000.0, -1000.0]]).unwrap();
		let softmax = scores.softmax_rows();
		for total in softmax.row_sums().iter() {
			assert!((total - 1.0).abs() < 1e-6);
		}
		assert!(softmax.is_finite());
	}

	#[test]
	fn test_one_hot_ties_pick_first_index() {
		let scores = Tensor::from_rows(&[[1.0f32, 3.0, 3.0], [2.0, 2.0, 2.0]]).unwrap();
		assert_eq!(
			scores.one_hot_argmax(),
			Tensor::from_rows(&[[0.0f32, 1.0, 0.0], [1.0, 0.0, 0.0]]).unwrap()
		);
		assert_eq!(
			scores.one_hot_argmin(),
			Tensor::from_rows(&[[1.0f32, 0.0, 0.0], [1.0, 0.0, 0.0]]).unwrap()
		);
	}

	proptest! {
		#[test]
		fn test_matmul_transpose_identity((a, b) in matmul_operands()) {
			let lhs = a.matmul(&b).unwrap().transpose();
			let rhs = b.transpose().matmul(&a.transpose()).unwrap();
			prop_assert_eq!(lhs, rhs);
		}

		#[test]
		fn test_one_hot_rows_select_extremes(
			x in (1usize..5, 1usize..5).prop_flat_map(|(rows, cols)| small_tensor(rows, cols))
		) {
			let (max, min) = (x.one_hot_argmax(), x.one_hot_argmin());
			let rows = izip!(x.array().rows(), max.array().rows(), min.array().rows());
			for (values, max_row, min_row) in rows {
				prop_assert_eq!(max_row.sum(), 1.0);
				prop_assert_eq!(min_row.sum(), 1.0);
				let picked_max = izip!(values, max_row)
					.find(|&(_, &hot)| hot == 1.0)
					.map(|(&value, _)| value);
				let picked_min = izip!(values, min_row)
					.find(|&(_, &hot)| hot == 1.0)
					.map(|(&value, _)| value);
				prop_assert_eq!(picked_max, values.iter().copied().reduce(f32::max));
				prop_assert_eq!(picked_min, values.iter().copied().reduce(f32::min));
			}
		}
	}
}
