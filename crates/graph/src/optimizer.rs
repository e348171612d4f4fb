// Copyright 2025 Irreducible Inc.

use std::collections::HashMap;

use auto_impl::auto_impl;
use ndarray::Array2;

use crate::{node::ParamId, tensor::Tensor};

/// A first-order update rule.
///
/// The optimizer receives gradients that have already been rescaled by the caller, so the same
/// rule works whether or not per-parameter learning rate scaling is in effect.
#[auto_impl(&mut, Box)]
pub trait Optimizer {
	fn apply(&mut self, param: ParamId, value: &mut Tensor, gradient: &Tensor);
}

/// `value -= learning_rate * gradient`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
	pub learning_rate: f32,
}

impl GradientDescent {
	pub const fn new(learning_rate: f32) -> Self {
		Self { learning_rate }
	}
}

impl Optimizer for GradientDescent {
	fn apply(&mut self, _param: ParamId, value: &mut Tensor, gradient: &Tensor) {
		value.array_mut().scaled_add(-self.learning_rate, gradient.array());
	}
}

/// Gradient descent with heavy-ball momentum, keeping one velocity per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
	pub learning_rate: f32,
	pub momentum: f32,
	velocities: HashMap<ParamId, Array2<f32>>,
}

impl Momentum {
	pub fn new(learning_rate: f32, momentum: f32) -> Self {
		Self {
			learning_rate,
			momentum,
			velocities: HashMap::new(),
		}
	}
}

impl Optimizer for Momentum {
	fn apply(&mut self, param: ParamId, value: &mut Tensor, gradient: &Tensor) {
		let velocity = self
			.velocities
			.entry(param)
			.or_insert_with(|| Array2::zeros(gradient.raw_dim()));
		if velocity.dim() != gradient.dim() {
			*velocity = Array2::zeros(gradient.raw_dim());
		}
		*velocity *= self.momentum;
		*velocity += gradient.array();
		value.array_mut().scaled_add(-self.learning_rate, velocity);
	}
}
