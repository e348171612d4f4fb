// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, Init, NodeId};

use crate::{Error, Layer, LayerOutputs};

/// Affine map `x·W + b` with an optional L2 penalty on `W`.
///
/// `W` is Glorot-initialized and `b` starts at zero. The modeling cost is `k_l2·ΣW²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinTrans {
	pub n_out: usize,
	pub k_l2: f32,
}

impl LinTrans {
	pub const fn new(n_out: usize) -> Self {
		Self { n_out, k_l2: 0.0 }
	}

	pub const fn with_l2(n_out: usize, k_l2: f32) -> Self {
		Self { n_out, k_l2 }
	}
}

impl Layer for LinTrans {
	fn link(
		&self,
		builder: &mut GraphBuilder,
		input: NodeId,
		_target: Option<NodeId>,
		_mode: NodeId,
	) -> Result<LayerOutputs, Error> {
		let n_in = builder.shape(input)?.cols;
		let w = builder.param("w", n_in, self.n_out, Init::GlorotUniform);
		let b = builder.param("b", 1, self.n_out, Init::Zeros);
		let product = builder.matmul(input, w)?;
		let x = builder.add(product, b)?;

		// A constant keeps the weights off the gradient path of the modeling cost.
		let c_mod = if self.k_l2 == 0.0 {
			builder.constant(0.0)
		} else {
			let squared = builder.square(w)?;
			let total = builder.reduce_sum(squared)?;
			builder.scale(total, self.k_l2)?
		};

		Ok(LayerOutputs {
			x,
			c_err: builder.zeros_like(input)?,
			c_mod,
			n_ops: builder.constant((n_in * self.n_out) as f32),
		})
	}
}
