// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, NodeId};
use condnet_utils::bail;

use crate::{Error, Layer, LayerOutputs};

/// Passes its input through and reports `Σ_cols (x − y)²` per sample as its error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredError;

impl Layer for SquaredError {
	fn link(
		&self,
		builder: &mut GraphBuilder,
		input: NodeId,
		target: Option<NodeId>,
		_mode: NodeId,
	) -> Result<LayerOutputs, Error> {
		let Some(target) = target else {
			bail!(Error::MissingTarget {
				layer: "SquaredError"
			});
		};
		let residual = builder.sub(input, target)?;
		let squared = builder.square(residual)?;
		Ok(LayerOutputs {
			x: input,
			c_err: builder.row_sum(squared)?,
			c_mod: builder.constant(0.0),
			n_ops: builder.constant(0.0),
		})
	}
}
