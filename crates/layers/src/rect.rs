// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, NodeId};

use crate::{Error, Layer, LayerOutputs};

/// Rectified linear activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rect;

impl Layer for Rect {
	fn link(
		&self,
		builder: &mut GraphBuilder,
		input: NodeId,
		_target: Option<NodeId>,
		_mode: NodeId,
	) -> Result<LayerOutputs, Error> {
		let width = builder.shape(input)?.cols;
		Ok(LayerOutputs {
			x: builder.relu(input)?,
			c_err: builder.zeros_like(input)?,
			c_mod: builder.constant(0.0),
			n_ops: builder.constant(width as f32),
		})
	}
}
