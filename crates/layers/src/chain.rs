// Copyright 2025 Irreducible Inc.

use condnet_graph::{GraphBuilder, NodeId};

use crate::{Error, Layer, LayerOutputs};

/// Sequential composition of layers.
///
/// Costs and operation counts of the links are summed. Each link's parameters live in a
/// namespace named after its position. The empty chain is the identity with zero cost.
#[derive(Debug, Default)]
pub struct Chain {
	links: Vec<Box<dyn Layer>>,
}

impl Chain {
	pub fn new(links: Vec<Box<dyn Layer>>) -> Self {
		Self { links }
	}

	pub fn identity() -> Self {
		Self::default()
	}

	pub fn then(mut self, layer: impl Layer + 'static) -> Self {
		self.links.push(Box::new(layer));
		self
	}

	pub fn len(&self) -> usize {
		self.links.len()
	}

	pub fn is_empty(&self) -> bool {
		self.links.is_empty()
	}
}

impl Layer for Chain {
	fn link(
		&self,
		builder: &mut GraphBuilder,
		input: NodeId,
		target: Option<NodeId>,
		mode: NodeId,
	) -> Result<LayerOutputs, Error> {
		if self.links.is_empty() {
			return Ok(LayerOutputs {
				x: input,
				c_err: builder.zeros_like(input)?,
				c_mod: builder.constant(0.0),
				n_ops: builder.constant(0.0),
			});
		}

		let mut x = input;
		let mut c_errs = Vec::with_capacity(self.links.len());
		let mut c_mods = Vec::with_capacity(self.links.len());
		let mut n_ops = Vec::with_capacity(self.links.len());
		for (index, layer) in self.links.iter().enumerate() {
			builder.push_namespace(index);
			let outputs = layer.link(builder, x, target, mode)?;
			builder.pop_namespace()?;
			x = outputs.x;
			c_errs.push(outputs.c_err);
			c_mods.push(outputs.c_mod);
			n_ops.push(outputs.n_ops);
		}

		Ok(LayerOutputs {
			x,
			c_err: builder.sum(c_errs)?,
			c_mod: builder.sum(c_mods)?,
			n_ops: builder.sum(n_ops)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use condnet_graph::{Feed, Session, Tensor};

	use super::*;
	use crate::{LinTrans, Rect, SquaredError};

	#[test]
	fn test_empty_chain_is_identity() {
		let mut builder = GraphBuilder::new();
		let x = builder.placeholder("x", 3);
		let mode = builder.mode();
		let out = Chain::identity().link(&mut builder, x, None, mode).unwrap();
		assert_eq!(out.x, x);
		assert_eq!(builder.n_params(), 0);

		let session = Session::with_seed(Arc::new(builder.build()), 0);
		let feed = Feed::new().with(x, Tensor::zeros(2, 3));
		let values = session.run(&[out.c_err, out.c_mod, out.n_ops], &feed).unwrap();
		assert_eq!(values[0], Tensor::column(vec![0.0, 0.0]));
		assert_eq!(values[1], Tensor::scalar(0.0));
		assert_eq!(values[2], Tensor::scalar(0.0));
	}

	#[test]
	fn test_chain_sums_costs_and_scopes_params() {
		let mut builder = GraphBuilder::new();
		let x = builder.placeholder("x", 2);
		let y = builder.placeholder("y", 1);
		let mode = builder.mode();
		let chain = Chain::identity()
			.then(LinTrans::new(3))
			.then(Rect)
			.then(LinTrans::with_l2(1, 1.0))
			.then(SquaredError);
		assert_eq!(chain.len(), 4);
		let out = chain.link(&mut builder, x, Some(y), mode).unwrap();

		let graph = Arc::new(builder.build());
		for name in ["0/w", "0/b", "2/w", "2/b"] {
			assert!(graph.param_by_name(name).is_some(), "missing {name}");
		}
		let w2 = graph.param_by_name("2/w").unwrap();
		let b2 = graph.param_by_name("2/b").unwrap();
		let mut session = Session::with_seed(graph, 0);
		session
			.set_param(w2, Tensor::column(vec![0.0, 0.0, 2.0]))
			.unwrap();
		session.set_param(b2, Tensor::scalar(1.0)).unwrap();

		let feed = Feed::new()
			.with(x, Tensor::zeros(2, 2))
			.with(y, Tensor::column(vec![1.0, 3.0]));
		let values = session
			.run(&[out.x, out.c_err, out.c_mod, out.n_ops], &feed)
			.unwrap();
		assert_eq!(values[0], Tensor::column(vec![1.0, 1.0]));
		assert_eq!(values[1], Tensor::column(vec![0.0, 4.0]));
		assert_eq!(values[2], Tensor::scalar(4.0));
		assert_eq!(values[3], Tensor::scalar(6.0 + 3.0 + 3.0));
	}
}
