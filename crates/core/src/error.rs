// Copyright 2025 Irreducible Inc.

use condnet_graph::Shape;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("router of layer {layer} scores {actual} branches, but the layer has {expected} sinks")]
	RouterBranchMismatch {
		layer: usize,
		expected: usize,
		actual: usize,
	},
	#[error("layer {layer} returned a {what} of shape {shape:?}")]
	InvalidLayerOutput {
		layer: usize,
		what: &'static str,
		shape: Shape,
	},
	#[error("hyperparameter {name} = {value} {reason}")]
	InvalidHyperparameter {
		name: &'static str,
		value: f32,
		reason: &'static str,
	},
	#[error("graph error: {0}")]
	Graph(#[from] condnet_graph::Error),
	#[error("layer error: {0}")]
	Layer(#[from] condnet_layers::Error),
}
