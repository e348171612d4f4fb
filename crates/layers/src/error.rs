// Copyright 2025 Irreducible Inc.

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{layer} computes an error signal and needs a target")]
	MissingTarget { layer: &'static str },
	#[error("graph error: {0}")]
	Graph(#[from] condnet_graph::Error),
}
