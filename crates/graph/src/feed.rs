// Copyright 2025 Irreducible Inc.

use std::collections::HashMap;

use crate::{node::NodeId, tensor::Tensor};

/// Whether a run is part of a training step.
///
/// Layers read it through [`crate::Op::Mode`]; routing itself never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
	Train,
	#[default]
	Eval,
}

impl Mode {
	pub const fn flag(self) -> f32 {
		match self {
			Self::Train => 1.0,
			Self::Eval => 0.0,
		}
	}
}

/// Values bound to graph nodes for a single run.
///
/// Placeholders must be fed. Any other node may be fed as well, in which case the fed value
/// replaces the computed one and gradients do not flow through it.
#[derive(Debug, Clone, Default)]
pub struct Feed {
	mode: Option<Mode>,
	values: HashMap<NodeId, Tensor>,
}

impl Feed {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, node: NodeId, value: Tensor) -> Self {
		self.insert(node, value);
		self
	}

	pub fn with_mode(mut self, mode: Mode) -> Self {
		self.mode = Some(mode);
		self
	}

	pub fn insert(&mut self, node: NodeId, value: Tensor) {
		self.values.insert(node, value);
	}

	/// The mode of the run; evaluation unless set.
	pub fn mode(&self) -> Mode {
		self.mode.unwrap_or_default()
	}

	pub fn get(&self, node: NodeId) -> Option<&Tensor> {
		self.values.get(&node)
	}

	pub fn contains(&self, node: NodeId) -> bool {
		self.values.contains_key(&node)
	}

	/// Layers `overrides` on top of `self`: every value and the mode set in `overrides` win.
	pub fn overridden_by(mut self, overrides: &Feed) -> Self {
		if let Some(mode) = overrides.mode {
			self.mode = Some(mode);
		}
		self.values
			.extend(overrides.values.iter().map(|(&node, value)| (node, value.clone())));
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_mode_is_eval() {
		assert_eq!(Feed::new().mode(), Mode::Eval);
		assert_eq!(Feed::new().with_mode(Mode::Train).mode(), Mode::Train);
	}

	#[test]
	fn test_overrides_win() {
		let base = Feed::new()
			.with_mode(Mode::Train)
			.with(NodeId(0), Tensor::scalar(1.0))
			.with(NodeId(1), Tensor::scalar(2.0));
		let overrides = Feed::new()
			.with_mode(Mode::Eval)
			.with(NodeId(1), Tensor::scalar(3.0));
		let merged = base.overridden_by(&overrides);
		assert_eq!(merged.mode(), Mode::Eval);
		assert_eq!(merged.get(NodeId(0)), Some(&Tensor::scalar(1.0)));
		assert_eq!(merged.get(NodeId(1)), Some(&Tensor::scalar(3.0)));
	}

	#[test]
	fn test_unset_mode_does_not_override() {
		let merged = Feed::new()
			.with_mode(Mode::Train)
			.overridden_by(&Feed::new());
		assert_eq!(merged.mode(), Mode::Train);
	}
}
