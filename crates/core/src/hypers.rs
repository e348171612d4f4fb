// Copyright 2025 Irreducible Inc.

//! Hyperparameters of the network variants.
//!
//! Overrides are written with struct update syntax over the defaults, e.g.
//! `DsHypers { epsilon: 0.5, ..Default::default() }`. Values are checked when a network is
//! constructed.

use condnet_utils::ensure;

use crate::error::Error;

/// Hyperparameters of a statically routed network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrHypers {
	/// Cost per operation.
	pub k_cpt: f32,
	/// Seed for parameter initialization.
	pub seed: u64,
}

impl Default for SrHypers {
	fn default() -> Self {
		Self {
			k_cpt: 0.0,
			seed: 0,
		}
	}
}

impl SrHypers {
	pub fn validate(&self) -> Result<(), Error> {
		check_finite("k_cpt", self.k_cpt)
	}
}

/// Hyperparameters of a decision smoothing network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DsHypers {
	/// Cost per operation.
	pub k_cpt: f32,
	/// Share of the training policy spread uniformly over branches.
	pub epsilon: f32,
	/// Decay of the running error statistics.
	pub lambda: f32,
	/// Seed for parameter initialization.
	pub seed: u64,
}

impl Default for DsHypers {
	fn default() -> Self {
		Self {
			k_cpt: 0.0,
			epsilon: 0.1,
			lambda: 0.9,
			seed: 0,
		}
	}
}

impl DsHypers {
	pub fn validate(&self) -> Result<(), Error> {
		check_finite("k_cpt", self.k_cpt)?;
		check_unit("epsilon", self.epsilon)?;
		check_unit("lambda", self.lambda)
	}
}

/// Hyperparameters of a cost regression network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrHypers {
	/// Cost per operation.
	pub k_cpt: f32,
	/// Weight of the router regression loss. Router learning rates are scaled by its inverse.
	pub k_cre: f32,
	/// Share of the training policy spread uniformly over branches.
	pub epsilon: f32,
	/// Decay of the running error statistics.
	pub lambda: f32,
	/// Regress routers onto the best achievable downstream cost instead of the realized one.
	pub optimistic: bool,
	/// Seed for parameter initialization.
	pub seed: u64,
}

impl Default for CrHypers {
	fn default() -> Self {
		Self {
			k_cpt: 0.0,
			k_cre: 1e-3,
			epsilon: 0.1,
			lambda: 0.99,
			optimistic: true,
			seed: 0,
		}
	}
}

impl CrHypers {
	pub fn validate(&self) -> Result<(), Error> {
		check_finite("k_cpt", self.k_cpt)?;
		check_finite("k_cre", self.k_cre)?;
		ensure!(
			self.k_cre > 0.0,
			Error::InvalidHyperparameter {
				name: "k_cre",
				value: self.k_cre,
				reason: "must be positive",
			}
		);
		check_unit("epsilon", self.epsilon)?;
		check_unit("lambda", self.lambda)
	}
}

fn check_finite(name: &'static str, value: f32) -> Result<(), Error> {
	ensure!(
		value.is_finite(),
		Error::InvalidHyperparameter {
			name,
			value,
			reason: "must be finite",
		}
	);
	Ok(())
}

fn check_unit(name: &'static str, value: f32) -> Result<(), Error> {
	ensure!(
		(0.0..=1.0).contains(&value),
		Error::InvalidHyperparameter {
			name,
			value,
			reason: "must lie in [0, 1]",
		}
	);
	Ok(())
}
