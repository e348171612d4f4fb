// Copyright 2025 Irreducible Inc.

use condnet_graph::{Assign, GraphBuilder, NodeId, StatId};

use crate::error::Error;

/// Stabilizes the variance ratio in the generalization correction.
const VARIANCE_FLOOR: f32 = 1e-3;

/// A statistic and the node reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatVar {
	pub id: StatId,
	pub node: NodeId,
}

impl StatVar {
	fn new(builder: &mut GraphBuilder, name: &str, init: f32) -> Self {
		let (id, node) = builder.stat(name, init);
		Self { id, node }
	}
}

/// Running mean and variance of a layer's error, tracked separately on training and validation
/// batches and weighted by the training path probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningStats {
	pub mu_tr: StatVar,
	pub v_tr: StatVar,
	pub mu_vl: StatVar,
	pub v_vl: StatVar,
	/// `Σ p_tr·c_err / Σ p_tr`.
	pub mu_batch: NodeId,
	/// `Σ p_tr·(c_err − mu_batch)² / Σ p_tr`.
	pub v_batch: NodeId,
	pub update_tr: [Assign; 2],
	pub update_vl: [Assign; 2],
}

impl RunningStats {
	/// Declares the statistics of one layer, starting at `μ = 0` and `v = 1`.
	pub(crate) fn link(
		builder: &mut GraphBuilder,
		p_tr: NodeId,
		c_err: NodeId,
		lambda: f32,
	) -> Result<Self, Error> {
		let mu_tr = StatVar::new(builder, "mu_tr", 0.0);
		let v_tr = StatVar::new(builder, "v_tr", 1.0);
		let mu_vl = StatVar::new(builder, "mu_vl", 0.0);
		let v_vl = StatVar::new(builder, "v_vl", 1.0);

		let total_p = builder.reduce_sum(p_tr)?;
		let weighted = builder.mul(p_tr, c_err)?;
		let weighted_sum = builder.reduce_sum(weighted)?;
		let mu_batch = builder.div(weighted_sum, total_p)?;

		let deviation = builder.sub(c_err, mu_batch)?;
		let squared = builder.square(deviation)?;
		let weighted = builder.mul(p_tr, squared)?;
		let weighted_sum = builder.reduce_sum(weighted)?;
		let v_batch = builder.div(weighted_sum, total_p)?;

		let update_tr = [
			moving_average(builder, mu_tr, mu_batch, lambda)?,
			moving_average(builder, v_tr, v_batch, lambda)?,
		];
		let update_vl = [
			moving_average(builder, mu_vl, mu_batch, lambda)?,
			moving_average(builder, v_vl, v_batch, lambda)?,
		];

		Ok(Self {
			mu_tr,
			v_tr,
			mu_vl,
			v_vl,
			mu_batch,
			v_batch,
			update_tr,
			update_vl,
		})
	}

	/// `sqrt((v_vl + 1e-3) / (v_tr + 1e-3))·(c_err − μ_tr) + μ_vl`, the error rescaled to
	/// estimate its out-of-sample value.
	pub(crate) fn generalization_cost(
		&self,
		builder: &mut GraphBuilder,
		c_err: NodeId,
	) -> Result<NodeId, Error> {
		let v_vl = builder.offset(self.v_vl.node, VARIANCE_FLOOR)?;
		let v_tr = builder.offset(self.v_tr.node, VARIANCE_FLOOR)?;
		let ratio = builder.div(v_vl, v_tr)?;
		let gain = builder.sqrt(ratio)?;
		let centered = builder.sub(c_err, self.mu_tr.node)?;
		let scaled = builder.mul(gain, centered)?;
		Ok(builder.add(scaled, self.mu_vl.node)?)
	}
}

fn moving_average(
	builder: &mut GraphBuilder,
	stat: StatVar,
	batch: NodeId,
	lambda: f32,
) -> Result<Assign, Error> {
	let kept = builder.scale(stat.node, lambda)?;
	let fresh = builder.scale(batch, 1.0 - lambda)?;
	let updated = builder.add(kept, fresh)?;
	Ok(builder.assign(stat.id, updated)?)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use condnet_graph::{Feed, Session, Tensor};

	use super::*;

	struct Fixture {
		session: Session,
		stats: RunningStats,
		c_gen: NodeId,
		feed: Feed,
	}

	fn fixture(lambda: f32) -> Fixture {
		let mut builder = GraphBuilder::new();
		let p_tr = builder.placeholder("p_tr", 1);
		let c_err = builder.placeholder("c_err", 1);
		let stats = RunningStats::link(&mut builder, p_tr, c_err, lambda).unwrap();
		let c_gen = stats.generalization_cost(&mut builder, c_err).unwrap();
		let session = Session::with_seed(Arc::new(builder.build()), 0);
		let feed = Feed::new()
			.with(p_tr, Tensor::column(vec![1.0, 1.0, 2.0]))
			.with(c_err, Tensor::column(vec![1.0, 3.0, 4.0]));
		Fixture {
			session,
			stats,
			c_gen,
			feed,
		}
	}

	#[test]
	fn test_weighted_batch_moments() {
		let Fixture {
			session,
			stats,
			feed,
			..
		} = fixture(0.5);
		let values = session.run(&[stats.mu_batch, stats.v_batch], &feed).unwrap();
		// μ = (1 + 3 + 8) / 4, v = (4 + 0 + 2·1) / 4
		assert_eq!(values[0], Tensor::scalar(3.0));
		assert_eq!(values[1], Tensor::scalar(1.5));
	}

	#[test]
	fn test_lambda_one_freezes_statistics() {
		let Fixture {
			mut session,
			stats,
			feed,
			..
		} = fixture(1.0);
		session.assign(&stats.update_tr, &feed).unwrap();
		session.assign(&stats.update_vl, &feed).unwrap();
		assert_eq!(session.stat(stats.mu_tr.id), Some(0.0));
		assert_eq!(session.stat(stats.v_tr.id), Some(1.0));
		assert_eq!(session.stat(stats.mu_vl.id), Some(0.0));
		assert_eq!(session.stat(stats.v_vl.id), Some(1.0));
	}

	#[test]
	fn test_lambda_zero_adopts_batch_values() {
		let Fixture {
			mut session,
			stats,
			feed,
			..
		} = fixture(0.0);
		session.assign(&stats.update_tr, &feed).unwrap();
		assert_eq!(session.stat(stats.mu_tr.id), Some(3.0));
		assert_eq!(session.stat(stats.v_tr.id), Some(1.5));
		// Validation statistics are a separate group.
		assert_eq!(session.stat(stats.mu_vl.id), Some(0.0));
		assert_eq!(session.stat(stats.v_vl.id), Some(1.0));
	}

	#[test]
	fn test_generalization_cost_is_identity_for_matching_statistics() {
		let Fixture {
			session,
			c_gen,
			feed,
			..
		} = fixture(0.9);
		let values = session.run(&[c_gen], &feed).unwrap();
		assert_eq!(values[0], Tensor::column(vec![1.0, 3.0, 4.0]));
	}

	#[test]
	fn test_generalization_cost_rescales_deviation() {
		let Fixture {
			mut session,
			stats,
			c_gen,
			feed,
		} = fixture(0.9);
		session.set_stat(stats.mu_tr.id, 2.0).unwrap();
		session.set_stat(stats.v_tr.id, 0.999).unwrap();
		session.set_stat(stats.mu_vl.id, 1.0).unwrap();
		session.set_stat(stats.v_vl.id, 3.999).unwrap();
		let values = session.run(&[c_gen], &feed).unwrap();
		// gain = sqrt(4 / 1) = 2
		let expected = [-1.0f32, 3.0, 5.0];
		for (value, expected) in values[0].iter().zip(expected) {
			assert!((value - expected).abs() < 1e-4, "{value} vs {expected}");
		}
	}
}
