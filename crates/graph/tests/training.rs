// Copyright 2025 Irreducible Inc.

use std::sync::Arc;

use condnet_graph::{
	Feed, GradientDescent, GraphBuilder, Init, Momentum, Optimizer, Session, Tensor,
};

fn fit_line(optimizer: &mut dyn Optimizer, steps: usize) -> (f32, f32) {
	let mut builder = GraphBuilder::new();
	let x = builder.placeholder("x", 1);
	let y = builder.placeholder("y", 1);
	builder.push_namespace("line");
	let w = builder.param("w", 1, 1, Init::Zeros);
	let b = builder.param("b", 1, 1, Init::Zeros);
	builder.pop_namespace().unwrap();
	let xw = builder.matmul(x, w).unwrap();
	let prediction = builder.add(xw, b).unwrap();
	let error = builder.sub(prediction, y).unwrap();
	let squared = builder.square(error).unwrap();
	let loss = builder.reduce_mean(squared).unwrap();
	let graph = Arc::new(builder.build());
	assert!(graph.param_by_name("line/w").is_some());

	let mut session = Session::with_seed(graph, 0);
	let xs = vec![-1.0, -0.5, 0.0, 0.5, 1.0];
	let ys = xs.iter().map(|x| 2.0 * x + 0.5).collect();
	let feed = Feed::new()
		.with(x, Tensor::column(xs))
		.with(y, Tensor::column(ys));

	let initial = session.run(&[loss], &feed).unwrap()[0].scalar_value().unwrap();
	for _ in 0..steps {
		let evaluation = session.evaluate(&[loss], &feed).unwrap();
		let gradients = session.gradients(&evaluation, loss).unwrap().into_vec();
		session.apply_gradients(optimizer, &gradients).unwrap();
	}
	let last = session.run(&[loss], &feed).unwrap()[0].scalar_value().unwrap();
	(initial, last)
}

#[test]
fn test_gradient_descent_fits_a_line() {
	let (initial, last) = fit_line(&mut GradientDescent::new(0.1), 300);
	assert!(last < 1e-3 * initial, "loss went from {initial} to {last}");
}

#[test]
fn test_momentum_fits_a_line() {
	let (initial, last) = fit_line(&mut Momentum::new(0.05, 0.9), 300);
	assert!(last < 1e-3 * initial, "loss went from {initial} to {last}");
}
