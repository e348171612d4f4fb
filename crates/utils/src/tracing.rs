// Copyright 2025 Irreducible Inc.

use crate::env::boolean_env_flag_set;

/// Environment flag that additionally reports span close events, including their busy and idle
/// time. Useful for seeing where a training step spends its time.
pub const LOG_SPANS_FLAG: &str = "CONDNET_LOG_SPANS";

/// Installs a global `tracing` subscriber.
///
/// The filter is taken from `RUST_LOG` and defaults to `info`. Calling this more than once, or
/// after another subscriber has been installed, is a no-op.
pub fn init_tracing() {
	use tracing_subscriber::{
		fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
	};

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let span_events = if boolean_env_flag_set(LOG_SPANS_FLAG) {
		FmtSpan::CLOSE
	} else {
		FmtSpan::NONE
	};

	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_span_events(span_events))
		.try_init();
}
