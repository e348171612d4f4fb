// Copyright 2025 Irreducible Inc.

/// Whether the environment variable `flag` is set to `1`, `on`, `true` or `yes`, in any case.
pub fn boolean_env_flag_set(flag: &str) -> bool {
	std::env::var(flag).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
	matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "on" | "true" | "yes")
}
