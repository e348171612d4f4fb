// Copyright 2025 Irreducible Inc.

//! Small shared helpers for the condnet crates: early-return macros, environment flags and
//! tracing setup.

pub mod env;
pub mod error_utils;
pub mod tracing;
