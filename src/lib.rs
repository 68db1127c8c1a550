//! pyexec - run untrusted Python scripts behind an HTTP API
//!
//! This crate provides:
//! - The execution pipeline: harness, artifact lifecycle, output decoding
//! - Sandbox selection with direct-execution fallback
//! - HTTP server (`/execute`, `/health`)
//! - TOML configuration with environment overrides

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod execution;
pub mod paths;
pub mod sandbox;
pub mod server;

pub use config::Config;
pub use execution::{ExecutionError, ExecutionOutput, ExecutionRequest, ExecutionService};
