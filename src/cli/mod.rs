//! Command-line interface for verdict-forge.
//!
//! Provides commands for serving the HTTP API, evaluating a single idea,
//! and running the scoring and finance engines directly.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
