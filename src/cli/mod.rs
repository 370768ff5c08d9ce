//! Command-line interface for insightflow.
//!
//! Provides commands for inspecting the pipeline stage vocabulary and
//! validating workflow submission files offline.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
