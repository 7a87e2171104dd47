//! Shared CLI type definitions for servecheck build and runtime.
//!
//! This crate provides CLI argument and configuration types used by both the
//! `build.rs` script (for man page generation) and the `servecheck` binary.
//! Keeping them here lets the build script render the man page without
//! depending on the HTTP stack.

// Clap and OrthoConfig derive macros inject generated code throughout the
// module, so the suppressions cannot be narrowed to single items.
#![expect(
    non_snake_case,
    reason = "Clap/OrthoConfig derive macros generate helper modules with uppercase names"
)]
#![expect(
    missing_docs,
    reason = "OrthoConfig and Clap derive macros generate items that cannot be documented"
)]

use clap::{Args, Parser, Subcommand};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

/// Default number of trials per run.
pub const DEFAULT_TRIAL_COUNT: u32 = 100;
/// Default bound on accepted shrink steps.
pub const DEFAULT_MAX_SHRINK_STEPS: u32 = 1000;
/// Default largest generation size.
pub const DEFAULT_MAX_SIZE: u32 = 100;
/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Arguments for the `satisfies` subcommand.
#[derive(Parser, OrthoConfig, Deserialize, Serialize, Default, Debug, Clone)]
#[ortho_config(prefix = "SERVECHECK_")]
pub struct SatisfiesArgs {
    /// JSON file holding the API route tree.
    #[arg(long)]
    pub api: Option<String>,
    /// Base URL of the server under test.
    #[arg(long)]
    pub url: Option<String>,
    /// Built-in predicate to check; repeat to combine. Defaults to `never-5xx`.
    #[arg(long = "predicate")]
    pub predicates: Vec<String>,
}

/// Arguments for the `equal` subcommand.
#[derive(Parser, OrthoConfig, Deserialize, Serialize, Default, Debug, Clone)]
#[ortho_config(prefix = "SERVECHECK_")]
pub struct EqualArgs {
    /// JSON file holding the API route tree.
    #[arg(long)]
    pub api: Option<String>,
    /// Base URL of the first server.
    #[arg(long)]
    pub url_a: Option<String>,
    /// Base URL of the second server.
    #[arg(long)]
    pub url_b: Option<String>,
    /// Response equality: `bytes`, `json` or `status`. Defaults to `bytes`.
    #[arg(long)]
    pub equality: Option<String>,
    /// Also compare headers, except these; repeat for several.
    #[arg(long = "ignore-header")]
    pub ignore_headers: Vec<String>,
}

/// CLI subcommands exposed by `servecheck`.
#[derive(Subcommand, Deserialize, Serialize, Debug, Clone)]
pub enum Commands {
    /// Check that a running server satisfies built-in predicates.
    #[command(name = "satisfies")]
    Satisfies(SatisfiesArgs),
    /// Check that two running servers answer every request alike.
    #[command(name = "equal")]
    Equal(EqualArgs),
}

/// Run settings shared by every subcommand.
#[derive(Args, OrthoConfig, Serialize, Deserialize, Default, Debug, Clone)]
#[ortho_config(prefix = "SERVECHECK_")]
pub struct CheckConfig {
    /// Number of generated requests.
    #[ortho_config(default = DEFAULT_TRIAL_COUNT)]
    #[arg(long, default_value_t = DEFAULT_TRIAL_COUNT)]
    pub trial_count: u32,
    /// Bound on accepted shrink steps per failure.
    #[ortho_config(default = DEFAULT_MAX_SHRINK_STEPS)]
    #[arg(long, default_value_t = DEFAULT_MAX_SHRINK_STEPS)]
    pub max_shrink_steps: u32,
    /// Largest size reached by the cycling size schedule.
    #[ortho_config(default = DEFAULT_MAX_SIZE)]
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    pub max_size: u32,
    /// Seed for replaying a run; random when absent.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Keep running after a failure and report each distinct category.
    #[ortho_config(default = false)]
    #[arg(long)]
    pub exhaustive: bool,
    /// Per-request timeout in milliseconds.
    #[ortho_config(default = DEFAULT_TIMEOUT_MS)]
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
    /// Retries of refused connections.
    #[ortho_config(default = 0)]
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

/// Top-level CLI entry point consumed by the binary.
#[derive(Parser, Deserialize, Serialize, Debug, Clone)]
#[command(name = "servecheck", version, about)]
pub struct Cli {
    /// Run settings.
    #[command(flatten)]
    pub config: CheckConfig,
    /// Check to run.
    #[command(subcommand)]
    pub command: Commands,
}
