/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::path::PathBuf;

use clap::Parser;

/// Process configuration (spec §6.6), read from flags or the matching
/// environment variable via `clap`'s `env` feature -- the same mechanism
/// the teacher's CLIs use for configuration that doubles as a deployment
/// knob.
#[derive(Parser, Debug)]
#[command(author, version, about = "Pogo centralized version control server")]
pub struct Config {
    /// Relational DB connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Root of the on-disk blob store.
    #[arg(long, env = "DATA_ROOT")]
    pub data_root: PathBuf,

    /// Externally visible URL, surfaced to clients but not used for binding.
    #[arg(long, env = "PUBLIC_ADDRESS", default_value = "http://localhost:7117")]
    pub public_address: String,

    /// Listen host.
    #[arg(long, env = "HOST", default_value = "[::]")]
    pub host: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 7117)]
    pub port: u16,

    /// Optional bootstrap access token that is always authenticated as
    /// the `root` identity with access to every repository.
    #[arg(long, env = "ROOT_TOKEN")]
    pub root_token: Option<String>,

    /// File-row count above which GC switches from in-memory to batched
    /// sweeping (spec §4.5.2 step 3).
    #[arg(long, env = "GC_MEMORY_THRESHOLD")]
    pub gc_memory_threshold: Option<i64>,

    /// CI run log retention, in hours (spec §6.6, default 720h = 30 days).
    #[arg(long, env = "CI_RUN_RETENTION_HOURS")]
    pub ci_run_retention_hours: Option<i64>,

    /// Default TTL for CI-issued tokens, in seconds (spec §5, default 1h).
    #[arg(long, env = "CI_TOKEN_TTL_SECONDS", default_value_t = 3600)]
    pub ci_token_ttl_seconds: u64,
}
