//! Subscriber setup for binaries, tests and benches
//!
//! The crate itself only emits `tracing` events. This module installs a
//! `tracing-subscriber` formatter for programs that have none of their own.
//! The filter comes from `STRATUM_LOG`, then `RUST_LOG`, then the given
//! default.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::error::{ArenaError, ArenaResult};

/// Environment variable read before `RUST_LOG`
pub const LOG_ENV: &str = "STRATUM_LOG";

static TEST_INIT: OnceLock<()> = OnceLock::new();

fn filter(default: &str) -> ArenaResult<EnvFilter> {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default.to_string());
    EnvFilter::try_new(&directives)
        .map_err(|e| ArenaError::invalid_config(&format!("bad log filter '{directives}': {e}")))
}

/// Installs a global formatter.
///
/// # Errors
///
/// [`ArenaError::InvalidConfig`] when the filter does not parse or a global
/// subscriber is already set.
pub fn init(default_filter: &str) -> ArenaResult<()> {
    fmt()
        .with_env_filter(filter(default_filter)?)
        .with_target(true)
        .try_init()
        .map_err(|e| ArenaError::invalid_config(&format!("subscriber already set: {e}")))
}

/// Installs a compact formatter writing through the test harness.
///
/// Safe to call from every test; only the first call does anything.
pub fn init_test_logging() {
    TEST_INIT.get_or_init(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        let Ok(filter) = filter("warn") else {
            return;
        };
        // another harness thread may win the race; either subscriber will do
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .compact()
            .try_init();
    });
}
