//! Tracing bootstrap for the echo bot.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,matrix_echo=debug,matrix_client=debug";

/// Initialize the global tracing subscriber.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `MATRIX_ECHO_LOG`
/// 3) internal default filter
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_env_filter(filter_from_env())
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(value) = env::var("MATRIX_ECHO_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        && let Ok(filter) = EnvFilter::try_new(value)
    {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}
