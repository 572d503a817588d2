//! Structured logging init (ambient stack — not present in the teacher
//! repo's CLI-only `println!` usage, adopted from the wider retrieval pack's
//! `tracing` + `tracing-subscriber` convention).

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber from `RUST_LOG`, falling back
/// to the `log_level` read from configuration (`LOG_LEVEL` env var) and
/// finally to `info`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
