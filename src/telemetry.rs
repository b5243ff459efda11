//! Tracing initialization.
//!
//! Structured logging via `tracing-subscriber` with env-filter overrides
//! (`RUST_LOG`) and the output format chosen in config. Initialized once,
//! before anything that logs.

use crate::config::LogFormat;

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` when set; defaults to `info` otherwise. Safe to call
/// only once per process; tests use [`try_init`] instead.
pub fn init(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }
}

/// Like [`init`] but tolerates an already-installed subscriber.
/// Used by in-process test servers sharing one process.
pub fn try_init(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init(),
    };
    let _ = result;
}
