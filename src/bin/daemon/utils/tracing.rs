//! Tracing Utilities Module
//!
//! This module contains tracing functionality for the motor daemon,
//! including logging configuration with optional file output.

use crate::config::LoggingSettings;
use std::fs::OpenOptions;
use std::sync::{Once, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static INIT: Once = Once::new();

/// Builds the level filter, letting `RUST_LOG` override the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initializes the tracing subscriber with console output and, when a log
/// file is configured, a second non-blocking file layer.
///
/// Calling this more than once is a no-op.
pub fn setup_tracing(settings: &LoggingSettings) {
    INIT.call_once(|| {
        let stdout_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_filter(env_filter(&settings.level));

        let file_layer = settings.file.as_ref().and_then(|path| {
            let file = match OpenOptions::new().append(true).create(true).open(path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Cannot open log file {}: {}", path.display(), e);
                    return None;
                }
            };

            let (non_blocking, guard) = tracing_appender::non_blocking::NonBlocking::new(file);
            // The guard flushes pending records on drop, so it must outlive the program
            let _ = WORKER_GUARD.set(guard);

            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_filter(env_filter(&settings.level)),
            )
        });

        if let Err(e) = tracing_subscriber::registry()
            .with(file_layer)
            .with(stdout_layer)
            .try_init()
        {
            eprintln!("Failed to initialize tracing subscriber: {}", e);
        }
    });
}
