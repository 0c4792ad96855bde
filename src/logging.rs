//! Structured logging setup using tracing-subscriber.
//!
//! Console output plus a rolling log file (`sofascore_odds.log`).

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .compact();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file);

    match file {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Arc::new(file));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            tracing::warn!(error = %e, path = %config.log_file, "could not open log file, console only");
        }
    }
}
