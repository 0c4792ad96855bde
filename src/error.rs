//! Unified error types for the odds bot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Upstream failure worth retrying: 407/429/5xx, timeouts, connection
    /// or TLS resets. Carries the last observed condition after retries.
    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    /// Upstream failure that retrying cannot fix: other 4xx, schema
    /// mismatch, market not found.
    #[error("upstream permanent error: {0}")]
    UpstreamPermanent(String),

    #[error("telegram error: {0}")]
    Telegram(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl BotError {
    /// Process exit code for a fatal error at the binary boundary.
    /// 0 success, 1 config, 2 upstream, 3 database, 4 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            BotError::Config(_) => 1,
            BotError::Database(_) => 3,
            BotError::Cancelled => 4,
            _ => 2,
        }
    }

    /// True for errors the upstream client retries with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::UpstreamTransient(_))
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
