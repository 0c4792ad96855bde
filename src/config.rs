//! Configuration — optional TOML file defaults + environment variable overrides.
//!
//! Every tunable is readable from the environment at startup; the TOML file
//! (`config/default.toml`) is a convenience for local runs and never holds
//! secrets.

use serde::Deserialize;
use std::env;

use crate::error::{BotError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_delay")]
    pub request_delay_seconds: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_delay_seconds: default_request_delay(),
            max_retries: default_max_retries(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.sofascore.com/api/v1".into()
}
fn default_request_delay() -> f64 {
    1.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_http_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u32,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_hours: u32,
    #[serde(default = "default_pre_start_window")]
    pub pre_start_window_minutes: i64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub enable_timestamp_correction: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: default_poll_interval(),
            discovery_interval_hours: default_discovery_interval(),
            pre_start_window_minutes: default_pre_start_window(),
            timezone: default_timezone(),
            enable_timestamp_correction: true,
            workers: default_workers(),
        }
    }
}

fn default_poll_interval() -> u32 {
    5
}
fn default_discovery_interval() -> u32 {
    2
}
fn default_pre_start_window() -> i64 {
    30
}
fn default_timezone() -> String {
    "America/Mexico_City".into()
}
fn default_true() -> bool {
    true
}
fn default_workers() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_file() -> String {
    "sofascore_odds.log".into()
}

impl Config {
    /// Load configuration from `config/default.toml` merged with env vars.
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .build()
            .map_err(|e| BotError::Config(e.to_string()))?;

        let mut cfg: Config = builder
            .try_deserialize()
            .map_err(|e| BotError::Config(e.to_string()))?;

        // Environment always wins over the TOML file.
        if let Ok(v) = env::var("DATABASE_URL") {
            cfg.database.url = v;
        }
        if let Ok(v) = env::var("DB_CONNECT_TIMEOUT") {
            cfg.database.connect_timeout_secs = parse_var("DB_CONNECT_TIMEOUT", &v)?;
        }
        if let Ok(v) = env::var("POLL_INTERVAL_MINUTES") {
            cfg.scheduler.poll_interval_minutes = parse_var("POLL_INTERVAL_MINUTES", &v)?;
        }
        if let Ok(v) = env::var("DISCOVERY_INTERVAL_HOURS") {
            cfg.scheduler.discovery_interval_hours = parse_var("DISCOVERY_INTERVAL_HOURS", &v)?;
        }
        if let Ok(v) = env::var("PRE_START_WINDOW_MINUTES") {
            cfg.scheduler.pre_start_window_minutes = parse_var("PRE_START_WINDOW_MINUTES", &v)?;
        }
        if let Ok(v) = env::var("TIMEZONE") {
            cfg.scheduler.timezone = v;
        }
        if let Ok(v) = env::var("ENABLE_TIMESTAMP_CORRECTION") {
            cfg.scheduler.enable_timestamp_correction = parse_bool(&v);
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            cfg.logging.log_level = v.to_lowercase();
        }
        if let Ok(v) = env::var("REQUEST_DELAY_SECONDS") {
            cfg.upstream.request_delay_seconds = parse_var("REQUEST_DELAY_SECONDS", &v)?;
        }
        if let Ok(v) = env::var("MAX_RETRIES") {
            cfg.upstream.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Ok(v) = env::var("NOTIFICATIONS_ENABLED") {
            cfg.telegram.notifications_enabled = parse_bool(&v);
        }
        if let Ok(v) = env::var("TELEGRAM_BOT_TOKEN") {
            cfg.telegram.bot_token = Some(v);
        }
        if let Ok(v) = env::var("TELEGRAM_CHAT_ID") {
            cfg.telegram.chat_id = Some(v);
        }
        if let Ok(v) = env::var("PROXY_ENABLED") {
            cfg.proxy.enabled = parse_bool(&v);
        }
        if let Ok(v) = env::var("PROXY_USERNAME") {
            cfg.proxy.username = v;
        }
        if let Ok(v) = env::var("PROXY_PASSWORD") {
            cfg.proxy.password = v;
        }
        if let Ok(v) = env::var("PROXY_ENDPOINT") {
            cfg.proxy.endpoint = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(BotError::Config("DATABASE_URL is required".into()));
        }
        if self.scheduler.poll_interval_minutes == 0 || self.scheduler.poll_interval_minutes > 60 {
            return Err(BotError::Config(
                "POLL_INTERVAL_MINUTES must be in 1..=60".into(),
            ));
        }
        if self.scheduler.discovery_interval_hours == 0
            || self.scheduler.discovery_interval_hours > 24
        {
            return Err(BotError::Config(
                "DISCOVERY_INTERVAL_HOURS must be in 1..=24".into(),
            ));
        }
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(BotError::Config(format!(
                "TIMEZONE is not a valid IANA zone: {}",
                self.scheduler.timezone
            )));
        }
        if self.proxy.enabled && self.proxy.endpoint.is_empty() {
            return Err(BotError::Config(
                "PROXY_ENDPOINT is required when PROXY_ENABLED".into(),
            ));
        }
        Ok(())
    }

    /// The configured display timezone. Validated at load.
    pub fn display_tz(&self) -> chrono_tz::Tz {
        self.scheduler
            .timezone
            .parse()
            .unwrap_or(chrono_tz::America::Mexico_City)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| BotError::Config(format!("invalid value for {}: {}", name, raw)))
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
