//! Telegram delivery — one outbound sendMessage call per report chunk.
//!
//! Delivery is at-least-once; the scheduler guarantees one verdict per event
//! per checkpoint. Failures retry under the upstream backoff policy and are
//! dropped after exhaustion — a lost notification never blocks a tick or
//! rolls back database writes.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::error::{BotError, Result};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
    max_retries: u32,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            max_retries: max_retries.max(1),
        }
    }

    /// Channel credentials present and notifications not gated off.
    pub fn enabled(&self) -> bool {
        self.config.notifications_enabled
            && self.config.bot_token.is_some()
            && self.config.chat_id.is_some()
    }

    /// Deliver a pre-rendered report, one API call per chunk.
    pub async fn send_report(&self, chunks: &[String]) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.config.bot_token, &self.config.chat_id) else {
            warn!("telegram not configured, dropping report");
            return Ok(());
        };

        for chunk in chunks {
            self.send_message(token, chat_id, chunk).await?;
        }
        info!(chunks = chunks.len(), "report delivered");
        Ok(())
    }

    async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let mut last_err = String::new();

        for attempt in 0..self.max_retries {
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    let detail = resp.text().await.unwrap_or_default();
                    // 4xx other than 429 means a malformed request; retrying
                    // cannot help.
                    if status.is_client_error() && status.as_u16() != 429 {
                        return Err(BotError::Telegram(format!(
                            "telegram API rejected message: {status} {detail}"
                        )));
                    }
                    last_err = format!("{status} {detail}");
                    warn!(status = status.as_u16(), attempt, "telegram API error");
                }
                Err(e) => {
                    last_err = e.to_string();
                    warn!(error = %e, attempt, "telegram request error");
                }
            }

            if attempt + 1 < self.max_retries {
                let factor = 1u64 << attempt.min(5);
                tokio::time::sleep((BACKOFF_BASE * factor as u32).min(BACKOFF_CAP)).await;
            }
        }

        Err(BotError::Telegram(format!(
            "delivery failed after {} attempts: {last_err}",
            self.max_retries
        )))
    }
}
