//! SofaScore API client — proxied HTTPS with browser impersonation.
//!
//! All outbound traffic funnels through one `reqwest::Client` carrying a
//! Chrome header fingerprint and, when enabled, the rotating residential
//! proxy (the exit IP rotates per request by virtue of the username format).
//! Requests are spaced by a global minimum delay; 429 responses widen the
//! spacing until calls succeed again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{ProxyConfig, UpstreamConfig};
use crate::error::{BotError, Result};
use crate::upstream::types::{DroppingOddsResponse, EventDetailResponse, EventOddsResponse};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const SPACING_CAP_MS: u64 = 30_000;

pub struct SofaScoreClient {
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
    /// Configured minimum spacing between requests, in milliseconds.
    base_spacing_ms: u64,
    /// Current effective spacing; widened by 429s, decays on success.
    spacing_ms: AtomicU64,
    /// Earliest instant the next request may fire.
    next_slot: Mutex<Instant>,
}

impl SofaScoreClient {
    pub fn new(upstream: &UpstreamConfig, proxy: &ProxyConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream.http_timeout_secs))
            .default_headers(browser_headers());

        if proxy.enabled {
            let url = format!(
                "http://{}:{}@{}",
                proxy.username, proxy.password, proxy.endpoint
            );
            builder = builder.proxy(
                reqwest::Proxy::all(&url)
                    .map_err(|e| BotError::Config(format!("invalid proxy endpoint: {e}")))?,
            );
            tracing::info!(endpoint = %proxy.endpoint, "proxy enabled");
        } else {
            tracing::info!("proxy disabled - using direct connection");
        }

        let base_spacing_ms = (upstream.request_delay_seconds * 1000.0).max(0.0) as u64;

        Ok(Self {
            base_url: upstream.base_url.clone(),
            client: builder.build()?,
            max_retries: upstream.max_retries.max(1),
            base_spacing_ms,
            spacing_ms: AtomicU64::new(base_spacing_ms),
            next_slot: Mutex::new(Instant::now()),
        })
    }

    /// Fetch the dropping-odds catalog (events + their market blocks).
    pub async fn dropping_odds(&self) -> Result<DroppingOddsResponse> {
        self.get_json("/odds/1/dropping/all").await
    }

    /// Fetch all markets for one event.
    pub async fn event_odds(&self, event_id: i64) -> Result<EventOddsResponse> {
        self.get_json(&format!("/event/{event_id}/odds/1/all")).await
    }

    /// Fetch event detail: status code, scores, ground type, start time.
    pub async fn event_detail(&self, event_id: i64) -> Result<EventDetailResponse> {
        self.get_json(&format!("/event/{event_id}")).await
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_err = BotError::UpstreamTransient("no attempts made".into());

        for attempt in 0..self.max_retries {
            self.wait_for_slot().await;

            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.relax_spacing();
                        debug!(endpoint, "api request successful");
                        return resp.json::<T>().await.map_err(|e| {
                            BotError::UpstreamPermanent(format!(
                                "schema mismatch for {endpoint}: {e}"
                            ))
                        });
                    }

                    if is_transient_status(status) {
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            self.widen_spacing();
                        }
                        last_err = BotError::UpstreamTransient(format!(
                            "HTTP {} for {}",
                            status.as_u16(),
                            endpoint
                        ));
                        warn!(endpoint, status = status.as_u16(), attempt, "transient upstream status");
                    } else {
                        // Client errors other than 407/429 are not retried.
                        return Err(BotError::UpstreamPermanent(format!(
                            "HTTP {} for {}",
                            status.as_u16(),
                            endpoint
                        )));
                    }
                }
                Err(e) => {
                    // Timeouts, connection resets, TLS failures.
                    last_err =
                        BotError::UpstreamTransient(format!("request error for {endpoint}: {e}"));
                    warn!(endpoint, error = %e, attempt, "request error");
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(last_err)
    }

    /// Serialize request starts so the global minimum spacing holds across
    /// all workers. Callers that cannot take the next slot suspend here.
    async fn wait_for_slot(&self) {
        let spacing = Duration::from_millis(self.spacing_ms.load(Ordering::Relaxed));
        let mut slot = self.next_slot.lock().await;
        let now = Instant::now();
        if *slot > now {
            let wait = *slot - now;
            debug!(wait_ms = wait.as_millis() as u64, "rate limiting request");
            tokio::time::sleep(wait).await;
        }
        *slot = Instant::now() + spacing;
    }

    fn widen_spacing(&self) {
        let cur = self.spacing_ms.load(Ordering::Relaxed).max(500);
        let next = (cur * 2).min(SPACING_CAP_MS);
        self.spacing_ms.store(next, Ordering::Relaxed);
        warn!(spacing_ms = next, "429 received, widening request spacing");
    }

    fn relax_spacing(&self) {
        let cur = self.spacing_ms.load(Ordering::Relaxed);
        if cur > self.base_spacing_ms {
            let next = (cur / 2).max(self.base_spacing_ms);
            self.spacing_ms.store(next, Ordering::Relaxed);
        }
    }
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 30s.
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(5);
    (BACKOFF_BASE * factor as u32).min(BACKOFF_CAP)
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::PROXY_AUTHENTICATION_REQUIRED
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Chrome desktop header fingerprint, mirroring what the browser sends.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "User-Agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(
        "Accept",
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(
        "Sec-Ch-Ua",
        HeaderValue::from_static(
            "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
        ),
    );
    headers.insert("Sec-Ch-Ua-Mobile", HeaderValue::from_static("?0"));
    headers.insert("Sec-Ch-Ua-Platform", HeaderValue::from_static("\"Windows\""));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_starts_at_one_second_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(20), Duration::from_secs(30));
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(StatusCode::PROXY_AUTHENTICATION_REQUIRED));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }
}
