//! Process-wide runtime state.
//!
//! All mutable shared state (pool, upstream client, notifier, correction
//! cache, staleness marker) lives here, built once at boot and torn down on
//! shutdown. Pure logic modules never reach into this.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::{pool, queries};
use crate::error::Result;
use crate::notifier::telegram::TelegramNotifier;
use crate::scheduler::correction::CorrectionCache;
use crate::upstream::client::SofaScoreClient;

pub struct Runtime {
    pub config: Config,
    pub db: PgPool,
    pub upstream: SofaScoreClient,
    pub notifier: TelegramNotifier,
    pub corrections: CorrectionCache,
    /// Bounded pool for per-event fan-out inside a tick.
    pub workers: Semaphore,
    /// Flipped on any write to events, odds, or results; the matcher
    /// refreshes the alert view before reading when set.
    alerts_stale: AtomicBool,
}

impl Runtime {
    pub async fn init(config: Config) -> Result<Arc<Self>> {
        let db = pool::create_pool(&config.database).await?;
        pool::run_migrations(&db).await?;
        info!("database connected and migrations applied");

        let upstream = SofaScoreClient::new(&config.upstream, &config.proxy)?;
        let notifier =
            TelegramNotifier::new(config.telegram.clone(), config.upstream.max_retries);
        let workers = Semaphore::new(config.scheduler.workers.max(1));

        Ok(Arc::new(Self {
            config,
            db,
            upstream,
            notifier,
            corrections: CorrectionCache::default(),
            workers,
            // Stale at boot so the first matcher run sees fresh history.
            alerts_stale: AtomicBool::new(true),
        }))
    }

    pub fn mark_alerts_stale(&self) {
        self.alerts_stale.store(true, Ordering::Release);
    }

    /// Refresh the materialized view if any write happened since the last
    /// refresh. Safe to call concurrently; a redundant refresh is harmless.
    pub async fn refresh_alerts_if_stale(&self) -> Result<()> {
        if self.alerts_stale.swap(false, Ordering::AcqRel) {
            debug!("alert view stale, refreshing");
            if let Err(e) = queries::refresh_alert_view(&self.db).await {
                // Leave the marker set so the next run retries.
                self.alerts_stale.store(true, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Force a view refresh regardless of the marker.
    pub async fn refresh_alerts(&self) -> Result<()> {
        queries::refresh_alert_view(&self.db).await?;
        self.alerts_stale.store(false, Ordering::Release);
        Ok(())
    }
}
