//! Clock-driven dispatcher.
//!
//! Three recurring loops (discovery, pre-start sweep, midnight results) plus
//! the one-shot entry points. Ticks are independent: a missed tick is
//! skipped, never batched, and a tick that is still running when the next
//! alignment arrives makes the new tick a no-op (per-job exclusive flag).

pub mod correction;
pub mod jobs;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::BotError;
use crate::runtime::Runtime;
use crate::scheduler::jobs::PreStartMode;

/// Local time of the daily result sweep.
const MIDNIGHT_SWEEP_HOUR: u32 = 4;
const MIDNIGHT_SWEEP_MINUTE: u32 = 0;

/// Drain window for in-flight work after cancellation.
const SHUTDOWN_GRACE: StdDuration = StdDuration::from_secs(30);

pub struct Scheduler {
    rt: Arc<Runtime>,
    cancel: CancellationToken,
    discovery_running: AtomicBool,
    pre_start_running: AtomicBool,
    results_running: AtomicBool,
}

impl Scheduler {
    pub fn new(rt: Arc<Runtime>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            rt,
            cancel,
            discovery_running: AtomicBool::new(false),
            pre_start_running: AtomicBool::new(false),
            results_running: AtomicBool::new(false),
        })
    }

    /// Run until the cancellation token fires, then drain.
    pub async fn run(self: Arc<Self>) {
        let tz = self.rt.config.display_tz();
        info!(
            discovery_hours = self.rt.config.scheduler.discovery_interval_hours,
            poll_minutes = self.rt.config.scheduler.poll_interval_minutes,
            timezone = %tz,
            "scheduler starting"
        );

        let mut loops = JoinSet::new();

        {
            let s = self.clone();
            loops.spawn(async move { s.discovery_loop(tz).await });
        }
        {
            let s = self.clone();
            loops.spawn(async move { s.pre_start_loop(tz).await });
        }
        {
            let s = self.clone();
            loops.spawn(async move { s.midnight_loop(tz).await });
        }

        // Catch anything already inside the window, then seed history.
        self.tick_pre_start().await;
        self.tick_discovery().await;

        self.cancel.cancelled().await;
        info!("shutdown requested, draining workers");

        let drain = async {
            while loops.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("drain window elapsed, aborting remaining work");
            loops.abort_all();
        }
        info!("scheduler stopped");
    }

    async fn discovery_loop(&self, tz: Tz) {
        let every = self.rt.config.scheduler.discovery_interval_hours;
        loop {
            let next = next_hour_aligned(Utc::now().with_timezone(&tz), every);
            if !self.sleep_until(next.with_timezone(&Utc)).await {
                break;
            }
            self.tick_discovery().await;
        }
    }

    async fn pre_start_loop(&self, tz: Tz) {
        let every = self.rt.config.scheduler.poll_interval_minutes;
        loop {
            let next = next_minute_aligned(Utc::now().with_timezone(&tz), every);
            if !self.sleep_until(next.with_timezone(&Utc)).await {
                break;
            }
            self.tick_pre_start().await;
        }
    }

    async fn midnight_loop(&self, tz: Tz) {
        loop {
            let next = next_daily_at(
                Utc::now().with_timezone(&tz),
                MIDNIGHT_SWEEP_HOUR,
                MIDNIGHT_SWEEP_MINUTE,
            );
            if !self.sleep_until(next.with_timezone(&Utc)).await {
                break;
            }
            if begin(&self.results_running, "midnight") {
                if let Err(e) = jobs::run_midnight(&self.rt, &self.cancel).await {
                    log_job_error("midnight", e);
                }
                self.results_running.store(false, Ordering::Release);
            }
        }
    }

    async fn tick_discovery(&self) {
        if begin(&self.discovery_running, "discovery") {
            if let Err(e) = jobs::run_discovery(&self.rt).await {
                log_job_error("discovery", e);
            }
            self.discovery_running.store(false, Ordering::Release);
        }
    }

    async fn tick_pre_start(&self) {
        if begin(&self.pre_start_running, "pre-start") {
            if let Err(e) = jobs::run_pre_start(&self.rt, &self.cancel, PreStartMode::Live).await {
                log_job_error("pre-start", e);
            }
            self.pre_start_running.store(false, Ordering::Release);
        }
    }

    /// Sleep until the target instant. Returns false on cancellation.
    async fn sleep_until(&self, target: DateTime<Utc>) -> bool {
        let wait = (target - Utc::now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => !self.cancel.is_cancelled(),
        }
    }
}

/// Claim a job's exclusive flag. A tick that finds it held is skipped.
fn begin(flag: &AtomicBool, job: &str) -> bool {
    if flag
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        true
    } else {
        warn!(job, "previous tick still running, skipping this one");
        false
    }
}

fn log_job_error(job: &str, e: BotError) {
    match e {
        BotError::Cancelled => info!(job, "tick cancelled"),
        e => error!(job, error = %e, "tick failed"),
    }
}

/// Upcoming tick per job, for the `status` command.
pub fn next_ticks(
    poll_minutes: u32,
    discovery_hours: u32,
    tz: Tz,
) -> Vec<(&'static str, DateTime<Tz>)> {
    let now = Utc::now().with_timezone(&tz);
    vec![
        ("discovery", next_hour_aligned(now, discovery_hours)),
        ("pre-start", next_minute_aligned(now, poll_minutes)),
        (
            "midnight results",
            next_daily_at(now, MIDNIGHT_SWEEP_HOUR, MIDNIGHT_SWEEP_MINUTE),
        ),
    ]
}

// ── Clock alignment ─────────────────────────────────────────────

/// Next wall-clock instant whose minute is a multiple of `every`.
pub fn next_minute_aligned<Z: TimeZone>(now: DateTime<Z>, every: u32) -> DateTime<Z> {
    let every = every.clamp(1, 60);
    let next = (now.minute() / every + 1) * every;
    hour_start(&now) + Duration::minutes(next as i64)
}

/// Next wall-clock instant whose hour is a multiple of `every` (00:00,
/// 02:00, ... for `every` = 2).
pub fn next_hour_aligned<Z: TimeZone>(now: DateTime<Z>, every: u32) -> DateTime<Z> {
    let every = every.clamp(1, 24);
    let next = (now.hour() / every + 1) * every;
    hour_start(&now) - Duration::hours(now.hour() as i64) + Duration::hours(next as i64)
}

/// Next occurrence of `hour:minute` local time after `now`.
pub fn next_daily_at<Z: TimeZone>(now: DateTime<Z>, hour: u32, minute: u32) -> DateTime<Z> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(naive) = date.and_hms_opt(hour, minute, 0) {
            if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
                if candidate > now {
                    return candidate;
                }
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }
    // DST pathologies only; fall back to a plain 24h step.
    now + Duration::hours(24)
}

fn hour_start<Z: TimeZone>(now: &DateTime<Z>) -> DateTime<Z> {
    now.clone()
        - Duration::minutes(now.minute() as i64)
        - Duration::seconds(now.second() as i64)
        - Duration::nanoseconds(now.nanosecond() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, h, m, s).unwrap()
    }

    #[test]
    fn minute_alignment_lands_on_multiples() {
        assert_eq!(next_minute_aligned(utc(10, 2, 30), 5), utc(10, 5, 0));
        assert_eq!(next_minute_aligned(utc(10, 5, 0), 5), utc(10, 10, 0));
        assert_eq!(next_minute_aligned(utc(10, 57, 1), 5), utc(11, 0, 0));
    }

    #[test]
    fn hour_alignment_lands_on_multiples() {
        assert_eq!(next_hour_aligned(utc(1, 30, 0), 2), utc(2, 0, 0));
        assert_eq!(next_hour_aligned(utc(2, 0, 0), 2), utc(4, 0, 0));
        assert_eq!(
            next_hour_aligned(utc(23, 10, 0), 2),
            utc(0, 0, 0) + Duration::hours(24)
        );
    }

    #[test]
    fn daily_alignment_rolls_to_tomorrow() {
        assert_eq!(next_daily_at(utc(3, 0, 0), 4, 0), utc(4, 0, 0));
        assert_eq!(next_daily_at(utc(4, 0, 0), 4, 0), utc(4, 0, 0) + Duration::hours(24));
        assert_eq!(next_daily_at(utc(12, 30, 0), 4, 0), utc(4, 0, 0) + Duration::hours(24));
    }

    #[test]
    fn begin_claims_exclusively() {
        let flag = AtomicBool::new(false);
        assert!(begin(&flag, "test"));
        assert!(!begin(&flag, "test"));
        flag.store(false, Ordering::Release);
        assert!(begin(&flag, "test"));
    }
}
