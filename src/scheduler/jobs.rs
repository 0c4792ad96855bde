//! Job bodies: discovery, pre-start sweep, result collection, backfills.
//!
//! Each job is a fault boundary — an error inside one event's processing is
//! logged and the job moves to the next event. Jobs never propagate faults
//! to the dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::models::{DbEvent, EventStatus, NewEvent};
use crate::db::queries::{self, CandidateQuery};
use crate::db::retry_once;
use crate::error::{BotError, Result};
use crate::matcher::engine::{self, TIER2_TOLERANCE};
use crate::matcher::types::{CurrentEvent, Verdict, VerdictStatus};
use crate::notifier::report;
use crate::odds;
use crate::runtime::Runtime;
use crate::sports;
use crate::upstream::types::{ApiEvent, OddsMapEntry};

/// Upstream status codes that admit a result write.
const RESULT_CODES: [i32; 6] = [100, 110, 92, 120, 130, 140];
/// Upstream status codes that terminate an event with no result.
const CANCEL_CODES: [i32; 3] = [70, 80, 90];

/// Minutes-to-start, by rounding (not truncation).
pub fn minutes_to_start(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ((start - now).num_seconds() as f64 / 60.0).round() as i64
}

/// A pre-start tick refreshes finals only at the two key moments.
pub fn is_checkpoint(minutes: i64) -> bool {
    minutes == 30 || minutes == 5
}

/// How the pre-start sweep runs: `Live` fetches finals and notifies;
/// `DryRun` (the `alerts` command) evaluates stored odds and only logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreStartMode {
    Live,
    DryRun,
}

// ── Discovery ───────────────────────────────────────────────────

/// Job A: pull the dropping-odds catalog, upsert events, capture openings.
pub async fn run_discovery(rt: &Runtime) -> Result<()> {
    info!("starting discovery");

    let response = rt.upstream.dropping_odds().await?;
    let events = response.events.unwrap_or_default();
    let odds_map = response.odds_map.unwrap_or_default();

    if events.is_empty() {
        warn!("no events in dropping-odds catalog");
        return Ok(());
    }
    info!(events = events.len(), "dropping-odds catalog fetched");

    let mut processed = 0usize;
    let mut skipped = 0usize;

    for api_event in &events {
        match ingest_discovered_event(rt, api_event, &odds_map).await {
            Ok(true) => processed += 1,
            Ok(false) => skipped += 1,
            Err(e) => {
                warn!(event_id = ?api_event.id, error = %e, "failed to ingest event");
                skipped += 1;
            }
        }
    }

    info!(processed, skipped, "discovery completed");
    Ok(())
}

async fn ingest_discovered_event(
    rt: &Runtime,
    api_event: &ApiEvent,
    odds_map: &std::collections::HashMap<String, OddsMapEntry>,
) -> Result<bool> {
    let Some(new_event) = extract_event(api_event) else {
        debug!(event_id = ?api_event.id, "event missing required fields");
        return Ok(false);
    };

    queries::upsert_event(&rt.db, &new_event).await?;
    rt.mark_alerts_stale();

    let has_draw = sports::profile(&new_event.sport).has_draw();
    let market = odds_map
        .get(&new_event.event_id.to_string())
        .and_then(|entry| entry.odds.as_ref());

    let Some(update) = market.and_then(|m| odds::extract_from_market(m, has_draw)) else {
        debug!(event_id = new_event.event_id, "no usable market in catalog entry");
        return Ok(false);
    };

    queries::upsert_odds(&rt.db, new_event.event_id, &update).await?;
    debug!(
        event_id = new_event.event_id,
        sport = %new_event.sport,
        "event and opening odds stored"
    );
    Ok(true)
}

/// Map a catalog entry to a storable event; `None` when required fields are
/// missing.
fn extract_event(api: &ApiEvent) -> Option<NewEvent> {
    let id = api.id?;
    let slug = api.slug.clone()?;
    let start_time = DateTime::<Utc>::from_timestamp(api.start_timestamp?, 0)?;
    let tournament = api.tournament.as_ref()?;
    let category = tournament.category.as_ref()?;
    let sport = category.sport.as_ref()?.name.clone()?;
    let home_team = api.home_team.as_ref()?.name.clone()?;
    let away_team = api.away_team.as_ref()?.name.clone()?;
    let competition = format!(
        "{}, {}",
        category.name.clone()?,
        tournament.name.clone()?
    );
    let country = category.country.as_ref().and_then(|c| c.name.clone());

    Some(NewEvent {
        event_id: id,
        slug,
        sport: sports::classify(&sport, &home_team, &away_team),
        competition,
        country,
        home_team,
        away_team,
        start_time,
    })
}

// ── Pre-start sweep ─────────────────────────────────────────────

/// Job C: for every event inside the pre-start window, take a checkpoint
/// when due, refresh finals, and run the matcher.
pub async fn run_pre_start(
    rt: &Arc<Runtime>,
    cancel: &CancellationToken,
    mode: PreStartMode,
) -> Result<()> {
    let window = rt.config.scheduler.pre_start_window_minutes;
    let events = retry_once(|| queries::events_starting_within(&rt.db, window)).await?;

    if events.is_empty() {
        debug!("no events inside the pre-start window");
        return Ok(());
    }
    info!(events = events.len(), window, "pre-start sweep");

    let mut set = JoinSet::new();
    for event in events {
        if cancel.is_cancelled() {
            return Err(BotError::Cancelled);
        }
        let rt = rt.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let Ok(_permit) = rt.workers.acquire().await else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }
            if let Err(e) = process_pre_start_event(&rt, &event, mode).await {
                warn!(event_id = event.event_id, error = %e, "pre-start processing failed");
            }
        });
    }
    while set.join_next().await.is_some() {}
    Ok(())
}

/// Fetch → normalize → write → match → notify for one in-window event.
async fn process_pre_start_event(rt: &Runtime, event: &DbEvent, mode: PreStartMode) -> Result<()> {
    let minutes = minutes_to_start(event.start_time, Utc::now());

    if mode == PreStartMode::Live {
        if !is_checkpoint(minutes) {
            debug!(
                event_id = event.event_id,
                minutes, "between checkpoints, no upstream call"
            );
            return Ok(());
        }
        info!(
            event_id = event.event_id,
            participants = %event.participants(),
            minutes,
            "checkpoint reached, refreshing finals"
        );

        if rt.config.scheduler.enable_timestamp_correction && correct_start_time(rt, event).await? {
            // The event moved; re-evaluate on a later tick against the
            // corrected time.
            return Ok(());
        }

        if !refresh_finals(rt, event).await? {
            return Ok(());
        }
    }

    let Some(verdict) = evaluate_event(rt, event.event_id, minutes).await? else {
        debug!(event_id = event.event_id, "variation vector incomplete, matcher skipped");
        return Ok(());
    };

    deliver_verdict(rt, &verdict, mode).await
}

/// Cross-check `start_time` against the upstream. Returns true when the
/// event was moved and this tick should skip it.
async fn correct_start_time(rt: &Runtime, event: &DbEvent) -> Result<bool> {
    if rt.corrections.recently_corrected(event.event_id) {
        debug!(event_id = event.event_id, "correction cooldown active");
        return Ok(false);
    }

    let detail = match rt.upstream.event_detail(event.event_id).await {
        Ok(d) => d,
        Err(e) if e.is_transient() => {
            // Correction is best-effort; the checkpoint still proceeds.
            warn!(event_id = event.event_id, error = %e, "timestamp cross-check unavailable");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let Some(api_event) = detail.event else {
        return Ok(false);
    };
    harvest_ground_type(rt, &event.sport, event.event_id, &api_event).await;

    let Some(upstream_start) = api_event
        .start_timestamp
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    else {
        return Ok(false);
    };

    let divergence = (upstream_start - event.start_time).num_seconds().abs();
    if divergence > 60 {
        info!(
            event_id = event.event_id,
            old = %event.start_time,
            new = %upstream_start,
            "start time diverged, correcting"
        );
        queries::update_event_start_time(&rt.db, event.event_id, upstream_start).await?;
        rt.corrections.note(event.event_id);
        return Ok(true);
    }
    Ok(false)
}

/// Fetch and store final odds. Returns false when the payload had no usable
/// market (the event is skipped this tick, `last_checked_at` still moves).
async fn refresh_finals(rt: &Runtime, event: &DbEvent) -> Result<bool> {
    let payload = rt.upstream.event_odds(event.event_id).await?;
    let markets = payload.markets.unwrap_or_default();
    let has_draw = sports::profile(&event.sport).has_draw();

    match odds::extract_from_markets(&markets, has_draw) {
        Some(update) => {
            queries::upsert_odds(&rt.db, event.event_id, &update).await?;
            rt.mark_alerts_stale();
            info!(event_id = event.event_id, "final odds updated");
            Ok(true)
        }
        None => {
            queries::touch_last_checked(&rt.db, event.event_id).await?;
            warn!(event_id = event.event_id, "no usable odds market, event skipped this tick");
            Ok(false)
        }
    }
}

/// Run the matcher for one event against a fresh view snapshot.
pub async fn evaluate_event(
    rt: &Runtime,
    event_id: i64,
    minutes: i64,
) -> Result<Option<Verdict>> {
    rt.refresh_alerts_if_stale().await?;

    let Some(event) = queries::get_event(&rt.db, event_id).await? else {
        return Ok(None);
    };
    let Some(odds_row) = queries::get_event_odds(&rt.db, event_id).await? else {
        return Ok(None);
    };
    let Some(current) = CurrentEvent::from_rows(&event, &odds_row, minutes) else {
        return Ok(None);
    };

    let profile = sports::profile(&event.sport);
    let query = CandidateQuery {
        sport: event.sport.clone(),
        var_shape: current.vars.has_draw(),
        exclude_event_id: event_id,
        var_one: current.vars.one,
        var_x: current.vars.x,
        var_two: current.vars.two,
        ground_type: if profile.uses_ground_type() {
            event.ground_type.clone()
        } else {
            None
        },
    };

    let tier1 = queries::tier1_candidates(&rt.db, &query).await?;
    let tier2 = if tier1.is_empty() {
        queries::tier2_candidates(&rt.db, &query, TIER2_TOLERANCE).await?
    } else {
        Vec::new()
    };

    Ok(Some(engine::evaluate(&current, tier1, tier2)))
}

async fn deliver_verdict(rt: &Runtime, verdict: &Verdict, mode: PreStartMode) -> Result<()> {
    match verdict.status {
        VerdictStatus::NoCandidates => {
            info!(
                event_id = verdict.event_id,
                "no historical candidates, nothing to report"
            );
            return Ok(());
        }
        VerdictStatus::Success => info!(
            event_id = verdict.event_id,
            prediction = verdict.prediction.as_ref().map(|p| p.text.as_str()),
            confidence = verdict.confidence,
            "matcher verdict: SUCCESS"
        ),
        VerdictStatus::NoMatch => info!(
            event_id = verdict.event_id,
            candidates = verdict.candidates.len(),
            "matcher verdict: NO_MATCH"
        ),
    }

    if mode == PreStartMode::DryRun {
        return Ok(());
    }
    if !rt.notifier.enabled() {
        info!(event_id = verdict.event_id, "notifications disabled, verdict logged only");
        return Ok(());
    }

    let chunks = report::render_report(verdict, rt.config.display_tz());
    if let Err(e) = rt.notifier.send_report(&chunks).await {
        // Delivery failures never roll back writes or block the tick.
        warn!(event_id = verdict.event_id, error = %e, "report delivery failed, dropped");
    }
    Ok(())
}

// ── Result collection ───────────────────────────────────────────

/// Job D: results for events that started in the preceding 24 hours.
pub async fn run_midnight(rt: &Arc<Runtime>, cancel: &CancellationToken) -> Result<()> {
    let now = Utc::now();
    let events =
        retry_once(|| queries::events_missing_results_between(&rt.db, now - Duration::hours(24), now))
            .await?;
    collect_results(rt, cancel, events, "midnight").await
}

/// Job E: results for every event in history still lacking one.
pub async fn run_results_all(rt: &Arc<Runtime>, cancel: &CancellationToken) -> Result<()> {
    let events = retry_once(|| queries::events_missing_results_all(&rt.db)).await?;
    collect_results(rt, cancel, events, "backfill").await
}

async fn collect_results(
    rt: &Arc<Runtime>,
    cancel: &CancellationToken,
    events: Vec<DbEvent>,
    job: &'static str,
) -> Result<()> {
    let now = Utc::now();
    // A result is not requested before start_time + the sport's cutoff.
    let due: Vec<DbEvent> = events
        .into_iter()
        .filter(|e| now >= e.start_time + sports::profile(&e.sport).result_cutoff)
        .collect();

    if due.is_empty() {
        info!(job, "no events due for result collection");
        return Ok(());
    }
    info!(job, events = due.len(), "collecting results");

    let mut set = JoinSet::new();
    for event in due {
        if cancel.is_cancelled() {
            return Err(BotError::Cancelled);
        }
        let rt = rt.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let Ok(_permit) = rt.workers.acquire().await else {
                return false;
            };
            if cancel.is_cancelled() {
                return false;
            }
            match collect_result_for_event(&rt, &event).await {
                Ok(written) => written,
                Err(e) => {
                    warn!(event_id = event.event_id, error = %e, "result collection failed");
                    false
                }
            }
        });
    }

    let mut written = 0usize;
    while let Some(res) = set.join_next().await {
        if matches!(res, Ok(true)) {
            written += 1;
        }
    }
    info!(job, written, "result collection completed");
    Ok(())
}

/// Salvage one finished event. Returns true when a new result row was
/// written.
async fn collect_result_for_event(rt: &Runtime, event: &DbEvent) -> Result<bool> {
    let detail = rt.upstream.event_detail(event.event_id).await?;
    let Some(api_event) = detail.event else {
        return Err(BotError::UpstreamPermanent(format!(
            "event {} detail payload empty",
            event.event_id
        )));
    };

    harvest_ground_type(rt, &event.sport, event.event_id, &api_event).await;

    let Some(code) = api_event.status.as_ref().and_then(|s| s.code) else {
        debug!(event_id = event.event_id, "no status code in detail");
        return Ok(false);
    };

    if CANCEL_CODES.contains(&code) {
        info!(event_id = event.event_id, code, "event cancelled upstream, no result");
        queries::mark_event_status(&rt.db, event.event_id, EventStatus::Cancelled).await?;
        rt.mark_alerts_stale();
        return Ok(false);
    }

    if !RESULT_CODES.contains(&code) {
        debug!(event_id = event.event_id, code, "event not terminal yet");
        queries::touch_last_checked(&rt.db, event.event_id).await?;
        return Ok(false);
    }

    let (Some(home_score), Some(away_score)) = (
        api_event.home_score.as_ref().and_then(|s| s.value()),
        api_event.away_score.as_ref().and_then(|s| s.value()),
    ) else {
        warn!(event_id = event.event_id, "terminal status without scores");
        return Ok(false);
    };

    let has_draw = sports::profile(&event.sport).has_draw();
    let Some(winner) = winner_side(api_event.winner_code, home_score, away_score, has_draw) else {
        warn!(
            event_id = event.event_id,
            home_score, away_score, "equal scores for a no-draw sport, result rejected"
        );
        return Ok(false);
    };

    let inserted =
        queries::insert_result(&rt.db, event.event_id, home_score, away_score, winner).await?;
    if inserted {
        info!(
            event_id = event.event_id,
            score = format!("{home_score}-{away_score}"),
            winner,
            "result stored"
        );
    } else {
        // First write won earlier; re-writes are rejected by design.
        debug!(event_id = event.event_id, "result already present");
    }

    queries::mark_event_status(&rt.db, event.event_id, EventStatus::Finished).await?;
    rt.mark_alerts_stale();
    Ok(inserted)
}

/// Winner from the upstream code, falling back to the scoreline.
/// `None` when the scores tie in a sport without draws.
fn winner_side(
    winner_code: Option<i32>,
    home_score: i32,
    away_score: i32,
    has_draw: bool,
) -> Option<&'static str> {
    match winner_code {
        Some(1) => Some("1"),
        Some(2) => Some("2"),
        Some(3) if has_draw => Some("X"),
        _ => {
            if home_score > away_score {
                Some("1")
            } else if away_score > home_score {
                Some("2")
            } else if has_draw {
                Some("X")
            } else {
                None
            }
        }
    }
}

// ── Final-odds backfill ─────────────────────────────────────────

/// Refresh finals (and any missing openings) for every started event.
pub async fn run_final_odds_all(rt: &Arc<Runtime>, cancel: &CancellationToken) -> Result<()> {
    let events = retry_once(|| queries::events_started_before(&rt.db, Utc::now())).await?;
    if events.is_empty() {
        info!("no started events to backfill");
        return Ok(());
    }
    info!(events = events.len(), "final-odds backfill");

    let mut updated = 0usize;
    for event in events {
        if cancel.is_cancelled() {
            return Err(BotError::Cancelled);
        }
        match refresh_finals(rt, &event).await {
            Ok(true) => updated += 1,
            Ok(false) => {}
            Err(e) => warn!(event_id = event.event_id, error = %e, "backfill failed for event"),
        }
    }
    info!(updated, "final-odds backfill completed");
    Ok(())
}

async fn harvest_ground_type(rt: &Runtime, sport: &str, event_id: i64, api_event: &ApiEvent) {
    if !sports::profile(sport).uses_ground_type() {
        return;
    }
    if let Some(ground) = &api_event.ground_type {
        if let Err(e) = queries::set_ground_type(&rt.db, event_id, ground).await {
            warn!(event_id, error = %e, "could not store ground type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_only_at_thirty_and_five() {
        for m in -10..=60 {
            assert_eq!(is_checkpoint(m), m == 30 || m == 5, "minute {m}");
        }
    }

    #[test]
    fn minutes_round_not_truncate() {
        let now = Utc::now();
        // 29m31s rounds to 30.
        assert_eq!(minutes_to_start(now + Duration::seconds(29 * 60 + 31), now), 30);
        // 30m29s rounds to 30.
        assert_eq!(minutes_to_start(now + Duration::seconds(30 * 60 + 29), now), 30);
        // 30m31s rounds to 31.
        assert_eq!(minutes_to_start(now + Duration::seconds(30 * 60 + 31), now), 31);
        // 4m29s rounds to 4.
        assert_eq!(minutes_to_start(now + Duration::seconds(4 * 60 + 29), now), 4);
    }

    #[test]
    fn winner_from_code_beats_scores() {
        assert_eq!(winner_side(Some(1), 0, 2, true), Some("1"));
        assert_eq!(winner_side(Some(2), 3, 0, false), Some("2"));
        assert_eq!(winner_side(Some(3), 1, 1, true), Some("X"));
    }

    #[test]
    fn winner_from_scores_when_code_missing() {
        assert_eq!(winner_side(None, 2, 1, false), Some("1"));
        assert_eq!(winner_side(None, 0, 3, true), Some("2"));
        assert_eq!(winner_side(None, 1, 1, true), Some("X"));
    }

    #[test]
    fn tie_without_draw_support_is_rejected() {
        assert_eq!(winner_side(None, 1, 1, false), None);
        // winnerCode 3 on a no-draw sport falls through to the scoreline.
        assert_eq!(winner_side(Some(3), 2, 2, false), None);
    }

    #[test]
    fn terminal_and_cancel_code_sets_are_disjoint() {
        for c in CANCEL_CODES {
            assert!(!RESULT_CODES.contains(&c));
        }
    }
}
