//! SQL query functions for all tables and the alert view.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::models::*;
use crate::error::Result;
use crate::odds::OddsUpdate;

// ── Events ──────────────────────────────────────────────────────

/// Upsert an event keyed on its upstream id.
///
/// `sport` and `start_time` are write-once here: reschedules go through
/// `update_event_start_time` (timestamp correction) only.
pub async fn upsert_event(pool: &PgPool, ev: &NewEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO events (event_id, slug, sport, competition, country, home_team, away_team,
                             start_time, last_checked_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
         ON CONFLICT (event_id) DO UPDATE SET
             slug = EXCLUDED.slug,
             competition = EXCLUDED.competition,
             country = EXCLUDED.country,
             home_team = EXCLUDED.home_team,
             away_team = EXCLUDED.away_team,
             last_checked_at = now(),
             updated_at = now()",
    )
    .bind(ev.event_id)
    .bind(&ev.slug)
    .bind(&ev.sport)
    .bind(&ev.competition)
    .bind(&ev.country)
    .bind(&ev.home_team)
    .bind(&ev.away_team)
    .bind(ev.start_time)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_event(pool: &PgPool, event_id: i64) -> Result<Option<DbEvent>> {
    let row = sqlx::query_as::<_, DbEvent>("SELECT * FROM events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The only legal path for moving `start_time` after discovery.
pub async fn update_event_start_time(
    pool: &PgPool,
    event_id: i64,
    new_start: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE events SET start_time = $1, updated_at = now() WHERE event_id = $2")
        .bind(new_start)
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_event_status(pool: &PgPool, event_id: i64, status: EventStatus) -> Result<()> {
    sqlx::query("UPDATE events SET status = $1, updated_at = now() WHERE event_id = $2")
        .bind(status.as_str())
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record an upstream read even when no odds were written.
pub async fn touch_last_checked(pool: &PgPool, event_id: i64) -> Result<()> {
    sqlx::query("UPDATE events SET last_checked_at = now() WHERE event_id = $1")
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_ground_type(pool: &PgPool, event_id: i64, ground_type: &str) -> Result<()> {
    sqlx::query(
        "UPDATE events SET ground_type = $1, updated_at = now()
         WHERE event_id = $2 AND ground_type IS DISTINCT FROM $1",
    )
    .bind(ground_type)
    .bind(event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Scheduled events with `start_time - now` in (0, window] minutes.
pub async fn events_starting_within(pool: &PgPool, window_minutes: i64) -> Result<Vec<DbEvent>> {
    let now = Utc::now();
    let rows = sqlx::query_as::<_, DbEvent>(
        "SELECT * FROM events
         WHERE status = 'scheduled' AND start_time > $1 AND start_time <= $2
         ORDER BY start_time",
    )
    .bind(now)
    .bind(now + Duration::minutes(window_minutes))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Scheduled events in [from, to) without a result row.
pub async fn events_missing_results_between(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DbEvent>> {
    let rows = sqlx::query_as::<_, DbEvent>(
        "SELECT e.* FROM events e
         WHERE e.status = 'scheduled'
           AND e.start_time >= $1 AND e.start_time < $2
           AND NOT EXISTS (SELECT 1 FROM results r WHERE r.event_id = e.event_id)
         ORDER BY e.start_time",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Every started, non-cancelled event still lacking a result.
pub async fn events_missing_results_all(pool: &PgPool) -> Result<Vec<DbEvent>> {
    let rows = sqlx::query_as::<_, DbEvent>(
        "SELECT e.* FROM events e
         WHERE e.status = 'scheduled'
           AND e.start_time < now()
           AND NOT EXISTS (SELECT 1 FROM results r WHERE r.event_id = e.event_id)
         ORDER BY e.start_time",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Started, non-cancelled events, for the final-odds backfill.
pub async fn events_started_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<DbEvent>> {
    let rows = sqlx::query_as::<_, DbEvent>(
        "SELECT * FROM events
         WHERE status <> 'cancelled' AND start_time < $1
         ORDER BY start_time DESC",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_events(pool: &PgPool, limit: i64) -> Result<Vec<DbEvent>> {
    let rows = sqlx::query_as::<_, DbEvent>(
        "SELECT * FROM events ORDER BY start_time DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_events(pool: &PgPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?)
}

pub async fn count_odds(pool: &PgPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM event_odds")
        .fetch_one(pool)
        .await?)
}

pub async fn count_results(pool: &PgPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM results")
        .fetch_one(pool)
        .await?)
}

// ── Odds ────────────────────────────────────────────────────────

/// Upsert the per-event odds record.
///
/// Openings are write-once: an existing opening survives any later write.
/// Finals take the newest non-null value. The generated variation columns
/// follow on their own.
pub async fn upsert_odds(pool: &PgPool, event_id: i64, odds: &OddsUpdate) -> Result<()> {
    sqlx::query(
        "INSERT INTO event_odds (event_id, one_open, x_open, two_open,
                                 one_final, x_final, two_final,
                                 open_captured_at, final_captured_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7,
                 CASE WHEN $2::numeric IS NOT NULL THEN now() END,
                 CASE WHEN $5::numeric IS NOT NULL THEN now() END)
         ON CONFLICT (event_id) DO UPDATE SET
             one_open = COALESCE(event_odds.one_open, EXCLUDED.one_open),
             x_open   = COALESCE(event_odds.x_open, EXCLUDED.x_open),
             two_open = COALESCE(event_odds.two_open, EXCLUDED.two_open),
             one_final = COALESCE(EXCLUDED.one_final, event_odds.one_final),
             x_final   = COALESCE(EXCLUDED.x_final, event_odds.x_final),
             two_final = COALESCE(EXCLUDED.two_final, event_odds.two_final),
             open_captured_at = CASE
                 WHEN event_odds.one_open IS NULL AND EXCLUDED.one_open IS NOT NULL THEN now()
                 ELSE event_odds.open_captured_at
             END,
             final_captured_at = CASE
                 WHEN EXCLUDED.one_final IS NOT NULL THEN now()
                 ELSE event_odds.final_captured_at
             END",
    )
    .bind(event_id)
    .bind(odds.one_open)
    .bind(odds.x_open)
    .bind(odds.two_open)
    .bind(odds.one_final)
    .bind(odds.x_final)
    .bind(odds.two_final)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_event_odds(pool: &PgPool, event_id: i64) -> Result<Option<DbEventOdds>> {
    let row = sqlx::query_as::<_, DbEventOdds>("SELECT * FROM event_odds WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ── Results ─────────────────────────────────────────────────────

/// Insert a result. First write wins; returns false when a row already
/// existed.
pub async fn insert_result(
    pool: &PgPool,
    event_id: i64,
    home_score: i32,
    away_score: i32,
    winner_side: &str,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO results (event_id, home_score, away_score, winner_side)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(event_id)
    .bind(home_score)
    .bind(away_score)
    .bind(winner_side)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

// ── Alert view ──────────────────────────────────────────────────

/// Candidate search parameters against the alert view.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub sport: String,
    /// True when the current vector carries a draw component.
    pub var_shape: bool,
    pub exclude_event_id: i64,
    pub var_one: Decimal,
    pub var_x: Option<Decimal>,
    pub var_two: Decimal,
    /// Restrict racket-sport searches when the ground type is known.
    pub ground_type: Option<String>,
}

const CANDIDATE_COLUMNS: &str = "event_id, sport, ground_type, participants, competition, \
                                 var_one, var_x, var_two, var_shape, home_score, away_score, \
                                 result_text, winner_side, point_diff";

/// Variation tier 1: componentwise equality at 2-decimal precision.
pub async fn tier1_candidates(pool: &PgPool, q: &CandidateQuery) -> Result<Vec<DbAlertCandidate>> {
    let sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM mv_alert_events
         WHERE sport = $1 AND var_shape = $2 AND event_id <> $3
           AND var_one = $4 AND var_two = $5
           AND ($6::numeric IS NULL OR var_x = $6)
           AND ($7::text IS NULL OR ground_type = $7)"
    );
    let rows = sqlx::query_as::<_, DbAlertCandidate>(&sql)
        .bind(&q.sport)
        .bind(q.var_shape)
        .bind(q.exclude_event_id)
        .bind(q.var_one)
        .bind(q.var_two)
        .bind(q.var_x)
        .bind(&q.ground_type)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Variation tier 2: each component within the tolerance ball.
pub async fn tier2_candidates(
    pool: &PgPool,
    q: &CandidateQuery,
    tolerance: Decimal,
) -> Result<Vec<DbAlertCandidate>> {
    let sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM mv_alert_events
         WHERE sport = $1 AND var_shape = $2 AND event_id <> $3
           AND abs(var_one - $4) <= $8 AND abs(var_two - $5) <= $8
           AND ($6::numeric IS NULL OR abs(var_x - $6) <= $8)
           AND ($7::text IS NULL OR ground_type = $7)"
    );
    let rows = sqlx::query_as::<_, DbAlertCandidate>(&sql)
        .bind(&q.sport)
        .bind(q.var_shape)
        .bind(q.exclude_event_id)
        .bind(q.var_one)
        .bind(q.var_two)
        .bind(q.var_x)
        .bind(&q.ground_type)
        .bind(tolerance)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn refresh_alert_view(pool: &PgPool) -> Result<()> {
    sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY mv_alert_events")
        .execute(pool)
        .await?;
    Ok(())
}
