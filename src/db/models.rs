//! Database row types for all tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// Event lifecycle state. Stored as plain TEXT; `as_str` is the wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Finished,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Finished => "finished",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbEvent {
    pub event_id: i64,
    pub slug: String,
    pub sport: String,
    pub competition: String,
    pub country: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub ground_type: Option<String>,
    pub status: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbEvent {
    pub fn participants(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbEventOdds {
    pub event_id: i64,
    pub one_open: Option<Decimal>,
    pub x_open: Option<Decimal>,
    pub two_open: Option<Decimal>,
    pub one_final: Option<Decimal>,
    pub x_final: Option<Decimal>,
    pub two_final: Option<Decimal>,
    pub var_one: Option<Decimal>,
    pub var_x: Option<Decimal>,
    pub var_two: Option<Decimal>,
    pub open_captured_at: Option<DateTime<Utc>>,
    pub final_captured_at: Option<DateTime<Utc>>,
}

/// Row of the materialized alert view — the matcher's search space.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbAlertCandidate {
    pub event_id: i64,
    pub sport: String,
    pub ground_type: Option<String>,
    pub participants: String,
    pub competition: String,
    pub var_one: Decimal,
    pub var_x: Option<Decimal>,
    pub var_two: Decimal,
    pub var_shape: bool,
    pub home_score: i32,
    pub away_score: i32,
    pub result_text: String,
    pub winner_side: String,
    pub point_diff: i32,
}

/// New event attributes as extracted from an upstream payload.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: i64,
    pub slug: String,
    pub sport: String,
    pub competition: String,
    pub country: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
}
