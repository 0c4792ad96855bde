//! Matcher verdict types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::models::{DbEvent, DbEventOdds};
use crate::sports;

/// Variation vector of an event: final minus opening per column, 2 decimals.
/// `x` is `None` for 2-way sports and for draw sports matched as 2-way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariationVector {
    pub one: Decimal,
    pub x: Option<Decimal>,
    pub two: Decimal,
}

impl VariationVector {
    pub fn has_draw(&self) -> bool {
        self.x.is_some()
    }
}

/// Closeness class of a historical candidate's variation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VariationTier {
    /// Tier 1: componentwise equality at 2-decimal precision.
    Exact,
    /// Tier 2: each component within the tolerance ball.
    Similar,
}

/// Unanimity level among candidate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultTier {
    /// A: all candidates share the exact scoreline.
    Identical,
    /// B: all candidates share winner and point difference.
    SimilarResult,
    /// C: all candidates share the winner only.
    WinnerOnly,
}

impl ResultTier {
    pub fn confidence(&self) -> u8 {
        match self {
            ResultTier::Identical => 100,
            ResultTier::SimilarResult => 75,
            ResultTier::WinnerOnly => 50,
        }
    }

    pub fn weight(&self) -> u32 {
        match self {
            ResultTier::Identical => 4,
            ResultTier::SimilarResult => 3,
            ResultTier::WinnerOnly => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResultTier::Identical => "A (identical results)",
            ResultTier::SimilarResult => "B (similar results)",
            ResultTier::WinnerOnly => "C (same winning side)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictStatus {
    Success,
    NoMatch,
    NoCandidates,
}

/// One historical candidate as it appears in a verdict.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateAssessment {
    pub event_id: i64,
    pub participants: String,
    pub competition: String,
    pub vars: VariationVector,
    /// Signed componentwise differences, candidate minus current.
    pub diffs: VariationVector,
    pub home_score: i32,
    pub away_score: i32,
    pub result_text: String,
    pub winner_side: String,
    pub point_diff: i32,
    /// Sign pattern matches the current vector. Always true in tier 1.
    pub symmetric: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub winner_side: String,
    pub point_diff: i32,
    /// Present for result tier A only.
    pub exact_score: Option<String>,
    pub text: String,
}

/// The matcher's structured output for one evaluated event.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub event_id: i64,
    pub participants: String,
    pub competition: String,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub minutes_to_start: i64,
    pub current_vars: VariationVector,
    pub odds_line: OddsLine,
    pub status: VerdictStatus,
    pub variation_tier: Option<VariationTier>,
    pub result_tier: Option<ResultTier>,
    pub confidence: Option<u8>,
    pub prediction: Option<Prediction>,
    pub candidates: Vec<CandidateAssessment>,
}

/// Open→final odds per column, for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OddsLine {
    pub one_open: Option<Decimal>,
    pub x_open: Option<Decimal>,
    pub two_open: Option<Decimal>,
    pub one_final: Option<Decimal>,
    pub x_final: Option<Decimal>,
    pub two_final: Option<Decimal>,
}

/// The event under evaluation, as the engine sees it.
#[derive(Debug, Clone)]
pub struct CurrentEvent {
    pub event_id: i64,
    pub sport: String,
    pub participants: String,
    pub competition: String,
    pub start_time: DateTime<Utc>,
    pub minutes_to_start: i64,
    pub vars: VariationVector,
    pub odds_line: OddsLine,
}

impl CurrentEvent {
    /// Assemble the matcher input from the stored rows.
    ///
    /// Returns `None` when the variation vector is not fully formed. A
    /// draw-sport event whose draw variation is null is matched as 2-way.
    pub fn from_rows(event: &DbEvent, odds: &DbEventOdds, minutes_to_start: i64) -> Option<Self> {
        let one = odds.var_one?;
        let two = odds.var_two?;
        let x = if sports::profile(&event.sport).has_draw() {
            odds.var_x
        } else {
            None
        };

        Some(Self {
            event_id: event.event_id,
            sport: event.sport.clone(),
            participants: event.participants(),
            competition: event.competition.clone(),
            start_time: event.start_time,
            minutes_to_start,
            vars: VariationVector { one, x, two },
            odds_line: OddsLine {
                one_open: odds.one_open,
                x_open: odds.x_open,
                two_open: odds.two_open,
                one_final: odds.one_final,
                x_final: odds.x_final,
                two_final: odds.two_final,
            },
        })
    }
}
