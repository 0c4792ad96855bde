//! History matcher — evaluates the two variation tiers and the three
//! result tiers over a snapshot of the alert view.
//!
//! Pure logic: candidate rows come in, a verdict comes out. Candidate
//! retrieval and view refresh live in the db layer; delivery lives in the
//! notifier.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info};

use crate::db::models::DbAlertCandidate;
use crate::matcher::types::*;

/// Tier-2 tolerance ball, inclusive of 0.04.
pub const TIER2_TOLERANCE: Decimal = Decimal::from_parts(401, 0, 0, false, 4); // 0.0401

/// Evaluate one event against the candidate sets the repository returned.
///
/// Tier-1 (exact) candidates, when any exist, displace tier 2 entirely.
/// Tier-2 candidates pass a sign-symmetry filter before the unanimity rules;
/// the filtered-out ones stay in the verdict for diagnostics.
pub fn evaluate(
    current: &CurrentEvent,
    tier1: Vec<DbAlertCandidate>,
    tier2: Vec<DbAlertCandidate>,
) -> Verdict {
    let (variation_tier, raw) = if !tier1.is_empty() {
        (VariationTier::Exact, tier1)
    } else if !tier2.is_empty() {
        (VariationTier::Similar, tier2)
    } else {
        debug!(event_id = current.event_id, "no candidates within tolerance");
        return base_verdict(current, VerdictStatus::NoCandidates, None, vec![]);
    };

    let candidates: Vec<CandidateAssessment> = raw
        .into_iter()
        .map(|row| assess(current, row, variation_tier))
        .collect();

    let symmetric: Vec<&CandidateAssessment> =
        candidates.iter().filter(|c| c.symmetric).collect();

    info!(
        event_id = current.event_id,
        tier = ?variation_tier,
        candidates = candidates.len(),
        symmetric = symmetric.len(),
        "evaluating candidate set"
    );

    if symmetric.is_empty() {
        return base_verdict(
            current,
            VerdictStatus::NoMatch,
            Some(variation_tier),
            candidates,
        );
    }

    let Some((result_tier, prediction)) = unanimous_outcome(&symmetric) else {
        return base_verdict(
            current,
            VerdictStatus::NoMatch,
            Some(variation_tier),
            candidates,
        );
    };

    let mut verdict = base_verdict(
        current,
        VerdictStatus::Success,
        Some(variation_tier),
        candidates,
    );
    verdict.confidence = Some(result_tier.confidence());
    verdict.result_tier = Some(result_tier);
    verdict.prediction = Some(prediction);
    verdict
}

fn base_verdict(
    current: &CurrentEvent,
    status: VerdictStatus,
    variation_tier: Option<VariationTier>,
    candidates: Vec<CandidateAssessment>,
) -> Verdict {
    Verdict {
        event_id: current.event_id,
        participants: current.participants.clone(),
        competition: current.competition.clone(),
        sport: current.sport.clone(),
        start_time: current.start_time,
        minutes_to_start: current.minutes_to_start,
        current_vars: current.vars,
        odds_line: current.odds_line.clone(),
        status,
        variation_tier,
        result_tier: None,
        confidence: None,
        prediction: None,
        candidates,
    }
}

fn assess(
    current: &CurrentEvent,
    row: DbAlertCandidate,
    tier: VariationTier,
) -> CandidateAssessment {
    let vars = VariationVector {
        one: row.var_one,
        x: row.var_x,
        two: row.var_two,
    };
    let diffs = VariationVector {
        one: row.var_one - current.vars.one,
        x: match (row.var_x, current.vars.x) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        },
        two: row.var_two - current.vars.two,
    };
    // Exact matches are symmetric by construction.
    let symmetric = tier == VariationTier::Exact || signs_match(&current.vars, &vars);

    CandidateAssessment {
        event_id: row.event_id,
        participants: row.participants,
        competition: row.competition,
        vars,
        diffs,
        home_score: row.home_score,
        away_score: row.away_score,
        result_text: row.result_text,
        winner_side: row.winner_side,
        point_diff: row.point_diff,
        symmetric,
    }
}

/// Componentwise sign-pattern match; a zero component matches either sign.
fn signs_match(a: &VariationVector, b: &VariationVector) -> bool {
    if !sign_matches(a.one, b.one) || !sign_matches(a.two, b.two) {
        return false;
    }
    match (a.x, b.x) {
        (Some(ax), Some(bx)) => sign_matches(ax, bx),
        _ => true,
    }
}

fn sign_matches(a: Decimal, b: Decimal) -> bool {
    a.is_zero() || b.is_zero() || (a.is_sign_positive() == b.is_sign_positive())
}

/// Pick the strongest result tier that holds unanimously, in A > B > C order.
fn unanimous_outcome(
    symmetric: &[&CandidateAssessment],
) -> Option<(ResultTier, Prediction)> {
    let first = symmetric.first()?;

    if symmetric
        .iter()
        .all(|c| c.home_score == first.home_score && c.away_score == first.away_score)
    {
        let tier = ResultTier::Identical;
        return Some((
            tier,
            prediction_for(&first.winner_side, first.point_diff, Some(&first.result_text)),
        ));
    }

    if symmetric
        .iter()
        .all(|c| c.winner_side == first.winner_side && c.point_diff == first.point_diff)
    {
        return Some((
            ResultTier::SimilarResult,
            prediction_for(&first.winner_side, first.point_diff, None),
        ));
    }

    if symmetric.iter().all(|c| c.winner_side == first.winner_side) {
        let diff = weighted_point_diff(symmetric, ResultTier::WinnerOnly);
        return Some((
            ResultTier::WinnerOnly,
            prediction_for(&first.winner_side, diff, None),
        ));
    }

    None
}

/// Weighted average point differential, rounded to the nearest integer.
/// All tier-C inputs carry the same weight, so this is the arithmetic mean.
fn weighted_point_diff(candidates: &[&CandidateAssessment], tier: ResultTier) -> i32 {
    let weight = Decimal::from(tier.weight());
    let total: Decimal = candidates
        .iter()
        .map(|c| Decimal::from(c.point_diff) * weight)
        .sum();
    let denom = weight * Decimal::from(candidates.len() as u32);
    if denom.is_zero() {
        return 0;
    }
    (total / denom)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i32()
        .unwrap_or(0)
}

fn prediction_for(winner_side: &str, point_diff: i32, exact_score: Option<&str>) -> Prediction {
    let text = match winner_side {
        "X" => "Draw".to_string(),
        side => {
            let name = if side == "1" { "Home" } else { "Away" };
            match exact_score {
                Some(score) => format!("{name} wins by {point_diff} (exact score {score})"),
                None => format!("{name} wins by {point_diff}"),
            }
        }
    };
    Prediction {
        winner_side: winner_side.to_string(),
        point_diff,
        exact_score: exact_score.map(String::from),
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn current(one: Decimal, x: Option<Decimal>, two: Decimal) -> CurrentEvent {
        CurrentEvent {
            event_id: 1,
            sport: "Tennis".into(),
            participants: "A vs B".into(),
            competition: "ATP Test".into(),
            start_time: Utc::now(),
            minutes_to_start: 30,
            vars: VariationVector { one, x, two },
            odds_line: OddsLine::default(),
        }
    }

    fn candidate(
        id: i64,
        one: Decimal,
        x: Option<Decimal>,
        two: Decimal,
        home: i32,
        away: i32,
    ) -> DbAlertCandidate {
        let winner = if home > away {
            "1"
        } else if away > home {
            "2"
        } else {
            "X"
        };
        DbAlertCandidate {
            event_id: id,
            sport: "Tennis".into(),
            ground_type: None,
            participants: format!("P{id} vs Q{id}"),
            competition: "ATP Test".into(),
            var_one: one,
            var_x: x,
            var_two: two,
            var_shape: x.is_some(),
            home_score: home,
            away_score: away,
            result_text: format!("{home}-{away}"),
            winner_side: winner.into(),
            point_diff: (home - away).abs(),
        }
    }

    // History holds two exact-variation tennis events both ending 2-1:
    // tier 1, result tier A, confidence 100.
    #[test]
    fn exact_tennis_candidates_identical_results() {
        let cur = current(dec!(0.15), None, dec!(-0.12));
        let tier1 = vec![
            candidate(10, dec!(0.15), None, dec!(-0.12), 2, 1),
            candidate(11, dec!(0.15), None, dec!(-0.12), 2, 1),
        ];

        let v = evaluate(&cur, tier1, vec![]);
        assert_eq!(v.status, VerdictStatus::Success);
        assert_eq!(v.variation_tier, Some(VariationTier::Exact));
        assert_eq!(v.result_tier, Some(ResultTier::Identical));
        assert_eq!(v.confidence, Some(100));
        assert_eq!(v.candidates.len(), 2);
        let p = v.prediction.unwrap();
        assert_eq!(p.winner_side, "1");
        assert_eq!(p.point_diff, 1);
        assert_eq!(p.exact_score.as_deref(), Some("2-1"));
    }

    // Three similar football candidates, same winner, diffs 2/1/3:
    // tier 2, result tier C, confidence 50, mean diff 2.
    #[test]
    fn similar_football_candidates_same_winner() {
        let cur = current(dec!(0.13), Some(dec!(-0.05)), dec!(-0.08));
        let tier2 = vec![
            candidate(20, dec!(0.12), Some(dec!(-0.05)), dec!(-0.07), 2, 0),
            candidate(21, dec!(0.13), Some(dec!(-0.06)), dec!(-0.08), 1, 0),
            candidate(22, dec!(0.14), Some(dec!(-0.04)), dec!(-0.09), 3, 0),
        ];

        let v = evaluate(&cur, vec![], tier2);
        assert_eq!(v.status, VerdictStatus::Success);
        assert_eq!(v.variation_tier, Some(VariationTier::Similar));
        assert_eq!(v.result_tier, Some(ResultTier::WinnerOnly));
        assert_eq!(v.confidence, Some(50));
        let p = v.prediction.unwrap();
        assert_eq!(p.winner_side, "1");
        assert_eq!(p.point_diff, 2);
        assert!(p.exact_score.is_none());
    }

    // Two symmetric candidates disagree on the winner: NO_MATCH, but the
    // verdict still lists both for the report.
    #[test]
    fn disagreeing_winners_is_no_match() {
        let cur = current(dec!(0.10), None, dec!(-0.10));
        let tier2 = vec![
            candidate(30, dec!(0.11), None, dec!(-0.11), 2, 1),
            candidate(31, dec!(0.09), None, dec!(-0.09), 1, 2),
        ];

        let v = evaluate(&cur, vec![], tier2);
        assert_eq!(v.status, VerdictStatus::NoMatch);
        assert_eq!(v.candidates.len(), 2);
        assert!(v.prediction.is_none());
        assert!(v.confidence.is_none());
    }

    #[test]
    fn empty_history_is_no_candidates() {
        let cur = current(dec!(0.50), None, dec!(-0.50));
        let v = evaluate(&cur, vec![], vec![]);
        assert_eq!(v.status, VerdictStatus::NoCandidates);
        assert!(v.candidates.is_empty());
        assert!(v.variation_tier.is_none());
    }

    // Two candidates share the current sign pattern, one does not: the
    // non-symmetric one is reported but excluded from tier selection.
    #[test]
    fn symmetry_filter_excludes_but_reports() {
        let cur = current(dec!(0.10), None, dec!(-0.10));
        let tier2 = vec![
            candidate(40, dec!(0.12), None, dec!(-0.08), 2, 0),
            candidate(41, dec!(0.08), None, dec!(-0.12), 2, 0),
            // Sign-flipped on both components.
            candidate(42, dec!(-0.10), None, dec!(0.10), 0, 2),
        ];

        let v = evaluate(&cur, vec![], tier2);
        assert_eq!(v.status, VerdictStatus::Success);
        assert_eq!(v.result_tier, Some(ResultTier::Identical));
        assert_eq!(v.candidates.len(), 3);
        let flipped = v.candidates.iter().find(|c| c.event_id == 42).unwrap();
        assert!(!flipped.symmetric);
        assert_eq!(v.prediction.unwrap().winner_side, "1");
    }

    // All tier-2 candidates fail the symmetry filter: NO_MATCH, not
    // NO_CANDIDATES — the report must still show what was found.
    #[test]
    fn all_non_symmetric_is_no_match() {
        let cur = current(dec!(0.10), None, dec!(-0.10));
        let tier2 = vec![candidate(50, dec!(-0.10), None, dec!(0.10), 0, 2)];

        let v = evaluate(&cur, vec![], tier2);
        assert_eq!(v.status, VerdictStatus::NoMatch);
        assert_eq!(v.candidates.len(), 1);
    }

    // Same winner and diff but different exact scorelines: tier B, not A.
    #[test]
    fn same_winner_and_diff_is_tier_b() {
        let cur = current(dec!(0.10), None, dec!(-0.10));
        let tier2 = vec![
            candidate(60, dec!(0.11), None, dec!(-0.11), 2, 0),
            candidate(61, dec!(0.09), None, dec!(-0.09), 3, 1),
        ];

        let v = evaluate(&cur, vec![], tier2);
        assert_eq!(v.status, VerdictStatus::Success);
        assert_eq!(v.result_tier, Some(ResultTier::SimilarResult));
        assert_eq!(v.confidence, Some(75));
        assert_eq!(v.prediction.unwrap().point_diff, 2);
    }

    // Exact candidates displace any similar ones.
    #[test]
    fn tier1_displaces_tier2() {
        let cur = current(dec!(0.10), None, dec!(-0.10));
        let tier1 = vec![candidate(70, dec!(0.10), None, dec!(-0.10), 2, 0)];
        let tier2 = vec![candidate(71, dec!(0.12), None, dec!(-0.08), 0, 2)];

        let v = evaluate(&cur, tier1, tier2);
        assert_eq!(v.variation_tier, Some(VariationTier::Exact));
        assert_eq!(v.candidates.len(), 1);
        assert_eq!(v.candidates[0].event_id, 70);
    }

    // Zero components match either sign.
    #[test]
    fn zero_component_matches_either_sign() {
        let a = VariationVector {
            one: dec!(0.00),
            x: None,
            two: dec!(-0.10),
        };
        let b = VariationVector {
            one: dec!(-0.03),
            x: None,
            two: dec!(-0.08),
        };
        assert!(signs_match(&a, &b));

        let c = VariationVector {
            one: dec!(0.03),
            x: None,
            two: dec!(0.08),
        };
        assert!(!signs_match(&b, &c));
    }

    #[test]
    fn draw_prediction_text() {
        let cur = current(dec!(0.05), Some(dec!(-0.02)), dec!(-0.05));
        let tier1 = vec![
            candidate(80, dec!(0.05), Some(dec!(-0.02)), dec!(-0.05), 1, 1),
            candidate(81, dec!(0.05), Some(dec!(-0.02)), dec!(-0.05), 1, 1),
        ];
        let v = evaluate(&cur, tier1, vec![]);
        let p = v.prediction.unwrap();
        assert_eq!(p.winner_side, "X");
        assert_eq!(p.text, "Draw");
    }

    #[test]
    fn weighted_mean_rounds_to_nearest() {
        let a = candidate(90, dec!(0.1), None, dec!(-0.1), 3, 0);
        let b = candidate(91, dec!(0.1), None, dec!(-0.1), 2, 0);
        let ca = assess_for_test(&a);
        let cb = assess_for_test(&b);
        // (3 + 2) / 2 = 2.5 -> 3
        assert_eq!(
            weighted_point_diff(&[&ca, &cb], ResultTier::WinnerOnly),
            3
        );
    }

    fn assess_for_test(row: &DbAlertCandidate) -> CandidateAssessment {
        let cur = current(dec!(0.1), None, dec!(-0.1));
        assess(&cur, row.clone(), VariationTier::Similar)
    }
}
