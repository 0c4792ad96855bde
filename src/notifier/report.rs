//! Verdict rendering — one HTML report per verdict, split on candidate
//! boundaries when it would exceed the Telegram body limit.

use chrono_tz::Tz;
use rust_decimal::Decimal;

use crate::matcher::types::{
    CandidateAssessment, OddsLine, VariationTier, VariationVector, Verdict, VerdictStatus,
};

/// Hard bound on a single message body.
pub const MAX_MESSAGE_LEN: usize = 4_000;

/// Render a verdict into one or more message bodies, each within the limit.
/// Splits happen between candidates, never inside one.
pub fn render_report(verdict: &Verdict, tz: Tz) -> Vec<String> {
    let header = render_header(verdict, tz);
    let blocks: Vec<String> = verdict
        .candidates
        .iter()
        .enumerate()
        .map(|(i, c)| render_candidate(i + 1, c, verdict))
        .collect();

    let mut messages = Vec::new();
    let mut current = header;

    for block in blocks {
        if current.len() + block.len() > MAX_MESSAGE_LEN {
            messages.push(current);
            current = format!("📊 <b>Candidates (continued) — {}</b>\n", verdict.participants);
        }
        current.push_str(&block);
    }
    messages.push(current);
    messages
}

fn render_header(verdict: &Verdict, tz: Tz) -> String {
    let status_line = match verdict.status {
        VerdictStatus::Success => "✅ <b>CANDIDATE REPORT - SUCCESS</b>",
        VerdictStatus::NoMatch => "❌ <b>CANDIDATE REPORT - NO MATCH</b>",
        VerdictStatus::NoCandidates => "❓ <b>CANDIDATE REPORT - NO CANDIDATES</b>",
    };

    let start_local = verdict.start_time.with_timezone(&tz).format("%H:%M");
    let non_symmetric = verdict.candidates.iter().filter(|c| !c.symmetric).count();

    let mut msg = format!(
        "{status_line}\n\n🏆 {}\n🏟️ {} ({})\n⏰ Starts at {} (in {} minutes)\n\n",
        verdict.participants,
        verdict.competition,
        verdict.sport,
        start_local,
        verdict.minutes_to_start,
    );

    msg.push_str(&format!(
        "📈 Current Variations:\n   {}\n\n",
        format_vars(&verdict.current_vars)
    ));
    msg.push_str(&format!(
        "💰 Current Odds:\n   {}\n\n",
        format_odds_line(&verdict.odds_line)
    ));

    msg.push_str("🔍 Candidate Summary:\n");
    msg.push_str(&format!(
        "   • Variation tier: {}\n",
        match verdict.variation_tier {
            Some(VariationTier::Exact) => "1 (exact)",
            Some(VariationTier::Similar) => "2 (similar)",
            None => "none",
        }
    ));
    msg.push_str(&format!("   • Candidates: {}", verdict.candidates.len()));
    if non_symmetric > 0 {
        msg.push_str(&format!(" ({non_symmetric} non-symmetric, excluded)"));
    }
    msg.push('\n');
    if let Some(tier) = verdict.result_tier {
        msg.push_str(&format!("   • Result tier: {}\n", tier.label()));
    }
    if let Some(confidence) = verdict.confidence {
        msg.push_str(&format!("   • Confidence: {confidence}%\n"));
    }
    msg.push('\n');

    match &verdict.prediction {
        Some(p) => msg.push_str(&format!("🎯 <b>Prediction:</b> {}\n", p.text)),
        None => msg.push_str("❌ <b>No prediction:</b> candidate outcomes disagree\n"),
    }

    if !verdict.candidates.is_empty() {
        msg.push_str("\n📊 <b>Candidates:</b>\n");
    }
    msg
}

fn render_candidate(index: usize, c: &CandidateAssessment, verdict: &Verdict) -> String {
    let symmetry = if c.symmetric { "✅" } else { "❌ (non-symmetric)" };
    let mut block = format!(
        "   {index}. {} → {} {symmetry}\n      Competition: {}\n      Variations: {}\n",
        c.participants,
        c.result_text,
        c.competition,
        format_vars(&c.vars),
    );
    if verdict.variation_tier == Some(VariationTier::Similar) {
        block.push_str(&format!("      Differences: {}\n", format_diffs(&c.diffs)));
    }
    block.push('\n');
    block
}

fn format_vars(v: &VariationVector) -> String {
    match v.x {
        Some(x) => format!("Δ1: {:.2}, ΔX: {:.2}, Δ2: {:.2}", v.one, x, v.two),
        None => format!("Δ1: {:.2}, Δ2: {:.2}", v.one, v.two),
    }
}

fn format_diffs(v: &VariationVector) -> String {
    match v.x {
        Some(x) => format!(
            "Δ1: {}, ΔX: {}, Δ2: {}",
            signed(v.one),
            signed(x),
            signed(v.two)
        ),
        None => format!("Δ1: {}, Δ2: {}", signed(v.one), signed(v.two)),
    }
}

fn signed(d: Decimal) -> String {
    if d.is_sign_negative() {
        format!("{d:.2}")
    } else {
        format!("+{d:.2}")
    }
}

fn format_odds_line(line: &OddsLine) -> String {
    let mut parts = vec![format!(
        "1: {}→{}",
        opt(line.one_open),
        opt(line.one_final)
    )];
    if line.x_open.is_some() || line.x_final.is_some() {
        parts.push(format!("X: {}→{}", opt(line.x_open), opt(line.x_final)));
    }
    parts.push(format!("2: {}→{}", opt(line.two_open), opt(line.two_final)));
    parts.join(", ")
}

fn opt(d: Option<Decimal>) -> String {
    d.map(|v| format!("{v:.3}")).unwrap_or_else(|| "—".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::types::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn assessment(id: i64, symmetric: bool) -> CandidateAssessment {
        CandidateAssessment {
            event_id: id,
            participants: format!("Player {id} vs Player {}", id + 1),
            competition: "ATP Challenger, Somewhere".into(),
            vars: VariationVector {
                one: dec!(0.15),
                x: None,
                two: dec!(-0.12),
            },
            diffs: VariationVector {
                one: dec!(0.01),
                x: None,
                two: dec!(-0.02),
            },
            home_score: 2,
            away_score: 1,
            result_text: "2-1".into(),
            winner_side: "1".into(),
            point_diff: 1,
            symmetric,
        }
    }

    fn verdict(candidates: Vec<CandidateAssessment>) -> Verdict {
        Verdict {
            event_id: 1,
            participants: "A vs B".into(),
            competition: "ATP Test".into(),
            sport: "Tennis".into(),
            start_time: Utc::now(),
            minutes_to_start: 30,
            current_vars: VariationVector {
                one: dec!(0.15),
                x: None,
                two: dec!(-0.12),
            },
            odds_line: OddsLine {
                one_open: Some(dec!(2.100)),
                x_open: None,
                two_open: Some(dec!(1.700)),
                one_final: Some(dec!(2.250)),
                x_final: None,
                two_final: Some(dec!(1.580)),
            },
            status: VerdictStatus::Success,
            variation_tier: Some(VariationTier::Similar),
            result_tier: Some(ResultTier::SimilarResult),
            confidence: Some(75),
            prediction: Some(Prediction {
                winner_side: "1".into(),
                point_diff: 1,
                exact_score: None,
                text: "Home wins by 1".into(),
            }),
            candidates,
        }
    }

    #[test]
    fn small_report_is_one_message() {
        let v = verdict(vec![assessment(10, true), assessment(12, false)]);
        let messages = render_report(&v, chrono_tz::UTC);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert!(m.contains("SUCCESS"));
        assert!(m.contains("Home wins by 1"));
        assert!(m.contains("non-symmetric"));
        assert!(m.contains("Confidence: 75%"));
        assert!(m.len() <= MAX_MESSAGE_LEN);
    }

    #[test]
    fn long_reports_split_on_candidate_boundaries() {
        let many: Vec<_> = (0..60).map(|i| assessment(i, true)).collect();
        let v = verdict(many);
        let messages = render_report(&v, chrono_tz::UTC);
        assert!(messages.len() > 1);
        for m in &messages {
            assert!(m.len() <= MAX_MESSAGE_LEN, "chunk exceeds limit: {}", m.len());
        }
        // No candidate block is torn across messages.
        let total: usize = messages
            .iter()
            .map(|m| m.matches("Competition:").count())
            .sum();
        assert_eq!(total, 60);
    }

    #[test]
    fn no_match_report_lists_candidates_without_prediction() {
        let mut v = verdict(vec![assessment(10, true)]);
        v.status = VerdictStatus::NoMatch;
        v.prediction = None;
        v.result_tier = None;
        v.confidence = None;
        let messages = render_report(&v, chrono_tz::UTC);
        assert!(messages[0].contains("NO MATCH"));
        assert!(messages[0].contains("No prediction"));
        assert!(messages[0].contains("Player 10"));
    }

    #[test]
    fn diff_formatting_is_signed() {
        assert_eq!(signed(dec!(0.01)), "+0.01");
        assert_eq!(signed(dec!(-0.02)), "-0.02");
    }
}
