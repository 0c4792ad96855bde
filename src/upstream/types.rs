//! Upstream API response types.
//!
//! Fields are optional across the board: the feed omits keys freely and the
//! normalizer is the layer that decides what is usable.

use std::collections::HashMap;

use serde::Deserialize;

// ── Dropping-odds catalog ──────────────────────────────────────────

/// Response of the discovery endpoint (`/odds/1/dropping/all`).
#[derive(Debug, Deserialize)]
pub struct DroppingOddsResponse {
    pub events: Option<Vec<ApiEvent>>,
    /// Market block per event id (stringified in the payload).
    #[serde(rename = "oddsMap")]
    pub odds_map: Option<HashMap<String, OddsMapEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct OddsMapEntry {
    pub odds: Option<ApiMarket>,
}

/// An event entry as the catalog and detail endpoints report it.
#[derive(Debug, Deserialize)]
pub struct ApiEvent {
    pub id: Option<i64>,
    pub slug: Option<String>,
    #[serde(rename = "startTimestamp")]
    pub start_timestamp: Option<i64>,
    pub tournament: Option<ApiTournament>,
    #[serde(rename = "homeTeam")]
    pub home_team: Option<ApiTeam>,
    #[serde(rename = "awayTeam")]
    pub away_team: Option<ApiTeam>,
    pub status: Option<ApiStatus>,
    #[serde(rename = "homeScore")]
    pub home_score: Option<ApiScore>,
    #[serde(rename = "awayScore")]
    pub away_score: Option<ApiScore>,
    #[serde(rename = "winnerCode")]
    pub winner_code: Option<i32>,
    #[serde(rename = "groundType")]
    pub ground_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTournament {
    pub name: Option<String>,
    pub category: Option<ApiCategory>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCategory {
    pub name: Option<String>,
    pub sport: Option<ApiSport>,
    pub country: Option<ApiCountry>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSport {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCountry {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTeam {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    pub code: Option<i32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Score block; `current` carries overtime/penalty aggregation.
#[derive(Debug, Deserialize)]
pub struct ApiScore {
    pub current: Option<i32>,
    pub display: Option<i32>,
    pub normaltime: Option<i32>,
}

impl ApiScore {
    pub fn value(&self) -> Option<i32> {
        self.current.or(self.display).or(self.normaltime)
    }
}

// ── Markets ────────────────────────────────────────────────────────

/// Response of the event-odds endpoint (`/event/{id}/odds/1/all`).
#[derive(Debug, Deserialize)]
pub struct EventOddsResponse {
    pub markets: Option<Vec<ApiMarket>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMarket {
    #[serde(rename = "marketName")]
    pub market_name: Option<String>,
    pub choices: Option<Vec<ApiChoice>>,
}

/// One quote column. Fractional strings like "7/2"; `initialFractionalValue`
/// is the opening quote, `fractionalValue` the current one.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiChoice {
    pub name: Option<String>,
    #[serde(rename = "initialFractionalValue")]
    pub initial_fractional_value: Option<String>,
    #[serde(rename = "fractionalValue")]
    pub fractional_value: Option<String>,
}

/// Response of the event-detail endpoint (`/event/{id}`).
#[derive(Debug, Deserialize)]
pub struct EventDetailResponse {
    pub event: Option<ApiEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dropping_odds_catalog() {
        let raw = r#"{
            "events": [{
                "id": 12345678,
                "slug": "alcaraz-sinner",
                "startTimestamp": 1756200000,
                "tournament": {
                    "name": "US Open",
                    "category": {
                        "name": "ATP",
                        "sport": {"name": "Tennis"},
                        "country": {"name": "USA"}
                    }
                },
                "homeTeam": {"name": "Alcaraz C."},
                "awayTeam": {"name": "Sinner J."}
            }],
            "oddsMap": {
                "12345678": {
                    "odds": {
                        "marketName": "Full time",
                        "choices": [
                            {"name": "1", "initialFractionalValue": "4/5", "fractionalValue": "8/11"},
                            {"name": "2", "initialFractionalValue": "21/20", "fractionalValue": "6/5"}
                        ]
                    }
                }
            }
        }"#;

        let parsed: DroppingOddsResponse = serde_json::from_str(raw).unwrap();
        let events = parsed.events.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, Some(12345678));
        assert_eq!(
            events[0]
                .tournament
                .as_ref()
                .and_then(|t| t.category.as_ref())
                .and_then(|c| c.sport.as_ref())
                .and_then(|s| s.name.as_deref()),
            Some("Tennis")
        );

        let odds_map = parsed.odds_map.unwrap();
        let market = odds_map["12345678"].odds.as_ref().unwrap();
        let choices = market.choices.as_ref().unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].initial_fractional_value.as_deref(), Some("4/5"));
        assert_eq!(choices[1].fractional_value.as_deref(), Some("6/5"));
    }

    #[test]
    fn parses_event_detail_with_scores() {
        let raw = r#"{
            "event": {
                "id": 12345678,
                "status": {"code": 100, "type": "finished"},
                "winnerCode": 1,
                "homeScore": {"current": 2, "display": 2, "normaltime": 2},
                "awayScore": {"current": 1, "display": 1, "normaltime": 1},
                "groundType": "Hardcourt outdoor",
                "startTimestamp": 1756200000
            }
        }"#;

        let parsed: EventDetailResponse = serde_json::from_str(raw).unwrap();
        let event = parsed.event.unwrap();
        assert_eq!(event.status.as_ref().and_then(|s| s.code), Some(100));
        assert_eq!(event.winner_code, Some(1));
        assert_eq!(event.home_score.as_ref().and_then(|s| s.value()), Some(2));
        assert_eq!(event.away_score.as_ref().and_then(|s| s.value()), Some(1));
        assert_eq!(event.ground_type.as_deref(), Some("Hardcourt outdoor"));
    }

    #[test]
    fn score_falls_back_through_display_and_normaltime() {
        let raw = r#"{"display": 3}"#;
        let score: ApiScore = serde_json::from_str(raw).unwrap();
        assert_eq!(score.value(), Some(3));

        let raw = r#"{"normaltime": 1}"#;
        let score: ApiScore = serde_json::from_str(raw).unwrap();
        assert_eq!(score.value(), Some(1));

        let raw = r#"{}"#;
        let score: ApiScore = serde_json::from_str(raw).unwrap();
        assert_eq!(score.value(), None);
    }

    #[test]
    fn tolerates_missing_fields_everywhere() {
        let parsed: DroppingOddsResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parsed.events.is_none());
        assert!(parsed.odds_map.is_none());

        let parsed: EventOddsResponse = serde_json::from_str(r#"{"markets": []}"#).unwrap();
        assert!(parsed.markets.unwrap().is_empty());
    }
}
