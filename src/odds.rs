//! Odds normalization — raw market payloads to canonical decimal triples.
//!
//! The upstream quotes fractionally ("7/2"); stored odds are decimal,
//! truncated to 3 fractional digits. A quote below 1.001 or above 1000 is
//! discarded. Market selection is by arity: the draw column must be present
//! iff the sport supports draws, otherwise the payload counts as no-odds.

use rust_decimal::Decimal;

use crate::upstream::types::{ApiChoice, ApiMarket};

/// Decimal places kept for raw odds.
const RAW_SCALE: u32 = 3;
const MIN_QUOTE: Decimal = Decimal::from_parts(1001, 0, 0, false, 3); // 1.001
const MAX_QUOTE: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Canonical odds captured from one market read.
///
/// `x_*` components are `None` for 2-way sports. Opening components are
/// `None` when the payload carries only current quotes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OddsUpdate {
    pub one_open: Option<Decimal>,
    pub x_open: Option<Decimal>,
    pub two_open: Option<Decimal>,
    pub one_final: Option<Decimal>,
    pub x_final: Option<Decimal>,
    pub two_final: Option<Decimal>,
}

impl OddsUpdate {
    /// Both non-draw current quotes present — the minimum to be storable.
    pub fn is_usable(&self) -> bool {
        self.one_final.is_some() && self.two_final.is_some()
    }

    pub fn has_openings(&self) -> bool {
        self.one_open.is_some() && self.two_open.is_some()
    }
}

/// Convert a fractional quote ("n/d") to decimal odds: `n/d + 1`.
///
/// Returns `None` for malformed input, division by zero, negatives, or a
/// result outside the plausible [1.001, 1000] band.
pub fn fractional_to_decimal(fractional: &str) -> Option<Decimal> {
    let (num_raw, den_raw) = fractional.split_once('/')?;
    let num: Decimal = num_raw.trim().parse().ok()?;
    let den: Decimal = den_raw.trim().parse().ok()?;

    if den.is_zero() || num.is_sign_negative() || den.is_sign_negative() {
        return None;
    }

    let decimal = (num / den + Decimal::ONE).trunc_with_scale(RAW_SCALE);
    if decimal < MIN_QUOTE || decimal > MAX_QUOTE {
        return None;
    }
    Some(decimal)
}

/// Extract opening and current odds from a market whose arity matches the
/// sport. Named `1`/`X`/`2` columns are preferred; otherwise columns are
/// taken positionally (first = home, middle = draw, last = away).
pub fn extract_from_market(market: &ApiMarket, has_draw: bool) -> Option<OddsUpdate> {
    let choices = market.choices.as_deref()?;
    let expected = if has_draw { 3 } else { 2 };
    if choices.len() != expected {
        return None;
    }

    let (one, x, two) = if has_draw {
        (
            pick_choice(choices, "1", 0),
            Some(pick_choice(choices, "X", 1)),
            pick_choice(choices, "2", 2),
        )
    } else {
        (pick_choice(choices, "1", 0), None, pick_choice(choices, "2", 1))
    };

    let update = OddsUpdate {
        one_open: open_of(one),
        x_open: x.and_then(open_of),
        two_open: open_of(two),
        one_final: current_of(one),
        x_final: x.and_then(current_of),
        two_final: current_of(two),
    };

    update.is_usable().then_some(update)
}

/// Select the first market in the payload whose structure matches the
/// sport's arity. `None` means the payload has no usable odds.
pub fn extract_from_markets(markets: &[ApiMarket], has_draw: bool) -> Option<OddsUpdate> {
    markets
        .iter()
        .find_map(|market| extract_from_market(market, has_draw))
}

fn pick_choice<'a>(choices: &'a [ApiChoice], name: &str, index: usize) -> &'a ApiChoice {
    choices
        .iter()
        .find(|c| c.name.as_deref() == Some(name))
        .unwrap_or(&choices[index])
}

fn open_of(choice: &ApiChoice) -> Option<Decimal> {
    choice
        .initial_fractional_value
        .as_deref()
        .and_then(fractional_to_decimal)
}

fn current_of(choice: &ApiChoice) -> Option<Decimal> {
    choice
        .fractional_value
        .as_deref()
        .and_then(fractional_to_decimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn choice(name: &str, open: Option<&str>, cur: Option<&str>) -> ApiChoice {
        ApiChoice {
            name: Some(name.to_string()),
            initial_fractional_value: open.map(String::from),
            fractional_value: cur.map(String::from),
        }
    }

    fn market(choices: Vec<ApiChoice>) -> ApiMarket {
        ApiMarket {
            market_name: Some("Full time".into()),
            choices: Some(choices),
        }
    }

    #[test]
    fn fractional_conversion() {
        assert_eq!(fractional_to_decimal("7/2"), Some(dec!(4.5)));
        assert_eq!(fractional_to_decimal("1/1"), Some(dec!(2)));
        assert_eq!(fractional_to_decimal("3/5"), Some(dec!(1.6)));
    }

    #[test]
    fn fractional_truncates_to_three_digits() {
        // 1/3 + 1 = 1.3333... -> 1.333, not 1.334
        assert_eq!(fractional_to_decimal("1/3"), Some(dec!(1.333)));
        // 2/3 + 1 = 1.6666... -> 1.666
        assert_eq!(fractional_to_decimal("2/3"), Some(dec!(1.666)));
    }

    #[test]
    fn fractional_rejects_garbage() {
        assert_eq!(fractional_to_decimal(""), None);
        assert_eq!(fractional_to_decimal("7"), None);
        assert_eq!(fractional_to_decimal("7/0"), None);
        assert_eq!(fractional_to_decimal("-1/2"), None);
        assert_eq!(fractional_to_decimal("a/b"), None);
    }

    #[test]
    fn fractional_rejects_out_of_band_quotes() {
        // 0/1 + 1 = 1.0 < 1.001
        assert_eq!(fractional_to_decimal("0/1"), None);
        // 5000/1 + 1 = 5001 > 1000
        assert_eq!(fractional_to_decimal("5000/1"), None);
    }

    #[test]
    fn three_way_market_maps_named_columns() {
        let m = market(vec![
            choice("1", Some("1/1"), Some("6/5")),
            choice("X", Some("12/5"), Some("11/5")),
            choice("2", Some("7/2"), Some("3/1")),
        ]);
        let odds = extract_from_market(&m, true).unwrap();
        assert_eq!(odds.one_open, Some(dec!(2)));
        assert_eq!(odds.x_open, Some(dec!(3.4)));
        assert_eq!(odds.two_open, Some(dec!(4.5)));
        assert_eq!(odds.one_final, Some(dec!(2.2)));
        assert_eq!(odds.x_final, Some(dec!(3.2)));
        assert_eq!(odds.two_final, Some(dec!(4)));
    }

    #[test]
    fn two_way_market_has_no_draw_column() {
        let m = market(vec![
            choice("1", Some("4/5"), Some("4/6")),
            choice("2", Some("1/1"), Some("6/5")),
        ]);
        let odds = extract_from_market(&m, false).unwrap();
        assert_eq!(odds.x_open, None);
        assert_eq!(odds.x_final, None);
        assert_eq!(odds.one_final, Some(dec!(1.666)));
    }

    #[test]
    fn arity_mismatch_is_no_odds() {
        let two_way = market(vec![
            choice("1", Some("1/1"), Some("1/1")),
            choice("2", Some("1/1"), Some("1/1")),
        ]);
        assert!(extract_from_market(&two_way, true).is_none());

        let three_way = market(vec![
            choice("1", Some("1/1"), Some("1/1")),
            choice("X", Some("1/1"), Some("1/1")),
            choice("2", Some("1/1"), Some("1/1")),
        ]);
        assert!(extract_from_market(&three_way, false).is_none());
    }

    #[test]
    fn positional_fallback_when_columns_unnamed() {
        let m = market(vec![
            choice("Home", None, Some("1/1")),
            choice("Away", None, Some("2/1")),
        ]);
        let odds = extract_from_market(&m, false).unwrap();
        assert_eq!(odds.one_final, Some(dec!(2)));
        assert_eq!(odds.two_final, Some(dec!(3)));
        assert!(!odds.has_openings());
    }

    #[test]
    fn first_matching_market_wins() {
        let markets = vec![
            market(vec![choice("1", None, Some("1/1"))]), // wrong arity
            market(vec![
                choice("1", None, Some("1/1")),
                choice("2", None, Some("2/1")),
            ]),
        ];
        let odds = extract_from_markets(&markets, false).unwrap();
        assert_eq!(odds.two_final, Some(dec!(3)));
    }

    #[test]
    fn invalid_quote_discards_column_but_not_market() {
        let m = market(vec![
            choice("1", Some("0/1"), Some("1/1")),
            choice("2", Some("2/1"), Some("2/1")),
        ]);
        let odds = extract_from_market(&m, false).unwrap();
        assert_eq!(odds.one_open, None);
        assert_eq!(odds.one_final, Some(dec!(2)));
        assert_eq!(odds.two_open, Some(dec!(3)));
    }
}
