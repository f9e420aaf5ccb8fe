//! Wager token parsing.
//!
//! A wager message is a whitespace-separated list of tokens, each either
//! `NN-AMOUNT` or a bare `NN` that stakes the configured default unit.
//! Bad tokens never abort the message; they are collected alongside the
//! accepted entries so the caller can decide what to report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;

use super::error::EntryError;

/// Largest stake a single token may carry. Ledger-wide sums are held to the
/// same ceiling, so every aggregate also fits the journal's signed column.
pub const MAX_AMOUNT: u64 = i64::MAX as u64;

/// A numbered bet target in `0..=99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Outcome(u8);

impl Outcome {
    pub const MAX: u8 = 99;

    pub fn new(value: i64) -> Result<Self, EntryError> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Outcome(value as u8))
        } else {
            Err(EntryError::OutcomeOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Every outcome in ascending order.
    pub fn all() -> impl Iterator<Item = Outcome> {
        (0..=Self::MAX).map(Outcome)
    }
}

impl FromStr for Outcome {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.trim().parse().map_err(|_| EntryError::Malformed)?;
        Outcome::new(value)
    }
}

impl TryFrom<i64> for Outcome {
    type Error = EntryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Outcome::new(value)
    }
}

impl From<Outcome> for u8 {
    fn from(o: Outcome) -> u8 {
        o.0
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One accepted `(outcome, amount)` pair from a wager message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WagerEntry {
    pub outcome: Outcome,
    pub amount: u64,
}

/// A token that could not be turned into a [`WagerEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedToken {
    pub token: String,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: EntryError,
}

fn serialize_reason<S: serde::Serializer>(reason: &EntryError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedWager {
    pub accepted: Vec<WagerEntry>,
    pub rejected: Vec<RejectedToken>,
}

impl ParsedWager {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Sum of accepted amounts; `None` if it would pass [`MAX_AMOUNT`].
    pub fn total(&self) -> Option<u64> {
        self.accepted
            .iter()
            .try_fold(0u64, |acc, e| acc.checked_add(e.amount))
            .filter(|t| *t <= MAX_AMOUNT)
    }
}

/// Parse a single token. `default_unit` is used when no amount is given.
pub fn parse_entry(token: &str, default_unit: u64) -> Result<WagerEntry, EntryError> {
    let (outcome, amount) = match token.split_once('-') {
        Some((num, amt)) => {
            if amt.contains('-') {
                return Err(EntryError::Malformed);
            }
            let amount: u64 = amt.parse().map_err(|e: std::num::ParseIntError| {
                match e.kind() {
                    IntErrorKind::PosOverflow => EntryError::AmountTooLarge,
                    _ => EntryError::Malformed,
                }
            })?;
            (num.parse::<Outcome>()?, amount)
        }
        None => (token.parse::<Outcome>()?, default_unit),
    };
    if amount == 0 {
        return Err(EntryError::ZeroAmount);
    }
    if amount > MAX_AMOUNT {
        return Err(EntryError::AmountTooLarge);
    }
    Ok(WagerEntry { outcome, amount })
}

/// Split a message on whitespace and parse every token independently.
pub fn parse_wager_text(text: &str, default_unit: u64) -> ParsedWager {
    let mut parsed = ParsedWager::default();
    for token in text.split_whitespace() {
        match parse_entry(token, default_unit) {
            Ok(entry) => parsed.accepted.push(entry),
            Err(reason) => parsed.rejected.push(RejectedToken {
                token: token.to_string(),
                reason,
            }),
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn o(v: i64) -> Outcome {
        Outcome::new(v).unwrap()
    }

    #[test]
    fn explicit_amount_with_leading_zero() {
        let e = parse_entry("07-500", 500).unwrap();
        assert_eq!(e.outcome, o(7));
        assert_eq!(e.amount, 500);
    }

    #[test]
    fn bare_outcome_uses_default_unit() {
        let e = parse_entry("07", 250).unwrap();
        assert_eq!(e, WagerEntry { outcome: o(7), amount: 250 });
    }

    #[test]
    fn boundary_tokens_rejected() {
        assert_eq!(parse_entry("-1", 500), Err(EntryError::Malformed));
        assert_eq!(parse_entry("100", 500), Err(EntryError::OutcomeOutOfRange(100)));
        assert_eq!(parse_entry("ab", 500), Err(EntryError::Malformed));
        assert_eq!(parse_entry("5-3-2", 500), Err(EntryError::Malformed));
        assert_eq!(parse_entry("5-", 500), Err(EntryError::Malformed));
        assert_eq!(parse_entry("5-0", 500), Err(EntryError::ZeroAmount));
    }

    #[test]
    fn oversized_amounts_rejected() {
        let max = format!("01-{}", MAX_AMOUNT);
        assert_eq!(parse_entry(&max, 500).unwrap().amount, MAX_AMOUNT);
        let over = format!("01-{}", MAX_AMOUNT + 1);
        assert_eq!(parse_entry(&over, 500), Err(EntryError::AmountTooLarge));
        assert_eq!(
            parse_entry("01-18446744073709551615", 500),
            Err(EntryError::AmountTooLarge)
        );
        assert_eq!(
            parse_entry("01-99999999999999999999999", 500),
            Err(EntryError::AmountTooLarge)
        );
    }

    #[test]
    fn total_past_ceiling_is_none() {
        let text = format!("01-{} 02-1", MAX_AMOUNT);
        let parsed = parse_wager_text(&text, 500);
        assert_eq!(parsed.accepted.len(), 2);
        assert_eq!(parsed.total(), None);
    }

    #[test]
    fn range_edges_accepted() {
        assert_eq!(parse_entry("0", 1).unwrap().outcome, o(0));
        assert_eq!(parse_entry("99-10", 1).unwrap().outcome, o(99));
    }

    #[test]
    fn message_keeps_both_halves() {
        let parsed = parse_wager_text("07-500  12 ab 100 33-1000", 500);
        assert_eq!(
            parsed.accepted,
            vec![
                WagerEntry { outcome: o(7), amount: 500 },
                WagerEntry { outcome: o(12), amount: 500 },
                WagerEntry { outcome: o(33), amount: 1000 },
            ]
        );
        assert_eq!(parsed.rejected_count(), 2);
        assert_eq!(parsed.rejected[0].token, "ab");
        assert_eq!(parsed.total(), Some(2000));
    }

    #[test]
    fn outcome_displays_two_digits() {
        assert_eq!(o(5).to_string(), "05");
        assert_eq!(o(42).to_string(), "42");
    }
}
