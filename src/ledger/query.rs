use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::accounts::UserId;
use super::outcome::Outcome;
use super::History;

/// Amount by which an outcome's total exceeds a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverLimit {
    pub outcome: Outcome,
    pub excess: u64,
}

/// Frozen copy of the outcome totals, kept for reference against a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverbuySnapshot {
    pub user_id: UserId,
    pub captured_at: DateTime<Utc>,
    pub totals: BTreeMap<Outcome, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserOutcomeTotal {
    pub user_id: UserId,
    pub total: u64,
}

/// Outcomes whose total is strictly above `limit`, ascending.
pub fn over_limit(totals: &BTreeMap<Outcome, u64>, limit: u64) -> Vec<OverLimit> {
    totals
        .iter()
        .filter(|(_, total)| **total > limit)
        .map(|(outcome, total)| OverLimit {
            outcome: *outcome,
            excess: total - limit,
        })
        .collect()
}

/// Users with a nonzero stake on `outcome`, across all sessions.
pub fn per_outcome_user_totals(history: &History, outcome: Outcome) -> Vec<UserOutcomeTotal> {
    history
        .iter()
        .filter_map(|(user, sessions)| {
            let total = sessions
                .values()
                .flatten()
                .filter(|e| e.outcome == outcome)
                .fold(0u64, |acc, e| acc.saturating_add(e.amount));
            (total > 0).then(|| UserOutcomeTotal {
                user_id: user.clone(),
                total,
            })
        })
        .collect()
}
