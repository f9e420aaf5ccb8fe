use chrono::{DateTime, Utc};

/// A wager row as stored in the journal
#[derive(Debug, Clone)]
pub struct WagerRow {
    pub id: Option<i64>,
    pub user_id: String,
    pub display_name: String,
    /// Session key in "dd/mm/YYYY AM|PM" form
    pub session_key: String,
    pub outcome: i64,
    pub amount: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Account terms as stored in the journal
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub user_id: String,
    pub display_name: String,
    pub commission: i64,
    pub multiplier: i64,
}

/// Counts reported after replaying the journal into a fresh store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub sessions: usize,
    pub wagers: usize,
    pub accounts: usize,
    pub skipped: usize,
    pub winning_outcome: Option<u8>,
}
