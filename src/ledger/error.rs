use thiserror::Error;

use super::session::SessionKey;

/// Failures returned by [`super::LedgerStore`] operations.
///
/// All of them are caller-visible conditions; none leave partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("session {0} is closed for wagering")]
    SessionClosed(SessionKey),
    #[error("no valid entries ({rejected} rejected)")]
    NoValidEntries { rejected: usize },
    #[error("commission must be within 0..=100 and multiplier non-negative (got {commission}/{multiplier})")]
    InvalidRange { commission: i64, multiplier: i64 },
    #[error("wager would push the ledger total past {limit}")]
    TotalOverflow { limit: u64 },
}

/// Why a single wager token was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("malformed token")]
    Malformed,
    #[error("outcome {0} outside 0..=99")]
    OutcomeOutOfRange(i64),
    #[error("amount must be positive")]
    ZeroAmount,
    #[error("amount is too large")]
    AmountTooLarge,
}
