use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::LedgerError;

/// Opaque, stable caller identity supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user settlement terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub display_name: String,
    /// "com": percent of total wagered kept by the house (0 to 100)
    pub commission_percent: u8,
    /// "za": payout factor on the amount wagered on the winning outcome
    pub payout_multiplier: u32,
}

#[derive(Debug, Default)]
pub struct AccountDirectory {
    accounts: BTreeMap<UserId, Account>,
}

impl AccountDirectory {
    /// Create the account if missing and refresh its display name.
    pub fn touch(&mut self, user: &UserId, display_name: &str) {
        let account = self.accounts.entry(user.clone()).or_insert_with(|| Account {
            display_name: user.to_string(),
            ..Account::default()
        });
        let cleaned = clean_display_name(display_name);
        if !cleaned.is_empty() {
            account.display_name = cleaned;
        }
    }

    /// Validate and store commission/multiplier. Prior values survive a rejection.
    pub fn set_commission(
        &mut self,
        user: &UserId,
        commission: i64,
        multiplier: i64,
    ) -> Result<(), LedgerError> {
        let invalid = LedgerError::InvalidRange {
            commission,
            multiplier,
        };
        let commission_percent = u8::try_from(commission)
            .ok()
            .filter(|c| *c <= 100)
            .ok_or_else(|| invalid.clone())?;
        let payout_multiplier = u32::try_from(multiplier).map_err(|_| invalid)?;

        self.touch(user, "");
        if let Some(account) = self.accounts.get_mut(user) {
            account.commission_percent = commission_percent;
            account.payout_multiplier = payout_multiplier;
        }
        Ok(())
    }

    /// Terms for a user; never-configured users get `(0, 0)`.
    pub fn get(&self, user: &UserId) -> Account {
        self.accounts.get(user).cloned().unwrap_or_else(|| Account {
            display_name: user.to_string(),
            ..Account::default()
        })
    }

    pub fn users(&self) -> impl Iterator<Item = (&UserId, &Account)> {
        self.accounts.iter()
    }
}

/// Names are caller-supplied; drop control characters and angle brackets.
fn clean_display_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>'))
        .collect::<String>()
        .trim()
        .to_string()
}
