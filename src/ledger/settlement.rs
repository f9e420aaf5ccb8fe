//! Per-user settlement against the designated winning outcome.
//!
//! For every user with at least one wager:
//!
//!   commission = floor(total × com / 100)
//!   after      = total − commission
//!   win        = exposure × za
//!   net        = after − win
//!
//! `net < 0` means the house pays the user; `net ≥ 0` means the user pays the
//! house. Records carry `|net|` with the direction as its own field.

use serde::Serialize;

use super::accounts::{Account, AccountDirectory, UserId};
use super::outcome::Outcome;
use super::History;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HouseOwesUser,
    UserOwesHouse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub total_wagered: u64,
    pub commission_percent: u8,
    pub commission_amount: u64,
    pub after_commission: u64,
    pub exposure: u64,
    pub payout_multiplier: u32,
    pub win_amount: u64,
    /// Absolute value of `after_commission - win_amount`
    pub net_amount: u64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    pub winning_outcome: Option<Outcome>,
    /// No winning outcome designated yet; exposures are reported as zero.
    pub provisional: bool,
    pub records: Vec<SettlementRecord>,
}

/// Settle one user given their totals and terms.
pub fn settle_user(
    user_id: &UserId,
    account: &Account,
    total_wagered: u64,
    exposure: u64,
) -> SettlementRecord {
    let commission_amount =
        (total_wagered as u128 * account.commission_percent as u128 / 100) as u64;
    let after_commission = total_wagered - commission_amount;
    let win_amount = exposure.saturating_mul(account.payout_multiplier as u64);

    let (net_amount, direction) = if after_commission >= win_amount {
        (after_commission - win_amount, Direction::UserOwesHouse)
    } else {
        (win_amount - after_commission, Direction::HouseOwesUser)
    };

    SettlementRecord {
        user_id: user_id.clone(),
        display_name: account.display_name.clone(),
        total_wagered,
        commission_percent: account.commission_percent,
        commission_amount,
        after_commission,
        exposure,
        payout_multiplier: account.payout_multiplier,
        win_amount,
        net_amount,
        direction,
    }
}

/// Settle every user in `history`, in user-id order.
pub fn settle(
    history: &History,
    accounts: &AccountDirectory,
    winning: Option<Outcome>,
) -> SettlementReport {
    let records = history
        .iter()
        .filter_map(|(user, sessions)| {
            let entries = sessions.values().flatten();
            let total = entries
                .clone()
                .fold(0u64, |acc, e| acc.saturating_add(e.amount));
            if total == 0 {
                return None;
            }
            let exposure = match winning {
                Some(w) => entries
                    .filter(|e| e.outcome == w)
                    .fold(0u64, |acc, e| acc.saturating_add(e.amount)),
                None => 0,
            };
            Some(settle_user(user, &accounts.get(user), total, exposure))
        })
        .collect();

    SettlementReport {
        winning_outcome: winning,
        provisional: winning.is_none(),
        records,
    }
}
