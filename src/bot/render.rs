//! Plain-text rendering of router replies for chat delivery.

use std::fmt::Write;

use super::command::CommandError;
use super::router::{Reply, UserListing};
use crate::ledger::{Direction, LedgerError, Outcome};

pub const HELP_TEXT: &str = "\
Send wagers as NN-AMOUNT or NN (default unit), separated by spaces.
Admin commands:
/dateopen, /dateclose - open or close the current session
/ledger - totals per number
/break <limit> - numbers over the limit
/overbuy <user> - keep a copy of the ledger for a user
/pnumber <NN> - set the winning number
/comandza [<user> <com>/<za>] - list users or set terms
/total - settlement for every user
/tsent - users who would receive a report
/alldata - all users
/reset - discard this session's wagers";

pub fn render(reply: &Reply) -> String {
    match reply {
        Reply::Started { is_admin } => {
            if *is_admin {
                "🤖 Bot started. You have admin access.".to_string()
            } else {
                "🤖 Bot started.".to_string()
            }
        }
        Reply::Help => HELP_TEXT.to_string(),
        Reply::SessionToggled { session_key, open } => {
            if *open {
                format!("{} is open for wagers", session_key)
            } else {
                format!("{} is closed", session_key)
            }
        }
        Reply::Accepted(receipt) => {
            let mut out = format!("{} accepted", receipt.total_accepted);
            if !receipt.rejected.is_empty() {
                let tokens: Vec<&str> = receipt.rejected.iter().map(|r| r.token.as_str()).collect();
                let _ = write!(out, " (skipped: {})", tokens.join(" "));
            }
            out
        }
        Reply::Summary { totals } => {
            let mut lines = vec!["📒 Ledger Summary".to_string()];
            for outcome in Outcome::all() {
                match totals.get(&outcome) {
                    Some(total) => lines.push(format!("{} ➤ {}", outcome, total)),
                    None => lines.push(format!("{} ➤", outcome)),
                }
            }
            lines.join("\n")
        }
        Reply::OverLimit { limit, rows } => {
            if rows.is_empty() {
                return format!("📌 Nothing is over {}", limit);
            }
            let mut lines = vec![format!("📌 Over Limit ({}):", limit)];
            lines.extend(rows.iter().map(|r| format!("{} ➤ {}", r.outcome, r.excess)));
            lines.join("\n")
        }
        Reply::Snapshot(snap) => format!(
            "Overbuy list saved for {} ({} numbers)",
            snap.user_id,
            snap.totals.len()
        ),
        Reply::WinningOutcome { outcome, users } => {
            if users.is_empty() {
                return format!("Winning number {} set. Nobody played it.", outcome);
            }
            let mut lines = vec![format!("Winning number {}", outcome)];
            lines.extend(
                users
                    .iter()
                    .map(|u| format!("{}: {} ➤ {}", u.user_id, outcome, u.total)),
            );
            lines.join("\n")
        }
        Reply::CommissionCandidates { users } => {
            if users.is_empty() {
                return "No users yet".to_string();
            }
            format!(
                "Choose a user, then send /comandza <user> <com>/<za>\n{}",
                listing(users)
            )
        }
        Reply::CommissionSet { user_id, account } => format!(
            "{}: Com {}%, Za {} saved",
            user_id, account.commission_percent, account.payout_multiplier
        ),
        Reply::Settlement(report) => {
            if report.records.is_empty() {
                return "No wagers recorded".to_string();
            }
            let winner = report
                .winning_outcome
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mut out = String::new();
            if report.provisional {
                out.push_str("⚠️ No winning number set; results are provisional\n");
            }
            for r in &report.records {
                let status = match r.direction {
                    Direction::HouseOwesUser => "house pays",
                    Direction::UserOwesHouse => "house receives",
                };
                let _ = writeln!(
                    out,
                    "{}\nTotal: {}\nCom({}%) ➤ {}\nAfter Com: {}\nPnumber({}) ➤ {}\nZa({}) ➤ {}\nResult: {} ({})\n---",
                    r.display_name,
                    r.total_wagered,
                    r.commission_percent,
                    r.commission_amount,
                    r.after_commission,
                    winner,
                    r.exposure,
                    r.payout_multiplier,
                    r.win_amount,
                    r.net_amount,
                    status,
                );
            }
            out.trim_end().to_string()
        }
        Reply::BroadcastIntent { users } => users
            .iter()
            .map(|u| format!("Report queued for {}", u.display_name))
            .collect::<Vec<_>>()
            .join("\n"),
        Reply::Users { users } => {
            if users.is_empty() {
                "No users yet".to_string()
            } else {
                listing(users)
            }
        }
        Reply::Reset(summary) => format!(
            "{} reset: {} wager(s), {} removed",
            summary.session_key, summary.wagers_removed, summary.amount_removed
        ),
    }
}

fn listing(users: &[UserListing]) -> String {
    users
        .iter()
        .map(|u| {
            if u.display_name == u.user_id.as_str() {
                u.user_id.to_string()
            } else {
                format!("{} ({})", u.user_id, u.display_name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_error(err: &CommandError) -> String {
    match err {
        CommandError::Ledger(LedgerError::SessionClosed(_)) => "Wagering is closed".to_string(),
        CommandError::Ledger(LedgerError::NoValidEntries { .. }) => {
            "No valid entries. Use NN-AMOUNT or NN".to_string()
        }
        CommandError::Ledger(LedgerError::InvalidRange { .. }) => {
            "Com must be 0-100 and Za must not be negative (e.g. 15/80)".to_string()
        }
        CommandError::Ledger(LedgerError::TotalOverflow { .. }) => {
            "Wager not recorded: the ledger total is too large".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{OverLimit, SettlementReport};
    use std::collections::BTreeMap;

    #[test]
    fn summary_lists_every_number() {
        let totals = BTreeMap::from([(Outcome::new(7).unwrap(), 1200)]);
        let text = render(&Reply::Summary { totals });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 101);
        assert_eq!(lines[8], "07 ➤ 1200");
        assert_eq!(lines[1], "00 ➤");
    }

    #[test]
    fn empty_over_limit_differs_from_error() {
        let empty = render(&Reply::OverLimit { limit: 100, rows: vec![] });
        assert_eq!(empty, "📌 Nothing is over 100");
        let some = render(&Reply::OverLimit {
            limit: 100,
            rows: vec![OverLimit { outcome: Outcome::new(5).unwrap(), excess: 20 }],
        });
        assert!(some.ends_with("05 ➤ 20"));
        assert_ne!(empty, render_error(&CommandError::Usage(crate::bot::command::BREAK_USAGE)));
    }

    #[test]
    fn provisional_settlement_is_flagged() {
        let report = SettlementReport {
            winning_outcome: None,
            provisional: true,
            records: vec![crate::ledger::settlement::settle_user(
                &crate::ledger::UserId::new("a"),
                &Default::default(),
                500,
                0,
            )],
        };
        let text = render(&Reply::Settlement(report));
        assert!(text.starts_with("⚠️"));
        assert!(text.contains("Result: 500 (house receives)"));
    }
}
