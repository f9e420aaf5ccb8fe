use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use super::command::{parse_message, Command, CommandError, Message};
use crate::db::Journal;
use crate::ledger::{
    Account, LedgerStore, OverLimit, OverbuySnapshot, Outcome, Receipt, ResetSummary,
    SessionKey, SettlementReport, UserId, UserOutcomeTotal,
};

/// Everything the transport knows about one inbound message.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub user_id: UserId,
    pub display_name: String,
    pub session_key: SessionKey,
    pub text: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserListing {
    pub user_id: UserId,
    pub display_name: String,
}

/// Typed result of a handled message, rendered to text by [`super::render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Started { is_admin: bool },
    Help,
    SessionToggled { session_key: SessionKey, open: bool },
    Accepted(Receipt),
    Summary { totals: BTreeMap<Outcome, u64> },
    OverLimit { limit: u64, rows: Vec<OverLimit> },
    Snapshot(OverbuySnapshot),
    WinningOutcome { outcome: Outcome, users: Vec<UserOutcomeTotal> },
    CommissionCandidates { users: Vec<UserListing> },
    CommissionSet { user_id: UserId, account: Account },
    Settlement(SettlementReport),
    BroadcastIntent { users: Vec<UserListing> },
    Users { users: Vec<UserListing> },
    Reset(ResetSummary),
}

/// Dispatches chat messages against the shared ledger, mirroring successful
/// mutations into the journal when one is configured.
#[derive(Clone)]
pub struct CommandRouter {
    store: LedgerStore,
    journal: Option<Journal>,
    /// Held from a store mutation until its journal write lands, so the
    /// journal sees mutations in the order the store applied them.
    order: Arc<Mutex<()>>,
}

impl CommandRouter {
    pub fn new(store: LedgerStore, journal: Option<Journal>) -> Self {
        CommandRouter {
            store,
            journal,
            order: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn handle(&self, req: &Inbound) -> Result<Reply, CommandError> {
        let message = parse_message(&req.text)?;
        if let Message::Command(cmd) = &message {
            if cmd.requires_admin() && !req.is_admin {
                warn!("Denied /{} for non-admin {}", cmd.name(), req.user_id);
                return Err(CommandError::PermissionDenied {
                    command: cmd.name(),
                });
            }
        }

        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        match message {
            Message::Wager(text) => self.submit_wager(req, &text),
            Message::Command(cmd) => self.run(req, cmd),
        }
    }

    fn submit_wager(&self, req: &Inbound, text: &str) -> Result<Reply, CommandError> {
        let receipt = self
            .store
            .record(&req.user_id, &req.display_name, req.session_key, text)?;
        for bad in &receipt.rejected {
            warn!("Skipped wager token {:?} from {}: {}", bad.token, req.user_id, bad.reason);
        }
        self.journal(|j| {
            j.record_entries(
                &req.user_id,
                &req.display_name,
                receipt.session_key,
                &receipt.accepted,
                receipt.recorded_at,
            )
        });
        Ok(Reply::Accepted(receipt))
    }

    fn run(&self, req: &Inbound, cmd: Command) -> Result<Reply, CommandError> {
        let reply = match cmd {
            Command::Start => Reply::Started {
                is_admin: req.is_admin,
            },
            Command::Help => Reply::Help,
            Command::DateOpen | Command::DateClose => {
                let open = cmd == Command::DateOpen;
                self.store.set_open(req.session_key, open);
                self.journal(|j| j.set_session(req.session_key, open));
                Reply::SessionToggled {
                    session_key: req.session_key,
                    open,
                }
            }
            Command::Ledger => Reply::Summary {
                totals: self.store.summary(),
            },
            Command::Break { limit } => Reply::OverLimit {
                limit,
                rows: self.store.over_limit(limit),
            },
            Command::Overbuy { user } => Reply::Snapshot(self.store.snapshot(&user)),
            Command::PNumber { outcome } => {
                let users = self.store.set_winning_outcome(outcome);
                self.journal(|j| j.set_winning_outcome(outcome));
                Reply::WinningOutcome { outcome, users }
            }
            Command::ListCommissionUsers => Reply::CommissionCandidates {
                users: self.user_listing(),
            },
            Command::SetCommission {
                user,
                commission,
                multiplier,
            } => {
                let account = self.store.set_commission(&user, commission, multiplier)?;
                info!(
                    "Terms for {} set to com {}% / za {}",
                    user, account.commission_percent, account.payout_multiplier
                );
                self.journal(|j| j.set_account(&user, &account));
                Reply::CommissionSet {
                    user_id: user,
                    account,
                }
            }
            Command::Total => {
                let report = self.store.settle();
                if report.provisional {
                    warn!("Settlement computed without a winning outcome (provisional)");
                }
                Reply::Settlement(report)
            }
            Command::TSent => {
                let users = self
                    .store
                    .settle()
                    .records
                    .into_iter()
                    .map(|r| UserListing {
                        user_id: r.user_id,
                        display_name: r.display_name,
                    })
                    .collect();
                Reply::BroadcastIntent { users }
            }
            Command::AllData => Reply::Users {
                users: self.user_listing(),
            },
            Command::Reset => {
                let summary = self.store.reset_ledger(req.session_key);
                self.journal(|j| j.reset_session(req.session_key).map(|_| ()));
                Reply::Reset(summary)
            }
        };
        Ok(reply)
    }

    fn user_listing(&self) -> Vec<UserListing> {
        self.store
            .users()
            .into_iter()
            .map(|(user_id, acct)| UserListing {
                user_id,
                display_name: acct.display_name,
            })
            .collect()
    }

    /// Journal writes are best-effort: the in-memory ledger stays authoritative.
    fn journal(&self, write: impl FnOnce(&Journal) -> anyhow::Result<()>) {
        if let Some(j) = &self.journal {
            if let Err(e) = write(j) {
                warn!("Journal write failed: {}", e);
            }
        }
    }
}
