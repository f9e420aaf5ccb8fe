//! In-memory wager ledger.
//!
//! [`LedgerStore`] is the single owner of every piece of betting state: the
//! session gate, the append-only wager list, per-outcome totals, per-user
//! history, account terms, the winning outcome and overbuy snapshots. One
//! mutex guards all of it, so a gate check and the writes that follow it are
//! one critical section, and readers always see totals and history agree.

pub mod accounts;
pub mod error;
pub mod outcome;
pub mod query;
pub mod session;
pub mod settlement;

pub use accounts::{Account, AccountDirectory, UserId};
pub use error::LedgerError;
pub use outcome::{parse_wager_text, Outcome, ParsedWager, RejectedToken, WagerEntry, MAX_AMOUNT};
pub use query::{OverLimit, OverbuySnapshot, UserOutcomeTotal};
pub use session::{Period, SessionGate, SessionKey};
pub use settlement::{Direction, SettlementReport};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// user → session → accepted entries, in submission order.
pub type History = BTreeMap<UserId, BTreeMap<SessionKey, Vec<WagerEntry>>>;

/// Default stake when a token names only the outcome.
pub const DEFAULT_UNIT: u64 = 500;

/// A recorded wager. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wager {
    pub user_id: UserId,
    pub session_key: SessionKey,
    pub outcome: Outcome,
    pub amount: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Result of a successful `record` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub session_key: SessionKey,
    pub total_accepted: u64,
    /// Timestamp stamped on every wager of this submission
    pub recorded_at: DateTime<Utc>,
    pub accepted: Vec<WagerEntry>,
    pub rejected: Vec<RejectedToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub session_key: SessionKey,
    pub wagers_removed: usize,
    pub amount_removed: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    gate: SessionGate,
    wagers: Vec<Wager>,
    totals: BTreeMap<Outcome, u64>,
    /// Σ totals; kept at or below `MAX_AMOUNT` so no per-outcome or per-user
    /// sum can overflow.
    grand_total: u64,
    history: History,
    accounts: AccountDirectory,
    winning: Option<Outcome>,
    snapshots: HashMap<UserId, OverbuySnapshot>,
}

impl LedgerState {
    /// Room check for `amount` more. Runs before any write of a batch.
    fn reserve(&self, amount: u64) -> Result<(), LedgerError> {
        match self.grand_total.checked_add(amount) {
            Some(t) if t <= MAX_AMOUNT => Ok(()),
            _ => Err(LedgerError::TotalOverflow { limit: MAX_AMOUNT }),
        }
    }

    /// Callers must have passed `reserve` for the amount first.
    fn append(&mut self, wager: Wager) {
        self.grand_total += wager.amount;
        *self.totals.entry(wager.outcome).or_insert(0) += wager.amount;
        self.history
            .entry(wager.user_id.clone())
            .or_default()
            .entry(wager.session_key)
            .or_default()
            .push(WagerEntry {
                outcome: wager.outcome,
                amount: wager.amount,
            });
        self.wagers.push(wager);
    }

    fn nonzero_totals(&self) -> BTreeMap<Outcome, u64> {
        self.totals
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, v)| (*k, *v))
            .collect()
    }
}

/// Shared handle to the process-wide ledger. Cheap to clone.
#[derive(Clone)]
pub struct LedgerStore {
    inner: Arc<Mutex<LedgerState>>,
    default_unit: u64,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT)
    }
}

impl LedgerStore {
    pub fn new(default_unit: u64) -> Self {
        LedgerStore {
            inner: Arc::new(Mutex::new(LedgerState::default())),
            default_unit,
        }
    }

    /// Mutations validate everything (gate, ceiling) before their first
    /// write and the writes themselves cannot fail, so a poisoned mutex is
    /// safe to keep using.
    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Session gate ─────────────────────────────────────────────────────────

    pub fn is_open(&self, key: &SessionKey) -> bool {
        self.state().gate.is_open(key)
    }

    pub fn set_open(&self, key: SessionKey, open: bool) {
        self.state().gate.set_open(key, open);
        info!("Session {} {}", key, if open { "opened" } else { "closed" });
    }

    pub fn sessions(&self) -> Vec<(SessionKey, bool)> {
        self.state().gate.known()
    }

    // ── Wagers ────────────────────────────────────────────────────────────────

    /// Parse `text` and record every valid entry for `user` in `key`.
    pub fn record(
        &self,
        user: &UserId,
        display_name: &str,
        key: SessionKey,
        text: &str,
    ) -> Result<Receipt, LedgerError> {
        let parsed = parse_wager_text(text, self.default_unit);
        self.record_parsed(user, display_name, key, parsed)
    }

    /// Record already-parsed entries. The whole call fails with
    /// `SessionClosed` if the window is closed when the lock is taken, and
    /// with `TotalOverflow` if the batch does not fit; either way nothing is
    /// written.
    fn record_parsed(
        &self,
        user: &UserId,
        display_name: &str,
        key: SessionKey,
        parsed: ParsedWager,
    ) -> Result<Receipt, LedgerError> {
        let batch_total = parsed.total();
        let mut state = self.state();
        if !state.gate.is_open(&key) {
            return Err(LedgerError::SessionClosed(key));
        }
        if parsed.accepted.is_empty() {
            return Err(LedgerError::NoValidEntries {
                rejected: parsed.rejected_count(),
            });
        }
        let total_accepted = batch_total.ok_or(LedgerError::TotalOverflow { limit: MAX_AMOUNT })?;
        state.reserve(total_accepted)?;

        let now = Utc::now();
        state.accounts.touch(user, display_name);
        for entry in &parsed.accepted {
            state.append(Wager {
                user_id: user.clone(),
                session_key: key,
                outcome: entry.outcome,
                amount: entry.amount,
                recorded_at: now,
            });
        }
        drop(state);

        debug!(
            "Recorded {} entr(ies) for {} in {} (total {}, {} rejected)",
            parsed.accepted.len(),
            user,
            key,
            total_accepted,
            parsed.rejected_count()
        );
        Ok(Receipt {
            session_key: key,
            total_accepted,
            recorded_at: now,
            accepted: parsed.accepted,
            rejected: parsed.rejected,
        })
    }

    /// Append a wager that was accepted earlier (journal replay). Skips the
    /// gate but not the ledger ceiling.
    pub(crate) fn restore_wager(&self, wager: Wager, display_name: &str) -> Result<(), LedgerError> {
        let mut state = self.state();
        state.reserve(wager.amount)?;
        state.accounts.touch(&wager.user_id, display_name);
        state.append(wager);
        Ok(())
    }

    /// All wagers a user has made, oldest first. Unknown users get an empty list.
    pub fn user_wagers(&self, user: &UserId) -> Vec<Wager> {
        self.state()
            .wagers
            .iter()
            .filter(|w| &w.user_id == user)
            .cloned()
            .collect()
    }

    pub fn wager_count(&self) -> usize {
        self.state().wagers.len()
    }

    /// Drop every wager recorded in `key` and take it out of the totals.
    pub fn reset_ledger(&self, key: SessionKey) -> ResetSummary {
        let mut state = self.state();
        let state = &mut *state;

        let mut wagers_removed = 0;
        let mut amount_removed = 0;
        let totals = &mut state.totals;
        state.wagers.retain(|w| {
            if w.session_key != key {
                return true;
            }
            if let Some(total) = totals.get_mut(&w.outcome) {
                *total -= w.amount;
            }
            wagers_removed += 1;
            amount_removed += w.amount;
            false
        });
        state.grand_total -= amount_removed;
        state.totals.retain(|_, v| *v > 0);
        for sessions in state.history.values_mut() {
            sessions.remove(&key);
        }
        state.history.retain(|_, sessions| !sessions.is_empty());

        info!(
            "Ledger reset for {}: {} wager(s), {} removed",
            key, wagers_removed, amount_removed
        );
        ResetSummary {
            session_key: key,
            wagers_removed,
            amount_removed,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Nonzero outcome totals, ascending by outcome.
    pub fn summary(&self) -> BTreeMap<Outcome, u64> {
        self.state().nonzero_totals()
    }

    pub fn over_limit(&self, limit: u64) -> Vec<OverLimit> {
        query::over_limit(&self.state().totals, limit)
    }

    pub fn per_outcome_user_totals(&self, outcome: Outcome) -> Vec<UserOutcomeTotal> {
        query::per_outcome_user_totals(&self.state().history, outcome)
    }

    /// Freeze the current totals under `user`, replacing any earlier copy.
    pub fn snapshot(&self, user: &UserId) -> OverbuySnapshot {
        let mut state = self.state();
        let snap = OverbuySnapshot {
            user_id: user.clone(),
            captured_at: Utc::now(),
            totals: state.nonzero_totals(),
        };
        state.snapshots.insert(user.clone(), snap.clone());
        snap
    }

    pub fn stored_snapshot(&self, user: &UserId) -> Option<OverbuySnapshot> {
        self.state().snapshots.get(user).cloned()
    }

    // ── Accounts ─────────────────────────────────────────────────────────────

    pub fn set_commission(
        &self,
        user: &UserId,
        commission: i64,
        multiplier: i64,
    ) -> Result<Account, LedgerError> {
        let mut state = self.state();
        state.accounts.set_commission(user, commission, multiplier)?;
        Ok(state.accounts.get(user))
    }

    pub fn touch_account(&self, user: &UserId, display_name: &str) {
        self.state().accounts.touch(user, display_name);
    }

    pub fn account(&self, user: &UserId) -> Account {
        self.state().accounts.get(user)
    }

    /// Every known user with their terms, in id order.
    pub fn users(&self) -> Vec<(UserId, Account)> {
        self.state()
            .accounts
            .users()
            .map(|(id, acct)| (id.clone(), acct.clone()))
            .collect()
    }

    // ── Settlement ───────────────────────────────────────────────────────────

    /// Designate the winning outcome and return who staked on it.
    pub fn set_winning_outcome(&self, outcome: Outcome) -> Vec<UserOutcomeTotal> {
        let mut state = self.state();
        state.winning = Some(outcome);
        info!("Winning outcome set to {}", outcome);
        query::per_outcome_user_totals(&state.history, outcome)
    }

    pub fn winning_outcome(&self) -> Option<Outcome> {
        self.state().winning
    }

    /// Settle against the stored winning outcome.
    pub fn settle(&self) -> SettlementReport {
        let state = self.state();
        settlement::settle(&state.history, &state.accounts, state.winning)
    }

    /// Settle against an explicit winning outcome without storing it.
    pub fn settle_with(&self, winning: Option<Outcome>) -> SettlementReport {
        let state = self.state();
        settlement::settle(&state.history, &state.accounts, winning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key() -> SessionKey {
        SessionKey::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), Period::AM)
    }

    fn o(v: i64) -> Outcome {
        Outcome::new(v).unwrap()
    }

    fn open_store() -> LedgerStore {
        let store = LedgerStore::default();
        store.set_open(key(), true);
        store
    }

    /// totals == Σ wagers per outcome == Σ history per outcome
    fn assert_consistent(store: &LedgerStore) {
        let state = store.state();
        let mut from_wagers: BTreeMap<Outcome, u64> = BTreeMap::new();
        for w in &state.wagers {
            *from_wagers.entry(w.outcome).or_default() += w.amount;
        }
        let mut from_history: BTreeMap<Outcome, u64> = BTreeMap::new();
        for e in state.history.values().flat_map(|s| s.values().flatten()) {
            *from_history.entry(e.outcome).or_default() += e.amount;
        }
        assert_eq!(state.nonzero_totals(), from_wagers);
        assert_eq!(from_wagers, from_history);
        assert_eq!(state.grand_total, from_wagers.values().sum::<u64>());
    }

    /// Outcomes 1, 2 and 3 are only ever staked together, one unit each.
    fn assert_batch_whole(summary: &BTreeMap<Outcome, u64>) {
        let one = summary.get(&o(1)).copied().unwrap_or(0);
        assert_eq!(summary.get(&o(2)).copied().unwrap_or(0), one);
        assert_eq!(summary.get(&o(3)).copied().unwrap_or(0), one);
    }

    #[test]
    fn closed_session_rejects_without_effect() {
        let store = LedgerStore::default();
        let u = UserId::new("a");
        let err = store.record(&u, "A", key(), "07-500 12").unwrap_err();
        assert_eq!(err, LedgerError::SessionClosed(key()));
        assert!(store.summary().is_empty());
        assert!(store.user_wagers(&u).is_empty());
        assert!(store.users().is_empty());
    }

    #[test]
    fn record_accepts_valid_and_skips_bad_tokens() {
        let store = open_store();
        let u = UserId::new("a");
        let receipt = store.record(&u, "A", key(), "07-500 07 ab 100 -1").unwrap();
        assert_eq!(receipt.total_accepted, 1000);
        assert_eq!(receipt.rejected.len(), 3);
        assert_eq!(store.summary(), BTreeMap::from([(o(7), 1000)]));
        assert_eq!(store.user_wagers(&u).len(), 2);
        assert_consistent(&store);
    }

    #[test]
    fn all_bad_tokens_is_no_valid_entries() {
        let store = open_store();
        let err = store.record(&UserId::new("a"), "A", key(), "ab 100").unwrap_err();
        assert_eq!(err, LedgerError::NoValidEntries { rejected: 2 });
        assert_eq!(store.wager_count(), 0);
        assert!(store.users().is_empty());
    }

    #[test]
    fn totals_accumulate_across_sessions() {
        let store = open_store();
        let pm = SessionKey::new(key().date, Period::PM);
        store.set_open(pm, true);
        store.record(&UserId::new("a"), "", key(), "05-1000").unwrap();
        store.record(&UserId::new("b"), "", pm, "05-2000 09-300").unwrap();
        assert_eq!(store.summary(), BTreeMap::from([(o(5), 3000), (o(9), 300)]));
        assert_consistent(&store);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = open_store();
        let u = UserId::new("a");
        store.record(&u, "", key(), "05-100").unwrap();
        let snap = store.snapshot(&u);
        store.record(&u, "", key(), "05-100 06-100").unwrap();
        assert_eq!(snap.totals, BTreeMap::from([(o(5), 100)]));
        assert_eq!(store.stored_snapshot(&u).unwrap().totals, snap.totals);
        assert_eq!(store.summary().get(&o(5)), Some(&200));
    }

    #[test]
    fn reset_removes_only_that_session() {
        let store = open_store();
        let pm = SessionKey::new(key().date, Period::PM);
        store.set_open(pm, true);
        let u = UserId::new("a");
        store.record(&u, "", key(), "05-1000 06-10").unwrap();
        store.record(&u, "", pm, "05-500").unwrap();
        let summary = store.reset_ledger(key());
        assert_eq!(summary.wagers_removed, 2);
        assert_eq!(summary.amount_removed, 1010);
        assert_eq!(store.summary(), BTreeMap::from([(o(5), 500)]));
        assert_consistent(&store);
        // accounts survive a reset
        assert_eq!(store.users().len(), 1);
    }

    #[test]
    fn settle_uses_stored_winner_and_current_terms() {
        let store = open_store();
        let u = UserId::new("a");
        store.record(&u, "", key(), "07-200 08-800").unwrap();
        store.set_commission(&u, 10, 80).unwrap();
        assert!(store.settle().provisional);

        let who = store.set_winning_outcome(o(7));
        assert_eq!(who, vec![UserOutcomeTotal { user_id: u.clone(), total: 200 }]);
        let report = store.settle();
        assert_eq!(report.records[0].net_amount, 15100);
        assert_eq!(report.records[0].direction, Direction::HouseOwesUser);
    }

    #[test]
    fn oversized_single_message_is_rejected_whole() {
        let store = open_store();
        let u = UserId::new("a");
        let text = format!("01-{} 02-1", MAX_AMOUNT);
        let err = store.record(&u, "A", key(), &text).unwrap_err();
        assert_eq!(err, LedgerError::TotalOverflow { limit: MAX_AMOUNT });
        assert_eq!(store.wager_count(), 0);
        assert!(store.summary().is_empty());
        assert!(store.users().is_empty());

        // amounts past the ceiling are skipped per token, not stored
        let receipt = store.record(&u, "A", key(), "01-18446744073709551615 02-1").unwrap();
        assert_eq!(receipt.total_accepted, 1);
        assert_eq!(receipt.rejected.len(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn batch_that_would_overflow_leaves_state_untouched() {
        let store = open_store();
        store
            .record(&UserId::new("a"), "A", key(), &format!("01-{}", MAX_AMOUNT))
            .unwrap();
        let before = store.summary();

        let err = store.record(&UserId::new("b"), "B", key(), "05-10 01-1").unwrap_err();
        assert_eq!(err, LedgerError::TotalOverflow { limit: MAX_AMOUNT });
        assert_eq!(store.summary(), before);
        assert_eq!(store.wager_count(), 1);
        assert!(store.user_wagers(&UserId::new("b")).is_empty());
        assert_eq!(store.users().len(), 1);
        assert_consistent(&store);

        // the store keeps working after the rejection
        let report = store.settle_with(Some(o(1)));
        assert_eq!(report.records[0].total_wagered, MAX_AMOUNT);

        // a reset frees room again
        store.reset_ledger(key());
        store.record(&UserId::new("b"), "B", key(), "05-10 01-1").unwrap();
        assert_eq!(store.summary().values().sum::<u64>(), 11);
        assert_consistent(&store);
    }

    #[test]
    fn restore_respects_the_ceiling() {
        let store = LedgerStore::default();
        let wager = |amount| Wager {
            user_id: UserId::new("a"),
            session_key: key(),
            outcome: o(4),
            amount,
            recorded_at: Utc::now(),
        };
        store.restore_wager(wager(MAX_AMOUNT), "A").unwrap();
        assert!(store.restore_wager(wager(1), "A").is_err());
        assert_eq!(store.wager_count(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn receipt_carries_the_stored_timestamp() {
        let store = open_store();
        let u = UserId::new("a");
        let receipt = store.record(&u, "A", key(), "05 06").unwrap();
        for w in store.user_wagers(&u) {
            assert_eq!(w.recorded_at, receipt.recorded_at);
        }
    }

    #[test]
    fn concurrent_records_stay_consistent() {
        let store = open_store();
        std::thread::scope(|s| {
            let reader = store.clone();
            s.spawn(move || {
                let batch = UserId::new("batch");
                for _ in 0..300 {
                    assert_consistent(&reader);
                    let seen = reader.user_wagers(&batch);
                    let on = |n| seen.iter().filter(|w| w.outcome == o(n)).count();
                    assert_eq!(seen.len() % 3, 0);
                    assert_eq!((on(1), on(2)), (on(3), on(3)));
                    if let Some(r) = reader.settle().records.iter().find(|r| r.user_id == batch) {
                        assert_eq!(r.total_wagered % 3, 0);
                    }
                }
            });
            let batcher = store.clone();
            s.spawn(move || {
                for _ in 0..300 {
                    batcher
                        .record(&UserId::new("batch"), "", key(), "01-1 02-1 03-1")
                        .unwrap();
                }
            });
            for t in 0..8 {
                let store = store.clone();
                s.spawn(move || {
                    let u = UserId::new(format!("user{t}"));
                    for i in 0..100 {
                        let text = format!("{:02}-{} {:02}", (t * 7 + i) % 100, i + 1, i % 100);
                        store.record(&u, "", key(), &text).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.wager_count(), 8 * 100 * 2 + 300 * 3);
        let expected: u64 = 8 * ((1..=100u64).sum::<u64>() + 100 * DEFAULT_UNIT) + 900;
        assert_eq!(store.summary().values().sum::<u64>(), expected);
        assert_consistent(&store);
    }

    #[test]
    fn close_races_never_leave_partial_writes() {
        let store = open_store();
        std::thread::scope(|s| {
            let writer = store.clone();
            s.spawn(move || {
                for _ in 0..500 {
                    let _ = writer.record(&UserId::new("w"), "", key(), "01-1 02-1 03-1");
                }
            });
            let toggler = store.clone();
            s.spawn(move || {
                for i in 0..500 {
                    toggler.set_open(key(), i % 2 == 0);
                }
            });
        });
        assert_batch_whole(&store.summary());
        assert_consistent(&store);
    }
}
