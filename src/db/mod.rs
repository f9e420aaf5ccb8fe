use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

pub mod models;
use models::*;

use crate::ledger::{Account, LedgerStore, Outcome, SessionKey, UserId, Wager, WagerEntry};

/// Append-only SQLite journal of ledger mutations (single connection with mutex)
#[derive(Clone)]
pub struct Journal {
    conn: Arc<Mutex<Connection>>,
}

impl Journal {
    /// Open (or create) the journal at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// Journal backed by a private in-memory database
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let journal = Journal {
            conn: Arc::new(Mutex::new(conn)),
        };
        journal.run_migrations()?;
        Ok(journal)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("journal connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Append accepted entries from one submission
    pub fn record_entries(
        &self,
        user: &UserId,
        display_name: &str,
        session_key: SessionKey,
        entries: &[WagerEntry],
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO wagers (user_id, display_name, session_key, outcome, amount, recorded_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
            )?;
            let key = session_key.to_string();
            for e in entries {
                stmt.execute(params![
                    user.as_str(),
                    display_name,
                    key,
                    e.outcome.value(),
                    i64::try_from(e.amount)?,
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_session(&self, session_key: SessionKey, open: bool) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO sessions (session_key, open, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_key) DO UPDATE SET open=excluded.open, updated_at=excluded.updated_at",
            params![session_key.to_string(), open, Utc::now()],
        )?;
        Ok(())
    }

    pub fn set_account(&self, user: &UserId, account: &Account) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO accounts (user_id, display_name, commission, multiplier, updated_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name=excluded.display_name,
                commission=excluded.commission,
                multiplier=excluded.multiplier,
                updated_at=excluded.updated_at",
            params![
                user.as_str(),
                account.display_name,
                account.commission_percent,
                account.payout_multiplier,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn set_winning_outcome(&self, outcome: Outcome) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value) VALUES ('winning_outcome', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![outcome.value().to_string()],
        )?;
        Ok(())
    }

    /// Forget every wager of a session window
    pub fn reset_session(&self, session_key: SessionKey) -> Result<usize> {
        let n = self.conn()?.execute(
            "DELETE FROM wagers WHERE session_key = ?1",
            params![session_key.to_string()],
        )?;
        Ok(n)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn list_wagers(&self) -> Result<Vec<WagerRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, display_name, session_key, outcome, amount, recorded_at
             FROM wagers ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], map_wager)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_sessions(&self) -> Result<Vec<(String, bool)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT session_key, open FROM sessions")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, display_name, commission, multiplier FROM accounts ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AccountRow {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    commission: row.get(2)?,
                    multiplier: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn winning_outcome(&self) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM settings WHERE key = 'winning_outcome'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // ── Replay ───────────────────────────────────────────────────────────────

    /// Rebuild `store` from the journal. Rows that no longer parse are
    /// skipped and counted rather than aborting start-up.
    pub fn replay_into(&self, store: &LedgerStore) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();

        for (key, open) in self.list_sessions()? {
            match key.parse::<SessionKey>() {
                Ok(key) => {
                    store.set_open(key, open);
                    stats.sessions += 1;
                }
                Err(e) => {
                    warn!("Skipping journal session row: {}", e);
                    stats.skipped += 1;
                }
            }
        }

        // Terms first: wager rows are newer than or as new as the name an
        // account row captured, so they get the last word on display names.
        for row in self.list_accounts()? {
            let user = UserId::new(row.user_id);
            match store.set_commission(&user, row.commission, row.multiplier) {
                Ok(_) => {
                    store.touch_account(&user, &row.display_name);
                    stats.accounts += 1;
                }
                Err(e) => {
                    warn!("Skipping journal account {}: {}", user, e);
                    stats.skipped += 1;
                }
            }
        }

        for row in self.list_wagers()? {
            let Some(wager) = wager_from_row(&row) else {
                warn!("Skipping malformed journal wager row {:?}", row.id);
                stats.skipped += 1;
                continue;
            };
            match store.restore_wager(wager, &row.display_name) {
                Ok(()) => stats.wagers += 1,
                Err(e) => {
                    warn!("Skipping journal wager row {:?}: {}", row.id, e);
                    stats.skipped += 1;
                }
            }
        }

        if let Some(raw) = self.winning_outcome()? {
            match raw.parse::<Outcome>() {
                Ok(outcome) => {
                    store.set_winning_outcome(outcome);
                    stats.winning_outcome = Some(outcome.value());
                }
                Err(e) => {
                    warn!("Ignoring journal winning outcome {:?}: {}", raw, e);
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_wager(row: &rusqlite::Row) -> rusqlite::Result<WagerRow> {
    Ok(WagerRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        display_name: row.get(2)?,
        session_key: row.get(3)?,
        outcome: row.get(4)?,
        amount: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}

fn wager_from_row(row: &WagerRow) -> Option<Wager> {
    let amount = u64::try_from(row.amount).ok().filter(|a| *a > 0)?;
    Some(Wager {
        user_id: UserId::new(row.user_id.clone()),
        session_key: row.session_key.parse().ok()?,
        outcome: Outcome::new(row.outcome).ok()?,
        amount,
        recorded_at: row.recorded_at,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS wagers (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      TEXT    NOT NULL,
    display_name TEXT    NOT NULL,
    session_key  TEXT    NOT NULL,
    outcome      INTEGER NOT NULL,
    amount       INTEGER NOT NULL,
    recorded_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    session_key TEXT    PRIMARY KEY,
    open        INTEGER NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    user_id      TEXT    PRIMARY KEY,
    display_name TEXT    NOT NULL,
    commission   INTEGER NOT NULL,
    multiplier   INTEGER NOT NULL,
    updated_at   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wagers_session ON wagers(session_key);
CREATE INDEX IF NOT EXISTS idx_wagers_user ON wagers(user_id);
"#;
