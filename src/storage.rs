use std::time::Duration;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::status::LedgerStatus;

/// SQLite-backed shared slots for the replica mirror, plus a history of
/// ledger status readings.
pub struct StateStore {
    conn: Connection,
}

/// One stored snapshot body and its write counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotValue {
    pub body: String,
    pub version: i64,
}

impl StateStore {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS replica_slot (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS ledger_status (
                ts INTEGER NOT NULL,
                custody_balance TEXT NOT NULL,
                total_allocated TEXT NOT NULL,
                unallocated TEXT NOT NULL,
                fee_numerator TEXT NOT NULL,
                fee_denominator TEXT NOT NULL,
                fee_recipient TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn load_slot(&self, key: &str) -> Result<Option<SlotValue>> {
        let row = self
            .conn
            .query_row(
                "SELECT body, version FROM replica_slot WHERE key = ?1",
                params![key],
                |row| Ok(SlotValue { body: row.get(0)?, version: row.get(1)? }),
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrites the slot unconditionally (last write wins) and returns the
    /// new version.
    pub fn store_slot(&mut self, key: &str, body: &str, ts: u64) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO replica_slot (key, body, version, updated_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                version = replica_slot.version + 1,
                updated_at = excluded.updated_at",
            params![key, body, ts as i64],
        )?;
        let version: i64 = tx.query_row(
            "SELECT version FROM replica_slot WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(version)
    }

    pub fn persist_status(&mut self, ts: u64, status: &LedgerStatus) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO ledger_status (ts, custody_balance, total_allocated, unallocated,
                fee_numerator, fee_denominator, fee_recipient)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ts as i64,
                status.custody_balance.to_string(),
                status.total_allocated.to_string(),
                status.unallocated.to_string(),
                status.fee_numerator.to_string(),
                status.fee_denominator.to_string(),
                status.fee_recipient.to_string()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn status_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM ledger_status", [], |row| row.get(0))?)
    }
}
