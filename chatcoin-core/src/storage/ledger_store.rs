use crate::error::Result;
use crate::storage::Storage;
use crate::types::LedgerEntry;
use chrono::{DateTime, Utc};
use rusqlite::params;

pub struct LedgerStore<'a> {
    storage: &'a Storage,
}

impl<'a> LedgerStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn entries_for_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, event_id, user_id, delta, reason, created_at
             FROM ledger_entries WHERE user_id = ?1 ORDER BY id",
        )?;

        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok(LedgerEntry {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    user_id: row.get(2)?,
                    delta: row.get(3)?,
                    reason: row.get(4)?,
                    created_at: DateTime::from_timestamp(row.get(5)?, 0).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Sum of all deltas for a user. By the conservation invariant this
    /// always equals the stored balance.
    pub async fn sum_for_user(&self, user_id: &str) -> Result<i64> {
        let conn = self.storage.get_connection().await;

        let sum: i64 = conn.query_row(
            "SELECT COALESCE(SUM(delta), 0) FROM ledger_entries WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(sum)
    }
}
