use crate::error::Result;
use crate::storage::Storage;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

/// Result of applying an award delta.
#[derive(Debug, Clone, Copy)]
pub struct AwardOutcome {
    /// False when the event id had already been applied; the balance was
    /// left untouched.
    pub applied: bool,
    pub new_balance: i64,
}

pub struct BalanceStore<'a> {
    storage: &'a Storage,
}

impl<'a> BalanceStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn get(&self, user_id: &str) -> Result<i64> {
        let conn = self.storage.get_connection().await;

        let balance = conn
            .query_row(
                "SELECT balance FROM user_balances WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    }

    /// Apply an award delta and its ledger row in one transaction keyed by
    /// event id. If the ledger row already exists the balance is not
    /// touched, which makes re-running a reclaimed job safe.
    pub async fn apply_delta_with_ledger(
        &self,
        event_id: &str,
        user_id: &str,
        delta: i64,
        reason: &str,
    ) -> Result<AwardOutcome> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let now = Utc::now().timestamp();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO ledger_entries (event_id, user_id, delta, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![event_id, user_id, delta, reason, now],
        )?;

        if inserted == 0 {
            let balance = current_balance(&tx, user_id)?;
            tx.commit()?;
            tracing::debug!("Ledger already holds event {}, balance untouched", event_id);
            return Ok(AwardOutcome {
                applied: false,
                new_balance: balance,
            });
        }

        tx.execute(
            "INSERT INTO user_balances (user_id, balance, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 balance = balance + excluded.balance,
                 updated_at = excluded.updated_at",
            params![user_id, delta, now],
        )?;

        let balance = current_balance(&tx, user_id)?;
        tx.commit()?;

        Ok(AwardOutcome {
            applied: true,
            new_balance: balance,
        })
    }
}

fn current_balance(
    tx: &rusqlite::Transaction<'_>,
    user_id: &str,
) -> std::result::Result<i64, rusqlite::Error> {
    let balance = tx
        .query_row(
            "SELECT balance FROM user_balances WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(balance.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_event_applies_once() {
        let storage = Storage::open_in_memory().await.unwrap();
        let balances = BalanceStore::new(&storage);

        let first = balances
            .apply_delta_with_ledger("evt-1", "viewer-1", 5, "chat_reward")
            .await
            .unwrap();
        assert!(first.applied);
        assert_eq!(first.new_balance, 5);

        let second = balances
            .apply_delta_with_ledger("evt-1", "viewer-1", 5, "chat_reward")
            .await
            .unwrap();
        assert!(!second.applied);
        assert_eq!(second.new_balance, 5);

        assert_eq!(balances.get("viewer-1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_zero() {
        let storage = Storage::open_in_memory().await.unwrap();
        let balances = BalanceStore::new(&storage);

        assert_eq!(balances.get("nobody").await.unwrap(), 0);
    }
}
