pub mod balance_store;
pub mod job_store;
pub mod ledger_store;
pub mod lottery_store;

pub use balance_store::{AwardOutcome, BalanceStore};
pub use job_store::JobStore;
pub use ledger_store::LedgerStore;
pub use lottery_store::LotteryStore;

use crate::error::{CoreError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // Balances table. The CHECK is the last line of defense against
        // overspend; purchases must reject before ever tripping it.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_balances (
                user_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Award job queue
        conn.execute(
            "CREATE TABLE IF NOT EXISTS award_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                stream_session_id TEXT,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                locked_at INTEGER,
                processed_at INTEGER,
                last_error TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_award_jobs_status
             ON award_jobs (status, created_at)",
            [],
        )?;

        // Append-only ledger; UNIQUE(event_id) is the exactly-once backstop
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                delta INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ledger_user
             ON ledger_entries (user_id, created_at)",
            [],
        )?;

        // Lotteries table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS lotteries (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                unit_cost INTEGER NOT NULL CHECK (unit_cost > 0),
                per_user_cap INTEGER NOT NULL,
                closes_at INTEGER,
                drawn INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Ticket entries table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ticket_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lottery_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                ticket_count INTEGER NOT NULL CHECK (ticket_count > 0),
                created_at INTEGER NOT NULL,
                UNIQUE (lottery_id, user_id),
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id)
            )",
            [],
        )?;

        // Draw records table, immutable once written
        conn.execute(
            "CREATE TABLE IF NOT EXISTS draw_records (
                lottery_id TEXT PRIMARY KEY,
                seed TEXT NOT NULL,
                policy TEXT NOT NULL,
                drawn_at INTEGER NOT NULL,
                winner_entry_ids TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id)
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
