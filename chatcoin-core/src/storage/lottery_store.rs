use crate::error::{CoreError, Result};
use crate::storage::Storage;
use crate::types::{DrawRecord, Lottery, SnapshotEntry, TicketEntry, WinnerPolicy};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

pub struct LotteryStore<'a> {
    storage: &'a Storage,
}

impl<'a> LotteryStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn create(
        &self,
        title: &str,
        unit_cost: i64,
        per_user_cap: i64,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<Lottery> {
        let conn = self.storage.get_connection().await;

        let lottery = Lottery {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            unit_cost,
            per_user_cap,
            closes_at,
            drawn: false,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO lotteries (id, title, unit_cost, per_user_cap, closes_at, drawn, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                lottery.id,
                lottery.title,
                lottery.unit_cost,
                lottery.per_user_cap,
                lottery.closes_at.map(|t| t.timestamp()),
                lottery.created_at.timestamp(),
            ],
        )?;

        tracing::info!("Created lottery '{}' with ID: {}", title, lottery.id);
        Ok(lottery)
    }

    pub async fn get(&self, lottery_id: &str) -> Result<Option<Lottery>> {
        let conn = self.storage.get_connection().await;

        let lottery = conn
            .query_row(
                "SELECT id, title, unit_cost, per_user_cap, closes_at, drawn, created_at
                 FROM lotteries WHERE id = ?1",
                [lottery_id],
                row_to_lottery,
            )
            .optional()?;
        Ok(lottery)
    }

    pub async fn list(&self) -> Result<Vec<Lottery>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, title, unit_cost, per_user_cap, closes_at, drawn, created_at
             FROM lotteries ORDER BY created_at, id",
        )?;

        let lotteries = stmt
            .query_map([], row_to_lottery)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lotteries)
    }

    pub async fn entries(&self, lottery_id: &str) -> Result<Vec<TicketEntry>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, lottery_id, user_id, ticket_count, created_at
             FROM ticket_entries WHERE lottery_id = ?1 ORDER BY id",
        )?;

        let entries = stmt
            .query_map([lottery_id], |row| {
                Ok(TicketEntry {
                    id: row.get(0)?,
                    lottery_id: row.get(1)?,
                    user_id: row.get(2)?,
                    ticket_count: row.get(3)?,
                    created_at: DateTime::from_timestamp(row.get(4)?, 0).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Frozen view of the entry table for a draw, in stable id order. One
    /// statement, so later purchases cannot tear the snapshot.
    pub async fn snapshot_entries(&self, lottery_id: &str) -> Result<Vec<SnapshotEntry>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, ticket_count
             FROM ticket_entries WHERE lottery_id = ?1 ORDER BY id",
        )?;

        let entries = stmt
            .query_map([lottery_id], |row| {
                Ok(SnapshotEntry {
                    entry_id: row.get(0)?,
                    user_id: row.get(1)?,
                    ticket_count: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Persist a completed draw and mark the lottery drawn in one
    /// transaction. Refuses if a draw record already exists.
    pub async fn record_draw(&self, record: &DrawRecord) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let drawn: i64 = tx
            .query_row(
                "SELECT drawn FROM lotteries WHERE id = ?1",
                [record.lottery_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| CoreError::LotteryNotFound(record.lottery_id.clone()))?;

        if drawn != 0 {
            return Err(CoreError::item_closed(format!(
                "lottery {} already drawn",
                record.lottery_id
            )));
        }

        tx.execute(
            "INSERT INTO draw_records (lottery_id, seed, policy, drawn_at, winner_entry_ids, snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.lottery_id,
                record.seed,
                serde_json::to_string(&record.policy)?,
                record.drawn_at.timestamp(),
                serde_json::to_string(&record.winner_entry_ids)?,
                serde_json::to_string(&record.snapshot)?,
            ],
        )?;

        tx.execute(
            "UPDATE lotteries SET drawn = 1 WHERE id = ?1",
            [record.lottery_id.as_str()],
        )?;

        tx.commit()?;

        tracing::info!(
            "Recorded draw for lottery {} with {} winners",
            record.lottery_id,
            record.winner_entry_ids.len()
        );
        Ok(())
    }

    pub async fn get_draw(&self, lottery_id: &str) -> Result<Option<DrawRecord>> {
        let conn = self.storage.get_connection().await;

        let result = conn.query_row(
            "SELECT lottery_id, seed, policy, drawn_at, winner_entry_ids, snapshot
             FROM draw_records WHERE lottery_id = ?1",
            [lottery_id],
            |row| {
                let policy_str: String = row.get(2)?;
                let winners_str: String = row.get(4)?;
                let snapshot_str: String = row.get(5)?;

                let policy: WinnerPolicy = serde_json::from_str(&policy_str).map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        2,
                        "policy".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?;
                let winner_entry_ids: Vec<i64> =
                    serde_json::from_str(&winners_str).map_err(|_| {
                        rusqlite::Error::InvalidColumnType(
                            4,
                            "winner_entry_ids".to_string(),
                            rusqlite::types::Type::Text,
                        )
                    })?;
                let snapshot: Vec<SnapshotEntry> =
                    serde_json::from_str(&snapshot_str).map_err(|_| {
                        rusqlite::Error::InvalidColumnType(
                            5,
                            "snapshot".to_string(),
                            rusqlite::types::Type::Text,
                        )
                    })?;

                Ok(DrawRecord {
                    lottery_id: row.get(0)?,
                    seed: row.get(1)?,
                    policy,
                    drawn_at: DateTime::from_timestamp(row.get(3)?, 0).unwrap_or_else(Utc::now),
                    winner_entry_ids,
                    snapshot,
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn row_to_lottery(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<Lottery, rusqlite::Error> {
    Ok(Lottery {
        id: row.get(0)?,
        title: row.get(1)?,
        unit_cost: row.get(2)?,
        per_user_cap: row.get(3)?,
        closes_at: row
            .get::<_, Option<i64>>(4)?
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        drawn: row.get::<_, i64>(5)? != 0,
        created_at: DateTime::from_timestamp(row.get(6)?, 0).unwrap_or_else(Utc::now),
    })
}
