use crate::error::Result;
use crate::storage::Storage;
use crate::types::{AwardJob, AwardPayload, JobStatus, QueueCounts};
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

const JOB_COLUMNS: &str = "id, event_id, user_id, stream_session_id, payload, status, \
                           attempts, locked_at, processed_at, last_error, created_at";

pub struct JobStore<'a> {
    storage: &'a Storage,
}

impl<'a> JobStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Insert a job for the event unless one already exists; either way the
    /// job row for that event id is returned. Duplicate delivery is a no-op.
    pub async fn enqueue(
        &self,
        event_id: &str,
        user_id: &str,
        stream_session_id: Option<&str>,
        payload: &AwardPayload,
    ) -> Result<AwardJob> {
        let conn = self.storage.get_connection().await;

        let payload_json = serde_json::to_string(payload)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO award_jobs
             (event_id, user_id, stream_session_id, payload, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                event_id,
                user_id,
                stream_session_id,
                payload_json,
                Utc::now().timestamp(),
            ],
        )?;

        if inserted == 0 {
            tracing::debug!("Duplicate event {} ignored at enqueue", event_id);
        }

        let job = conn.query_row(
            &format!("SELECT {} FROM award_jobs WHERE event_id = ?1", JOB_COLUMNS),
            [event_id],
            row_to_job,
        )?;
        Ok(job)
    }

    /// Atomically claim up to `limit` jobs that are pending, or stuck in
    /// processing past the stale-lock threshold (a crashed worker). The
    /// single UPDATE is the only mutual exclusion between workers.
    pub async fn claim_batch(
        &self,
        limit: usize,
        stale_lock_threshold: Duration,
    ) -> Result<Vec<AwardJob>> {
        let conn = self.storage.get_connection().await;

        let now = Utc::now().timestamp();
        let stale_cutoff = now - stale_lock_threshold.num_seconds();

        let mut stmt = conn.prepare(&format!(
            "UPDATE award_jobs
             SET status = 'processing', locked_at = ?1, attempts = attempts + 1
             WHERE id IN (
                 SELECT id FROM award_jobs
                 WHERE status = 'pending'
                    OR (status = 'processing' AND locked_at <= ?2)
                 ORDER BY created_at, id
                 LIMIT ?3
             )
             RETURNING {}",
            JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(params![now, stale_cutoff, limit as i64], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if !jobs.is_empty() {
            tracing::debug!("Claimed {} award jobs", jobs.len());
        }
        Ok(jobs)
    }

    pub async fn complete(&self, job_id: i64) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "UPDATE award_jobs
             SET status = 'completed', processed_at = ?1, last_error = NULL
             WHERE id = ?2",
            params![Utc::now().timestamp(), job_id],
        )?;
        Ok(())
    }

    /// Record a failure: back to pending while attempts remain, frozen at
    /// failed once they are exhausted. Returns the resulting status.
    pub async fn fail(&self, job_id: i64, error: &str, max_attempts: u32) -> Result<JobStatus> {
        let conn = self.storage.get_connection().await;

        let status: String = conn.query_row(
            "UPDATE award_jobs
             SET status = CASE WHEN attempts >= ?2 THEN 'failed' ELSE 'pending' END,
                 locked_at = NULL,
                 processed_at = CASE WHEN attempts >= ?2 THEN ?3 ELSE NULL END,
                 last_error = ?4
             WHERE id = ?1
             RETURNING status",
            params![job_id, max_attempts, Utc::now().timestamp(), error],
            |row| row.get(0),
        )?;

        let status = JobStatus::parse(&status).unwrap_or(JobStatus::Failed);
        if status == JobStatus::Failed {
            tracing::warn!("Award job {} frozen after exhausting retries: {}", job_id, error);
        } else {
            tracing::debug!("Award job {} returned to queue: {}", job_id, error);
        }
        Ok(status)
    }

    pub async fn get_by_event_id(&self, event_id: &str) -> Result<Option<AwardJob>> {
        let conn = self.storage.get_connection().await;

        let result = conn.query_row(
            &format!("SELECT {} FROM award_jobs WHERE event_id = ?1", JOB_COLUMNS),
            [event_id],
            row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Jobs frozen at failed, for operator inspection.
    pub async fn failed_jobs(&self) -> Result<Vec<AwardJob>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM award_jobs WHERE status = 'failed' ORDER BY created_at, id",
            JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let conn = self.storage.get_connection().await;

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM award_jobs GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => counts.pending = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> std::result::Result<AwardJob, rusqlite::Error> {
    let payload_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;

    let payload: AwardPayload = serde_json::from_str(&payload_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(4, "payload".to_string(), rusqlite::types::Type::Text)
    })?;

    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(5, "status".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(AwardJob {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_id: row.get(2)?,
        stream_session_id: row.get(3)?,
        payload,
        status,
        attempts: row.get(6)?,
        locked_at: row
            .get::<_, Option<i64>>(7)?
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        processed_at: row
            .get::<_, Option<i64>>(8)?
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        last_error: row.get(9)?,
        created_at: DateTime::from_timestamp(row.get(10)?, 0).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_payload(content: &str) -> AwardPayload {
        AwardPayload::ChatMessage {
            content: content.to_string(),
            emote_count: 0,
            is_subscriber: false,
            badges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let storage = Storage::open_in_memory().await.unwrap();
        let jobs = JobStore::new(&storage);

        let first = jobs
            .enqueue("evt-1", "viewer-1", None, &chat_payload("hello"))
            .await
            .unwrap();
        let second = jobs
            .enqueue("evt-1", "viewer-1", None, &chat_payload("hello"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, JobStatus::Pending);

        let counts = jobs.counts().await.unwrap();
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn test_claim_marks_processing_and_increments_attempts() {
        let storage = Storage::open_in_memory().await.unwrap();
        let jobs = JobStore::new(&storage);

        jobs.enqueue("evt-1", "viewer-1", None, &chat_payload("hello"))
            .await
            .unwrap();
        jobs.enqueue("evt-2", "viewer-2", None, &chat_payload("hi"))
            .await
            .unwrap();

        let claimed = jobs.claim_batch(10, Duration::seconds(60)).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(claimed
            .iter()
            .all(|j| j.status == JobStatus::Processing && j.attempts == 1));

        // Fresh locks are not reclaimable
        let again = jobs.claim_batch(10, Duration::seconds(60)).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let storage = Storage::open_in_memory().await.unwrap();
        let jobs = JobStore::new(&storage);

        jobs.enqueue("evt-1", "viewer-1", None, &chat_payload("hello"))
            .await
            .unwrap();

        let claimed = jobs.claim_batch(10, Duration::seconds(60)).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // A zero threshold treats the lock as immediately stale, as if the
        // claiming worker had crashed long ago.
        let reclaimed = jobs.claim_batch(10, Duration::seconds(0)).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, claimed[0].id);
        assert_eq!(reclaimed[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_fail_retries_then_freezes() {
        let storage = Storage::open_in_memory().await.unwrap();
        let jobs = JobStore::new(&storage);

        jobs.enqueue("evt-1", "viewer-1", None, &chat_payload("hello"))
            .await
            .unwrap();

        let max_attempts = 2;

        let claimed = jobs.claim_batch(1, Duration::seconds(0)).await.unwrap();
        let status = jobs
            .fail(claimed[0].id, "boom", max_attempts)
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Pending);

        let claimed = jobs.claim_batch(1, Duration::seconds(0)).await.unwrap();
        assert_eq!(claimed[0].attempts, 2);
        let status = jobs
            .fail(claimed[0].id, "boom again", max_attempts)
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Failed);

        // Frozen jobs are not claimable and show up for operators
        let claimed = jobs.claim_batch(1, Duration::seconds(0)).await.unwrap();
        assert!(claimed.is_empty());

        let failed = jobs.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("boom again"));
    }
}
