use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated chat event handed over by the ingestion layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub event_id: String,
    pub user_id: String,
    pub stream_session_id: Option<String>,
    pub content: String,
    pub badges: Vec<String>,
    pub emote_count: u32,
    pub is_subscriber: bool,
    pub received_at: DateTime<Utc>,
}

/// Closed set of award sources. Validated at enqueue time, stored as a
/// tagged JSON blob on the job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AwardPayload {
    ChatMessage {
        content: String,
        emote_count: u32,
        is_subscriber: bool,
        badges: Vec<String>,
    },
    Cheer {
        amount: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// One durable award job per distinct event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardJob {
    pub id: i64,
    pub event_id: String,
    pub user_id: String,
    pub stream_session_id: Option<String>,
    pub payload: AwardPayload,
    pub status: JobStatus,
    pub attempts: u32,
    pub locked_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only balance history row. The unique event id is the final
/// idempotency backstop for every balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub event_id: String,
    pub user_id: String,
    pub delta: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lottery {
    pub id: String,
    pub title: String,
    pub unit_cost: i64,
    pub per_user_cap: i64,
    pub closes_at: Option<DateTime<Utc>>,
    pub drawn: bool,
    pub created_at: DateTime<Utc>,
}

impl Lottery {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.drawn && self.closes_at.map_or(true, |closes| now < closes)
    }
}

/// One row per (lottery, user); repeat purchases increment ticket_count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEntry {
    pub id: i64,
    pub lottery_id: String,
    pub user_id: String,
    pub ticket_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Balance read result. `degraded` marks a circuit-open fallback that
/// must not be cached as authoritative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BalanceReading {
    pub balance: i64,
    pub degraded: bool,
}

/// Successful ticket purchase outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub lottery_id: String,
    pub user_id: String,
    pub quantity: i64,
    pub cost: i64,
    pub new_balance: i64,
    pub ticket_count: i64,
}

/// Winner selection policy applied between ordinals of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerPolicy {
    /// A winner's entry is removed from the index space for later ordinals.
    ExcludeAfterWin,
    /// Entries stay in the index space and may win more than once.
    AllowRepeat,
}

/// Frozen view of one ticket entry at draw time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub entry_id: i64,
    pub user_id: String,
    pub ticket_count: i64,
}

/// Immutable record of a completed draw. Anyone holding the seed and the
/// snapshot can recompute the identical winner list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRecord {
    pub lottery_id: String,
    pub seed: String,
    pub policy: WinnerPolicy,
    pub drawn_at: DateTime<Utc>,
    pub winner_entry_ids: Vec<i64>,
    pub snapshot: Vec<SnapshotEntry>,
}

/// Job queue totals for operator visibility.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}
