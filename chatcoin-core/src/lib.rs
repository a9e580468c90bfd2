//! chatcoin core - engagement economy engine for livestream chat
//!
//! This library turns chat activity into coin balances through a durable
//! award queue, guards balance reads with a circuit breaker, and sells
//! lottery tickets against those balances without ever allowing overspend.

pub mod breaker;
pub mod buffer;
pub mod engine;
pub mod error;
pub mod evaluators;
pub mod rewards;
pub mod storage;
pub mod types;
pub mod worker;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, Clock, ManualClock, SystemClock};
pub use buffer::EventBuffer;
pub use engine::{EconomyEngine, EngineConfig};
pub use error::{CoreError, Result};
pub use evaluators::{
    AchievementEvaluator, NoopAchievementEvaluator, NoopReferralTierEvaluator,
    ReferralTierEvaluator,
};
pub use rewards::{HeuristicSpamFilter, RewardConfig, SpamFilter};
pub use storage::Storage;
pub use types::{
    AwardJob, AwardPayload, BalanceReading, ChatEvent, DrawRecord, JobStatus, LedgerEntry,
    Lottery, Purchase, QueueCounts, SnapshotEntry, TicketEntry, WinnerPolicy,
};
pub use worker::RewardWorker;
