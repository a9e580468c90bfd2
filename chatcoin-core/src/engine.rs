use crate::breaker::{BreakerConfig, CircuitBreaker, Clock, SystemClock};
use crate::buffer::EventBuffer;
use crate::error::{CoreError, Result};
use crate::evaluators::{
    AchievementEvaluator, NoopAchievementEvaluator, NoopReferralTierEvaluator,
    ReferralTierEvaluator,
};
use crate::rewards::{HeuristicSpamFilter, RewardConfig, SpamFilter, REASON_GRANT, REASON_PURCHASE};
use crate::storage::lottery_store::row_to_lottery;
use crate::storage::{BalanceStore, JobStore, LedgerStore, LotteryStore, Storage};
use crate::types::{
    AwardJob, AwardPayload, BalanceReading, ChatEvent, LedgerEntry, Lottery, Purchase,
    QueueCounts, TicketEntry,
};
use crate::worker::RewardWorker;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

const MAX_CONTENT_CHARS: usize = 2000;

/// Runtime knobs for the engine and its workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub buffer_capacity: usize,
    pub claim_batch_size: usize,
    pub max_attempts: u32,
    pub stale_lock_secs: i64,
    pub poll_interval_ms: u64,
    pub idle_backoff_ms: u64,
    /// Backpressure valve: how long a purchase may wait for the balance
    /// lock before failing with a retryable error.
    pub purchase_lock_timeout_ms: u64,
    /// How long a cached balance may serve degraded reads.
    pub degraded_cache_ttl_ms: u64,
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 512,
            claim_batch_size: 16,
            max_attempts: 5,
            stale_lock_secs: 60,
            poll_interval_ms: 250,
            idle_backoff_ms: 2000,
            purchase_lock_timeout_ms: 20_000,
            degraded_cache_ttl_ms: 5_000,
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(CoreError::validation("buffer capacity must be positive"));
        }
        if self.claim_batch_size == 0 {
            return Err(CoreError::validation("claim batch size must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::validation("max attempts must be positive"));
        }
        if self.purchase_lock_timeout_ms == 0 {
            return Err(CoreError::validation("purchase lock timeout must be positive"));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(CoreError::validation(
                "breaker failure threshold must be positive",
            ));
        }
        Ok(())
    }
}

struct CachedBalance {
    balance: i64,
    cached_at: Instant,
}

/// The economy engine owns all balance writes. Everything else in the
/// system observes balances through it.
pub struct EconomyEngine {
    storage: Arc<Storage>,
    buffer: Arc<EventBuffer>,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn Clock>,
    filter: Arc<dyn SpamFilter>,
    referral: Arc<dyn ReferralTierEvaluator>,
    achievements: Arc<dyn AchievementEvaluator>,
    rewards: RewardConfig,
    config: EngineConfig,
    balance_cache: RwLock<HashMap<String, CachedBalance>>,
}

impl EconomyEngine {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("chatcoin.db");
        let storage = Arc::new(Storage::new(&db_path).await?);
        Self::from_parts(storage, RewardConfig::default(), EngineConfig::default())
    }

    pub async fn open_in_memory() -> Result<Self> {
        let storage = Arc::new(Storage::open_in_memory().await?);
        Self::from_parts(storage, RewardConfig::default(), EngineConfig::default())
    }

    pub fn from_parts(
        storage: Arc<Storage>,
        rewards: RewardConfig,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let breaker = Arc::new(CircuitBreaker::with_clock(
            config.breaker.clone(),
            clock.clone(),
        ));

        Ok(Self {
            buffer: Arc::new(EventBuffer::new(config.buffer_capacity)),
            breaker,
            clock,
            filter: Arc::new(HeuristicSpamFilter::default()),
            referral: Arc::new(NoopReferralTierEvaluator),
            achievements: Arc::new(NoopAchievementEvaluator),
            storage,
            rewards,
            config,
            balance_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn set_spam_filter(&mut self, filter: Arc<dyn SpamFilter>) {
        self.filter = filter;
    }

    pub fn set_referral_evaluator(&mut self, evaluator: Arc<dyn ReferralTierEvaluator>) {
        self.referral = evaluator;
    }

    pub fn set_achievement_evaluator(&mut self, evaluator: Arc<dyn AchievementEvaluator>) {
        self.achievements = evaluator;
    }

    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Accept a chat event from ingestion. Repeated delivery of the same
    /// event id is tolerated without double effect.
    pub async fn submit_chat_event(&self, event: ChatEvent) -> Result<AwardJob> {
        if event.event_id.trim().is_empty() {
            return Err(CoreError::validation("event id cannot be empty"));
        }
        if event.user_id.trim().is_empty() {
            return Err(CoreError::validation("user id cannot be empty"));
        }
        if event.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(CoreError::validation("message content too long"));
        }

        // Fast path for UI reads; dedup so redelivery does not double the
        // sender's history.
        if !self.buffer.contains_event(&event.event_id) {
            self.buffer.push(event.clone());
        }

        let payload = AwardPayload::ChatMessage {
            content: event.content.clone(),
            emote_count: event.emote_count,
            is_subscriber: event.is_subscriber,
            badges: event.badges.clone(),
        };
        JobStore::new(&self.storage)
            .enqueue(
                &event.event_id,
                &event.user_id,
                event.stream_session_id.as_deref(),
                &payload,
            )
            .await
    }

    /// Accept a cheer from ingestion, same idempotency contract as chat.
    pub async fn submit_cheer_event(
        &self,
        event_id: &str,
        user_id: &str,
        stream_session_id: Option<&str>,
        amount: u32,
    ) -> Result<AwardJob> {
        if event_id.trim().is_empty() {
            return Err(CoreError::validation("event id cannot be empty"));
        }
        if user_id.trim().is_empty() {
            return Err(CoreError::validation("user id cannot be empty"));
        }
        if amount == 0 {
            return Err(CoreError::validation("cheer amount must be positive"));
        }

        JobStore::new(&self.storage)
            .enqueue(
                event_id,
                user_id,
                stream_session_id,
                &AwardPayload::Cheer { amount },
            )
            .await
    }

    /// Balance read through the circuit breaker. While the breaker is
    /// open this serves the last cached value (or zero), clearly flagged
    /// degraded, instead of erroring.
    pub async fn get_balance(&self, user_id: &str) -> Result<BalanceReading> {
        if !self.breaker.try_acquire() {
            return Ok(self.degraded_reading(user_id));
        }

        match BalanceStore::new(&self.storage).get(user_id).await {
            Ok(balance) => {
                self.breaker.record_success();
                self.balance_cache.write().insert(
                    user_id.to_string(),
                    CachedBalance {
                        balance,
                        cached_at: self.clock.now(),
                    },
                );
                Ok(BalanceReading {
                    balance,
                    degraded: false,
                })
            }
            Err(e) if e.is_transient() => {
                self.breaker.record_failure(&e);
                tracing::warn!("Balance read degraded for {}: {}", user_id, e);
                Ok(self.degraded_reading(user_id))
            }
            Err(e) => Err(e),
        }
    }

    fn degraded_reading(&self, user_id: &str) -> BalanceReading {
        let ttl = Duration::from_millis(self.config.degraded_cache_ttl_ms);
        let balance = self
            .balance_cache
            .read()
            .get(user_id)
            .filter(|cached| self.clock.now().duration_since(cached.cached_at) <= ttl)
            .map(|cached| cached.balance)
            .unwrap_or(0);
        BalanceReading {
            balance,
            degraded: true,
        }
    }

    /// Operator credit outside the chat pipeline; still ledgered.
    pub async fn grant(&self, user_id: &str, amount: i64) -> Result<i64> {
        if user_id.trim().is_empty() {
            return Err(CoreError::validation("user id cannot be empty"));
        }
        if amount <= 0 {
            return Err(CoreError::validation("grant amount must be positive"));
        }

        let event_id = format!("grant:{}", Uuid::new_v4());
        let outcome = BalanceStore::new(&self.storage)
            .apply_delta_with_ledger(&event_id, user_id, amount, REASON_GRANT)
            .await?;

        tracing::info!("Granted {} coins to {}", amount, user_id);
        Ok(outcome.new_balance)
    }

    /// Buy lottery tickets. All-or-nothing: on any rejection the
    /// transaction rolls back with zero side effects. The IMMEDIATE
    /// transaction serializes concurrent purchases so a second request
    /// re-reads the already-decremented balance instead of racing on a
    /// stale read.
    pub async fn purchase(
        &self,
        user_id: &str,
        lottery_id: &str,
        quantity: i64,
    ) -> Result<Purchase> {
        if user_id.trim().is_empty() {
            return Err(CoreError::validation("user id cannot be empty"));
        }
        if quantity <= 0 {
            return Err(CoreError::validation("quantity must be positive"));
        }

        let lock_timeout = Duration::from_millis(self.config.purchase_lock_timeout_ms);
        let mut conn = match tokio::time::timeout(lock_timeout, self.storage.get_connection()).await
        {
            Ok(conn) => conn,
            Err(_) => {
                return Err(CoreError::timeout(
                    "timed out waiting for the balance lock, retry later",
                ));
            }
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let lottery = tx
            .query_row(
                "SELECT id, title, unit_cost, per_user_cap, closes_at, drawn, created_at
                 FROM lotteries WHERE id = ?1",
                [lottery_id],
                row_to_lottery,
            )
            .optional()?
            .ok_or_else(|| CoreError::LotteryNotFound(lottery_id.to_string()))?;

        if !lottery.is_open(now) {
            let reason = if lottery.drawn {
                format!("lottery {} has already been drawn", lottery_id)
            } else {
                format!("lottery {} is past its entry cutoff", lottery_id)
            };
            return Err(CoreError::item_closed(reason));
        }

        let current_tickets: i64 = tx
            .query_row(
                "SELECT ticket_count FROM ticket_entries WHERE lottery_id = ?1 AND user_id = ?2",
                params![lottery_id, user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let requested = current_tickets + quantity;
        if requested > lottery.per_user_cap {
            return Err(CoreError::LimitExceeded {
                cap: lottery.per_user_cap,
                requested,
            });
        }

        let balance: i64 = tx
            .query_row(
                "SELECT balance FROM user_balances WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let cost = lottery.unit_cost * quantity;
        if balance < cost {
            return Err(CoreError::InsufficientBalance {
                need: cost,
                available: balance,
            });
        }

        let now_ts = now.timestamp();
        tx.execute(
            "UPDATE user_balances SET balance = balance - ?1, updated_at = ?2 WHERE user_id = ?3",
            params![cost, now_ts, user_id],
        )?;
        tx.execute(
            "INSERT INTO ticket_entries (lottery_id, user_id, ticket_count, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(lottery_id, user_id) DO UPDATE SET
                 ticket_count = ticket_count + excluded.ticket_count",
            params![lottery_id, user_id, quantity, now_ts],
        )?;
        tx.execute(
            "INSERT INTO ledger_entries (event_id, user_id, delta, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format!("purchase:{}", Uuid::new_v4()),
                user_id,
                -cost,
                REASON_PURCHASE,
                now_ts
            ],
        )?;

        let ticket_count: i64 = tx.query_row(
            "SELECT ticket_count FROM ticket_entries WHERE lottery_id = ?1 AND user_id = ?2",
            params![lottery_id, user_id],
            |row| row.get(0),
        )?;

        tx.commit()?;

        tracing::info!(
            "User {} bought {} tickets in lottery {} for {} coins",
            user_id,
            quantity,
            lottery_id,
            cost
        );

        Ok(Purchase {
            lottery_id: lottery_id.to_string(),
            user_id: user_id.to_string(),
            quantity,
            cost,
            new_balance: balance - cost,
            ticket_count,
        })
    }

    pub async fn create_lottery(
        &self,
        title: &str,
        unit_cost: i64,
        per_user_cap: i64,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<Lottery> {
        if title.trim().is_empty() {
            return Err(CoreError::validation("lottery title cannot be empty"));
        }
        if unit_cost <= 0 {
            return Err(CoreError::validation("unit cost must be positive"));
        }
        if per_user_cap <= 0 {
            return Err(CoreError::validation("per-user cap must be positive"));
        }

        LotteryStore::new(&self.storage)
            .create(title, unit_cost, per_user_cap, closes_at)
            .await
    }

    pub async fn lottery(&self, lottery_id: &str) -> Result<Lottery> {
        LotteryStore::new(&self.storage)
            .get(lottery_id)
            .await?
            .ok_or_else(|| CoreError::LotteryNotFound(lottery_id.to_string()))
    }

    pub async fn list_lotteries(&self) -> Result<Vec<Lottery>> {
        LotteryStore::new(&self.storage).list().await
    }

    pub async fn ticket_entries(&self, lottery_id: &str) -> Result<Vec<TicketEntry>> {
        LotteryStore::new(&self.storage).entries(lottery_id).await
    }

    pub async fn ledger(&self, user_id: &str) -> Result<Vec<LedgerEntry>> {
        LedgerStore::new(&self.storage).entries_for_user(user_id).await
    }

    pub async fn failed_jobs(&self) -> Result<Vec<AwardJob>> {
        JobStore::new(&self.storage).failed_jobs().await
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        JobStore::new(&self.storage).counts().await
    }

    pub fn recent_events(&self, limit: usize) -> Vec<ChatEvent> {
        self.buffer.recent(limit)
    }

    fn make_worker(&self) -> RewardWorker {
        RewardWorker::new(
            self.storage.clone(),
            self.buffer.clone(),
            self.breaker.clone(),
            self.filter.clone(),
            self.referral.clone(),
            self.achievements.clone(),
            self.rewards.clone(),
            self.config.clone(),
        )
    }

    /// Spawn a background reward worker tied to a shutdown channel.
    pub fn spawn_worker(&self, shutdown_rx: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let worker = self.make_worker();
        tokio::spawn(worker.run(shutdown_rx))
    }

    /// Drain the queue in the current task until no claimable jobs
    /// remain. Used by tests and one-shot operator runs.
    pub async fn process_pending(&self) -> Result<usize> {
        let worker = self.make_worker();
        let mut total = 0;
        loop {
            let claimed = worker.process_batch().await?;
            if claimed == 0 {
                break;
            }
            total += claimed;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::REASON_FILTERED;
    use crate::storage::LedgerStore;

    fn chat_event(event_id: &str, user_id: &str, content: &str) -> ChatEvent {
        ChatEvent {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            stream_session_id: Some("session-1".to_string()),
            content: content.to_string(),
            badges: Vec::new(),
            emote_count: 0,
            is_subscriber: false,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_event_awards_once() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();

        engine
            .submit_chat_event(chat_event("evt-1", "viewer-1", "hello chat"))
            .await
            .unwrap();
        engine
            .submit_chat_event(chat_event("evt-1", "viewer-1", "hello chat"))
            .await
            .unwrap();

        engine.process_pending().await.unwrap();

        let entries = engine.ledger("viewer-1").await.unwrap();
        assert_eq!(entries.len(), 1);

        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert!(!reading.degraded);
        assert_eq!(reading.balance, entries[0].delta);

        let counts = engine.queue_counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.pending, 0);
    }

    #[tokio::test]
    async fn test_ledger_conserves_balance() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();

        for i in 0..4 {
            engine
                .submit_chat_event(chat_event(
                    &format!("evt-{}", i),
                    "viewer-1",
                    &format!("message number {}", i),
                ))
                .await
                .unwrap();
        }
        engine.process_pending().await.unwrap();
        engine.grant("viewer-1", 100).await.unwrap();

        let lottery = engine
            .create_lottery("Weekly raffle", 20, 100, None)
            .await
            .unwrap();
        engine.purchase("viewer-1", &lottery.id, 2).await.unwrap();

        let sum = LedgerStore::new(&engine.storage())
            .sum_for_user("viewer-1")
            .await
            .unwrap();
        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert_eq!(sum, reading.balance);
    }

    #[tokio::test]
    async fn test_purchase_end_to_end() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();
        engine.grant("viewer-1", 100).await.unwrap();

        let lottery = engine
            .create_lottery("Weekly raffle", 20, 100, None)
            .await
            .unwrap();

        let purchase = engine.purchase("viewer-1", &lottery.id, 3).await.unwrap();
        assert_eq!(purchase.cost, 60);
        assert_eq!(purchase.new_balance, 40);
        assert_eq!(purchase.ticket_count, 3);

        let err = engine.purchase("viewer-1", &lottery.id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientBalance {
                need: 60,
                available: 40
            }
        ));

        // The rejected purchase left no side effects
        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert_eq!(reading.balance, 40);
        let entries = engine.ticket_entries(&lottery.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ticket_count, 3);
    }

    #[tokio::test]
    async fn test_purchase_enforces_per_user_cap() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();
        engine.grant("viewer-1", 1000).await.unwrap();

        let lottery = engine
            .create_lottery("Capped raffle", 10, 4, None)
            .await
            .unwrap();

        engine.purchase("viewer-1", &lottery.id, 3).await.unwrap();
        let err = engine.purchase("viewer-1", &lottery.id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::LimitExceeded {
                cap: 4,
                requested: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_purchase_rejects_closed_lottery() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();
        engine.grant("viewer-1", 100).await.unwrap();

        let closed = engine
            .create_lottery(
                "Yesterday's raffle",
                10,
                100,
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .unwrap();

        let err = engine.purchase("viewer-1", &closed.id, 1).await.unwrap_err();
        assert!(matches!(err, CoreError::ItemClosed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purchases_never_overspend() {
        let engine = Arc::new(EconomyEngine::open_in_memory().await.unwrap());
        engine.grant("viewer-1", 100).await.unwrap();

        let lottery = engine
            .create_lottery("Contended raffle", 30, 100, None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = engine.clone();
            let lottery_id = lottery.id.clone();
            handles.push(tokio::spawn(async move {
                engine.purchase("viewer-1", &lottery_id, 1).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // floor(100 / 30) purchases can succeed, never more
        assert_eq!(successes, 3);
        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert_eq!(reading.balance, 10);
        let entries = engine.ticket_entries(&lottery.id).await.unwrap();
        assert_eq!(entries[0].ticket_count, 3);
    }

    #[tokio::test]
    async fn test_open_breaker_serves_degraded_cached_balance() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();
        engine.grant("viewer-1", 50).await.unwrap();

        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert!(!reading.degraded);
        assert_eq!(reading.balance, 50);

        for _ in 0..engine.config.breaker.failure_threshold {
            engine
                .breaker()
                .record_failure(&CoreError::transient("store unreachable"));
        }

        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert!(reading.degraded);
        assert_eq!(reading.balance, 50);
    }

    #[tokio::test]
    async fn test_filtered_message_records_zero_delta() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();

        engine
            .submit_chat_event(chat_event("evt-1", "viewer-1", "aaaaaaaaaaaa"))
            .await
            .unwrap();
        engine.process_pending().await.unwrap();

        let entries = engine.ledger("viewer-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].delta, 0);
        assert_eq!(entries[0].reason, REASON_FILTERED);

        let reading = engine.get_balance("viewer-1").await.unwrap();
        assert_eq!(reading.balance, 0);

        let counts = engine.queue_counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 0);
    }

    #[tokio::test]
    async fn test_submit_validates_input() {
        let engine = EconomyEngine::open_in_memory().await.unwrap();

        let err = engine
            .submit_chat_event(chat_event("", "viewer-1", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = engine
            .submit_cheer_event("cheer-1", "viewer-1", None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
