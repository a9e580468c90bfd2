use crate::breaker::CircuitBreaker;
use crate::buffer::EventBuffer;
use crate::engine::EngineConfig;
use crate::error::Result;
use crate::evaluators::{AchievementEvaluator, ReferralTierEvaluator};
use crate::rewards::{RewardConfig, SpamFilter, REASON_CHAT, REASON_CHEER, REASON_FILTERED};
use crate::storage::{BalanceStore, JobStore, Storage};
use crate::types::{AwardJob, AwardPayload};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Background consumer of the award job queue. Multiple workers can run
/// against the same store; the atomic claim update in JobStore is their
/// only coordination.
pub struct RewardWorker {
    storage: Arc<Storage>,
    buffer: Arc<EventBuffer>,
    breaker: Arc<CircuitBreaker>,
    filter: Arc<dyn SpamFilter>,
    referral: Arc<dyn ReferralTierEvaluator>,
    achievements: Arc<dyn AchievementEvaluator>,
    rewards: RewardConfig,
    config: EngineConfig,
}

impl RewardWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<Storage>,
        buffer: Arc<EventBuffer>,
        breaker: Arc<CircuitBreaker>,
        filter: Arc<dyn SpamFilter>,
        referral: Arc<dyn ReferralTierEvaluator>,
        achievements: Arc<dyn AchievementEvaluator>,
        rewards: RewardConfig,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            buffer,
            breaker,
            filter,
            referral,
            achievements,
            rewards,
            config,
        }
    }

    /// Poll loop. Sleeps between polls and backs off with jitter while
    /// the queue is empty; never busy-spins.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!("Reward worker started");

        let mut delay = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Reward worker received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(delay) => {
                    match self.process_batch().await {
                        Ok(n) if n > 0 => {
                            delay = Duration::from_millis(self.config.poll_interval_ms);
                        }
                        Ok(_) => {
                            delay = self.idle_delay();
                        }
                        Err(e) => {
                            tracing::error!("Failed to process award batch: {}", e);
                            self.breaker.record_failure(&e);
                            delay = self.idle_delay();
                        }
                    }
                }
            }
        }

        tracing::info!("Reward worker shutdown complete");
    }

    // Jitter spreads empty-queue polling across workers so retries do
    // not storm in lockstep.
    fn idle_delay(&self) -> Duration {
        let jitter = rand::rng().random_range(0..=self.config.idle_backoff_ms / 4);
        Duration::from_millis(self.config.idle_backoff_ms + jitter)
    }

    /// Claim and process one batch. One job's failure never blocks the
    /// rest of the batch. Returns how many jobs were claimed.
    pub async fn process_batch(&self) -> Result<usize> {
        let jobs = JobStore::new(&self.storage)
            .claim_batch(
                self.config.claim_batch_size,
                chrono::Duration::seconds(self.config.stale_lock_secs),
            )
            .await?;

        let claimed = jobs.len();
        for job in jobs {
            if let Err(e) = self.process_job(&job).await {
                self.breaker.record_failure(&e);
                let result = JobStore::new(&self.storage)
                    .fail(job.id, &e.to_string(), self.config.max_attempts)
                    .await;
                if let Err(fail_err) = result {
                    tracing::error!(
                        "Failed to record failure for job {}: {}",
                        job.id,
                        fail_err
                    );
                }
            }
        }
        Ok(claimed)
    }

    async fn process_job(&self, job: &AwardJob) -> Result<()> {
        let (delta, reason) = self.score(job);

        let outcome = BalanceStore::new(&self.storage)
            .apply_delta_with_ledger(&job.event_id, &job.user_id, delta, reason)
            .await?;
        JobStore::new(&self.storage).complete(job.id).await?;
        self.breaker.record_success();

        if outcome.applied {
            tracing::debug!(
                "Awarded {} coins to {} for event {} ({})",
                delta,
                job.user_id,
                job.event_id,
                reason
            );

            if delta > 0 {
                // Cascades run detached; their failure must not roll back
                // the award.
                let referral = self.referral.clone();
                let achievements = self.achievements.clone();
                let user_id = job.user_id.clone();
                let new_balance = outcome.new_balance;
                tokio::spawn(async move {
                    let (referral_result, achievement_result) = futures::future::join(
                        referral.balance_changed(&user_id, new_balance),
                        achievements.evaluate(&user_id),
                    )
                    .await;
                    if let Err(e) = referral_result {
                        tracing::warn!("Referral tier evaluation failed for {}: {}", user_id, e);
                    }
                    if let Err(e) = achievement_result {
                        tracing::warn!("Achievement evaluation failed for {}: {}", user_id, e);
                    }
                });
            }
        }
        Ok(())
    }

    /// Score a job into a coin delta and a ledger reason. Filtered
    /// messages still produce a zero-delta ledger row for audit.
    fn score(&self, job: &AwardJob) -> (i64, &'static str) {
        match &job.payload {
            AwardPayload::ChatMessage {
                content,
                emote_count,
                is_subscriber,
                ..
            } => {
                let history = self
                    .buffer
                    .recent_for_user(&job.user_id, self.rewards.history_window);
                if self.filter.is_spam(content, &history) {
                    return (0, REASON_FILTERED);
                }

                let streak = match job.stream_session_id.as_deref() {
                    Some(session) => history
                        .iter()
                        .filter(|e| e.stream_session_id.as_deref() == Some(session))
                        .count(),
                    None => 0,
                };
                (
                    self.rewards
                        .chat_delta(content, *emote_count, *is_subscriber, streak),
                    REASON_CHAT,
                )
            }
            AwardPayload::Cheer { amount } => (self.rewards.cheer_delta(*amount), REASON_CHEER),
        }
    }
}
