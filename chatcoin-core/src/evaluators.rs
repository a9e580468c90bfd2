use crate::error::Result;
use async_trait::async_trait;

/// Downstream consumer notified when an award lands. Failures here are
/// logged and never roll back the award.
#[async_trait]
pub trait ReferralTierEvaluator: Send + Sync {
    async fn balance_changed(&self, user_id: &str, new_balance: i64) -> Result<()>;
}

#[async_trait]
pub trait AchievementEvaluator: Send + Sync {
    async fn evaluate(&self, user_id: &str) -> Result<()>;
}

pub struct NoopReferralTierEvaluator;

#[async_trait]
impl ReferralTierEvaluator for NoopReferralTierEvaluator {
    async fn balance_changed(&self, _user_id: &str, _new_balance: i64) -> Result<()> {
        Ok(())
    }
}

pub struct NoopAchievementEvaluator;

#[async_trait]
impl AchievementEvaluator for NoopAchievementEvaluator {
    async fn evaluate(&self, _user_id: &str) -> Result<()> {
        Ok(())
    }
}
