use crate::types::ChatEvent;
use serde::{Deserialize, Serialize};

/// Reason codes recorded on ledger rows.
pub const REASON_CHAT: &str = "chat_reward";
pub const REASON_CHEER: &str = "cheer_reward";
pub const REASON_FILTERED: &str = "filtered";
pub const REASON_PURCHASE: &str = "ticket_purchase";
pub const REASON_GRANT: &str = "operator_grant";

/// Scoring rules for turning a chat message into a coin delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub base_reward: i64,
    /// Messages at least this long earn the length bonus.
    pub length_bonus_threshold: usize,
    pub length_bonus: i64,
    /// Per-emote bonus, capped at max_emote_bonus.
    pub emote_bonus: i64,
    pub max_emote_bonus: i64,
    pub subscriber_multiplier: i64,
    /// Buffered messages from the same session needed for the streak bonus.
    pub streak_threshold: usize,
    pub streak_bonus: i64,
    /// How many recent buffered messages to consult per user.
    pub history_window: usize,
    /// Coins per cheered unit.
    pub cheer_rate: i64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_reward: 1,
            length_bonus_threshold: 40,
            length_bonus: 1,
            emote_bonus: 1,
            max_emote_bonus: 3,
            subscriber_multiplier: 2,
            streak_threshold: 3,
            streak_bonus: 2,
            history_window: 20,
            cheer_rate: 1,
        }
    }
}

impl RewardConfig {
    /// Delta for a chat message. `session_streak` is how many of the
    /// sender's recent buffered messages belong to the same stream session.
    pub fn chat_delta(
        &self,
        content: &str,
        emote_count: u32,
        is_subscriber: bool,
        session_streak: usize,
    ) -> i64 {
        let mut delta = self.base_reward;

        if content.chars().count() >= self.length_bonus_threshold {
            delta += self.length_bonus;
        }

        delta += (i64::from(emote_count) * self.emote_bonus).min(self.max_emote_bonus);

        if session_streak >= self.streak_threshold {
            delta += self.streak_bonus;
        }

        if is_subscriber {
            delta *= self.subscriber_multiplier;
        }

        delta
    }

    pub fn cheer_delta(&self, amount: u32) -> i64 {
        i64::from(amount) * self.cheer_rate
    }
}

/// Bot/spam decision over a message and the sender's recent history.
pub trait SpamFilter: Send + Sync {
    fn is_spam(&self, content: &str, recent: &[ChatEvent]) -> bool;
}

/// Heuristic filter: repeated identical messages, link flooding, and
/// single-character flooding are treated as bot traffic.
pub struct HeuristicSpamFilter {
    pub max_identical_repeats: usize,
    pub max_link_ratio_len: usize,
    pub flood_char_ratio: f64,
}

impl Default for HeuristicSpamFilter {
    fn default() -> Self {
        Self {
            max_identical_repeats: 2,
            max_link_ratio_len: 24,
            flood_char_ratio: 0.8,
        }
    }
}

impl SpamFilter for HeuristicSpamFilter {
    fn is_spam(&self, content: &str, recent: &[ChatEvent]) -> bool {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return true;
        }

        // Same message repeated across the sender's recent history
        let repeats = recent.iter().filter(|e| e.content == content).count();
        if repeats >= self.max_identical_repeats {
            return true;
        }

        // Bare link spam: short messages that are mostly a URL
        if (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
            && trimmed.len() <= self.max_link_ratio_len
        {
            return true;
        }

        // Single character flooding ("aaaaaaaaaa")
        let chars: Vec<char> = trimmed.chars().collect();
        if chars.len() >= 8 {
            let mut counts = std::collections::HashMap::new();
            for c in &chars {
                *counts.entry(*c).or_insert(0usize) += 1;
            }
            let max_count = counts.values().copied().max().unwrap_or(0);
            if (max_count as f64) / (chars.len() as f64) >= self.flood_char_ratio {
                return true;
            }
        }

        false
    }
}
