use crate::error::CoreError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Injected time source so tests can simulate elapsed time instead of
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BreakerConfig {
    /// Consecutive transient failures before the breaker opens.
    pub failure_threshold: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    backoff: Duration,
}

/// Fail-fast guard around store calls. Opens after repeated transient
/// failures, lets exactly one probe through after the backoff window,
/// and closes again on probe success.
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let backoff = config.base_backoff;
        Self {
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                backoff,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a store call may proceed. When the backoff window of an
    /// open breaker has elapsed, the first caller through becomes the
    /// single probe; everyone else keeps failing fast until it resolves.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| self.clock.now().duration_since(at))
                    .unwrap_or_default();
                if elapsed >= inner.backoff {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!("Circuit breaker half-open, probing store");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.backoff = self.config.base_backoff;
    }

    /// Only transient errors count toward opening; validation errors and
    /// client disconnects pass through untracked.
    pub fn record_failure(&self, error: &CoreError) {
        if !error.is_transient() {
            return;
        }

        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(self.clock.now());
                    inner.backoff = self.config.base_backoff;
                    tracing::warn!(
                        "Circuit breaker opened after {} consecutive transient failures",
                        inner.consecutive_failures
                    );
                }
            }
            BreakerState::HalfOpen => {
                // Probe failed: reopen with a doubled window
                inner.state = BreakerState::Open;
                inner.opened_at = Some(self.clock.now());
                inner.backoff = (inner.backoff * 2).min(self.config.max_backoff);
                tracing::warn!(
                    "Circuit breaker probe failed, reopening for {:?}",
                    inner.backoff
                );
            }
            BreakerState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> CoreError {
        CoreError::transient("connection lost")
    }

    fn breaker_with_clock() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock(
            BreakerConfig {
                failure_threshold: 3,
                base_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(30),
            },
            clock.clone(),
        );
        (breaker, clock)
    }

    #[test]
    fn test_opens_after_threshold() {
        let (breaker, _clock) = breaker_with_clock();

        for _ in 0..2 {
            breaker.record_failure(&transient());
            assert_eq!(breaker.state(), BreakerState::Closed);
        }
        breaker.record_failure(&transient());
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_non_transient_does_not_trip() {
        let (breaker, _clock) = breaker_with_clock();

        for _ in 0..10 {
            breaker.record_failure(&CoreError::validation("bad input"));
            breaker.record_failure(&CoreError::client_disconnect("gone"));
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_single_probe_after_backoff() {
        let (breaker, clock) = breaker_with_clock();

        for _ in 0..3 {
            breaker.record_failure(&transient());
        }
        assert!(!breaker.try_acquire());

        clock.advance(Duration::from_secs(1));

        // Exactly one caller gets the probe slot
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_failed_probe_doubles_backoff() {
        let (breaker, clock) = breaker_with_clock();

        for _ in 0..3 {
            breaker.record_failure(&transient());
        }

        clock.advance(Duration::from_secs(1));
        assert!(breaker.try_acquire());
        breaker.record_failure(&transient());
        assert_eq!(breaker.state(), BreakerState::Open);

        // One second is no longer enough after the doubled window
        clock.advance(Duration::from_secs(1));
        assert!(!breaker.try_acquire());

        clock.advance(Duration::from_secs(1));
        assert!(breaker.try_acquire());
    }
}
