//! Reconnection Policy
//!
//! Linear backoff for stream reconnection: attempt `n` waits
//! `base_delay × n`. Attempts are bounded; once the bound is reached the
//! policy stops handing out delays until it is reset.
//!
//! [`ReconnectTimer`] is the owned handle for one scheduled attempt. Dropping
//! it cancels the pending sleep.

use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};

/// Default delay unit between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default maximum number of consecutive reconnection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay unit; attempt `n` waits `base_delay × n`.
    pub base_delay: Duration,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }
}

/// Reconnection policy implementing bounded linear backoff.
///
/// # Example
///
/// ```rust
/// use price_stream_client::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(500), 2));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(500)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
/// assert_eq!(policy.next_delay(), None);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Count one more attempt and get its delay.
    ///
    /// Returns `None` if max attempts have been reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;
        Some(self.config.base_delay.saturating_mul(self.attempt_count))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

/// Owned handle for one scheduled reconnection.
///
/// The sleep is cancelled when the handle is dropped. A timer that already
/// fired still runs its callback, so the callback must check that its timer
/// is still the current one.
#[derive(Debug)]
pub struct ReconnectTimer {
    id: u64,
    attempt: u32,
    delay: Duration,
    _guard: DropGuard,
}

impl ReconnectTimer {
    /// Schedule `on_fire` to run after `delay` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn schedule<F>(id: u64, attempt: u32, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {
                    tracing::trace!(timer_id = id, "Reconnect timer cancelled");
                }
                () = tokio::time::sleep(delay) => on_fire(),
            }
        });

        Self {
            id,
            attempt,
            delay,
            _guard: token.drop_guard(),
        }
    }

    /// Identifier assigned when the timer was scheduled.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Attempt number this timer will start.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the timer was scheduled with.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn policy_linear_backoff() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(100), 0));

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let mut delays = Vec::new();

        while let Some(delay) = policy.next_delay() {
            delays.push(delay);
        }

        assert_eq!(delays.len(), 5);
        assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(policy.attempt_count(), 5);
        assert!(!policy.should_retry());
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(100), 3));

        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(1), 0));

        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let timer = ReconnectTimer::schedule(7, 1, Duration::from_secs(2), move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(timer.id(), 7);
        assert_eq!(timer.attempt(), 1);
        assert_eq!(timer.delay(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let timer = ReconnectTimer::schedule(1, 1, Duration::from_secs(1), move || {
            flag.store(true, Ordering::SeqCst);
        });
        drop(timer);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
