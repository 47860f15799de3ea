use std::time::Duration;

/// Fixed interval the sync loop waits after a failed poll.
pub const DEFAULT_SYNC_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    /// Policy that waits the same interval after every failure.
    pub fn fixed(delay: Duration) -> Self {
        let millis = delay.as_millis() as u64;
        Self::new(millis, millis)
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Delay before retry number `attempt` (zero-based), raised to the
    /// server's hint when larger and capped at the maximum.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        let hinted = retry_after_hint_ms.unwrap_or(0);
        let bounded = calculated.max(hinted).min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_SYNC_RETRY_DELAY)
    }
}
