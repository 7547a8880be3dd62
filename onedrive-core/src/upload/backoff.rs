use std::time::Duration;

use async_trait::async_trait;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MULTIPLIER: u32 = 2;
pub const DEFAULT_MAX_RETRIES: u8 = 5;

/// Retry policy for a single chunk: `base_delay * multiplier^(n - 1)` before
/// the n-th retry, and at most `max_retries` retries.
///
/// The first retry waits `base_delay` itself, one step earlier than a
/// `base * 2^n` schedule counted after the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_retries: u8,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, multiplier: u32, max_retries: u8) -> Self {
        Self {
            base_delay,
            multiplier,
            max_retries,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u16) -> Duration {
        let base_ms = self.base_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let exponent = u32::from(retry.saturating_sub(1));
        let factor = u64::from(self.multiplier).saturating_pow(exponent);
        Duration::from_millis(base_ms.saturating_mul(factor))
    }

    /// Retry counts are `u16` so that one past `u8::MAX` is still representable.
    pub fn allows(&self, retry: u16) -> bool {
        retry <= u16::from(self.max_retries)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MULTIPLIER, DEFAULT_MAX_RETRIES)
    }
}

/// Waits out a backoff delay. Swapped for a recording fake in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
