use std::time::Duration;

use crate::config::SyncConfig;

const MAX_SHIFT: u32 = 16;

/// Reconnect policy for the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Consecutive reconnect attempts allowed; unlimited when `None`.
    pub max_retries: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            retry_base: Duration::from_millis(config.retry_base_ms),
            retry_cap: Duration::from_millis(config.retry_cap_ms),
            max_retries: config.max_retries,
        }
    }
}

/// Capped exponential backoff.
///
/// Delays run `base, 2*base, 4*base, ...` up to `cap`. The attempt counter
/// resets once a connection is acknowledged.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(options: SyncOptions) -> Self {
        Self {
            base: options.retry_base,
            cap: options.retry_cap,
            max_attempts: options.max_retries,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the limit is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| self.attempt >= max) {
            return None;
        }
        let factor = 1_u32 << self.attempt.min(MAX_SHIFT);
        self.attempt = self.attempt.saturating_add(1);
        Some(self.base.saturating_mul(factor).min(self.cap))
    }

    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}
