//! Retry policy for page fetches
//!
//! Backoff is expressed as an explicit per-fetch state machine
//! ([`RetryState`]) so the policy can be exercised without any I/O.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Upper bound of random jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a retry configuration with custom delays and no jitter
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
            jitter_ms: 0,
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let delay_ms = if retry == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((retry - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }
}

/// Outcome of feeding a failed attempt into the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// Stop and report the last failure
    GiveUp,
}

/// Retry state of a single fetch: attempts made and the pending delay
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    attempts: u32,
    next_delay: Duration,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
            next_delay: Duration::ZERO,
        }
    }

    /// Record the start of an attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay chosen by the most recent `Retry` decision
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Decide what happens after the current attempt failed
    pub fn on_failure(&mut self, retryable: bool) -> RetryDecision {
        if !retryable || self.attempts > self.config.max_retries {
            self.next_delay = Duration::ZERO;
            return RetryDecision::GiveUp;
        }

        let mut delay = self.config.calculate_delay(self.attempts);
        if self.config.jitter_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=self.config.jitter_ms);
            delay += Duration::from_millis(jitter);
        }
        self.next_delay = delay;

        debug!(
            attempt = self.attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );

        RetryDecision::Retry {
            attempt: self.attempts + 1,
            delay,
        }
    }
}
