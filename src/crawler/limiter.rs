//! Request throttling and concurrency bounding
//!
//! [`RateLimiter`] bounds how often requests go out; [`ConcurrencyGate`]
//! bounds how many fetches run at once. Both are plain values handed to the
//! fetcher, so independent crawls never share limits by accident.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::utils::error::{CrawlError, FetchError};

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by every fetch of one crawl
///
/// Capacity equals the configured requests-per-second (at least one token);
/// one token is replenished every `1 / rate` seconds.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DirectLimiter>,
    requests_per_second: f64,
}

impl RateLimiter {
    /// Create a limiter for `requests_per_second`
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Config` when the rate is not a positive finite
    /// number or its replenish period does not fit in a `Duration`
    pub fn new(requests_per_second: f64) -> Result<Self, CrawlError> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(CrawlError::Config(format!(
                "requests_per_second must be positive (got {requests_per_second})"
            )));
        }

        let period = replenish_period(requests_per_second).ok_or_else(|| {
            CrawlError::Config(format!(
                "requests_per_second {requests_per_second} is too low"
            ))
        })?;
        let burst = NonZeroU32::new(requests_per_second.ceil().min(u32::MAX as f64) as u32)
            .unwrap_or(NonZeroU32::MIN);

        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                CrawlError::Config(format!(
                    "requests_per_second {requests_per_second} is too high"
                ))
            })?
            .allow_burst(burst);

        Ok(Self {
            inner: Arc::new(governor::RateLimiter::direct(quota)),
            requests_per_second,
        })
    }

    /// Suspend until a token is available, then consume it
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Consume a token without waiting; false when the bucket is empty
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }
}

/// Time to replenish one token at `requests_per_second`
///
/// `None` when the period does not fit in governor's nanosecond clock.
pub fn replenish_period(requests_per_second: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / requests_per_second)
        .ok()
        .filter(|period| period.as_nanos() <= u128::from(u64::MAX))
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

/// Counting semaphore bounding simultaneously active fetches
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Slot held for the duration of one fetch attempt; released on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate admitting `capacity` concurrent fetches
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Config` for zero and `CrawlError::Gate` when the
    /// capacity exceeds what the semaphore can represent
    pub fn new(capacity: usize) -> Result<Self, CrawlError> {
        if capacity == 0 {
            return Err(CrawlError::Config(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(CrawlError::Gate(format!(
                "capacity {capacity} exceeds the maximum of {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Suspend until a slot is free and take it
    ///
    /// # Errors
    ///
    /// Returns `FetchError::GateClosed` if the underlying semaphore was closed
    pub async fn acquire(&self) -> Result<GatePermit, FetchError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_rate_limiter_rejects_non_positive() {
        assert!(RateLimiter::new(0.0).is_err());
        assert!(RateLimiter::new(-1.0).is_err());
        assert!(RateLimiter::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_rate_limiter_rejects_unrepresentable_period() {
        for rate in [1e-300, f64::MIN_POSITIVE, 1e-12] {
            assert!(
                matches!(RateLimiter::new(rate), Err(CrawlError::Config(_))),
                "rate {rate} accepted"
            );
        }
        assert!(replenish_period(1e-300).is_none());
        assert_eq!(replenish_period(0.5), Some(Duration::from_secs(2)));
        assert!(RateLimiter::new(0.001).is_ok());
    }

    #[test]
    fn test_burst_bounded_by_capacity() {
        let limiter = RateLimiter::new(3.0).unwrap();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_fractional_rate_has_one_token() {
        let limiter = RateLimiter::new(0.5).unwrap();
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(20.0).unwrap();
        for _ in 0..20 {
            assert!(limiter.try_acquire());
        }

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_gate_rejects_zero() {
        assert!(matches!(ConcurrencyGate::new(0), Err(CrawlError::Config(_))));
    }

    #[tokio::test]
    async fn test_gate_bounds_permits() {
        let gate = ConcurrencyGate::new(2).unwrap();
        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        let waiting = tokio::time::timeout(Duration::from_millis(20), gate.acquire()).await;
        assert!(waiting.is_err(), "third acquire should block");

        drop(first);
        assert_eq!(gate.available(), 1);
        assert!(gate.acquire().await.is_ok());
    }
}
