//! Process-wide inbound accept rate limiting.
//!
//! The source protects one global counter with a spinlock and accepts at
//! most one new connection per `streaming_rate_t` seconds; everything past
//! that gets HTTP 503 "busy, try later" before any per-host work happens.
//! A `std::sync::Mutex` held only long enough to compare-and-set a single
//! timestamp is the direct equivalent: there is nothing to `.await` inside
//! the critical section, so a sync mutex is the right tool (the async
//! per-host locks live in [`crate::duplicate`] instead).

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Gate on "has enough time passed since the last accepted inbound
/// connection". Shared by every `Receiver::accept` call in the process.
pub struct InboundRateLimiter {
    last_accept: Mutex<Option<Instant>>,
}

impl InboundRateLimiter {
    /// A limiter that has never accepted anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_accept: Mutex::new(None),
        }
    }

    /// Decide whether an inbound connection arriving at `now` may proceed.
    /// `window` is `StreamConfig::streaming_rate_seconds`; `None` disables
    /// rate limiting entirely (every connection is accepted).
    ///
    /// On acceptance, records `now` as the new high-water mark. On
    /// rejection, returns how much longer the caller should wait before
    /// the next attempt might succeed.
    ///
    /// # Errors
    /// Returns the remaining wait as `Err(Duration)` if the window has not
    /// yet elapsed since the last accepted connection.
    pub fn try_accept(&self, now: Instant, window: Option<Duration>) -> Result<(), Duration> {
        let Some(window) = window else {
            return Ok(());
        };
        let mut guard = self.last_accept.lock().expect("rate limiter mutex poisoned");
        if let Some(last) = *guard {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < window {
                let retry_after = window - elapsed;
                tracing::warn!(retry_after_ms = retry_after.as_millis() as u64, "busy_try_later");
                return Err(retry_after);
            }
        }
        *guard = Some(now);
        Ok(())
    }
}

impl Default for InboundRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_window_always_accepts() {
        let limiter = InboundRateLimiter::new();
        let now = Instant::now();
        assert!(limiter.try_accept(now, None).is_ok());
        assert!(limiter.try_accept(now, None).is_ok());
    }

    #[test]
    fn s3_second_connection_within_window_is_rejected() {
        let limiter = InboundRateLimiter::new();
        let window = Duration::from_secs(30);
        let t0 = Instant::now();
        assert!(limiter.try_accept(t0, Some(window)).is_ok());

        let t1 = t0 + Duration::from_secs(5);
        let result = limiter.try_accept(t1, Some(window));
        assert!(result.is_err());
        let retry_after = result.unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(25));
    }

    #[test]
    fn accepts_again_once_window_elapses() {
        let limiter = InboundRateLimiter::new();
        let window = Duration::from_secs(30);
        let t0 = Instant::now();
        limiter.try_accept(t0, Some(window)).unwrap();

        let t1 = t0 + Duration::from_secs(31);
        assert!(limiter.try_accept(t1, Some(window)).is_ok());
    }
}
