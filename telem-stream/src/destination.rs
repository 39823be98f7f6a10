//! Destination Registry: an ordered list of candidate parent
//! endpoints per host, round-robined on failure, with per-entry postpone
//! back-off and a global postpone reset used after a reconnect.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use telem_types::{BackoffConfig, DestinationEntry, parse_destination_string};
use telem_core::StreamError;

/// Exponential backoff with jitter for the `attempt`-th reconnect since
/// the registry last succeeded. `attempt` is clamped so a long-failing host's delay
/// converges to `max_backoff_ms` rather than overflowing.
#[must_use]
pub fn backoff_delay(config: &BackoffConfig, attempt: u64) -> Duration {
    let exponent = u32::try_from(attempt).unwrap_or(u32::MAX).min(32);
    let scaled = config.min_backoff_ms.saturating_mul(config.factor.saturating_pow(exponent).into());
    let capped = scaled.min(config.max_backoff_ms);
    let jitter_range = capped * u64::from(config.jitter_percent) / 100;
    let jitter = if jitter_range == 0 { 0 } else { rand::random::<u64>() % jitter_range };
    Duration::from_millis(capped + jitter)
}

/// One candidate endpoint plus the runtime bookkeeping the registry attaches to it.
#[derive(Debug, Clone)]
struct Destination {
    entry: DestinationEntry,
    attempts: u64,
    last_attempt: Option<Instant>,
    postpone_until: Option<Instant>,
}

/// Ordered, round-robining list of destinations for one host.
#[derive(Debug)]
pub struct Destinations {
    entries: VecDeque<Destination>,
}

impl Destinations {
    /// Parse a whitespace-separated destination string into an
    /// ordered registry, preserving insertion order.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let entries = parse_destination_string(raw)
            .into_iter()
            .map(|entry| Destination {
                entry,
                attempts: 0,
                last_attempt: None,
                postpone_until: None,
            })
            .collect();
        Self { entries }
    }

    /// Whether this host has any configured destination at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of configured destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Attempt each destination in order, skipping any whose
    /// `postpone_until` has not yet elapsed, until one connects or all are
    /// exhausted. On success the winning entry is moved to the tail so the
    /// next round probes the next candidate first.
    ///
    /// `dial` is handed each entry's endpoint and TLS requirement and
    /// returns the connected transport; it is expected to apply its own
    /// connect timeout (the registry does not wrap one, since what
    /// "timeout" means is transport-specific).
    ///
    /// # Errors
    /// Returns [`StreamError::AllDestinationsUnavailable`] if every
    /// destination is postponed or every dial attempt failed.
    pub async fn connect_to_one_of<T, F, Fut>(
        &mut self,
        now: Instant,
        mut dial: F,
    ) -> Result<(T, DestinationEntry), StreamError>
    where
        F: FnMut(DestinationEntry) -> Fut,
        Fut: Future<Output = Result<T, std::io::Error>>,
    {
        let count = self.entries.len();
        let mut attempted = 0usize;

        for _ in 0..count {
            let mut candidate = match self.entries.pop_front() {
                Some(c) => c,
                None => break,
            };

            if candidate.postpone_until.is_some_and(|until| until > now) {
                self.entries.push_back(candidate);
                continue;
            }

            candidate.last_attempt = Some(now);
            candidate.attempts += 1;
            attempted += 1;

            let entry = candidate.entry.clone();
            match dial(entry.clone()).await {
                Ok(transport) => {
                    self.entries.push_back(candidate);
                    return Ok((transport, entry));
                }
                Err(_) => {
                    self.entries.push_back(candidate);
                }
            }
        }

        Err(StreamError::AllDestinationsUnavailable { attempted })
    }

    /// Postpone every destination until `now + delay`, used right after a
    /// reconnect to avoid a thundering-herd reconnect storm.
    pub fn reset_postpone(&mut self, now: Instant, delay: Duration) {
        for candidate in &mut self.entries {
            candidate.postpone_until = Some(now + delay);
        }
    }

    /// Total attempts recorded across all destinations, for diagnostics.
    #[must_use]
    pub fn total_attempts(&self) -> u64 {
        self.entries.iter().map(|d| d.attempts).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn connects_to_first_available_and_rotates_to_tail() {
        let mut destinations = Destinations::parse("a:1 b:2 c:3");
        let (transport, entry) = destinations
            .connect_to_one_of(Instant::now(), |entry| async move {
                if entry.endpoint == "a:1" {
                    Ok(42_u32)
                } else {
                    Err(std::io::Error::other("refused"))
                }
            })
            .await
            .unwrap();
        assert_eq!(transport, 42);
        assert_eq!(entry.endpoint, "a:1");

        // Next round should not necessarily start from "a" again: the
        // winning entry moved to the tail, so "b" is retried first.
        let front = &destinations.entries[0];
        assert_eq!(front.entry.endpoint, "b:2");
    }

    #[tokio::test]
    async fn skips_postponed_entries() {
        let mut destinations = Destinations::parse("a:1 b:2");
        let now = Instant::now();
        destinations.reset_postpone(now, Duration::from_secs(60));
        // "a" individually becomes available again.
        destinations.entries[0].postpone_until = None;

        let attempt_count = AtomicUsize::new(0);
        let (transport, entry) = destinations
            .connect_to_one_of(now, |entry| {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                async move { if entry.endpoint == "a:1" { Ok(1_u32) } else { Err(std::io::Error::other("x")) } }
            })
            .await
            .unwrap();
        assert_eq!(transport, 1);
        assert_eq!(entry.endpoint, "a:1");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_postponed_yields_all_destinations_unavailable() {
        let mut destinations = Destinations::parse("a:1 b:2");
        let now = Instant::now();
        destinations.reset_postpone(now, Duration::from_secs(60));
        let result = destinations
            .connect_to_one_of(now, |_entry| async move { Ok::<u32, std::io::Error>(1) })
            .await;
        assert!(matches!(
            result,
            Err(StreamError::AllDestinationsUnavailable { attempted: 0 })
        ));
    }

    #[tokio::test]
    async fn all_failing_yields_all_destinations_unavailable() {
        let mut destinations = Destinations::parse("a:1 b:2");
        let result = destinations
            .connect_to_one_of(Instant::now(), |_entry| async move {
                Err::<u32, _>(std::io::Error::other("refused"))
            })
            .await;
        assert!(matches!(
            result,
            Err(StreamError::AllDestinationsUnavailable { attempted: 2 })
        ));
    }
}
