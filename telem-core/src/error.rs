//! Error types for the streaming core.

use std::fmt;

use telem_types::ChartId;
use thiserror::Error;

/// Failures a `Sender`, `Receiver`, or the shared registry can surface.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A connect attempt to a destination failed (network error, refused
    /// connection, TLS handshake failure).
    #[error("connect to destination {endpoint:?} failed: {source}")]
    Connect {
        /// The endpoint that was attempted.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// None of a host's configured destinations could be reached this
    /// round; each is postponed per its own backoff.
    #[error("no destination available for host (all {attempted} candidate(s) postponed)")]
    AllDestinationsUnavailable {
        /// Number of destinations that were attempted.
        attempted: usize,
    },

    /// The inbound API key failed validation.
    #[error("invalid API key presented by peer")]
    InvalidApiKey,

    /// The inbound machine GUID collides with an already-connected,
    /// non-stale host and no preemption applies.
    #[error("host {machine_guid} already has an active receiver")]
    HostAlreadyConnected {
        /// Textual machine GUID of the conflicting host.
        machine_guid: String,
    },

    /// The process-wide inbound connection rate limit rejected this
    /// attempt.
    #[error("connection rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// A malformed line was read from the wire and could not be parsed as
    /// any known verb.
    #[error("malformed protocol line: {line:?}")]
    MalformedLine {
        /// The offending line, truncated for diagnostics.
        line: String,
    },

    /// A verb referenced a chart id that has not been declared on this
    /// connection (e.g. `SET` before `CHART`/`BEGIN`).
    #[error("verb referenced undeclared chart {chart_id}")]
    UndeclaredChart {
        /// The chart id that was referenced.
        chart_id: ChartId,
    },

    /// The peer advertised capabilities that reduce to an empty, unusable
    /// set (e.g. no framing version in common).
    #[error("capability negotiation failed: no common framing version")]
    CapabilityMismatch,

    /// The outbound buffer reached its hard water mark and the connection
    /// was dropped to metadata-only, or closed if already at that stage
    ///.
    #[error("outbound buffer exceeded hard water mark ({bytes} bytes buffered)")]
    BackpressureExceeded {
        /// Buffered byte count at the moment of the trip.
        bytes: usize,
    },

    /// A send or receive did not complete within its configured timeout.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Name of the operation that timed out (`"send"`, `"receive"`, `"connect"`).
        operation: &'static str,
        /// Elapsed time at the point of cancellation.
        elapsed_ms: u64,
    },

    /// The underlying I/O transport returned an error outside the cases
    /// above.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// A programming invariant was violated; these should never surface in
    /// production and indicate a bug in this crate rather than peer or
    /// environment behavior.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl StreamError {
    /// Build a [`StreamError::Connect`] from an endpoint and I/O source.
    #[must_use]
    pub fn connect(endpoint: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    /// Build a [`StreamError::MalformedLine`], truncating long lines so a
    /// log line can't be used to exhaust diagnostic output.
    #[must_use]
    pub fn malformed_line(line: &str) -> Self {
        const MAX_LEN: usize = 256;
        let truncated = if line.len() > MAX_LEN {
            let boundary = (0..=MAX_LEN).rfind(|&i| line.is_char_boundary(i)).unwrap_or(0);
            format!("{}...", &line[..boundary])
        } else {
            line.to_string()
        };
        Self::MalformedLine { line: truncated }
    }

    /// Whether this error should trigger the caller's reconnect/backoff
    /// path (as opposed to being a terminal misconfiguration).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::AllDestinationsUnavailable { .. }
                | Self::RateLimited { .. }
                | Self::BackpressureExceeded { .. }
                | Self::Timeout { .. }
                | Self::Io(_)
        )
    }
}
