//! Explicit configuration values for `Sender`/`Receiver` construction.
//!
//! The original agent relies on one process-wide configuration structure
//! and one process-wide "capabilities disabled" mask; here that becomes an
//! explicit value passed to constructors so tests can instantiate multiple
//! cores in-process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// Exponential backoff configuration for reconnecting a `Sender`, or for
/// re-probing a `Destination` after a failed connect attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor applied after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage `[0, 100]` added to each computed delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 500,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
        }
    }
}

/// Per-algorithm compression configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Whether compression negotiation is attempted at all.
    pub enabled: bool,
    /// Compression level for LZ4 (ignored if LZ4 is not negotiated).
    pub lz4_level: u32,
    /// Compression level for ZSTD.
    pub zstd_level: u32,
    /// Compression level for GZIP.
    pub gzip_level: u32,
    /// Compression level for BROTLI.
    pub brotli_level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lz4_level: 1,
            zstd_level: 3,
            gzip_level: 6,
            brotli_level: 4,
        }
    }
}

/// Soft/hard high-water marks for one `traffic_type` class of the outbound
/// buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaterMarks {
    /// Above this many buffered bytes, lower-priority traffic is paused.
    pub soft_bytes: usize,
    /// Above this many buffered bytes, the connection is dropped to
    /// metadata-only.
    pub hard_bytes: usize,
}

impl Default for WaterMarks {
    fn default() -> Self {
        Self {
            soft_bytes: 1 << 20,
            hard_bytes: 4 << 20,
        }
    }
}

/// Explicit, caller-constructed configuration for a `Sender`/`Receiver`
/// pair bound to one host. Replaces the source's process-wide globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Whether streaming is enabled at all for this host.
    pub enabled: bool,
    /// Whitespace-separated destination string, parsed by
    /// `telem_stream::destination::parse_destinations`.
    pub destination: String,
    /// API key presented to parents on connect.
    pub api_key: String,
    /// Default TLS requirement when a destination omits `:SSL`.
    pub tls_required_default: bool,
    /// Glob-style pattern matched against chart id/name to decide
    /// `UPSTREAM_SEND` vs `UPSTREAM_IGNORE`.
    pub send_charts_matching: String,
    /// Whether anomaly-series (ML) charts stream at all; consulted instead
    /// of `send_charts_matching` for any chart flagged `ANOMALY`.
    pub ml_streaming_enabled: bool,
    /// Compression negotiation and per-algorithm levels.
    pub compression: CompressionConfig,
    /// Minimum seconds between accepted inbound connections, global to the
    /// process. `None` disables rate limiting.
    pub streaming_rate_seconds: Option<u64>,
    /// Reconnect backoff bounds for the `Sender`.
    pub reconnect_backoff: BackoffConfig,
    /// Age after which an inbound `Receiver` with no traffic is considered
    /// stale and may be preempted by a new connection.
    pub stale_receiver_threshold: Duration,
    /// Backpressure water marks, keyed by traffic class.
    pub metadata_watermarks: WaterMarks,
    /// Backpressure water marks for bulk replication traffic.
    pub replication_watermarks: WaterMarks,
    /// Locally supported capability bits; the negotiated mask with any
    /// peer is always a subset of this.
    pub local_capabilities: Capability,
    /// Host-scoped bits to strip after reduction regardless of what both
    /// sides support (e.g. a parent configured without ML strips
    /// `DATA_WITH_ML`).
    pub disabled_capabilities: Capability,
    /// Bound on how long the Sender will wait for the outbound buffer to
    /// drain before closing with `SEND_TIMEOUT`.
    pub send_timeout: Duration,
    /// Bound on inbound socket reads for a `Receiver`.
    pub receive_timeout: Duration,
    /// Connect timeout handed to `Destinations::connect_to_one_of`.
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: String::new(),
            api_key: String::new(),
            tls_required_default: false,
            send_charts_matching: "*".to_string(),
            ml_streaming_enabled: false,
            compression: CompressionConfig::default(),
            streaming_rate_seconds: None,
            reconnect_backoff: BackoffConfig::default(),
            stale_receiver_threshold: Duration::from_secs(30),
            metadata_watermarks: WaterMarks::default(),
            replication_watermarks: WaterMarks {
                soft_bytes: 512 << 10,
                hard_bytes: 2 << 20,
            },
            local_capabilities: Capability::all(),
            disabled_capabilities: Capability::empty(),
            send_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
