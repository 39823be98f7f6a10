//! Data model shared by every Stream Core component.
//!
//! Flag sets are `bitflags` rather than individual `bool` fields, giving
//! bit-level concepts a typed, `Display`-able representation instead of ad
//! hoc booleans scattered across a struct.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::ids::{ChartId, DimId, MachineGuid};

bitflags! {
    /// Per-host flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HostFlags: u16 {
        /// A Sender task has been spawned for this host (spawn gate, I1).
        const SENDER_SPAWNED             = 1 << 0;
        /// The Sender has completed its post-connect handshake and may
        /// begin emitting chart definitions/metrics.
        const SENDER_READY_FOR_METRICS   = 1 << 1;
        /// A "connected to parent" log line has already been emitted for
        /// the current connection (suppresses duplicate logging).
        const SENDER_LOG_EMITTED         = 1 << 2;
        /// Global (host-scoped) exposed functions have been re-sent since
        /// the last reconnect.
        const GLOBAL_FUNCTIONS_UPDATED   = 1 << 3;
        /// The inbound Receiver for this host has disconnected; a Sender
        /// spawn should not be attempted while this is set together with
        /// no Sender already spawned (mirrors the source's gating of
        /// re-streaming on receiver state).
        const RECEIVER_DISCONNECTED      = 1 << 4;
        /// The host is stale and archived; no new Sender/Receiver may be
        /// spawned for it.
        const ARCHIVED                   = 1 << 5;
    }
}

/// A host label with its provenance (§3 Host: "labels (key/value with
/// provenance)"), the same shape used on the wire by `LABEL`/`CLABEL`
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
    /// Where the label came from (e.g. `"config"`, `"auto"`, `"k8s"`).
    pub source: String,
}

/// A host known to this agent, identified by its stable machine GUID. Carries only the data every component needs to agree on; the
/// Sender/Receiver tasks bound to this host, and the destination registry
/// and per-connection publication state that go with them, are owned by
/// `telem-stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    /// Stable 128-bit machine identifier.
    pub machine_guid: MachineGuid,
    /// Human-readable hostname.
    pub hostname: String,
    /// Host-scoped labels with provenance.
    pub labels: Vec<Label>,
    /// Whitespace-separated destination string this host streams to when
    /// acting as a child; empty if this host is parent-only.
    pub destination: String,
    /// Lifecycle/gating flags.
    pub flags: HostFlags,
}

impl Host {
    /// Construct a freshly-known host with no flags set.
    #[must_use]
    pub fn new(machine_guid: MachineGuid, hostname: impl Into<String>) -> Self {
        Self {
            machine_guid,
            hostname: hostname.into(),
            labels: Vec::new(),
            destination: String::new(),
            flags: HostFlags::empty(),
        }
    }
}

bitflags! {
    /// Per-chart flags that are properties of the chart itself, persisting
    /// across reconnects. The *per-connection* classification
    /// and replication state (`UPSTREAM_SEND`/`UPSTREAM_IGNORE`,
    /// `sender_replication_in_progress/finished`, ...) are **not** here —
    /// §4.5's state machine and I5's "sticky for the lifetime of the chart
    /// on this connection" wording both scope that state to one
    /// connection, so it is tracked by `telem_stream::publish::ConnState`
    /// instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ChartFlags: u16 {
        /// Chart-scoped variables should be (re-)sent with the next
        /// definition.
        const SEND_VARIABLES = 1 << 0;
        /// Chart is obsolete and pending removal.
        const OBSOLETE       = 1 << 1;
        /// Chart is a "detail" (sub-)chart.
        const DETAIL         = 1 << 2;
        /// Chart should be backfilled from its first stored point.
        const STORE_FIRST    = 1 << 3;
        /// Chart is hidden from default views.
        const HIDDEN         = 1 << 4;
        /// Chart carries an anomaly-detection series.
        const ANOMALY        = 1 << 5;
    }
}

bitflags! {
    /// Per-dimension option flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DimensionFlags: u8 {
        /// Dimension is obsolete and pending removal.
        const OBSOLETE        = 1 << 0;
        /// Dimension is hidden from default views.
        const HIDDEN          = 1 << 1;
        /// Disable automatic counter-reset detection for this dimension.
        const NO_RESET_DETECT = 1 << 2;
    }
}

/// Collection algorithm for a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// The collected value is an absolute reading.
    Absolute,
    /// The collected value is a monotonically increasing counter.
    Incremental,
    /// The value is a percentage of the row total.
    PctOverRow,
    /// The value is a percentage of the row-to-row difference.
    PctOverDiff,
}

impl Algorithm {
    /// Wire token used in `DIMENSION` records.
    #[must_use]
    pub const fn as_wire_token(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Incremental => "incremental",
            Self::PctOverRow => "percentage-of-absolute-row",
            Self::PctOverDiff => "percentage-of-incremental-row",
        }
    }
}

/// Accounting/backpressure class of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficType {
    /// Host/chart metadata: `CHART`, `DIMENSION`, `CLABEL`, `LABEL`.
    Metadata,
    /// Metric value records: `BEGIN`/`SET`/`END`, v2 equivalents.
    Data,
    /// Exposed function records.
    Functions,
    /// Dynamic configuration tokens.
    Dyncfg,
    /// Bulk historical replication records.
    Replication,
}

/// A chart definition as it is known locally, independent of any one
/// connection's publication state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDef {
    /// Stable chart id.
    pub id: ChartId,
    /// Optional display name, distinct from `id`.
    pub name: Option<String>,
    /// Human-readable title.
    pub title: String,
    /// Unit label (e.g. "percentage", "KiB/s").
    pub units: String,
    /// Grouping family.
    pub family: String,
    /// Dimensionless context used for templated alerting.
    pub context: String,
    /// Chart type (e.g. "line", "area", "stacked").
    pub chart_type: String,
    /// Relative ordering priority.
    pub priority: u32,
    /// Collection period in seconds.
    pub update_every: u32,
    /// Originating plugin, if any.
    pub plugin: Option<String>,
    /// Originating module, if any.
    pub module: Option<String>,
    /// Chart-scoped labels: `(name, value, source)`.
    pub labels: Vec<(String, String, String)>,
    /// Flags.
    pub flags: ChartFlags,
    /// Child dimensions, keyed by id for O(1) lookup during a tick.
    pub dimensions: Vec<DimensionDef>,
}

impl ChartDef {
    /// The flag-string token sequence emitted in a `CHART` record
    ///.
    #[must_use]
    pub fn flag_string(&self) -> String {
        let mut tokens = Vec::new();
        if self.flags.contains(ChartFlags::OBSOLETE) {
            tokens.push("obsolete");
        }
        if self.flags.contains(ChartFlags::DETAIL) {
            tokens.push("detail");
        }
        if self.flags.contains(ChartFlags::STORE_FIRST) {
            tokens.push("store_first");
        }
        if self.flags.contains(ChartFlags::HIDDEN) {
            tokens.push("hidden");
        }
        tokens.join(" ")
    }
}

/// A single time-series within a chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionDef {
    /// Stable dimension id, unique within the owning chart.
    pub id: DimId,
    /// Human-readable name.
    pub name: String,
    /// Collection algorithm.
    pub algorithm: Algorithm,
    /// Multiplier applied before storage.
    pub multiplier: i64,
    /// Divisor applied before storage.
    pub divisor: i64,
    /// Option flags.
    pub flags: DimensionFlags,
    /// Last value observed from the collector, if any.
    pub last_collected_value: Option<i64>,
    /// Generation counter bumped each time this dimension is (re-)exposed
    /// to a new connection; lets a racing collector detect it must retry
    /// rather than silently skip.
    pub exposed_upstream_generation: u64,
}

impl DimensionDef {
    /// The flag-string token sequence emitted in a `DIMENSION` record.
    #[must_use]
    pub fn flag_string(&self) -> String {
        let mut tokens = Vec::new();
        if self.flags.contains(DimensionFlags::OBSOLETE) {
            tokens.push("obsolete");
        }
        if self.flags.contains(DimensionFlags::HIDDEN) {
            tokens.push("hidden");
        }
        if self.flags.contains(DimensionFlags::NO_RESET_DETECT) {
            tokens.push("no_reset_detect");
        }
        tokens.join(" ")
    }
}

/// One candidate parent endpoint in a host's destination list. Time fields are owned by `telem-stream::destination`
/// (which has the `Instant` dependency); this struct carries only the
/// wire-visible/configuration-visible parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEntry {
    /// `host:port` (or similar) endpoint string.
    pub endpoint: String,
    /// Whether TLS is required for this destination (`:SSL` suffix).
    pub tls_required: bool,
}

/// Parse a whitespace-separated destination string into ordered entries
///. Each token may carry a `:SSL` suffix denoting required TLS.
#[must_use]
pub fn parse_destination_string(raw: &str) -> Vec<DestinationEntry> {
    raw.split_whitespace()
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            if let Some(stripped) = tok.strip_suffix(":SSL") {
                DestinationEntry {
                    endpoint: stripped.to_string(),
                    tls_required: true,
                }
            } else {
                DestinationEntry {
                    endpoint: tok.to_string(),
                    tls_required: false,
                }
            }
        })
        .collect()
}
