//! telem orchestrates bidirectional streaming between a child and parent
//! telemetry agent: capability/version negotiation, the per-host
//! destination registry, the Sender/Receiver task lifecycle, and the chart
//! publication protocol that decides what gets sent upstream on each
//! collection tick.
//!
//! Overview
//! - Negotiates protocol capabilities once per connection (`telem-wire`)
//!   and keeps every connection's reduced mask on the `Sender`/`Receiver`
//!   that owns it, never on a process-wide global.
//! - Tracks known hosts and, for each, at most one spawned Sender task and
//!   at most one spawned Receiver task (`host`), enforcing I1/I2.
//! - Maps the receiver's pre-handshake accept/reject decision onto HTTP
//!   status codes (`upgrade`), without depending on any particular HTTP
//!   framework.
//!
//! Key behaviors and trade-offs
//! - Async tasks, not OS threads: one `tokio::task` per Sender/Receiver,
//!   coordinated through `telem-core::StreamHandle` rather than raw
//!   `JoinHandle::abort`, so a stop request synchronizes with the task's
//!   own cleanup instead of racing it.
//! - Transport and negotiation are generic over `AsyncRead + AsyncWrite`
//!   and caller-supplied closures (`telem-stream::sender::Sender::connect`,
//!   `telem-stream::receiver::run_receive_loop`): this crate wires the
//!   pieces together but never opens a socket or terminates TLS itself.
#![warn(missing_docs)]

/// Per-host Sender/Receiver task-lifecycle registry.
pub mod host;
/// HTTP status mapping for the `/stream` upgrade request.
pub mod upgrade;

pub use host::{HostEntry, HostRegistry};
pub use upgrade::{HttpUpgrade, UpgradeResponse, reject_response};

pub use telem_core::{Abortable, PressureLevel, StreamBuffer, StreamError, StreamHandle, Stoppable};
pub use telem_middleware::{DuplicateReceiverGuard, InboundRateLimiter};
pub use telem_stream::{
    AcceptOutcome, ChartConnState, ConnPublishState, Destinations, MetricsSink, ReceiverEvent,
    ReceiverGate, ReceiverParams, RejectReason, Sender, SenderEvent, SpawnGate, TickAction,
    ValidationInputs, matches_send_pattern, run_receive_loop, validate_receiver_params,
};
pub use telem_types::{
    Algorithm, BackoffConfig, Capability, ChartDef, ChartFlags, ChartId, CompressionConfig, DestinationEntry,
    DimId, DimensionDef, DimensionFlags, Host, HostFlags, Label, MachineGuid, StreamConfig, TrafficType,
    WaterMarks, capability_from_legacy_version, parse_destination_string,
};
pub use telem_wire::{Advertisement, HandshakeResponse, ParsedVerb, encode_handshake_response, negotiate, parse_handshake_response, parse_line, reduce};
