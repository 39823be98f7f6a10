//! telem-stream
//!
//! Sender/receiver lifecycle, destination registry, and chart publication
//! protocol for the telem streaming core.
//!
//! - `destination`: [`destination::Destinations`], the per-host ordered,
//!   round-robining, backoff-aware parent endpoint list.
//! - `publish`: [`publish::ConnPublishState`], the per-connection chart
//!   classification/replication state machine.
//! - `sender`: the outbound connection task.
//! - `receiver`: the inbound connection task.
#![warn(missing_docs)]

/// Per-host destination registry.
pub mod destination;
/// Chart publication protocol state machine.
pub mod publish;
/// Receiver (inbound connection) task.
pub mod receiver;
/// Sender (outbound connection) task.
pub mod sender;

pub use destination::Destinations;
pub use publish::{ChartConnState, ConnPublishState, TickAction, matches_send_pattern};
pub use receiver::{
    AcceptOutcome, MetricsSink, ReceiverEvent, ReceiverGate, ReceiverParams, RejectReason, ValidationInputs,
    run_receive_loop, validate_receiver_params,
};
pub use sender::{Sender, SenderEvent, SpawnGate};
