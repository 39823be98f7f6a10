//! telem-middleware
//!
//! Inbound-connection gating shared by every `Receiver::accept` call: a
//! process-wide rate limiter and per-host duplicate-receiver
//! detection. Kept in its own crate, rather than inlined
//! in `telem-stream::receiver`, because both pieces of state are process-
//! wide singletons the caller constructs once and shares across every
//! inbound accept.
//!
//! - `rate_limit`: [`rate_limit::InboundRateLimiter`], a single
//!   spinlock-protected timestamp.
//! - `duplicate`: [`duplicate::DuplicateReceiverGuard`], the per-host
//!   "is there already a live receiver, and is it stale" decision (I2).
#![warn(missing_docs)]

/// Per-host duplicate-receiver detection.
pub mod duplicate;
/// Process-wide inbound accept rate limiting.
pub mod rate_limit;

pub use duplicate::{AcceptDecision, DuplicateReceiverGuard};
pub use rate_limit::InboundRateLimiter;
