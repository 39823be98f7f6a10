//! telem-core
//!
//! Task-lifecycle, error, and buffering primitives shared by
//! `telem-stream`'s sender, receiver, and destination registry.
//!
//! - `stream`: [`stream::StreamHandle`], a join-handle wrapper that
//!   distinguishes a cooperative stop (await actual task exit) from an
//!   abort (cancel immediately), used for every spawned connection task.
//! - `error`: [`error::StreamError`], the error enum surfaced by
//!   `telem-stream` and `telem-wire`.
//! - `buffer`: [`buffer::StreamBuffer`], the per-connection outbound byte
//!   buffer with traffic-class water marks and `BEGIN`/`#` compression.
#![warn(missing_docs)]

/// The per-connection outbound buffer.
pub mod buffer;
/// Error types surfaced by the streaming core.
pub mod error;
/// Task-lifecycle handle for spawned connection tasks.
pub mod stream;

pub use buffer::{PressureLevel, StreamBuffer};
pub use error::StreamError;
pub use stream::{Abortable, StreamHandle, Stoppable};
