//! telem-mock
//!
//! Deterministic test doubles for the telem streaming core: an in-memory
//! transport in place of a TCP socket, a recording metrics sink in place of
//! the real metrics store, and a handful of fixed chart/dimension fixtures
//! so dependent crates' tests don't each hand-roll their own.
#![warn(missing_docs)]

/// Deterministic `ChartDef`/`DimensionDef` fixtures.
pub mod fixtures;
/// A recording [`telem_stream::receiver::MetricsSink`].
pub mod sink;
/// In-memory duplex transport pairs.
pub mod transport;

pub use sink::MockMetricsSink;
pub use transport::{MockTransport, mock_pair};
