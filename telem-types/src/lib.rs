//! telem-types
//!
//! Shared data transfer objects for the telem streaming core.
//!
//! - `ids`: newtypes for identifiers that cross the wire (chart id, dimension
//!   id, machine guid) so a reviewer cannot accidentally swap one for a
//!   bare `String`.
//! - `capability`: the [`Capability`] bitflags advertised and negotiated
//!   between child and parent, plus the legacy version-integer mapping.
//! - `config`: [`StreamConfig`] and [`BackoffConfig`], the explicit
//!   configuration values passed into `Sender`/`Receiver` constructors in
//!   place of process globals.
//! - `model`: the data model shared by every component (`Host`, `Chart`,
//!   `Dimension`, `Destination`, `StreamBuffer`) and the flag sets attached
//!   to them.
#![warn(missing_docs)]

/// Capability bitflags and the legacy version-integer mapping (C1 data).
pub mod capability;
/// Explicit configuration values handed to `Sender`/`Receiver` (replaces
/// process-global configuration).
pub mod config;
/// Newtype wire identifiers.
pub mod ids;
/// Shared data model: `Host`, `Chart`, `Dimension`, `Destination`, `StreamBuffer`.
pub mod model;

pub use capability::{Capability, capability_from_legacy_version};
pub use config::{BackoffConfig, CompressionConfig, StreamConfig, WaterMarks};
pub use ids::{ChartId, DimId, MachineGuid};
pub use model::{
    Algorithm, ChartDef, ChartFlags, DestinationEntry, DimensionDef, DimensionFlags, Host,
    HostFlags, Label, TrafficType, parse_destination_string,
};
