//! Newtype identifiers that cross the wire.
//!
//! A bare `String` can be passed wherever a `String` is expected, which in
//! a streaming protocol means a hostname could silently be substituted for
//! a chart id. These wrappers make that a type error instead of a runtime
//! bug.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a chart, stable for the lifetime of the chart on a host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChartId(Box<str>);

impl ChartId {
    /// Build a `ChartId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().into_boxed_str())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChartId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChartId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identifier of a dimension, unique within its owning chart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimId(Box<str>);

impl DimId {
    /// Build a `DimId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().into_boxed_str())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DimId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DimId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// 128-bit machine identifier, stable across agent restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineGuid(uuid::Uuid);

impl MachineGuid {
    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Parse from the canonical hyphenated textual form used on the wire.
    ///
    /// # Errors
    /// Returns an error if `s` is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }

    /// The underlying UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for MachineGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
