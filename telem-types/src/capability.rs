//! Capability bitflags negotiated between child and parent.
//!
//! Modelled as `bitflags` rather than a closed enum because the wire
//! protocol needs set operations (intersection, stripping) rather than
//! exhaustive matching on a single selected variant.

use bitflags::bitflags;

bitflags! {
    /// Features a peer may advertise and that the local agent may support.
    ///
    /// Framing versions are mutually exclusive in practice (reduced to the
    /// highest common one by [`reduce`](super::capability::Capability::reduce)
    /// equivalent logic in `telem-wire`), but are represented as independent
    /// bits here because the wire integer/mask the peer sends may set more
    /// than one before reduction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct Capability: u32 {
        /// Minimal line-oriented v1 framing (`BEGIN`/`SET`/`END`).
        const V1            = 1 << 0;
        /// v2 framing (`BEGIN_V2`/`SET_V2`/`END_V2`).
        const V2            = 1 << 1;
        /// "VN" framing: v2 plus negotiated extensions, pre-capability-mask.
        const VN            = 1 << 2;
        /// The peer advertised a raw capability mask rather than a version integer.
        const VCAPS         = 1 << 3;
        /// Host label propagation (`LABEL`/`OVERWRITE`).
        const HLABELS       = 1 << 4;
        /// Per-chart label propagation (`CLABEL`/`CLABEL_COMMIT`).
        const CLABELS       = 1 << 5;
        /// Claim-id propagation (`CLAIMED_ID`).
        const CLAIM         = 1 << 6;
        /// Dynamic configuration tokens (`DYNCFG_*`).
        const DYNCFG        = 1 << 7;
        /// Exposed-function propagation.
        const FUNCTIONS     = 1 << 8;
        /// Bulk historical replication (`CHART_DEFINITION_END`, `REPLAY_*`).
        const REPLICATION   = 1 << 9;
        /// Binary metric encoding.
        const BINARY        = 1 << 10;
        /// Interpolated v2 framing (required for `BEGIN_V2`/`SET_V2`).
        const INTERPOLATED  = 1 << 11;
        /// IEEE-754 float/integer encoding (BASE64) instead of HEX/DECIMAL.
        const IEEE754       = 1 << 12;
        /// Anomaly-info travels alongside the data point rather than separately.
        const DATA_WITH_ML  = 1 << 13;
        /// Slot indices shorten chart/dimension references on the wire.
        const SLOTS         = 1 << 14;
        /// LZ4 compression available.
        const LZ4           = 1 << 15;
        /// ZSTD compression available.
        const ZSTD          = 1 << 16;
        /// GZIP compression available.
        const GZIP          = 1 << 17;
        /// BROTLI compression available.
        const BROTLI        = 1 << 18;
    }
}

impl Capability {
    /// The mask of compressor bits, used to report "available compressors"
    /// separately from protocol feature bits.
    #[must_use]
    pub const fn compressors() -> Self {
        Self::LZ4.union(Self::ZSTD).union(Self::GZIP).union(Self::BROTLI)
    }

    /// Framing-version bits, mutually exclusive after reduction.
    #[must_use]
    pub const fn framing_versions() -> Self {
        Self::V1.union(Self::V2).union(Self::VN).union(Self::VCAPS)
    }
}

/// Maps a legacy numeric `ver` query parameter to the capability set it
/// implies, per §4.1: "lowest version maps to V1; successive ranges add
/// host-labels, claim, chart-labels, LZ4."
///
/// An unrecognized (too-low, i.e. absent/zero) version coerces to `V1`
/// alone — per §7 this is a deliberate fallback, not an error.
#[must_use]
pub fn capability_from_legacy_version(version: u32) -> Capability {
    match version {
        0..=1 => Capability::V1,
        2..=2 => Capability::V1 | Capability::HLABELS,
        3..=3 => Capability::V1 | Capability::HLABELS | Capability::CLAIM,
        4..=4 => Capability::V1 | Capability::HLABELS | Capability::CLAIM | Capability::CLABELS,
        _ => {
            Capability::V1
                | Capability::HLABELS
                | Capability::CLAIM
                | Capability::CLABELS
                | Capability::LZ4
        }
    }
}
