//! Capability/version negotiation.
//!
//! A peer advertises either a legacy numeric protocol version or a raw
//! capability mask (when it itself sets `VCAPS`). [`negotiate`] folds
//! whichever form arrives down to a single [`Capability`] set: the
//! intersection of what the peer advertised with what this agent locally
//! supports, then the §4.1 post-reduction stripping rules, then a
//! host-scoped disable mask applied last.

use telem_types::{Capability, capability_from_legacy_version};

/// What a peer presented on connect, before reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advertisement {
    /// A legacy numeric `ver` query parameter (absent ⇒ caller passes `0`).
    LegacyVersion(u32),
    /// A raw capability mask, presented by a peer that itself sets
    /// [`Capability::VCAPS`].
    Mask(Capability),
}

impl Advertisement {
    /// Resolve to the capability set this advertisement implies, before
    /// intersection with the local side.
    #[must_use]
    pub fn resolve(self) -> Capability {
        match self {
            Self::LegacyVersion(v) => capability_from_legacy_version(v),
            Self::Mask(mask) => mask,
        }
    }
}

/// Reduce an already-resolved peer capability set against what this agent
/// locally supports and a host-scoped disable mask, per §4.1's
/// post-reduction rules:
///
/// 1. Intersect with local support.
/// 2. If `VCAPS` is present, strip `V1`/`V2`/`VN`; else if `VN` is present,
///    strip `V1`/`V2`; else if `V2` is present, strip `V1`.
/// 3. If `INTERPOLATED` is absent, strip `DATA_WITH_ML`.
/// 4. Strip the host-scoped `disabled` mask.
#[must_use]
pub fn reduce(local: Capability, peer: Capability, disabled: Capability) -> Capability {
    let mut mask = local.intersection(peer);

    if mask.contains(Capability::VCAPS) {
        mask.remove(Capability::V1 | Capability::V2 | Capability::VN);
    } else if mask.contains(Capability::VN) {
        mask.remove(Capability::V1 | Capability::V2);
    } else if mask.contains(Capability::V2) {
        mask.remove(Capability::V1);
    }

    if !mask.contains(Capability::INTERPOLATED) {
        mask.remove(Capability::DATA_WITH_ML);
    }

    mask.difference(disabled)
}

/// Negotiate the mask for one connection: resolve the peer's advertisement
/// (legacy version or raw mask) against local support and the host-scoped
/// disable mask. An advertised integer that maps to no recognized version
/// still resolves to `V1` (the mapping's own fallback; not an error here).
#[must_use]
pub fn negotiate(local: Capability, peer: Advertisement, disabled: Capability) -> Capability {
    reduce(local, peer.resolve(), disabled)
}

/// Whether a negotiated mask carries at least one usable framing version.
/// A mask failing this check cannot stream at all.
#[must_use]
pub fn has_usable_framing(mask: Capability) -> bool {
    mask.intersects(Capability::framing_versions())
}
