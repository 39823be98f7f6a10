//! HTTP status mapping for the `/stream` upgrade request. The HTTP server itself — routing, TLS termination,
//! detaching the socket from the client connection — is out of scope
//!; what belongs here is turning a
//! [`telem_stream::receiver::AcceptOutcome`] into the status code and body
//! the wire protocol promises.

use telem_stream::receiver::{AcceptOutcome, RejectReason};

/// The status line and body an HTTP layer should send back for one
/// `/stream` upgrade attempt (§6's "Error responses (HTTP path)" table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Plain-text response body.
    pub body: String,
}

impl UpgradeResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// Map a rejected/rate-limited/duplicate [`AcceptOutcome`] to the HTTP
/// response §6 specifies. Returns `None` for `Accept`, since the success
/// response depends on the negotiated handshake line, which the caller
/// assembles once it has actually run the handshake (see
/// [`HttpUpgrade::accepted_response`]).
#[must_use]
pub fn reject_response(outcome: &AcceptOutcome) -> Option<UpgradeResponse> {
    match outcome {
        AcceptOutcome::Accept { .. } | AcceptOutcome::SameLocalhost => None,
        AcceptOutcome::Reject(reason) => Some(reject_reason_response(*reason)),
        AcceptOutcome::RateLimited { .. } => Some(UpgradeResponse::new(503, "busy, try later")),
        AcceptOutcome::AlreadyStreaming => Some(UpgradeResponse::new(409, "already streaming")),
    }
}

fn reject_reason_response(reason: RejectReason) -> UpgradeResponse {
    match reason {
        RejectReason::MissingField(_)
        | RejectReason::InvalidApiKey
        | RejectReason::InvalidMachineGuid
        | RejectReason::KeyDisabled
        | RejectReason::MachineDisabled
        | RejectReason::IpNotAllowed
        | RejectReason::KeyMachineIdConfusion => UpgradeResponse::new(401, "denied"),
    }
}

/// Implemented by an HTTP layer embedding the streaming core, so the
/// worker-spawn-failure path stays
/// expressible without this crate depending on a particular HTTP
/// framework or runtime.
pub trait HttpUpgrade {
    /// The response once negotiation has succeeded: `handshake_line` is
    /// the already-encoded `OK V<n>\n<mask>\n` (or legacy `OK\n`) line
    /// from `telem_wire::handshake::encode_handshake_response`.
    fn accepted_response(&self, handshake_line: &str) -> UpgradeResponse {
        UpgradeResponse::new(200, handshake_line)
    }

    /// The response for `AcceptOutcome::SameLocalhost`: the socket is
    /// taken over exactly as on `Accept`, just with the plain-text
    /// sentinel body in place of a handshake line (§6, S6).
    fn same_localhost_response(&self) -> UpgradeResponse {
        UpgradeResponse::new(200, "same localhost")
    }

    /// The response when accepting would be valid but spawning the worker
    /// task itself failed (out-of-resources, not a protocol rejection).
    fn spawn_failed_response(&self) -> UpgradeResponse {
        UpgradeResponse::new(500, "thread spawn failed")
    }
}
