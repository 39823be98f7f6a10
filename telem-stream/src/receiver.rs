//! Receiver: the inbound half of a connection, from the
//! already-parsed query string of the upgrade request through to the
//! line-by-line worker loop that feeds a [`MetricsSink`].
//!
//! The HTTP upgrade itself — routing, TLS termination, emitting the 200/
//! 401/409/503 status line — is explicitly out of scope; what belongs here
//! is the receiver's own pre-handshake duties: parsing the query parameters,
//! validating them,
//! rate-limiting, and duplicate-detection, followed by the worker loop's
//! record dispatch. [`ReceiverGate::accept`] composes steps 1–4 into one
//! call; the caller's HTTP layer is responsible for turning the returned
//! [`AcceptOutcome`] into a status code.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use telem_middleware::duplicate::AcceptDecision;
use telem_middleware::{DuplicateReceiverGuard, InboundRateLimiter};
use telem_types::{Capability, MachineGuid};
use telem_wire::capability::Advertisement;
use telem_wire::verbs::{ParsedVerb, parse_line};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};

use telem_core::StreamError;

/// Query parameters a child presents on its `/stream` upgrade request.
/// Every field but `key`/`hostname`/`machine_guid` is
/// optional, matching the source's tolerance for older children that omit
/// newer parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverParams {
    /// API key presented by the child.
    pub key: Option<String>,
    /// Child's own hostname.
    pub hostname: Option<String>,
    /// Hostname as known to the cloud registry, if different.
    pub registry_hostname: Option<String>,
    /// Child's stable machine identifier, as presented (not yet parsed).
    pub machine_guid: Option<String>,
    /// Child's default collection period, in seconds.
    pub update_every: Option<u32>,
    /// Child's reported OS.
    pub os: Option<String>,
    /// Child's timezone name.
    pub timezone: Option<String>,
    /// Abbreviated timezone (e.g. "PST").
    pub abbrev_timezone: Option<String>,
    /// UTC offset in seconds.
    pub utc_offset: Option<i32>,
    /// Number of streaming hops between this child and the origin agent.
    pub hops: Option<u32>,
    /// Free-form host tags.
    pub tags: Option<String>,
    /// Legacy numeric protocol version; absent implies `V1`.
    pub ver: Option<u32>,
    /// Whether the child's agent build supports ML at all.
    pub ml_capable: Option<bool>,
    /// Whether ML is enabled on the child.
    pub ml_enabled: Option<bool>,
    /// Machine-learning model/config version string.
    pub mc_version: Option<String>,
    /// `NETDATA_SYSTEM_*` query keys, normalized to `NETDATA_HOST_*` for
    /// backward compatibility with older children.
    pub system_info: HashMap<String, String>,
}

impl ReceiverParams {
    /// Parse a URL-encoded query string (the part after `?`, with no
    /// leading `?`) into typed parameters.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (percent_decode(k), percent_decode(v)),
                None => (percent_decode(pair), String::new()),
            };
            match key.as_str() {
                "key" => params.key = Some(value),
                "hostname" => params.hostname = Some(value),
                "registry_hostname" => params.registry_hostname = Some(value),
                "machine_guid" => params.machine_guid = Some(value),
                "update_every" => params.update_every = value.parse().ok(),
                "os" => params.os = Some(value),
                "timezone" => params.timezone = Some(value),
                "abbrev_timezone" => params.abbrev_timezone = Some(value),
                "utc_offset" => params.utc_offset = value.parse().ok(),
                "hops" => params.hops = value.parse().ok(),
                "tags" => params.tags = Some(value),
                "ver" => params.ver = value.parse().ok(),
                "ml_capable" => params.ml_capable = Some(value == "1"),
                "ml_enabled" => params.ml_enabled = Some(value == "1"),
                "mc_version" => params.mc_version = Some(value),
                k if k.starts_with("NETDATA_SYSTEM_") => {
                    let mapped = format!("NETDATA_HOST_{}", &k["NETDATA_SYSTEM_".len()..]);
                    params.system_info.insert(mapped, value);
                }
                k => {
                    params.system_info.insert(k.to_string(), value);
                }
            }
        }
        params
    }

    /// The capability advertisement this child implies: `NETDATA_PROTOCOL_VERSION` present forces the minimum viable
    /// (`V1`) set regardless of `ver`; otherwise absent `ver` maps to `0`,
    /// which itself resolves to `V1`.
    #[must_use]
    pub fn advertisement(&self) -> Advertisement {
        if self.system_info.contains_key("NETDATA_PROTOCOL_VERSION") {
            Advertisement::Mask(Capability::V1)
        } else {
            Advertisement::LegacyVersion(self.ver.unwrap_or(0))
        }
    }
}

fn percent_decode(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut bytes = field.bytes();
    let mut raw = Vec::with_capacity(field.len());
    while let Some(b) = bytes.next() {
        match b {
            b'+' => raw.push(b' '),
            b'%' => {
                let hi = bytes.next();
                let lo = bytes.next();
                match (hi.and_then(hex_digit), lo.and_then(hex_digit)) {
                    (Some(hi), Some(lo)) => raw.push(hi << 4 | lo),
                    _ => raw.push(b'%'),
                }
            }
            other => raw.push(other),
        }
    }
    out.push_str(&String::from_utf8_lossy(&raw));
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Why accept-validation rejected an inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// `key`, `hostname`, or `machine_guid` was absent.
    MissingField(&'static str),
    /// `key` is not a well-formed identifier.
    InvalidApiKey,
    /// `machine_guid` is not a valid UUID.
    InvalidMachineGuid,
    /// Configuration marks this API key disabled.
    KeyDisabled,
    /// Configuration marks this machine disabled.
    MachineDisabled,
    /// The configured "allow from" pattern excludes the client IP.
    IpNotAllowed,
    /// The key is classified as a machine id, or vice versa.
    KeyMachineIdConfusion,
}

/// Result of checking a child's presented parameters: either a normal
/// accept/reject, or the distinct same-localhost loopback case, which is
/// not a rejection at all but a socket take-over (§6, S6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every check passed; the connection may proceed to rate limiting and
    /// duplicate detection.
    Accept(MachineGuid),
    /// `machine_guid` equals the local agent's own machine id: the child is
    /// this same agent, looped back to itself. Routed around rejection
    /// entirely — the caller takes over the socket and responds with the
    /// plain-text sentinel, never a 401.
    SameLocalhost,
    /// Some other check failed.
    Reject(RejectReason),
}

/// Caller-supplied facts accept-validation needs but that come from
/// configuration or the HTTP layer rather than the query string itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInputs<'a> {
    /// The local agent's own machine id, for the loopback check.
    pub local_machine_guid: &'a MachineGuid,
    /// Whether the configured "allow from" pattern accepts the client IP.
    pub client_ip_allowed: bool,
    /// Whether configuration disables this API key.
    pub key_disabled: bool,
    /// Whether configuration disables this machine.
    pub machine_disabled: bool,
    /// Whether the presented key is itself registered as a machine id (or
    /// the presented machine id is registered as a key) — a
    /// misconfiguration that must be rejected rather than silently
    /// tolerated.
    pub key_machine_id_confused: bool,
}

/// A minimal identifier check: API keys and machine GUIDs are expected to
/// be UUID-shaped or at least alphanumeric-with-hyphens tokens, never
/// empty or containing control/whitespace characters that would break the
/// line-oriented wire framing.
fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate a child's presented parameters against local configuration
/// facts.
///
/// Checks field presence first, then identity, then policy, then finally
/// the same-localhost loopback case — which is deliberately checked last
/// and returned as its own outcome rather than folded into `Reject`, since
/// §6/S6 route it through a socket take-over, not an HTTP rejection.
#[must_use]
pub fn validate_receiver_params(params: &ReceiverParams, inputs: &ValidationInputs<'_>) -> ValidationOutcome {
    let key = match params.key.as_deref().filter(|s| !s.is_empty()) {
        Some(key) => key,
        None => return ValidationOutcome::Reject(RejectReason::MissingField("key")),
    };
    if params.hostname.as_deref().filter(|s| !s.is_empty()).is_none() {
        return ValidationOutcome::Reject(RejectReason::MissingField("hostname"));
    }
    let machine_guid_raw = match params.machine_guid.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => raw,
        None => return ValidationOutcome::Reject(RejectReason::MissingField("machine_guid")),
    };

    if !is_valid_identifier(key) {
        return ValidationOutcome::Reject(RejectReason::InvalidApiKey);
    }
    let machine_guid = match MachineGuid::parse(machine_guid_raw) {
        Ok(guid) => guid,
        Err(_) => return ValidationOutcome::Reject(RejectReason::InvalidMachineGuid),
    };

    if inputs.key_disabled {
        return ValidationOutcome::Reject(RejectReason::KeyDisabled);
    }
    if inputs.machine_disabled {
        return ValidationOutcome::Reject(RejectReason::MachineDisabled);
    }
    if !inputs.client_ip_allowed {
        return ValidationOutcome::Reject(RejectReason::IpNotAllowed);
    }
    if inputs.key_machine_id_confused {
        return ValidationOutcome::Reject(RejectReason::KeyMachineIdConfusion);
    }
    if &machine_guid == inputs.local_machine_guid {
        return ValidationOutcome::SameLocalhost;
    }
    ValidationOutcome::Accept(machine_guid)
}

/// Outcome of running an inbound connection through all of the
/// pre-handshake steps (2 through 4); the caller's HTTP layer maps this to
/// a status code (401/503/409/200).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Validation, rate limiting, and duplicate-detection all passed;
    /// the worker loop may be spawned.
    Accept {
        /// The child's parsed machine id.
        machine_guid: MachineGuid,
    },
    /// The child's `machine_guid` is this same agent's own id: take over
    /// the socket and respond with the plain-text sentinel (§6, S6),
    /// rather than treating it as a rejection.
    SameLocalhost,
    /// Step 2 rejected the request.
    Reject(RejectReason),
    /// Step 3's global rate limit rejected the request.
    RateLimited {
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: u64,
    },
    /// Step 4 found a non-stale incumbent Receiver for this `machine_guid`.
    AlreadyStreaming,
}

/// Bundles the two process-wide gates step 3 and step 4 share across every
/// inbound connection, mirroring the source's one global rate-limit
/// spinlock and one per-host duplicate-receiver lock.
pub struct ReceiverGate {
    rate_limiter: InboundRateLimiter,
    duplicate_guard: DuplicateReceiverGuard,
}

impl Default for ReceiverGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverGate {
    /// A gate with no rate-limit history and no known incumbents.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate_limiter: InboundRateLimiter::new(),
            duplicate_guard: DuplicateReceiverGuard::new(),
        }
    }

    /// Run an inbound connection through steps 2-4 in order. On
    /// [`AcceptOutcome::Accept`], `stop_tx` has been installed as the new
    /// incumbent's preemption signal; the caller must spawn the worker
    /// loop with the matching `stop_rx`.
    pub async fn accept(
        &self,
        params: &ReceiverParams,
        inputs: &ValidationInputs<'_>,
        now: Instant,
        streaming_rate: Option<Duration>,
        stale_after: Duration,
        stop_tx: oneshot::Sender<()>,
    ) -> AcceptOutcome {
        let machine_guid = match validate_receiver_params(params, inputs) {
            ValidationOutcome::Accept(id) => id,
            ValidationOutcome::SameLocalhost => {
                tracing::info!("inbound stream connection looped back to local agent");
                return AcceptOutcome::SameLocalhost;
            }
            ValidationOutcome::Reject(reason) => {
                tracing::warn!(?reason, "denied inbound stream connection");
                return AcceptOutcome::Reject(reason);
            }
        };
        if let Err(wait) = self.rate_limiter.try_accept(now, streaming_rate) {
            return AcceptOutcome::RateLimited {
                retry_after_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            };
        }
        match self.duplicate_guard.try_accept(machine_guid, now, stale_after, stop_tx).await {
            AcceptDecision::Accept => {
                tracing::info!(%machine_guid, "accepted inbound stream connection");
                AcceptOutcome::Accept { machine_guid }
            }
            AcceptDecision::RejectAlreadyStreaming => AcceptOutcome::AlreadyStreaming,
        }
    }

    /// Refresh an accepted connection's liveness after a successfully
    /// parsed record.
    pub async fn touch(&self, machine_guid: &MachineGuid, now: Instant) {
        self.duplicate_guard.touch(machine_guid, now).await;
    }

    /// Release the incumbent slot for a host whose worker loop has exited.
    pub async fn release(&self, machine_guid: &MachineGuid) {
        self.duplicate_guard.release(machine_guid).await;
    }
}

/// Receives every successfully parsed record for one connection, in wire
/// order. Implementations dispatch into the metrics store.
#[async_trait::async_trait]
pub trait MetricsSink: Send + Sync {
    /// Handle one parsed verb for `machine_guid`.
    async fn dispatch(&self, machine_guid: &MachineGuid, verb: ParsedVerb);
}

/// Observable lifecycle transitions of a Receiver's worker loop.
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    /// The handshake completed and the worker loop is now parsing records.
    Accepted {
        /// The child's machine id.
        machine_guid: MachineGuid,
        /// Negotiated capability mask.
        mask: Capability,
    },
    /// An unrecognized verb was read and skipped.
    UnknownVerbSkipped {
        /// The child's machine id.
        machine_guid: MachineGuid,
        /// The unrecognized verb token.
        verb: String,
    },
    /// The worker loop exited, either because the peer disconnected, a
    /// fatal parse error occurred, or a stop was requested.
    Disconnected {
        /// The child's machine id.
        machine_guid: MachineGuid,
        /// The error that ended the session, if any (`None` on a clean
        /// stop request or graceful EOF).
        error: Option<String>,
    },
}

/// The worker loop: read newline-delimited records
/// from `transport` until EOF, a fatal parse error, `receive_timeout`
/// elapses with no data, or `stop_rx` fires, dispatching each successfully
/// parsed verb to `sink` and touching `gate`'s liveness clock.
///
/// # Errors
/// Returns the [`StreamError`] that ended the session if it ended
/// abnormally (parse error, I/O error, or read timeout); returns `Ok(())`
/// on a clean EOF or stop request.
pub async fn run_receive_loop<R, S>(
    transport: R,
    machine_guid: MachineGuid,
    receive_timeout: Duration,
    sink: Arc<S>,
    gate: Arc<ReceiverGate>,
    mut stop_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ReceiverEvent>,
) -> Result<(), StreamError>
where
    R: AsyncRead + Unpin,
    S: MetricsSink + ?Sized,
{
    let mut lines = BufReader::new(transport).lines();
    let result = loop {
        tokio::select! {
            _ = &mut stop_rx => break Ok(()),
            read = tokio::time::timeout(receive_timeout, lines.next_line()) => {
                match read {
                    Err(_) => {
                        break Err(StreamError::Timeout {
                            operation: "receive",
                            elapsed_ms: u64::try_from(receive_timeout.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    Ok(Err(io_err)) => break Err(StreamError::Io(io_err)),
                    Ok(Ok(None)) => break Ok(()),
                    Ok(Ok(Some(line))) => match parse_line(&line) {
                        Err(_) => {
                            tracing::error!(%machine_guid, line = %line, "parser_failed: malformed required field");
                            break Err(StreamError::malformed_line(&line));
                        }
                        Ok(None) => continue,
                        Ok(Some(ParsedVerb::Unknown { verb, .. })) => {
                            tracing::debug!(%machine_guid, verb = %verb, "unknown verb skipped");
                            let _ = events.send(ReceiverEvent::UnknownVerbSkipped {
                                machine_guid,
                                verb: verb.clone(),
                            });
                        }
                        Ok(Some(verb)) => {
                            gate.touch(&machine_guid, Instant::now()).await;
                            sink.dispatch(&machine_guid, verb).await;
                        }
                    },
                }
            }
        }
    };

    gate.release(&machine_guid).await;
    match &result {
        Ok(()) => tracing::info!(%machine_guid, "receiver session ended"),
        Err(err) => tracing::warn!(%machine_guid, error = %err, "receiver session ended abnormally"),
    }
    let _ = events.send(ReceiverEvent::Disconnected {
        machine_guid,
        error: result.as_ref().err().map(ToString::to_string),
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    fn guid(n: u128) -> MachineGuid {
        MachineGuid::from_uuid(Uuid::from_u128(n))
    }

    #[test]
    fn parses_core_query_parameters() {
        let params = ReceiverParams::from_query(
            "key=abc123&hostname=child1&machine_guid=11111111-1111-1111-1111-111111111111&ver=4&hops=1&ml_capable=1",
        );
        assert_eq!(params.key.as_deref(), Some("abc123"));
        assert_eq!(params.hostname.as_deref(), Some("child1"));
        assert_eq!(params.ver, Some(4));
        assert_eq!(params.hops, Some(1));
        assert_eq!(params.ml_capable, Some(true));
    }

    #[test]
    fn maps_netdata_system_keys_to_host_keys() {
        let params = ReceiverParams::from_query("NETDATA_SYSTEM_OS_NAME=linux&key=k&hostname=h&machine_guid=g");
        assert_eq!(params.system_info.get("NETDATA_HOST_OS_NAME").map(String::as_str), Some("linux"));
    }

    #[test]
    fn percent_encoded_values_decode() {
        let params = ReceiverParams::from_query("tags=a%20b%2Bc&key=k&hostname=h&machine_guid=g");
        assert_eq!(params.tags.as_deref(), Some("a b+c"));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let local = guid(0);
        let params = ReceiverParams::from_query("hostname=h&machine_guid=11111111-1111-1111-1111-111111111111");
        let inputs = ValidationInputs {
            local_machine_guid: &local,
            client_ip_allowed: true,
            key_disabled: false,
            machine_disabled: false,
            key_machine_id_confused: false,
        };
        assert_eq!(
            validate_receiver_params(&params, &inputs),
            ValidationOutcome::Reject(RejectReason::MissingField("key"))
        );
    }

    #[test]
    fn s6_same_localhost_is_its_own_outcome_not_a_rejection() {
        let local = guid(7);
        let params = ReceiverParams::from_query(&format!(
            "key=k&hostname=h&machine_guid={}",
            Uuid::from_u128(7)
        ));
        let inputs = ValidationInputs {
            local_machine_guid: &local,
            client_ip_allowed: true,
            key_disabled: false,
            machine_disabled: false,
            key_machine_id_confused: false,
        };
        assert_eq!(validate_receiver_params(&params, &inputs), ValidationOutcome::SameLocalhost);
    }

    #[tokio::test]
    async fn gate_routes_same_localhost_around_rejection() {
        let gate = ReceiverGate::new();
        let local = guid(7);
        let params = ReceiverParams::from_query(&format!("key=k&hostname=h&machine_guid={}", Uuid::from_u128(7)));
        let inputs = ValidationInputs {
            local_machine_guid: &local,
            client_ip_allowed: true,
            key_disabled: false,
            machine_disabled: false,
            key_machine_id_confused: false,
        };
        let (tx, _rx) = oneshot::channel();
        let outcome = gate.accept(&params, &inputs, Instant::now(), None, Duration::from_secs(30), tx).await;
        assert_eq!(outcome, AcceptOutcome::SameLocalhost);
    }

    #[test]
    fn valid_params_resolve_to_parsed_machine_guid() {
        let local = guid(0);
        let remote = Uuid::from_u128(9);
        let params = ReceiverParams::from_query(&format!("key=k&hostname=h&machine_guid={remote}"));
        let inputs = ValidationInputs {
            local_machine_guid: &local,
            client_ip_allowed: true,
            key_disabled: false,
            machine_disabled: false,
            key_machine_id_confused: false,
        };
        assert_eq!(validate_receiver_params(&params, &inputs), ValidationOutcome::Accept(MachineGuid::from_uuid(remote)));
    }

    #[tokio::test]
    async fn p3_second_accept_within_30s_is_rejected() {
        let gate = ReceiverGate::new();
        let local = guid(0);
        let remote = Uuid::from_u128(9);
        let params = ReceiverParams::from_query(&format!("key=k&hostname=h&machine_guid={remote}"));
        let inputs = ValidationInputs {
            local_machine_guid: &local,
            client_ip_allowed: true,
            key_disabled: false,
            machine_disabled: false,
            key_machine_id_confused: false,
        };
        let now = Instant::now();
        let (tx1, _rx1) = oneshot::channel();
        let first = gate.accept(&params, &inputs, now, None, Duration::from_secs(30), tx1).await;
        assert!(matches!(first, AcceptOutcome::Accept { .. }));

        let (tx2, _rx2) = oneshot::channel();
        let second = gate
            .accept(&params, &inputs, now + Duration::from_secs(5), None, Duration::from_secs(30), tx2)
            .await;
        assert_eq!(second, AcceptOutcome::AlreadyStreaming);
    }

    struct RecordingSink {
        verbs: StdMutex<Vec<ParsedVerb>>,
    }

    #[async_trait::async_trait]
    impl MetricsSink for RecordingSink {
        async fn dispatch(&self, _machine_guid: &MachineGuid, verb: ParsedVerb) {
            self.verbs.lock().unwrap().push(verb);
        }
    }

    #[tokio::test]
    async fn worker_loop_dispatches_records_and_reports_eof() {
        let data = b"CHART \"cpu.user\" '' 'title' '' '' '' line 0 1 '' '' ''\nBEGIN \"cpu.user\" 0\nEND\n".to_vec();
        let transport = Cursor::new(data);
        let sink = Arc::new(RecordingSink { verbs: StdMutex::new(Vec::new()) });
        let gate = Arc::new(ReceiverGate::new());
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let result = run_receive_loop(
            transport,
            guid(1),
            Duration::from_secs(5),
            Arc::clone(&sink),
            gate,
            stop_rx,
            events_tx,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(sink.verbs.lock().unwrap().len(), 3);
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, ReceiverEvent::Disconnected { error: None, .. }));
    }

    #[tokio::test]
    async fn worker_loop_treats_malformed_required_field_as_fatal() {
        let data = b"SET \"user\" =\n".to_vec();
        let transport = Cursor::new(data);
        let sink = Arc::new(RecordingSink { verbs: StdMutex::new(Vec::new()) });
        let gate = Arc::new(ReceiverGate::new());
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let result = run_receive_loop(transport, guid(1), Duration::from_secs(5), sink, gate, stop_rx, events_tx).await;
        assert!(matches!(result, Err(StreamError::MalformedLine { .. })));
    }

    #[tokio::test]
    async fn worker_loop_skips_unknown_verbs_without_failing() {
        let data = b"SOME_FUTURE_VERB a b\nEND\n".to_vec();
        let transport = Cursor::new(data);
        let sink = Arc::new(RecordingSink { verbs: StdMutex::new(Vec::new()) });
        let gate = Arc::new(ReceiverGate::new());
        let (_stop_tx, stop_rx) = oneshot::channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let result = run_receive_loop(transport, guid(1), Duration::from_secs(5), sink, gate, stop_rx, events_tx).await;
        assert!(result.is_ok());
        let first_event = events_rx.recv().await.unwrap();
        assert!(matches!(first_event, ReceiverEvent::UnknownVerbSkipped { .. }));
    }
}
