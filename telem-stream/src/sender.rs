//! Sender: one outbound connection per host, fed by many
//! collector threads through the commit protocol, emitting chart
//! definitions and metric values in the framing `telem-wire` encodes.
//!
//! Actual socket I/O, TLS, and compression codecs are handed to the caller
//! through a generic `AsyncRead + AsyncWrite` transport and a
//! caller-supplied negotiation closure (see [`Sender::connect`]): the
//! streaming core's job is the framing, ordering, backpressure, and
//! replication state machine above the byte stream, not the HTTP-upgrade
//! dance or a particular TLS/compression library.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use telem_core::buffer::PressureLevel;
use telem_core::{StreamBuffer, StreamError};
use telem_types::{Capability, ChartDef, ChartId, StreamConfig, TrafficType};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify, mpsc};

use telem_wire::verbs::{
    OrSame, encode_begin_v2, encode_chart, encode_chart_definition_end, encode_clabel,
    encode_clabel_commit, encode_dimension, encode_end_v1, encode_end_v2, encode_set_v1,
    encode_set_v2,
};

use crate::destination::Destinations;
use crate::publish::{ConnPublishState, TickAction, matches_send_pattern};

/// Enforces I1: at most one Sender task spawned per Host at a time. The
/// Host itself owns this gate; `try_acquire` is the atomic "first emit attempt"
/// check in §4.3 ("The spawn is attempted on first metric-emit attempt
/// when `!sender_spawned && !receiver_disconnected`").
#[derive(Debug, Default)]
pub struct SpawnGate {
    spawned: AtomicBool,
}

impl SpawnGate {
    /// A gate for a host with no Sender spawned yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to claim the gate. Returns `true` only for the caller that
    /// wins the race; every other concurrent caller gets `false` and must
    /// not spawn a second Sender.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.spawned
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the gate; the Sender calls this on its own termination
    ///.
    pub fn release(&self) {
        self.spawned.store(false, Ordering::SeqCst);
    }

    /// Whether a Sender currently holds the gate.
    #[must_use]
    pub fn is_spawned(&self) -> bool {
        self.spawned.load(Ordering::SeqCst)
    }
}

/// Observable transitions a Sender makes, for the caller to react to.
#[derive(Debug, Clone)]
pub enum SenderEvent {
    /// Connected to a destination; `sender_log_emitted`-equivalent callers
    /// should log this once per connection.
    Connected {
        /// The endpoint that accepted the connection.
        endpoint: String,
    },
    /// Post-connect handshake complete; chart definitions/metrics may now
    /// be emitted (`sender_ready_for_metrics`).
    ReadyForMetrics,
    /// A chart's definition was flushed to the outbound buffer.
    ChartDefinitionSent {
        /// The chart whose definition was sent.
        chart_id: ChartId,
    },
    /// A chart entered the replication handshake.
    ReplicationStarted {
        /// The chart now `sender_replication_in_progress`.
        chart_id: ChartId,
    },
    /// A traffic class tripped a water mark.
    BackpressureTripped {
        /// Which traffic class tripped.
        traffic_type: TrafficType,
        /// Soft or hard.
        level: PressureLevel,
    },
    /// The connection ended; a reconnect will be attempted unless
    /// `fatal` is set.
    Disconnected {
        /// The error that ended the connection.
        error: String,
        /// Whether this error should stop the Sender for good rather
        /// than trigger reconnect (mirrors `StreamError::is_retryable`).
        fatal: bool,
    },
    /// The Sender has fully stopped and released its spawn gate.
    Stopped,
}

/// RAII guard for one logical commit. Holding this guard holds the buffer's mutex, so
/// every line a caller pushes through [`Commit::buffer`] lands contiguously
/// on the wire; dropping it ("sender_commit") releases the mutex and wakes
/// the send loop.
pub struct Commit<'a> {
    guard: MutexGuard<'a, StreamBuffer>,
    notify: &'a Notify,
}

impl<'a> Commit<'a> {
    /// Mutable access to the buffer for the duration of this commit.
    pub fn buffer(&mut self) -> &mut StreamBuffer {
        &mut self.guard
    }
}

impl Drop for Commit<'_> {
    fn drop(&mut self) {
        self.notify.notify_one();
    }
}

/// Owns the one outbound connection for a host: the commit-guarded
/// buffer, per-connection chart publication state, and the destination
/// registry driving reconnection.
pub struct Sender {
    config: StreamConfig,
    buffer: Mutex<StreamBuffer>,
    bytes_pending: Notify,
    publish: Mutex<ConnPublishState>,
    capability: std::sync::Mutex<Capability>,
    destinations: Mutex<Destinations>,
    stopping: AtomicBool,
}

impl Sender {
    /// Build a Sender bound to `config`, parsing its destination string
    /// into a fresh registry.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        let destinations = Destinations::parse(&config.destination);
        Self {
            buffer: Mutex::new(StreamBuffer::new(
                config.metadata_watermarks,
                config.replication_watermarks,
            )),
            publish: Mutex::new(ConnPublishState::new()),
            capability: std::sync::Mutex::new(Capability::empty()),
            destinations: Mutex::new(destinations),
            stopping: AtomicBool::new(false),
            config,
        }
    }

    /// The capability mask negotiated on the current connection, `empty`
    /// before the first successful handshake.
    #[must_use]
    pub fn capability(&self) -> Capability {
        *self.capability.lock().expect("capability mutex poisoned")
    }

    fn set_capability(&self, mask: Capability) {
        *self.capability.lock().expect("capability mutex poisoned") = mask;
    }

    /// `sender_start`: acquire the commit mutex for one logical commit. The
    /// returned guard must be held for the duration of all records
    /// belonging to the same chart; dropping it is `sender_commit`.
    pub async fn start_commit(&self) -> Commit<'_> {
        let guard = self.buffer.lock().await;
        Commit { guard, notify: &self.bytes_pending }
    }

    /// §4.5 steps 1–5 for one chart on one collection tick. `ready` is
    /// `sender_ready_for_metrics`; `display_name` feeds the
    /// `send_charts_matching` classification (step 2). When this chart is
    /// an anomaly-detection series, classification instead consults
    /// `ml_streaming_enabled` rather than `send_charts_matching` (§4.5 step
    /// 2's anomaly-series branch).
    pub async fn tick(&self, chart: &ChartDef, ready: bool) -> TickAction {
        let pattern = self.config.send_charts_matching.clone();
        let ml_streaming_enabled = self.config.ml_streaming_enabled;
        let is_anomaly = chart.flags.contains(ChartFlags::ANOMALY);
        let chart_id_for_classify = chart.id.clone();
        let display_name = chart.name.clone();
        self.publish.lock().await.tick(&chart.id, ready, || {
            if is_anomaly {
                ml_streaming_enabled
            } else {
                matches_send_pattern(&pattern, chart_id_for_classify.as_str(), display_name.as_deref())
            }
        })
    }

    /// Emit a chart's full definition (`CHART`, `DIMENSION*`, optional
    /// `CLABEL*`/`CLABEL_COMMIT`, then `CHART_DEFINITION_END` if
    /// `REPLICATION` was negotiated) as one commit, then confirm the send
    /// in the publication state machine (§4.3: markers are set only after
    /// the commit succeeds, never up front by `tick`). Returns whether the
    /// chart entered the replication handshake as a result.
    pub async fn emit_chart_definition(&self, chart: &ChartDef, db_first: i64, db_last: i64, now: i64) -> bool {
        let capability = self.capability();
        let replicating = capability.contains(Capability::REPLICATION);
        {
            let mut commit = self.start_commit().await;
            let buffer = commit.buffer();
            buffer.begin_resync_window(&chart.id, now, i64::from(chart.update_every) * 1_000_000);
            buffer.push_metadata_line(&encode_chart(chart));
            for dim in &chart.dimensions {
                buffer.push_metadata_line(&encode_dimension(dim));
            }
            for (name, value, source) in &chart.labels {
                buffer.push_metadata_line(&encode_clabel(name, value, source));
            }
            if !chart.labels.is_empty() {
                buffer.push_metadata_line(encode_clabel_commit());
            }
            if replicating {
                buffer.push_metadata_line(&encode_chart_definition_end(db_first, db_last, now));
            }
        }
        self.publish.lock().await.mark_definition_sent(&chart.id, replicating);
        replicating
    }

    /// Emit a v1 `BEGIN`/`SET*`/`END` group for one chart tick. `values` pairs each updated dimension id with its
    /// collected integer.
    pub async fn emit_v1_tick(&self, chart: &ChartDef, timestamp_us: i64, values: &[(String, i64)]) {
        let mut commit = self.start_commit().await;
        let buffer = commit.buffer();
        buffer.push_begin(&chart.id, timestamp_us);
        for (dim_id, value) in values {
            buffer.push_metadata_line(&encode_set_v1(dim_id, *value));
        }
        buffer.push_metadata_line(encode_end_v1());
    }

    /// Emit a v2 `BEGIN_V2`/`SET_V2*`/`END_V2` group. `values` is `(dim_id, last_collected, value,
    /// flags)`; `wall_clock_same` and each value's sameness are decided by
    /// the caller, which has the previous tick's state.
    #[allow(clippy::too_many_arguments)]
    pub async fn emit_v2_tick(
        &self,
        chart: &ChartDef,
        slot: Option<u32>,
        point_end_time: i64,
        wall_clock: OrSame<i64>,
        values: &[(String, i64, OrSame<f64>, String)],
    ) {
        let ieee754 = self.capability().contains(Capability::IEEE754);
        let mut commit = self.start_commit().await;
        let buffer = commit.buffer();
        buffer.push_metadata_line(&encode_begin_v2(
            slot,
            chart.id.as_str(),
            chart.update_every,
            point_end_time,
            wall_clock,
            ieee754,
        ));
        for (dim_id, last_collected, value, flags) in values {
            buffer.push_metadata_line(&encode_set_v2(slot, dim_id, *last_collected, *value, flags, ieee754));
        }
        buffer.push_metadata_line(encode_end_v2());
    }

    /// Clear `replicating` for a chart once the (out-of-scope) replication
    /// subsystem acknowledges `CHART_DEFINITION_END`.
    pub async fn mark_replication_finished(&self, chart_id: &ChartId) {
        self.publish.lock().await.mark_replication_finished(chart_id);
    }

    /// Current backpressure level for a traffic class.
    pub async fn pressure(&self, traffic_type: TrafficType) -> PressureLevel {
        let buffer = self.buffer.lock().await;
        match traffic_type {
            TrafficType::Replication => buffer.replication_pressure(),
            _ => buffer.metadata_pressure(),
        }
    }

    /// Reset all per-connection state after a disconnect: chart
    /// publication reverts to `Undecided`, the negotiated
    /// capability mask is cleared, and every destination is postponed for
    /// `reconnect_backoff` to avoid a reconnect storm.
    pub async fn reset_for_reconnect(&self, now: Instant) {
        tracing::warn!("sender disconnected, resetting chart publication state for reconnect");
        self.publish.lock().await.reset();
        self.set_capability(Capability::empty());
        self.destinations
            .lock()
            .await
            .reset_postpone(now, Duration::from_millis(self.config.reconnect_backoff.min_backoff_ms));
    }

    /// Dial one of the configured destinations, negotiate
    /// capabilities with `negotiate`, and record the result.
    ///
    /// # Errors
    /// Propagates [`StreamError::AllDestinationsUnavailable`] if every
    /// destination is postponed or unreachable, or whatever `negotiate`
    /// returns if the handshake itself fails.
    pub async fn connect<T, F, Fut, N, FutN>(&self, now: Instant, dial: F, negotiate: N) -> Result<T, StreamError>
    where
        F: FnMut(telem_types::DestinationEntry) -> Fut,
        Fut: std::future::Future<Output = Result<T, std::io::Error>>,
        N: FnOnce(&mut T) -> FutN,
        FutN: std::future::Future<Output = Result<Capability, StreamError>>,
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut transport, entry) = match self.destinations.lock().await.connect_to_one_of(now, dial).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "all destinations unavailable this round");
                return Err(err);
            }
        };
        let mask = match negotiate(&mut transport).await {
            Ok(mask) => mask,
            Err(err) => {
                tracing::error!(endpoint = %entry.endpoint, error = %err, "handshake failed");
                return Err(err);
            }
        };
        tracing::info!(endpoint = %entry.endpoint, "connected to parent");
        self.set_capability(mask);
        Ok(transport)
    }

    /// Drain the outbound buffer to `sink`, returning bytes written. A
    /// no-op (and `Ok(0)`) if nothing is pending.
    ///
    /// # Errors
    /// Propagates the sink's I/O error.
    pub async fn flush_to<W: AsyncWrite + Unpin>(&self, sink: &mut W) -> Result<usize, std::io::Error> {
        let bytes = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(0);
            }
            buffer.drain()
        };
        sink.write_all(&bytes).await?;
        sink.flush().await?;
        Ok(bytes.len())
    }

    /// Await the next "bytes pending" signal (a commit completed), bounded
    /// by `timeout` so the send loop can still observe a stop request or
    /// periodically flush.
    pub async fn wait_for_pending(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.bytes_pending.notified()).await;
    }

    /// Request the send loop to stop after its current iteration.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Whether [`Sender::request_stop`] has been called.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Spawn the Sender's send loop as a cooperatively-stoppable task, wired
/// through [`telem_core::StreamHandle`] (P4: `stop_and_wait` returns only
/// after the task has actually exited). `body` is the caller-supplied
/// per-iteration work (connect-if-needed, flush, sleep-or-wait); kept
/// generic here because the concrete transport/negotiation types are
/// chosen by the caller (e.g. `telem-mock` for tests, a real TCP+TLS
/// client for production).
pub fn spawn_send_loop<Fut>(
    gate: Arc<SpawnGate>,
    events: mpsc::UnboundedSender<SenderEvent>,
    body: impl FnOnce(tokio::sync::oneshot::Receiver<()>) -> Fut + Send + 'static,
) -> Option<telem_core::StreamHandle>
where
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    if !gate.try_acquire() {
        return None;
    }
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let gate_for_task = Arc::clone(&gate);
    let join = tokio::spawn(async move {
        body(stop_rx).await;
        gate_for_task.release();
        let _ = events.send(SenderEvent::Stopped);
    });
    Some(telem_core::StreamHandle::new(stop_tx, join))
}

#[cfg(test)]
mod tests {
    use super::*;
    use telem_types::{Algorithm, ChartFlags, DimensionDef, DimensionFlags, WaterMarks};

    fn test_config() -> StreamConfig {
        let mut config = StreamConfig::default();
        config.destination = "parent.example:19999".to_string();
        config.metadata_watermarks = WaterMarks { soft_bytes: 1 << 20, hard_bytes: 4 << 20 };
        config.replication_watermarks = WaterMarks { soft_bytes: 1 << 20, hard_bytes: 4 << 20 };
        config.local_capabilities = Capability::all();
        config
    }

    fn sample_chart() -> ChartDef {
        ChartDef {
            id: ChartId::new("cpu.user"),
            name: None,
            title: "CPU user time".to_string(),
            units: "percentage".to_string(),
            family: "cpu".to_string(),
            context: "system.cpu".to_string(),
            chart_type: "line".to_string(),
            priority: 100,
            update_every: 1,
            plugin: Some("proc".to_string()),
            module: None,
            labels: Vec::new(),
            flags: ChartFlags::empty(),
            dimensions: vec![DimensionDef {
                id: telem_types::DimId::new("user"),
                name: "user".to_string(),
                algorithm: Algorithm::Absolute,
                multiplier: 1,
                divisor: 1,
                flags: DimensionFlags::empty(),
                last_collected_value: Some(42),
                exposed_upstream_generation: 0,
            }],
        }
    }

    #[tokio::test]
    async fn spawn_gate_only_lets_one_caller_through() {
        let gate = SpawnGate::new();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        gate.release();
        assert!(gate.try_acquire());
    }

    #[tokio::test]
    async fn p1_first_record_for_a_chart_is_its_definition() {
        let sender = Sender::new(test_config());
        sender.set_capability(Capability::REPLICATION);
        let chart = sample_chart();

        let action = sender.tick(&chart, true).await;
        assert_eq!(action, TickAction::EmitDefinition);
        let replicating = sender.emit_chart_definition(&chart, 0, 0, 1_700_000_000).await;
        assert!(replicating);

        let mut written = Vec::new();
        sender.flush_to(&mut written).await.unwrap();
        let text = String::from_utf8(written).unwrap();
        let first_line = text.lines().next().unwrap();
        assert!(first_line.starts_with("CHART "));
    }

    #[tokio::test]
    async fn p6_no_values_emitted_while_replicating() {
        let sender = Sender::new(test_config());
        sender.set_capability(Capability::REPLICATION);
        let chart = sample_chart();

        sender.tick(&chart, true).await;
        sender.emit_chart_definition(&chart, 0, 0, 1_700_000_000).await;
        let action = sender.tick(&chart, true).await;
        assert_eq!(action, TickAction::SuppressReplicating);
    }

    #[tokio::test]
    async fn p7_reconnect_forces_redefinition() {
        let sender = Sender::new(test_config());
        let chart = sample_chart();
        sender.tick(&chart, true).await;
        sender.emit_chart_definition(&chart, 0, 0, 0).await;
        sender.tick(&chart, true).await; // EmitMetrics (no replication negotiated)

        sender.reset_for_reconnect(Instant::now()).await;
        let action = sender.tick(&chart, true).await;
        assert_eq!(action, TickAction::EmitDefinition);
    }

    #[tokio::test]
    async fn definition_not_yet_confirmed_is_retried_not_skipped() {
        // Simulates a second tick landing before emit_chart_definition's
        // commit has run: tick() must not have marked the definition sent
        // up front, so the second call also returns EmitDefinition rather
        // than EmitMetrics for a chart whose CHART line never went out.
        let sender = Sender::new(test_config());
        let chart = sample_chart();
        assert_eq!(sender.tick(&chart, true).await, TickAction::EmitDefinition);
        assert_eq!(sender.tick(&chart, true).await, TickAction::EmitDefinition);
        sender.emit_chart_definition(&chart, 0, 0, 0).await;
        assert_eq!(sender.tick(&chart, true).await, TickAction::EmitMetrics);
    }

    #[tokio::test]
    async fn anomaly_chart_classifies_via_ml_streaming_enabled() {
        let mut config = test_config();
        config.send_charts_matching = "!*".to_string(); // would suppress by pattern alone
        config.ml_streaming_enabled = true;
        let sender = Sender::new(config);
        let mut chart = sample_chart();
        chart.flags = ChartFlags::ANOMALY;

        let action = sender.tick(&chart, true).await;
        assert_eq!(action, TickAction::EmitDefinition);
    }

    #[tokio::test]
    async fn anomaly_chart_suppressed_when_ml_streaming_disabled() {
        let mut config = test_config();
        config.send_charts_matching = "*".to_string(); // would send by pattern alone
        config.ml_streaming_enabled = false;
        let sender = Sender::new(config);
        let mut chart = sample_chart();
        chart.flags = ChartFlags::ANOMALY;

        let action = sender.tick(&chart, true).await;
        assert_eq!(action, TickAction::Skip);
    }

    #[tokio::test]
    async fn s1_minimal_v2_tick_matches_literal_shape() {
        let sender = Sender::new(test_config());
        sender.set_capability(Capability::IEEE754 | Capability::INTERPOLATED);
        let chart = sample_chart();

        sender
            .emit_v2_tick(
                &chart,
                None,
                1_700_000_000,
                OrSame::Same,
                &[("user".to_string(), 42, OrSame::Same, "A".to_string())],
            )
            .await;

        let mut written = Vec::new();
        sender.flush_to(&mut written).await.unwrap();
        let text = String::from_utf8(written).unwrap();
        let mut lines = text.lines();
        let begin = lines.next().unwrap();
        let set = lines.next().unwrap();
        let end = lines.next().unwrap();
        assert!(begin.starts_with("BEGIN_V2 'cpu.user' "));
        assert!(begin.ends_with('#'));
        assert!(set.starts_with("SET_V2 'user' "));
        assert_eq!(end, "END_V2");
    }

    #[tokio::test]
    async fn p2_v2_tick_is_always_begin_set_star_end_balanced() {
        let sender = Sender::new(test_config());
        sender.set_capability(Capability::IEEE754 | Capability::INTERPOLATED);
        let chart = sample_chart();

        for dim_count in [0usize, 1, 3, 8] {
            let values: Vec<_> = (0..dim_count)
                .map(|i| (format!("dim{i}"), 42, OrSame::Value(1.0), "A".to_string()))
                .collect();
            sender.emit_v2_tick(&chart, None, 1_700_000_000, OrSame::Same, &values).await;

            let mut written = Vec::new();
            sender.flush_to(&mut written).await.unwrap();
            let text = String::from_utf8(written).unwrap();
            let mut lines = text.lines();
            assert!(lines.next().unwrap().starts_with("BEGIN_V2 "));
            let set_lines: Vec<_> = (0..dim_count)
                .map(|_| lines.next().unwrap())
                .collect();
            assert!(set_lines.iter().all(|line| line.starts_with("SET_V2 ")));
            assert_eq!(lines.next().unwrap(), "END_V2");
            assert_eq!(lines.next(), None);
        }
    }

    #[tokio::test]
    async fn backpressure_reports_soft_then_hard() {
        let mut config = test_config();
        config.metadata_watermarks = WaterMarks { soft_bytes: 5, hard_bytes: 1000 };
        let sender = Sender::new(config);
        let chart = sample_chart();
        sender.emit_chart_definition(&chart, 0, 0, 0).await;
        assert_eq!(sender.pressure(TrafficType::Metadata).await, PressureLevel::Soft);
    }

    #[tokio::test]
    async fn request_stop_is_observable() {
        let sender = Sender::new(test_config());
        assert!(!sender.is_stopping());
        sender.request_stop();
        assert!(sender.is_stopping());
    }
}
