//! Per-host duplicate-receiver detection.
//!
//! "Exactly one Receiver per mirrored Host at a time; a stale Receiver (no
//! message for >= 30s) is preempted by a new one, otherwise the new one is
//! rejected." The incumbent's liveness is tracked as a monotonic timestamp
//! rather than the `Receiver` itself, so this crate doesn't need to depend
//! on `telem-stream`; preemption is a fire-and-forget stop signal the
//! caller hands in, matching the `oneshot` "tell a spawned task to stop"
//! shape used throughout (`telem_core::stream::StreamHandle`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use telem_types::MachineGuid;
use tokio::sync::{Mutex, oneshot};

struct Incumbent {
    last_msg_monotonic: Instant,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// What the caller should do with an inbound connection for a given
/// `machine_guid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    /// No live incumbent (or it was stale and has been signalled to stop);
    /// proceed with the handshake.
    Accept,
    /// A non-stale incumbent exists; reject with HTTP 409 and leave it
    /// undisturbed.
    RejectAlreadyStreaming,
}

/// Tracks the most recent message time of the live `Receiver` for each
/// host, guarding acceptance of a new inbound connection for the same
/// `machine_guid`.
#[derive(Default)]
pub struct DuplicateReceiverGuard {
    incumbents: Mutex<HashMap<MachineGuid, Incumbent>>,
}

impl DuplicateReceiverGuard {
    /// An empty guard, as constructed once per process.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a new inbound connection for `machine_guid` may
    /// proceed. If an incumbent exists and its age is `< stale_after`,
    /// rejects without disturbing it. Otherwise (no incumbent, or a stale
    /// one) fires the stale incumbent's stop signal if any, installs
    /// `stop_tx` as the new incumbent, and accepts.
    pub async fn try_accept(
        &self,
        machine_guid: MachineGuid,
        now: Instant,
        stale_after: Duration,
        stop_tx: oneshot::Sender<()>,
    ) -> AcceptDecision {
        let mut guard = self.incumbents.lock().await;
        if let Some(incumbent) = guard.get(&machine_guid) {
            let age = now.saturating_duration_since(incumbent.last_msg_monotonic);
            if age < stale_after {
                tracing::warn!(%machine_guid, age_ms = age.as_millis() as u64, "disconnect_stale_receiver: already_connected");
                return AcceptDecision::RejectAlreadyStreaming;
            }
        }
        if let Some(mut stale) = guard.insert(
            machine_guid,
            Incumbent {
                last_msg_monotonic: now,
                stop_tx: Some(stop_tx),
            },
        ) {
            tracing::info!(%machine_guid, "preempting stale receiver");
            if let Some(tx) = stale.stop_tx.take() {
                let _ = tx.send(());
            }
        }
        AcceptDecision::Accept
    }

    /// Refresh the incumbent's last-message timestamp; called on every
    /// successfully parsed record.
    pub async fn touch(&self, machine_guid: &MachineGuid, now: Instant) {
        if let Some(incumbent) = self.incumbents.lock().await.get_mut(machine_guid) {
            incumbent.last_msg_monotonic = now;
        }
    }

    /// Remove the incumbent entry for a host that has disconnected, so the
    /// next connection attempt is treated as having no incumbent at all
    /// rather than a stale one.
    pub async fn release(&self, machine_guid: &MachineGuid) {
        self.incumbents.lock().await.remove(machine_guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn guid() -> MachineGuid {
        MachineGuid::from_uuid(Uuid::from_u128(1))
    }

    #[tokio::test]
    async fn first_connection_is_always_accepted() {
        let registry = DuplicateReceiverGuard::new();
        let (tx, _rx) = oneshot::channel();
        let decision = registry.try_accept(guid(), Instant::now(), Duration::from_secs(30), tx).await;
        assert_eq!(decision, AcceptDecision::Accept);
    }

    #[tokio::test]
    async fn p3_second_connection_within_30s_is_rejected_and_incumbent_undisturbed() {
        let registry = DuplicateReceiverGuard::new();
        let t0 = Instant::now();
        let (tx1, rx1) = oneshot::channel();
        registry.try_accept(guid(), t0, Duration::from_secs(30), tx1).await;

        let t1 = t0 + Duration::from_secs(10);
        let (tx2, _rx2) = oneshot::channel();
        let decision = registry.try_accept(guid(), t1, Duration::from_secs(30), tx2).await;

        assert_eq!(decision, AcceptDecision::RejectAlreadyStreaming);
        // Incumbent's stop signal must not have fired.
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_incumbent_is_preempted_and_signalled() {
        let registry = DuplicateReceiverGuard::new();
        let t0 = Instant::now();
        let (tx1, mut rx1) = oneshot::channel();
        registry.try_accept(guid(), t0, Duration::from_secs(30), tx1).await;

        let t1 = t0 + Duration::from_secs(31);
        let (tx2, _rx2) = oneshot::channel();
        let decision = registry.try_accept(guid(), t1, Duration::from_secs(30), tx2).await;

        assert_eq!(decision, AcceptDecision::Accept);
        assert!(rx1.try_recv().is_ok());
    }

    #[tokio::test]
    async fn touch_refreshes_liveness_preventing_preemption() {
        let registry = DuplicateReceiverGuard::new();
        let t0 = Instant::now();
        let (tx1, _rx1) = oneshot::channel();
        registry.try_accept(guid(), t0, Duration::from_secs(30), tx1).await;

        let t1 = t0 + Duration::from_secs(29);
        registry.touch(&guid(), t1).await;

        let t2 = t1 + Duration::from_secs(29);
        let (tx2, _rx2) = oneshot::channel();
        let decision = registry.try_accept(guid(), t2, Duration::from_secs(30), tx2).await;
        assert_eq!(decision, AcceptDecision::RejectAlreadyStreaming);
    }

    #[tokio::test]
    async fn release_clears_incumbent_so_next_connect_is_fresh() {
        let registry = DuplicateReceiverGuard::new();
        let t0 = Instant::now();
        let (tx1, _rx1) = oneshot::channel();
        registry.try_accept(guid(), t0, Duration::from_secs(30), tx1).await;
        registry.release(&guid()).await;

        let t1 = t0 + Duration::from_secs(1);
        let (tx2, _rx2) = oneshot::channel();
        let decision = registry.try_accept(guid(), t1, Duration::from_secs(30), tx2).await;
        assert_eq!(decision, AcceptDecision::Accept);
    }
}
