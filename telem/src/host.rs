//! Host registry: the only type that owns a host's
//! Sender/Receiver task handles, so `telem-stream`'s own back-reference
//! from a Sender/Receiver to its Host can stay non-owning — the registry,
//! not a reference cycle, decides when a host's tasks actually stop.

use std::collections::HashMap;
use std::sync::Arc;

use telem_core::StreamHandle;
use telem_stream::sender::{Sender, SpawnGate};
use telem_types::{Host, MachineGuid, StreamConfig};
use tokio::sync::{Mutex, RwLock};

/// Everything the registry tracks for one known host: its data-model
/// record, its Sender (constructed eagerly, spawned lazily per I1), and
/// the task handles of whichever send/receive loops are currently live.
pub struct HostEntry {
    /// The host's data-model record.
    pub host: Host,
    /// This host's outbound Sender. Constructing a `Sender` is cheap and
    /// side-effect free; only `spawn_gate` gates whether a send loop is
    /// actually running.
    pub sender: Arc<Sender>,
    spawn_gate: Arc<SpawnGate>,
    sender_handle: Mutex<Option<StreamHandle>>,
    receiver_handle: Mutex<Option<StreamHandle>>,
}

impl HostEntry {
    fn new(host: Host, config: StreamConfig) -> Self {
        Self {
            host,
            sender: Arc::new(Sender::new(config)),
            spawn_gate: Arc::new(SpawnGate::new()),
            sender_handle: Mutex::new(None),
            receiver_handle: Mutex::new(None),
        }
    }

    /// Whether a send loop is currently spawned for this host (I1).
    #[must_use]
    pub fn sender_spawned(&self) -> bool {
        self.spawn_gate.is_spawned()
    }

    /// The gate `telem_stream::sender::spawn_send_loop` must be given to
    /// enforce I1 for this host.
    #[must_use]
    pub fn spawn_gate(&self) -> Arc<SpawnGate> {
        Arc::clone(&self.spawn_gate)
    }

    /// Install the handle of a just-spawned send loop, replacing (and
    /// thus stopping) any stale one left over from a prior connection
    /// attempt.
    pub async fn set_sender_handle(&self, handle: StreamHandle) {
        let stale = self.sender_handle.lock().await.replace(handle);
        if let Some(stale) = stale {
            stale.stop_and_wait().await;
        }
    }

    /// Install the handle of a just-accepted receive loop, replacing any
    /// stale one. By the time `ReceiverGate::accept` returns `Accept`,
    /// I2's preemption has already signalled the old incumbent to stop;
    /// this just gives the registry something to join on host removal.
    pub async fn set_receiver_handle(&self, handle: StreamHandle) {
        let stale = self.receiver_handle.lock().await.replace(handle);
        if let Some(stale) = stale {
            stale.stop_and_wait().await;
        }
    }

    /// Stop and wait for both the send and receive loops, if spawned.
    pub async fn stop_all(&self) {
        if let Some(handle) = self.sender_handle.lock().await.take() {
            handle.stop_and_wait().await;
        }
        if let Some(handle) = self.receiver_handle.lock().await.take() {
            handle.stop_and_wait().await;
        }
    }
}

/// Every host this agent currently knows about, keyed by machine id. Owns the lifetime of each host's Sender/Receiver task handles;
/// removing a host stops both before dropping its entry.
#[derive(Default)]
pub struct HostRegistry {
    hosts: RwLock<HashMap<MachineGuid, Arc<HostEntry>>>,
}

impl HostRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-known host, constructing (but not spawning) its
    /// Sender. Replaces any existing entry for the same machine id
    /// without stopping its tasks; callers that care should `remove` the
    /// old entry first.
    pub async fn register(&self, host: Host, config: StreamConfig) -> Arc<HostEntry> {
        let machine_guid = host.machine_guid;
        let entry = Arc::new(HostEntry::new(host, config));
        self.hosts.write().await.insert(machine_guid, Arc::clone(&entry));
        entry
    }

    /// Look up a known host's entry.
    pub async fn get(&self, machine_guid: &MachineGuid) -> Option<Arc<HostEntry>> {
        self.hosts.read().await.get(machine_guid).cloned()
    }

    /// Remove a host, stopping its Sender/Receiver tasks first.
    pub async fn remove(&self, machine_guid: &MachineGuid) {
        let entry = self.hosts.write().await.remove(machine_guid);
        if let Some(entry) = entry {
            entry.stop_all().await;
        }
    }

    /// Number of currently known hosts.
    pub async fn len(&self) -> usize {
        self.hosts.read().await.len()
    }

    /// Whether the registry currently has no known hosts.
    pub async fn is_empty(&self) -> bool {
        self.hosts.read().await.is_empty()
    }
}
