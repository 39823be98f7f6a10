//! A recording [`MetricsSink`], the receiver-side analog of
//! `telem_mock::transport`'s in-memory duplex: instead of faking the wire,
//! it fakes the metrics store that a real `run_receive_loop` dispatches
//! into, so tests can assert on exactly which verbs arrived for which host.

use std::collections::HashMap;
use std::sync::Mutex;

use telem_types::MachineGuid;
use telem_wire::ParsedVerb;

/// Records every verb dispatched to it, keyed by the sending host, in
/// arrival order.
#[derive(Debug, Default)]
pub struct MockMetricsSink {
    received: Mutex<HashMap<MachineGuid, Vec<ParsedVerb>>>,
}

impl MockMetricsSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All verbs recorded for `machine_guid`, in arrival order.
    #[must_use]
    pub fn verbs_for(&self, machine_guid: &MachineGuid) -> Vec<ParsedVerb> {
        self.received
            .lock()
            .expect("mock sink mutex poisoned")
            .get(machine_guid)
            .cloned()
            .unwrap_or_default()
    }

    /// Total verb count across every host seen so far.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.received
            .lock()
            .expect("mock sink mutex poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait::async_trait]
impl telem_stream::receiver::MetricsSink for MockMetricsSink {
    async fn dispatch(&self, machine_guid: &MachineGuid, verb: ParsedVerb) {
        self.received
            .lock()
            .expect("mock sink mutex poisoned")
            .entry(machine_guid.clone())
            .or_default()
            .push(verb);
    }
}
