//! End-to-end exercise of a chart definition and one v2 tick flowing from
//! a `Sender` to a `run_receive_loop` worker over an in-memory transport,
//! standing in for a real parent/child socket pair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use telem::{
    Algorithm, Capability, ChartDef, ChartFlags, ChartId, DimId, DimensionDef, DimensionFlags, MachineGuid,
    ReceiverGate, Sender, StreamConfig, TickAction, WaterMarks, run_receive_loop,
};
use telem_mock::MockMetricsSink;
use telem_wire::verbs::{OrSame, ParsedVerb};

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
            id: DimId::new("user"),
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

fn child_config() -> StreamConfig {
    let mut config = StreamConfig::default();
    config.destination = "parent.example:19999".to_string();
    config.metadata_watermarks = WaterMarks { soft_bytes: 1 << 20, hard_bytes: 4 << 20 };
    config.replication_watermarks = WaterMarks { soft_bytes: 1 << 20, hard_bytes: 4 << 20 };
    config.local_capabilities = Capability::all();
    config
}

#[tokio::test]
async fn chart_definition_and_tick_reach_the_parents_sink() {
    let (child_side, parent_side) = telem_mock::mock_pair();

    let sender = Sender::new(child_config());
    let mut child_side = Some(child_side);
    let connected = sender
        .connect(
            Instant::now(),
            |_entry| {
                let transport = child_side.take().expect("single destination, dialed once");
                async move { Ok(transport) }
            },
            |_transport| async { Ok(Capability::IEEE754 | Capability::INTERPOLATED | Capability::V2) },
        )
        .await
        .expect("destination configured, negotiate always succeeds");

    let chart = sample_chart();
    let action = sender.tick(&chart, true).await;
    assert_eq!(action, TickAction::EmitDefinition);
    sender.emit_chart_definition(&chart, 0, 0, 1_700_000_000).await;
    sender
        .emit_v2_tick(
            &chart,
            None,
            1_700_000_000,
            OrSame::Same,
            &[("user".to_string(), 42, OrSame::Value(42.0), "".to_string())],
        )
        .await;

    let mut connected = connected;
    sender.flush_to(&mut connected).await.expect("mock transport never errors");

    let sink = Arc::new(MockMetricsSink::new());
    let gate = Arc::new(ReceiverGate::new());
    let machine_guid = MachineGuid::parse("11111111-1111-1111-1111-111111111111").unwrap();
    let (_stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let (events_tx, _events_rx) = tokio::sync::mpsc::unbounded_channel();

    // Drop the writer half so the receive loop sees EOF after the
    // buffered bytes are consumed, rather than blocking forever.
    drop(connected);

    run_receive_loop(parent_side, machine_guid, Duration::from_secs(5), Arc::clone(&sink), gate, stop_rx, events_tx)
        .await
        .expect("clean EOF after the chart definition and tick");

    let verbs = sink.verbs_for(&machine_guid);
    assert!(matches!(verbs.first(), Some(ParsedVerb::Chart { .. })));
    assert!(verbs.iter().any(|v| matches!(v, ParsedVerb::BeginV2 { .. })));
    assert!(verbs.iter().any(|v| matches!(v, ParsedVerb::SetV2 { .. })));
    assert!(verbs.iter().any(|v| matches!(v, ParsedVerb::EndV2)));
}
