//! Deterministic chart/dimension fixtures: static, hand-picked data rather
//! than randomly generated records, so assertions in dependent crates'
//! tests stay literal and readable.

use telem_types::{Algorithm, ChartDef, ChartFlags, ChartId, DimId, DimensionDef, DimensionFlags};

/// A single-dimension `system.cpu`-shaped chart, matching the literal
/// wire example in `spec.md` §8 S1.
#[must_use]
pub fn cpu_user_chart() -> ChartDef {
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

/// A multi-dimension `disk.io`-shaped chart, for tests that need more than
/// one dimension per commit.
#[must_use]
pub fn disk_io_chart() -> ChartDef {
    ChartDef {
        id: ChartId::new("disk.io"),
        name: None,
        title: "Disk I/O".to_string(),
        units: "KiB/s".to_string(),
        family: "disk".to_string(),
        context: "disk.io".to_string(),
        chart_type: "area".to_string(),
        priority: 200,
        update_every: 1,
        plugin: Some("proc".to_string()),
        module: Some("diskstats".to_string()),
        labels: vec![("device".to_string(), "sda".to_string(), "auto".to_string())],
        flags: ChartFlags::empty(),
        dimensions: vec![
            DimensionDef {
                id: DimId::new("reads"),
                name: "reads".to_string(),
                algorithm: Algorithm::Incremental,
                multiplier: 1,
                divisor: 1,
                flags: DimensionFlags::empty(),
                last_collected_value: Some(1000),
                exposed_upstream_generation: 0,
            },
            DimensionDef {
                id: DimId::new("writes"),
                name: "writes".to_string(),
                algorithm: Algorithm::Incremental,
                multiplier: 1,
                divisor: 1,
                flags: DimensionFlags::empty(),
                last_collected_value: Some(500),
                exposed_upstream_generation: 0,
            },
        ],
    }
}

/// A chart carrying an anomaly-detection series,
/// for tests exercising the ML-streaming classification branch of §4.5
/// step 2.
#[must_use]
pub fn anomaly_chart() -> ChartDef {
    let mut chart = cpu_user_chart();
    chart.id = ChartId::new("cpu.user_anomaly_rate");
    chart.flags = ChartFlags::ANOMALY;
    chart
}
