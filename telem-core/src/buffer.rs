//! The per-connection outbound buffer: byte accounting by traffic class
//! plus v1 `BEGIN` microsecond zero-suppression.
//!
//! Right after a chart is (re)defined, the receiver's own clock and the
//! sender's collection clock are both freshly synchronized, so for a grace
//! window of 60 update cycles the `BEGIN "<chart>" <microseconds>` field is
//! zero-suppressed (written as `"0"`), telling the receiver to snap to its
//! own clock rather than trust a jittery measurement; once the window
//! elapses every `BEGIN` carries its real timestamp again until the chart
//! is redefined and the window restarts. `StreamBuffer` is where that
//! decision is made, since it is the one place with both the definition
//! time and every subsequent commit's timestamp. The distinct `#`
//! same-value marker used by v2 (`BEGIN_V2`/`SET_V2`) framing is a
//! `telem-wire` concern, not this buffer's.

use std::collections::HashMap;

use telem_types::{ChartId, WaterMarks};

/// Outcome of a water-mark check after appending to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    /// Buffered bytes are below the soft water mark.
    Normal,
    /// Above the soft water mark: lower-priority traffic classes should be
    /// paused.
    Soft,
    /// Above the hard water mark: the connection should be dropped to
    /// metadata-only, or closed if already there.
    Hard,
}

/// An outbound byte buffer for one connection, accounted separately for
/// metadata and replication traffic so each can be watermarked on its own
///.
pub struct StreamBuffer {
    bytes: Vec<u8>,
    metadata_bytes: usize,
    replication_bytes: usize,
    metadata_watermarks: WaterMarks,
    replication_watermarks: WaterMarks,
    /// Per chart, the timestamp (microseconds) up to and including which
    /// `BEGIN` should still zero-suppress. Absent once the window has
    /// never been opened, or after `forget_chart`.
    resync_until_us: HashMap<ChartId, i64>,
}

impl StreamBuffer {
    /// Build an empty buffer with the given water marks.
    #[must_use]
    pub fn new(metadata_watermarks: WaterMarks, replication_watermarks: WaterMarks) -> Self {
        Self {
            bytes: Vec::new(),
            metadata_bytes: 0,
            replication_bytes: 0,
            metadata_watermarks,
            replication_watermarks,
            resync_until_us: HashMap::new(),
        }
    }

    /// Open a chart's resynchronization window as of its (re)definition:
    /// every `BEGIN` up to and including `definition_timestamp_us +
    /// 60 * update_every_us` will zero-suppress its microsecond field.
    /// Called once per `CHART` line sent, never per tick.
    pub fn begin_resync_window(&mut self, chart_id: &ChartId, definition_timestamp_us: i64, update_every_us: i64) {
        self.resync_until_us
            .insert(chart_id.clone(), definition_timestamp_us + 60 * update_every_us);
    }

    /// Append a fully-formed metadata line (`CHART`, `DIMENSION`, `CLABEL`,
    /// ...).
    pub fn push_metadata_line(&mut self, line: &str) {
        self.metadata_bytes += line.len() + 1;
        self.bytes.extend_from_slice(line.as_bytes());
        self.bytes.push(b'\n');
    }

    /// Append a fully-formed replication line.
    pub fn push_replication_line(&mut self, line: &str) {
        self.replication_bytes += line.len() + 1;
        self.bytes.extend_from_slice(line.as_bytes());
        self.bytes.push(b'\n');
    }

    /// Emit a `BEGIN "<chart>" <usec>` line for a regular (v1) commit,
    /// zero-suppressing the microsecond field while `timestamp_us` still
    /// falls inside the chart's resynchronization window opened by the
    /// last `begin_resync_window` call.
    pub fn push_begin(&mut self, chart_id: &ChartId, timestamp_us: i64) {
        let in_resync_window = self
            .resync_until_us
            .get(chart_id)
            .is_some_and(|&resync_until| timestamp_us <= resync_until);

        let line = if in_resync_window {
            format!("BEGIN \"{chart_id}\" 0")
        } else {
            format!("BEGIN \"{chart_id}\" {timestamp_us}")
        };
        self.bytes.extend_from_slice(line.as_bytes());
        self.bytes.push(b'\n');
        self.metadata_bytes += line.len() + 1;

        if self.metadata_pressure() == PressureLevel::Hard {
            tracing::warn!(chart = %chart_id, bytes = self.metadata_bytes, "metadata buffer at hard water mark");
        }
    }

    /// Drop any recorded resync-window state for a chart (e.g. on `CHART`
    /// obsoletion), so a stale window can never outlive the chart.
    pub fn forget_chart(&mut self, chart_id: &ChartId) {
        self.resync_until_us.remove(chart_id);
    }

    /// Current pressure level against the metadata water marks.
    #[must_use]
    pub fn metadata_pressure(&self) -> PressureLevel {
        pressure_for(self.metadata_bytes, &self.metadata_watermarks)
    }

    /// Current pressure level against the replication water marks.
    #[must_use]
    pub fn replication_pressure(&self) -> PressureLevel {
        pressure_for(self.replication_bytes, &self.replication_watermarks)
    }

    /// Total bytes currently buffered, across all traffic classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer currently holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Take the buffered bytes for writing to the socket, resetting byte
    /// counters but preserving per-chart `BEGIN` history.
    pub fn drain(&mut self) -> Vec<u8> {
        self.metadata_bytes = 0;
        self.replication_bytes = 0;
        std::mem::take(&mut self.bytes)
    }
}

fn pressure_for(bytes: usize, marks: &WaterMarks) -> PressureLevel {
    if bytes >= marks.hard_bytes {
        PressureLevel::Hard
    } else if bytes >= marks.soft_bytes {
        PressureLevel::Soft
    } else {
        PressureLevel::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watermarks() -> WaterMarks {
        WaterMarks {
            soft_bytes: 10,
            hard_bytes: 20,
        }
    }

    #[test]
    fn ticks_inside_the_resync_window_are_zero_suppressed() {
        let mut buf = StreamBuffer::new(watermarks(), watermarks());
        let chart = ChartId::new("cpu.user");
        buf.begin_resync_window(&chart, 1_000_000, 1_000_000);
        buf.push_begin(&chart, 1_000_000);
        buf.push_begin(&chart, 2_000_000);
        buf.push_begin(&chart, 61_000_000);
        let out = String::from_utf8(buf.drain()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "BEGIN \"cpu.user\" 0");
        assert_eq!(lines[1], "BEGIN \"cpu.user\" 0");
        assert_eq!(lines[2], "BEGIN \"cpu.user\" 0");
    }

    #[test]
    fn ticks_past_the_resync_window_carry_full_timestamp() {
        let mut buf = StreamBuffer::new(watermarks(), watermarks());
        let chart = ChartId::new("cpu.user");
        buf.begin_resync_window(&chart, 1_000_000, 1_000_000);
        buf.push_begin(&chart, 62_000_000);
        let out = String::from_utf8(buf.drain()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "BEGIN \"cpu.user\" 62000000");
    }

    #[test]
    fn a_chart_with_no_open_window_never_suppresses() {
        let mut buf = StreamBuffer::new(watermarks(), watermarks());
        let chart = ChartId::new("cpu.user");
        buf.push_begin(&chart, 1_000_000);
        let out = String::from_utf8(buf.drain()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "BEGIN \"cpu.user\" 1000000");
    }

    #[test]
    fn forget_chart_closes_the_resync_window() {
        let mut buf = StreamBuffer::new(watermarks(), watermarks());
        let chart = ChartId::new("cpu.user");
        buf.begin_resync_window(&chart, 1_000_000, 1_000_000);
        buf.forget_chart(&chart);
        buf.push_begin(&chart, 2_000_000);
        let out = String::from_utf8(buf.drain()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "BEGIN \"cpu.user\" 2000000");
    }

    #[test]
    fn pressure_levels_trip_at_watermarks() {
        let mut buf = StreamBuffer::new(watermarks(), watermarks());
        assert_eq!(buf.metadata_pressure(), PressureLevel::Normal);
        buf.push_metadata_line("CHART x.y '' '' '' '' '' line 0 1 '' '' ''");
        assert_eq!(buf.metadata_pressure(), PressureLevel::Soft);
        buf.push_metadata_line("DIMENSION a a absolute 1 1 ''");
        assert_eq!(buf.metadata_pressure(), PressureLevel::Hard);
    }
}
