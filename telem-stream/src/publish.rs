//! Chart Publication Protocol: the per-chart, per-connection
//! state machine governing definition exposure, the replication handshake,
//! and metric emission.
//!
//! Modelled as a tagged enum (`{Undecided, Published{..}, Suppressed}`)
//! rather than sticky flag bits on the persistent `ChartDef`, since
//! classification is scoped to one connection (I5) and must start over as
//! `Undecided` on reconnect rather than persist across a session's
//! lifetime; this state is explicitly torn down per §4.5's diagram
//! ("disconnect ⇒ `UNDECIDED` (next conn)").

use std::collections::HashMap;

use telem_types::ChartId;

/// One chart's publication state for the *current* connection only.
/// Constructed fresh (`Undecided`) for every chart on every new
/// connection; see [`ConnPublishState::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartConnState {
    /// Not yet classified on this connection.
    Undecided,
    /// Classified `UPSTREAM_SEND`; `def_sent` tracks whether the `CHART`
    /// record has gone out yet, `replicating` whether the chart is
    /// currently blocked on the replication handshake (I3, I4).
    Published {
        /// `CHART`/`DIMENSION`/... definition has been emitted.
        def_sent: bool,
        /// Blocked on `CHART_DEFINITION_END` acknowledgment; metric
        /// emission is suppressed while this is `true`.
        replicating: bool,
    },
    /// Classified `UPSTREAM_IGNORE`; metrics for this chart are dropped
    /// for the remainder of the connection.
    Suppressed,
}

impl ChartConnState {
    /// Whether this chart may currently have metric values emitted for it.
    #[must_use]
    pub fn may_emit_metrics(self) -> bool {
        matches!(self, Self::Published { replicating: false, def_sent: true })
    }
}

/// One action the caller must take in response to a
/// collection tick, per §4.5 steps 1–5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// `sender_ready_for_metrics` is unset; attempt to spawn the Sender
    /// and treat this tick as a no-op (step 1).
    SpawnSenderAndRetry,
    /// Classified `UPSTREAM_IGNORE`; skip (step 3).
    Skip,
    /// Classified `UPSTREAM_SEND` and not yet exposed on this connection;
    /// emit the chart/dimension definition (step 4). If replication was
    /// negotiated the chart becomes `replicating` as a result.
    EmitDefinition,
    /// Definition already sent and not replicating; emit metric values
    /// (step 5).
    EmitMetrics,
    /// Definition sent but the chart is still blocked on the replication
    /// handshake; suppress metric emission this tick (step 4, last
    /// sentence).
    SuppressReplicating,
}

/// Per-connection publication state for every chart on a host, keyed by
/// chart id. Owned by the Sender; rebuilt fresh on every reconnect.
#[derive(Debug, Default)]
pub struct ConnPublishState {
    charts: HashMap<ChartId, ChartConnState>,
}

impl ConnPublishState {
    /// An empty state, as constructed for a brand new connection.
    #[must_use]
    pub fn new() -> Self {
        Self { charts: HashMap::new() }
    }

    /// Current state for a chart, `Undecided` if never seen this connection.
    #[must_use]
    pub fn state_of(&self, chart_id: &ChartId) -> ChartConnState {
        self.charts.get(chart_id).copied().unwrap_or(ChartConnState::Undecided)
    }

    /// §4.5 driven by one collection tick for one chart. `classify`
    /// decides `UPSTREAM_SEND` vs `UPSTREAM_IGNORE` the first time a chart
    /// is seen this connection (step 2); it is not re-consulted afterward
    /// (I5: sticky for the lifetime of the connection).
    ///
    /// `def_sent` is left `false` until [`ConnPublishState::mark_definition_sent`]
    /// confirms the definition commit actually ran: a chart classified
    /// `UPSTREAM_SEND` but not yet confirmed keeps returning
    /// `EmitDefinition` on every tick rather than being flipped to
    /// `EmitMetrics` by an unconfirmed send — a collector racing ahead of
    /// the confirmation retries the definition instead of skipping it.
    pub fn tick(
        &mut self,
        chart_id: &ChartId,
        sender_ready_for_metrics: bool,
        classify: impl FnOnce() -> bool,
    ) -> TickAction {
        if !sender_ready_for_metrics {
            return TickAction::SpawnSenderAndRetry;
        }

        let current = self.state_of(chart_id);
        let state = match current {
            ChartConnState::Undecided => {
                let send_upstream = classify();
                let next = if send_upstream {
                    ChartConnState::Published { def_sent: false, replicating: false }
                } else {
                    ChartConnState::Suppressed
                };
                self.charts.insert(chart_id.clone(), next);
                next
            }
            other => other,
        };

        match state {
            ChartConnState::Suppressed => TickAction::Skip,
            ChartConnState::Published { def_sent: false, .. } => TickAction::EmitDefinition,
            ChartConnState::Published { def_sent: true, replicating: true } => {
                TickAction::SuppressReplicating
            }
            ChartConnState::Published { def_sent: true, replicating: false } => TickAction::EmitMetrics,
            ChartConnState::Undecided => unreachable!("resolved above"),
        }
    }

    /// Confirm that a chart's definition commit actually ran, flipping
    /// `def_sent` and recording whether replication was negotiated for it.
    /// Called only after the commit has gone through (§4.3: "only after
    /// the commit succeeds are `exposed_upstream` markers set").
    pub fn mark_definition_sent(&mut self, chart_id: &ChartId, replicating: bool) {
        self.charts.insert(chart_id.clone(), ChartConnState::Published { def_sent: true, replicating });
    }

    /// Clear `replicating` for a chart once the (out-of-scope) replication
    /// subsystem signals `CHART_DEFINITION_END` was acknowledged.
    pub fn mark_replication_finished(&mut self, chart_id: &ChartId) {
        if let Some(ChartConnState::Published { replicating, .. }) = self.charts.get_mut(chart_id) {
            *replicating = false;
        }
    }

    /// Reset every chart back to `Undecided` for a new connection.
    pub fn reset(&mut self) {
        self.charts.clear();
    }

    /// Chart ids that reached `Published` on the connection just ended, so
    /// the caller can bootstrap their definitions first on the next one
    /// (S5: the first record observed for a previously-published chart is
    /// `CHART` again).
    #[must_use]
    pub fn previously_published(&self) -> Vec<ChartId> {
        self.charts
            .iter()
            .filter(|(_, state)| matches!(state, ChartConnState::Published { .. }))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Matches a chart's id or display name against a `send_charts_matching`
/// pattern:
/// whitespace-separated glob tokens, `*` as a wildcard, a leading `!`
/// negates that token. The first matching token (in order) wins; `*`
/// (match-everything) is the default when the pattern is empty.
#[must_use]
pub fn matches_send_pattern(pattern: &str, chart_id: &str, display_name: Option<&str>) -> bool {
    let tokens: Vec<&str> = pattern.split_whitespace().collect();
    if tokens.is_empty() {
        return true;
    }
    for token in tokens {
        let (negate, glob) = token.strip_prefix('!').map_or((false, token), |g| (true, g));
        let hit = glob_match(glob, chart_id) || display_name.is_some_and(|n| glob_match(glob, n));
        if hit {
            return !negate;
        }
    }
    false
}

/// Minimal `*`-only glob match.
fn glob_match(glob: &str, text: &str) -> bool {
    let parts: Vec<&str> = glob.split('*').collect();
    if parts.len() == 1 {
        return glob == text;
    }
    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            if !text[pos..].ends_with(part) {
                return false;
            }
        } else if let Some(found) = text[pos..].find(part) {
            pos += found + part.len();
        } else {
            return false;
        }
    }
    true
}
