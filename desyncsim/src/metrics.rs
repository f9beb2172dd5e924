//! Metrics collection for simulation analysis.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use desync::{cyclic_distance, Duration, LogKind, LogRecord, NodeId, NodeState, Timestamp};

/// One node's schedule as seen by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePhase {
    pub state: NodeState,
    pub latest_broadcast: Option<Timestamp>,
    pub next_broadcast: Timestamp,
    pub degree: u32,
}

/// A snapshot of every node's broadcast schedule at a point in time.
#[derive(Debug, Clone)]
pub struct PhaseSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Per-node schedule, in node id order.
    pub nodes: BTreeMap<NodeId, NodePhase>,
}

impl PhaseSnapshot {
    /// Create a new empty snapshot.
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            nodes: BTreeMap::new(),
        }
    }

    /// Record a node's state.
    pub fn record_node(&mut self, node_id: NodeId, phase: NodePhase) {
        self.nodes.insert(node_id, phase);
    }

    pub fn active_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|p| p.state != NodeState::Inactive)
            .count()
    }

    /// Forward distance from `a`'s latest broadcast to `b`'s, modulo the
    /// period. `None` unless both have broadcast since their last activation.
    pub fn gap(&self, a: NodeId, b: NodeId, period: u64) -> Option<u64> {
        let ta = self.nodes.get(&a)?.latest_broadcast?;
        let tb = self.nodes.get(&b)?.latest_broadcast?;
        Some(cyclic_distance(tb.as_ticks(), ta.as_ticks(), period))
    }

    /// Smallest cyclic gap between consecutive broadcast phases of all
    /// nodes that have broadcast. A lone node gets the whole period.
    pub fn min_gap(&self, period: u64) -> Option<u64> {
        let mut phases: Vec<u64> = self
            .nodes
            .values()
            .filter_map(|p| p.latest_broadcast)
            .map(|t| t.phase(Duration::from_ticks(period)))
            .collect();
        phases.sort_unstable();

        let (&first, &last) = (phases.first()?, phases.last()?);
        let wrap = first + period - last;
        let inner = phases.windows(2).map(|w| w[1] - w[0]).min();
        Some(inner.map_or(wrap, |inner| inner.min(wrap)))
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Events taken off the queue.
    pub events_processed: u64,
    /// Activate events dispatched, first start and restarts alike.
    pub activations: u64,
    /// Timer events dispatched.
    pub timer_fires: u64,
    /// Broadcasts logged by nodes.
    pub broadcasts: u64,
    /// Receives handed to an active node.
    pub receives_delivered: u64,
    /// Receives dropped because the target was inactive.
    pub receives_ignored: u64,
    /// Receives that failed, e.g. on a malformed path vector.
    pub receive_errors: u64,
    /// Loop-detection resets.
    pub resets: u64,
    /// Events addressed to a node that does not exist.
    pub unknown_targets: u64,
    /// Phase snapshots taken at intervals.
    pub snapshots: Vec<PhaseSnapshot>,
}

impl SimMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot.
    pub fn add_snapshot(&mut self, snapshot: PhaseSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Get the latest snapshot.
    pub fn latest_snapshot(&self) -> Option<&PhaseSnapshot> {
        self.snapshots.last()
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
    /// Every node's log, nodes in id order, each in append order.
    pub logs: Vec<LogRecord>,
}

impl SimulationResult {
    /// All log records rendered one per line.
    pub fn log_lines(&self) -> String {
        let mut out = String::new();
        for record in &self.logs {
            let _ = writeln!(out, "{}", record);
        }
        out
    }

    /// Number of log records of `kind`.
    pub fn count(&self, kind: LogKind) -> usize {
        self.logs.iter().filter(|r| r.kind == kind).count()
    }

    /// Log records of one node.
    pub fn node_log(&self, node: NodeId) -> impl Iterator<Item = &LogRecord> {
        self.logs.iter().filter(move |r| r.node == node)
    }

    /// Cyclic gap between two nodes at the end of the run.
    pub fn phase_gap(&self, a: NodeId, b: NodeId, period: u64) -> Option<u64> {
        self.metrics.latest_snapshot()?.gap(a, b, period)
    }
}
