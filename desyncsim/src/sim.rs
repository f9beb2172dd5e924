//! Discrete event simulator for desync networks.

use std::collections::BTreeMap;

use desync::{
    Action, ConfigError, Duration, EventHandle, LogKind, LogRecord, Node, NodeId, ProtocolConfig,
    Scheduler, Timestamp,
};
use tracing::{info, trace, warn};

use crate::event::ScheduledEvent;
use crate::metrics::{NodePhase, PhaseSnapshot, SimMetrics, SimulationResult};
use crate::queue::EventQueue;
use crate::topology::{Topology, TopologyError};

/// Discrete event simulator for desync networks.
pub struct Simulator {
    /// Shared protocol settings, validated once.
    config: ProtocolConfig,
    /// All nodes in the simulation, in id order.
    nodes: BTreeMap<NodeId, Node>,
    /// Network topology.
    topology: Topology,
    /// Clock and pending events.
    queue: EventQueue,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Interval for automatic snapshots.
    snapshot_interval: Option<Duration>,
    /// Next snapshot time.
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    /// Create an empty simulator. Fails on an invalid configuration, before
    /// any event exists.
    pub fn new(config: ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            nodes: BTreeMap::new(),
            topology: Topology::new(),
            queue: EventQueue::new(),
            metrics: SimMetrics::new(),
            snapshot_interval: None,
            next_snapshot: None,
        })
    }

    /// Set the network topology. Links of nodes already added are replaced.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        for (&id, node) in self.nodes.iter_mut() {
            node.set_links(self.topology.neighbors(id));
        }
        self
    }

    /// Set the snapshot interval for automatic phase recording.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.queue.now() + interval);
        self
    }

    /// Add an inactive node linked to its topology neighbors. Returns
    /// `false` if the id was already present.
    pub fn add_node(&mut self, node_id: NodeId) -> bool {
        if self.nodes.contains_key(&node_id) {
            return false;
        }
        let mut node = Node::new(node_id, self.config, self.queue.now());
        node.set_links(self.topology.neighbors(node_id));
        self.nodes.insert(node_id, node);
        true
    }

    /// Add every node of the topology.
    pub fn add_topology_nodes(&mut self) -> Vec<NodeId> {
        let ids = self.topology.nodes();
        for &id in &ids {
            self.add_node(id);
        }
        ids
    }

    /// Get a reference to a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get all node IDs in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the current simulation time.
    pub fn current_time(&self) -> Timestamp {
        self.queue.now()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Get the topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Get collected metrics.
    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Number of events still waiting to fire.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Schedule `node` to activate at `at`.
    pub fn activate_at(&mut self, node: NodeId, at: Timestamp) -> Result<EventHandle, TopologyError> {
        self.schedule_for(node, at, Action::Activate)
    }

    /// Deliver a hand-made broadcast to `target` at `at`, as if `sender` had
    /// sent it. The path vector is passed through undecoded.
    pub fn inject_receive(
        &mut self,
        at: Timestamp,
        target: NodeId,
        sender: NodeId,
        degree: u32,
        path_vector: impl Into<String>,
    ) -> Result<EventHandle, TopologyError> {
        self.schedule_for(
            target,
            at,
            Action::Receive {
                sender,
                degree,
                path_vector: path_vector.into(),
            },
        )
    }

    fn schedule_for(
        &mut self,
        node: NodeId,
        at: Timestamp,
        action: Action,
    ) -> Result<EventHandle, TopologyError> {
        if !self.nodes.contains_key(&node) {
            return Err(TopologyError::UnknownNode(node));
        }
        Ok(self.queue.schedule(at, node, action))
    }

    /// Process the next event, if any. Returns whether one was processed.
    pub fn step(&mut self) -> bool {
        match self.queue.pop() {
            Some(event) => {
                self.process_event(event);
                self.maybe_take_snapshot();
                true
            }
            None => false,
        }
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while let Some(time) = self.queue.peek_time() {
            if time > end_time {
                break;
            }
            self.step();
        }

        // Advance to end_time even if no more events
        self.queue.advance_to(end_time);
        self.finish()
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.queue.now() + duration)
    }

    /// Run until event queue is empty or max events processed.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        let mut processed = 0;
        while processed < max_events && self.step() {
            processed += 1;
        }
        self.finish()
    }

    /// Process a single event.
    fn process_event(&mut self, event: ScheduledEvent) {
        self.metrics.events_processed += 1;
        trace!(
            node = event.target,
            time = %event.time,
            kind = event.action.kind(),
            "dispatch"
        );

        let Some(node) = self.nodes.get_mut(&event.target) else {
            warn!(node = event.target, time = %event.time, "event for unknown node dropped");
            self.metrics.unknown_targets += 1;
            return;
        };

        match &event.action {
            Action::Activate => self.metrics.activations += 1,
            Action::TimerFire => self.metrics.timer_fires += 1,
            Action::Receive { .. } if node.is_active() => self.metrics.receives_delivered += 1,
            Action::Receive { .. } => self.metrics.receives_ignored += 1,
        }

        let logged = node.log().len();
        if let Err(err) = node.handle(&mut self.queue, event.action) {
            warn!(node = event.target, time = %event.time, error = %err, "receive failed");
            self.metrics.receive_errors += 1;
        }

        for record in &node.log()[logged..] {
            match record.kind {
                LogKind::Broadcast => self.metrics.broadcasts += 1,
                LogKind::Reset => self.metrics.resets += 1,
                LogKind::Init | LogKind::Deficit => {}
            }
        }
    }

    /// Check if we should take a snapshot and do so.
    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.queue.now() >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record every node's current schedule.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = PhaseSnapshot::new(self.queue.now());

        for (&node_id, node) in &self.nodes {
            snapshot.record_node(
                node_id,
                NodePhase {
                    state: node.state(),
                    latest_broadcast: node.latest_broadcast(),
                    next_broadcast: node.next_broadcast(),
                    degree: node.degree(),
                },
            );
        }

        self.metrics.add_snapshot(snapshot);
    }

    /// Every node's log concatenated in node id order.
    pub fn logs(&self) -> Vec<LogRecord> {
        self.nodes
            .values()
            .flat_map(|node| node.log().iter().cloned())
            .collect()
    }

    fn finish(&mut self) -> SimulationResult {
        self.take_snapshot();
        info!(
            time = %self.queue.now(),
            events = self.metrics.events_processed,
            broadcasts = self.metrics.broadcasts,
            resets = self.metrics.resets,
            receive_errors = self.metrics.receive_errors,
            "simulation stopped"
        );

        SimulationResult {
            end_time: self.queue.now(),
            metrics: self.metrics.clone(),
            queue_exhausted: self.queue.is_empty(),
            logs: self.logs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> ProtocolConfig {
        ProtocolConfig::default().with_jitter_bound(0)
    }

    fn at(ticks: u64) -> Timestamp {
        Timestamp::from_ticks(ticks)
    }

    fn sim_with(topology: Topology, config: ProtocolConfig) -> Simulator {
        let mut sim = Simulator::new(config).unwrap().with_topology(topology);
        sim.add_topology_nodes();
        sim
    }

    #[test]
    fn test_simulator_creation() {
        let sim = Simulator::new(ProtocolConfig::default()).unwrap();
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_ids().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Simulator::new(ProtocolConfig::default().with_period(0)).err();
        assert_eq!(err, Some(ConfigError::ZeroPeriod));
    }

    #[test]
    fn test_add_nodes() {
        let mut sim = Simulator::new(quiet()).unwrap();
        assert!(sim.add_node(1));
        assert!(sim.add_node(2));
        assert!(!sim.add_node(1));

        assert_eq!(sim.node_ids(), vec![1, 2]);
        assert!(!sim.node(1).unwrap().is_active());
    }

    #[test]
    fn test_with_topology_relinks_existing_nodes() {
        let mut sim = Simulator::new(quiet()).unwrap();
        sim.add_node(0);
        sim.add_node(1);
        assert!(sim.node(0).unwrap().links().is_empty());

        let sim = sim.with_topology(Topology::complete(&[0, 1]));
        assert_eq!(sim.node(0).unwrap().links(), &[1]);
        assert_eq!(sim.node(1).unwrap().links(), &[0]);
    }

    #[test]
    fn test_unknown_node_rejected() {
        let mut sim = Simulator::new(quiet()).unwrap();
        assert_eq!(
            sim.activate_at(3, Timestamp::ZERO),
            Err(TopologyError::UnknownNode(3))
        );
    }

    #[test]
    fn test_run_single_node() {
        let mut sim = sim_with(Topology::isolated(&[0]), quiet());
        sim.activate_at(0, Timestamp::ZERO).unwrap();

        let result = sim.run_until(at(3500));

        // Activation plus timers at 1000, 2000, 3000.
        assert_eq!(result.metrics.broadcasts, 4);
        assert_eq!(result.metrics.timer_fires, 3);
        assert_eq!(result.end_time, at(3500));
        assert!(!result.queue_exhausted);
        assert_eq!(sim.node(0).unwrap().latest_broadcast(), Some(at(3000)));
    }

    #[test]
    fn test_receives_to_inactive_nodes_are_ignored() {
        let mut sim = sim_with(Topology::complete(&[0, 1]), quiet());
        sim.activate_at(0, Timestamp::ZERO).unwrap();

        let result = sim.run_until(at(10));
        assert_eq!(result.metrics.receives_ignored, 1);
        assert_eq!(result.metrics.receives_delivered, 0);
        assert!(sim.node(1).unwrap().neighbor_map().is_empty());
    }

    #[test]
    fn test_run_events_budget() {
        let mut sim = sim_with(Topology::isolated(&[0]), quiet());
        sim.activate_at(0, Timestamp::ZERO).unwrap();

        let result = sim.run_events(2);
        assert_eq!(result.metrics.events_processed, 2);
        assert_eq!(result.end_time, at(1000));
    }

    #[test]
    fn test_queue_exhausted_without_nodes_active() {
        let mut sim = sim_with(Topology::complete(&[0, 1]), quiet());
        let result = sim.run_events(100);
        assert!(result.queue_exhausted);
        assert_eq!(result.metrics.events_processed, 0);
        assert_eq!(result.count(LogKind::Init), 2);
    }

    #[test]
    fn test_decode_error_counted_and_run_continues() {
        let mut sim = sim_with(Topology::complete(&[0, 1]), quiet());
        sim.activate_at(0, Timestamp::ZERO).unwrap();
        sim.inject_receive(at(500), 0, 1, 1, "7,x").unwrap();

        let result = sim.run_until(at(2500));
        assert_eq!(result.metrics.receive_errors, 1);
        assert!(sim.node(0).unwrap().is_active());
        assert_eq!(sim.node(0).unwrap().latest_broadcast(), Some(at(2000)));
    }

    #[test]
    fn test_snapshot_interval() {
        let mut sim = sim_with(Topology::isolated(&[0]), quiet())
            .with_snapshot_interval(Duration::from_ticks(1000));
        sim.activate_at(0, Timestamp::ZERO).unwrap();

        let result = sim.run_until(at(3000));
        let times: Vec<_> = result
            .metrics
            .snapshots
            .iter()
            .map(|s| s.time.as_ticks())
            .collect();
        assert_eq!(times, vec![1000, 2000, 3000, 3000]);
    }
}
