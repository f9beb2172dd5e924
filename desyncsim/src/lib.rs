//! desyncsim - Discrete event simulator for the desync protocol.
//!
//! This crate provides a deterministic, discrete-event simulator that runs
//! many desync nodes on one logical timeline.
//!
//! # Features
//!
//! - **Discrete event simulation**: No real-time delays, deterministic ordering
//! - **Multiple nodes in single process**: Nodes only interact through events
//! - **Configurable topology**: Complete, chain, ring, star, random geometric,
//!   Erdős–Rényi, or adjacency-list files
//! - **Scenario builder**: Seeded topologies and start offsets
//! - **Metrics collection**: Phase snapshots, broadcast/receive/reset counts
//!
//! # Example
//!
//! ```
//! use desyncsim::{Duration, ScenarioBuilder};
//!
//! // Three fully connected nodes starting at random offsets
//! let result = ScenarioBuilder::new(3)
//!     .with_seed(42)
//!     .complete()
//!     .run_for(Duration::from_ticks(20_000))
//!     .unwrap();
//!
//! assert!(result.metrics.broadcasts > 0);
//! assert!(!result.queue_exhausted);
//! ```
//!
//! # Architecture
//!
//! The simulator uses a priority queue of events ordered by (time, sequence_number).
//! The main loop:
//! 1. Pop next event from queue
//! 2. Advance simulation time
//! 3. Hand the event to its target node together with the queue
//! 4. The node schedules receives for its neighbors and its own timer
//!
//! Nodes never see each other; a broadcast is a set of receive events due at
//! the current instant, one per linked neighbor.

pub mod event;
pub mod metrics;
pub mod queue;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use desync::{Duration, NodeId, ProtocolConfig, Scheduler, Timestamp};
pub use event::{ScheduledEvent, SequenceNumber};
pub use metrics::{NodePhase, PhaseSnapshot, SimMetrics, SimulationResult};
pub use queue::EventQueue;
pub use scenario::{simple_scenario, ScenarioBuilder, ScenarioError, StartOffsets};
pub use sim::Simulator;
pub use topology::{Topology, TopologyError};
