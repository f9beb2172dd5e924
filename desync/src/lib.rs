#![forbid(unsafe_code)]
//! desync - Decentralized desynchronization protocol
//!
//! Nodes sharing a broadcast medium learn, without any coordinator, to spread
//! their periodic beacons evenly over a fixed period instead of colliding.
//!
//! # Key Properties
//!
//! - Every node broadcasts once per period and remembers when it last heard
//!   each neighbor
//! - A node whose next broadcast would cut into a neighbor's fair share of
//!   the period pushes its own schedule back (exponential blending)
//! - The push is bounded by the next known neighbor's projected broadcast
//!   (successor clamping)
//! - Broadcasts carry a path vector of the nodes that adjusted because of
//!   each other; a node that finds itself in the chain backs off and restarts
//!   (loop detection)
//! - All time is logical; all randomness comes from a per-node rng seeded by
//!   the node id, so runs are reproducible
//!
//! # Example (with the `test-support` feature)
//!
//! ```ignore
//! use desync::traits::test_impls::RecordingScheduler;
//! use desync::{Action, Node, ProtocolConfig, Timestamp};
//!
//! let config = ProtocolConfig::default().with_jitter_bound(0);
//! let mut sched = RecordingScheduler::new();
//! let mut node = Node::new(7, config, Timestamp::ZERO);
//! node.set_links([1]);
//! node.handle(&mut sched, Action::Activate).unwrap();
//!
//! // Next beacon one period later.
//! assert_eq!(node.next_broadcast(), Timestamp::from_ticks(1000));
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Node ids, event handles, actions, constants
//! - [`time`] - Logical Timestamp and Duration
//! - [`config`] - Per-simulation protocol configuration
//! - [`wire`] - Path vector encoding
//! - [`log`] - Per-node protocol log records
//! - [`traits`] - The Scheduler seam between nodes and the event queue
//! - [`node`] - The protocol state machine

pub mod config;
pub mod log;
pub mod node;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{ConfigError, ProtocolConfig};
pub use log::{LogKind, LogRecord};
pub use node::{cyclic_distance, NeighborMap, Node, NodeError, Rebalance};
pub use time::{Duration, Timestamp};
pub use traits::Scheduler;
pub use types::{Action, EventHandle, NodeId, NodeState, PathVector};
pub use wire::DecodeError;

// Re-export constants
pub use types::{DEFAULT_ALPHA, DEFAULT_JITTER_BOUND, DEFAULT_PERIOD, DEFAULT_TOLERANCE_PER_MILLE};

#[cfg(test)]
mod tests {
    use super::traits::test_impls::RecordingScheduler;
    use super::*;

    /// Feed every scheduled receive straight back into the addressed node,
    /// in scheduling order, until nothing at `now` is left.
    fn deliver_all(nodes: &mut [Node], sched: &mut RecordingScheduler, from: usize) {
        let mut cursor = from;
        while cursor < sched.scheduled().len() {
            let ev = sched.scheduled()[cursor].clone();
            cursor += 1;
            if ev.at != sched.now() || !matches!(ev.action, Action::Receive { .. }) {
                continue;
            }
            nodes[ev.target as usize].handle(sched, ev.action).unwrap();
        }
    }

    #[test]
    fn test_three_nodes_learn_degrees() {
        let config = ProtocolConfig::default().with_jitter_bound(0);
        let mut nodes: Vec<Node> = (0..3)
            .map(|id| {
                let mut n = Node::new(id, config, Timestamp::ZERO);
                n.set_links((0..3).filter(|&o| o != id));
                n
            })
            .collect();
        let mut sched = RecordingScheduler::new();

        for i in 0..3 {
            let mark = sched.scheduled().len();
            nodes[i].activate(&mut sched);
            deliver_all(&mut nodes, &mut sched, mark);
        }

        // Node 0 activated first and heard both later nodes.
        assert_eq!(nodes[0].degree(), 2);
        // Node 2 activated last, nobody broadcast after it.
        assert_eq!(nodes[1].degree(), 1);
        assert_eq!(nodes[2].degree(), 0);
    }

    #[test]
    fn test_config_error_display() {
        let err = ProtocolConfig::default().with_alpha(200).validate().unwrap_err();
        assert_eq!(err.to_string(), "alpha must be within 0..=100, got 200");
    }
}
