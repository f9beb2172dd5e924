//! Core types and constants for the desync protocol.

use core::fmt;

// Default protocol constants (in ticks unless noted)
pub const DEFAULT_PERIOD: u64 = 1000;
pub const DEFAULT_JITTER_BOUND: u64 = 10;
pub const DEFAULT_ALPHA: u8 = 50; // percent
pub const DEFAULT_TOLERANCE_PER_MILLE: u32 = 1;

// Bounds
pub const MAX_ALPHA: u8 = 100;
/// Largest period the signed share arithmetic can represent.
pub const MAX_PERIOD: u64 = i64::MAX as u64;
pub const PER_MILLE: u32 = 1000;

/// Node identifier. Also used as the seed of the node's private rng.
pub type NodeId = u32;

/// Ordered chain of node ids recording which nodes adjusted their offset
/// because of whom since the last broadcast.
pub type PathVector = Vec<NodeId>;

/// Handle to a scheduled event, used to cancel it.
///
/// Handles are never reused within one scheduler, so a stale handle can only
/// refer to an event that already fired or was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle(u64);

impl EventHandle {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Work a scheduled event performs on its target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Turn the node on: broadcast immediately and start the periodic timer.
    Activate,
    /// Deliver a neighbor's broadcast.
    Receive {
        sender: NodeId,
        /// Sender's neighbor count at broadcast time.
        degree: u32,
        /// Sender's path vector in wire encoding.
        path_vector: String,
    },
    /// The node's own periodic timer expired.
    TimerFire,
}

impl Action {
    /// Short name used in trace output.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Activate => "activate",
            Action::Receive { .. } => "receive",
            Action::TimerFire => "timer",
        }
    }
}

/// Externally visible protocol state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Off, either never activated or backing off after a loop reset.
    Inactive,
    /// On, between slots.
    Waiting,
    /// On, owning the slot opened by its latest broadcast.
    HoldingSlot,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Inactive => write!(f, "inactive"),
            NodeState::Waiting => write!(f, "waiting"),
            NodeState::HoldingSlot => write!(f, "holding-slot"),
        }
    }
}
