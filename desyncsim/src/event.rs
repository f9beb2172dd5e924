//! Event types and ordering for discrete event simulation.

use std::cmp::Ordering;

use desync::{Action, EventHandle, NodeId, Timestamp};

/// Unique sequence number for deterministic event ordering.
///
/// Assigned from a monotonic counter at scheduling time, so it doubles as
/// the event's cancellation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn handle(&self) -> EventHandle {
        EventHandle::new(self.0)
    }
}

impl From<EventHandle> for SequenceNumber {
    fn from(handle: EventHandle) -> Self {
        Self(handle.value())
    }
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// Node the action is addressed to.
    pub target: NodeId,
    /// The work to perform.
    pub action: Action,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, target: NodeId, action: Action) -> Self {
        Self {
            time,
            seq,
            target,
            action,
        }
    }
}

// Implement ordering for min-heap (BinaryHeap is max-heap, so we reverse).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap).
        // First compare by time, then by sequence number.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
