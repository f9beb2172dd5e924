//! The logical clock and pending-event queue.
//!
//! Events live in a `BinaryHeap` ordered by `(time, sequence)`. Cancellation
//! is lazy: a cancelled event stays in the heap but its sequence number is
//! removed from the live set, and [`EventQueue::pop`] skips it.

use std::collections::BinaryHeap;

use desync::{Action, EventHandle, NodeId, Scheduler, Timestamp};
use hashbrown::HashSet;
use tracing::warn;

use crate::event::{ScheduledEvent, SequenceNumber};

/// Pending events plus the current logical time.
#[derive(Debug, Default)]
pub struct EventQueue {
    /// Current simulation time; never decreases.
    now: Timestamp,
    /// Priority queue of scheduled events, cancelled ones included.
    heap: BinaryHeap<ScheduledEvent>,
    /// Sequence numbers of events that are scheduled and not cancelled.
    live: HashSet<SequenceNumber>,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// Events handed out by `pop`.
    fired: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue whose clock starts at `start` instead of zero.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now: start,
            ..Self::default()
        }
    }

    /// Number of live (scheduled, not cancelled, not fired) events.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of events fired so far.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Whether `handle` refers to an event that has yet to fire.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.live.contains(&SequenceNumber::from(handle))
    }

    /// Due time of the earliest live event.
    pub fn peek_time(&mut self) -> Option<Timestamp> {
        self.discard_cancelled();
        self.heap.peek().map(|event| event.time)
    }

    /// Remove the earliest live event and advance the clock to its due time.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.discard_cancelled();
        let event = self.heap.pop()?;
        self.live.remove(&event.seq);
        self.advance_to(event.time);
        self.fired += 1;
        Some(event)
    }

    /// Move the clock forward without firing anything. Earlier times are
    /// ignored.
    pub fn advance_to(&mut self, time: Timestamp) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Drop cancelled events sitting at the top of the heap.
    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.contains(&top.seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl Scheduler for EventQueue {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn schedule(&mut self, at: Timestamp, target: NodeId, action: Action) -> EventHandle {
        let at = if at < self.now {
            warn!(
                target_node = target,
                requested = %at,
                now = %self.now,
                "event scheduled in the past, clamping to now"
            );
            self.now
        } else {
            at
        };

        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.live.insert(seq);
        self.heap.push(ScheduledEvent::new(at, seq, target, action));
        seq.handle()
    }

    fn cancel(&mut self, handle: EventHandle) -> bool {
        self.live.remove(&SequenceNumber::from(handle))
    }
}
