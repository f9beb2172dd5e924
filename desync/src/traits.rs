//! The seam between protocol nodes and whatever drives logical time.
//!
//! A [`Node`](crate::Node) never owns the event queue. Each handler borrows a
//! [`Scheduler`] for the duration of one event and uses it to read the
//! current time, enqueue deliveries and timers, and cancel its pending timer.
//! The simulator's event queue is the production implementation;
//! [`test_impls::RecordingScheduler`] lets nodes be exercised in isolation.

use crate::time::Timestamp;
use crate::types::{Action, EventHandle, NodeId};

/// Logical clock plus event queue, as seen by a node.
pub trait Scheduler {
    /// Time of the event currently being processed.
    fn now(&self) -> Timestamp;

    /// Enqueue `action` for `target`, due at `at`.
    ///
    /// Implementations must fire events with equal due times in the order
    /// they were scheduled, and must never fire an event before `now()`.
    fn schedule(&mut self, at: Timestamp, target: NodeId, action: Action) -> EventHandle;

    /// Remove a pending event. Unknown, fired or already cancelled handles
    /// are ignored. Returns whether an event was removed.
    fn cancel(&mut self, handle: EventHandle) -> bool;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock scheduler for unit testing nodes without a simulator.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use hashbrown::HashSet;

    use super::*;

    /// An event recorded by [`RecordingScheduler`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Scheduled {
        pub handle: EventHandle,
        pub at: Timestamp,
        pub target: NodeId,
        pub action: Action,
    }

    /// Scheduler that records everything and never fires anything.
    ///
    /// Time only moves when the test calls [`set_now`](Self::set_now).
    #[derive(Debug, Default)]
    pub struct RecordingScheduler {
        now: Timestamp,
        next_handle: u64,
        scheduled: Vec<Scheduled>,
        cancelled: HashSet<EventHandle>,
    }

    impl RecordingScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(now: Timestamp) -> Self {
            Self {
                now,
                ..Self::default()
            }
        }

        pub fn set_now(&mut self, now: Timestamp) {
            self.now = now;
        }

        /// Every event ever scheduled, in scheduling order.
        pub fn scheduled(&self) -> &[Scheduled] {
            &self.scheduled
        }

        /// Scheduled events that have not been cancelled.
        pub fn pending(&self) -> Vec<&Scheduled> {
            self.scheduled
                .iter()
                .filter(|s| !self.cancelled.contains(&s.handle))
                .collect()
        }

        /// Pending events addressed to `target` whose action matches `pred`.
        pub fn pending_for(
            &self,
            target: NodeId,
            pred: impl Fn(&Action) -> bool,
        ) -> Vec<&Scheduled> {
            self.pending()
                .into_iter()
                .filter(|s| s.target == target && pred(&s.action))
                .collect()
        }

        pub fn is_cancelled(&self, handle: EventHandle) -> bool {
            self.cancelled.contains(&handle)
        }

        /// Forget everything recorded so far, keeping the clock.
        pub fn clear(&mut self) {
            self.scheduled.clear();
            self.cancelled.clear();
        }
    }

    impl Scheduler for RecordingScheduler {
        fn now(&self) -> Timestamp {
            self.now
        }

        fn schedule(&mut self, at: Timestamp, target: NodeId, action: Action) -> EventHandle {
            let handle = EventHandle::new(self.next_handle);
            self.next_handle += 1;
            self.scheduled.push(Scheduled {
                handle,
                at,
                target,
                action,
            });
            handle
        }

        fn cancel(&mut self, handle: EventHandle) -> bool {
            let known = self.scheduled.iter().any(|s| s.handle == handle);
            known && self.cancelled.insert(handle)
        }
    }
}
