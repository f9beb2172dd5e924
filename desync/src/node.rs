//! Node implementation - the desynchronization state machine.
//!
//! A node owns its neighbor knowledge, its path vector, its timer handle and
//! its rng. It never touches another node: all interaction goes through a
//! [`Scheduler`], which the driver lends to the node for one event at a time.
//!
//! ```text
//!              activate                 timer / receive
//!  Inactive ─────────────▶ HoldingSlot ─────────────────▶ Waiting
//!     ▲                        ▲                             │
//!     │ loop detected          └──────── timer fire ─────────┘
//!     └────────────── (any active state)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use desync::traits::test_impls::RecordingScheduler;
//! use desync::{Node, NodeState, ProtocolConfig, Timestamp};
//!
//! let mut sched = RecordingScheduler::new();
//! let mut node = Node::new(0, ProtocolConfig::default(), Timestamp::ZERO);
//! node.set_links([1, 2]);
//!
//! node.activate(&mut sched);
//! assert_eq!(node.state(), NodeState::HoldingSlot);
//! // One receive per neighbor plus the periodic timer.
//! assert_eq!(sched.pending().len(), 3);
//! ```

use hashbrown::HashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::config::ProtocolConfig;
use crate::log::{LogKind, LogRecord};
use crate::time::{Duration, Timestamp};
use crate::traits::Scheduler;
use crate::types::{Action, EventHandle, NodeId, NodeState, PathVector, PER_MILLE};
use crate::wire::{self, DecodeError};

/// Neighbor id -> time that neighbor was last heard from.
pub type NeighborMap = HashMap<NodeId, Timestamp>;

/// Failure of a single event handler. Never fatal to the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node {node}: malformed path vector from {sender}: {source}")]
    Decode {
        node: NodeId,
        sender: NodeId,
        #[source]
        source: DecodeError,
    },
}

/// What a rebalance step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebalance {
    /// Own share already covers the sender's fair share.
    Satisfied,
    /// Own id came back in the sender's path vector; node backed off.
    LoopReset { reactivate_at: Timestamp },
    /// Next broadcast moved.
    Adjusted { from: Timestamp, to: Timestamp },
}

/// Forward distance from `b` to `a` on a circle of length `period`.
///
/// Always within `[0, period)`; zero for a zero period.
pub fn cyclic_distance(a: u64, b: u64, period: u64) -> u64 {
    if period == 0 {
        return 0;
    }
    ((a % period) + period - (b % period)) % period
}

/// The desynchronization protocol node.
pub struct Node {
    node_id: NodeId,
    config: ProtocolConfig,

    // State
    active: bool,
    slot_held: bool,
    latest_broadcast: Option<Timestamp>,
    next_broadcast: Timestamp,
    timer: Option<EventHandle>,

    // Knowledge
    neighbor_map: NeighborMap,
    path_vector: PathVector,
    links: Vec<NodeId>,

    rng: ChaCha8Rng,
    log: Vec<LogRecord>,
}

impl Node {
    /// Create an inactive node. The rng is seeded from `node_id`, so two
    /// nodes with the same id and config behave identically.
    pub fn new(node_id: NodeId, config: ProtocolConfig, created_at: Timestamp) -> Self {
        Self {
            node_id,
            config,
            active: false,
            slot_held: false,
            latest_broadcast: None,
            next_broadcast: Timestamp::ZERO,
            timer: None,
            neighbor_map: NeighborMap::new(),
            path_vector: PathVector::new(),
            links: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(u64::from(node_id)),
            log: vec![LogRecord::bare(created_at, node_id, LogKind::Init)],
        }
    }

    /// Install the neighbors this node transmits to. Sorted and deduplicated
    /// so broadcast order does not depend on the caller.
    pub fn set_links(&mut self, links: impl IntoIterator<Item = NodeId>) {
        let mut links: Vec<NodeId> = links.into_iter().filter(|&l| l != self.node_id).collect();
        links.sort_unstable();
        links.dedup();
        self.links = links;
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_slot_held(&self) -> bool {
        self.slot_held
    }

    pub fn state(&self) -> NodeState {
        match (self.active, self.slot_held) {
            (false, _) => NodeState::Inactive,
            (true, true) => NodeState::HoldingSlot,
            (true, false) => NodeState::Waiting,
        }
    }

    /// Time of the latest broadcast since the last (re)activation.
    pub fn latest_broadcast(&self) -> Option<Timestamp> {
        self.latest_broadcast
    }

    /// Nominal (pre-jitter) time of the next broadcast.
    pub fn next_broadcast(&self) -> Timestamp {
        self.next_broadcast
    }

    /// Handle of the pending periodic timer, if any.
    pub fn timer(&self) -> Option<EventHandle> {
        self.timer
    }

    pub fn neighbor_map(&self) -> &NeighborMap {
        &self.neighbor_map
    }

    /// Number of neighbors heard from, advertised as degree in broadcasts.
    pub fn degree(&self) -> u32 {
        u32::try_from(self.neighbor_map.len()).unwrap_or(u32::MAX)
    }

    pub fn path_vector(&self) -> &[NodeId] {
        &self.path_vector
    }

    pub fn links(&self) -> &[NodeId] {
        &self.links
    }

    pub fn log(&self) -> &[LogRecord] {
        &self.log
    }

    /// Dispatch one event addressed to this node.
    pub fn handle<S: Scheduler>(&mut self, sched: &mut S, action: Action) -> Result<(), NodeError> {
        match action {
            Action::Activate => {
                self.activate(sched);
                Ok(())
            }
            Action::TimerFire => {
                self.on_timer_fire(sched);
                Ok(())
            }
            Action::Receive {
                sender,
                degree,
                path_vector,
            } => self.on_receive(sched, sender, degree, &path_vector),
        }
    }

    /// Turn on, broadcast immediately and start the periodic timer.
    pub fn activate<S: Scheduler>(&mut self, sched: &mut S) {
        let now = sched.now();
        info!(node = self.node_id, time = %now, "activating");

        self.active = true;
        self.broadcast(sched);
        self.next_broadcast = now + self.config.period();
        self.set_timer(sched, self.next_broadcast);
    }

    /// Send the beacon to every linked neighbor and open a new slot.
    pub fn broadcast<S: Scheduler>(&mut self, sched: &mut S) {
        let now = sched.now();
        let degree = self.degree();
        let encoded = wire::encode(&self.path_vector);

        for &neighbor in &self.links {
            sched.schedule(
                now,
                neighbor,
                Action::Receive {
                    sender: self.node_id,
                    degree,
                    path_vector: encoded.clone(),
                },
            );
        }
        debug!(
            node = self.node_id,
            time = %now,
            degree,
            path_vector = %encoded,
            fanout = self.links.len(),
            "broadcast"
        );

        self.path_vector.clear();
        self.log
            .push(LogRecord::bare(now, self.node_id, LogKind::Broadcast));
        if self.slot_held {
            self.close_slot(now);
        }
        self.slot_held = true;
        self.latest_broadcast = Some(now);
    }

    /// Close the current slot and log how far its length was from the fair
    /// share. Returns the deficit; positive means the slot was too short.
    pub fn close_slot(&mut self, now: Timestamp) -> f64 {
        let fair = self.fair_share().as_ticks().max(1) as f64;
        let actual = self
            .latest_broadcast
            .map_or(0, |latest| now.saturating_sub(latest).as_ticks()) as f64;
        let deficit = (fair - actual) / fair;

        trace!(node = self.node_id, time = %now, deficit, "slot closed");
        self.log.push(LogRecord::new(
            now,
            self.node_id,
            LogKind::Deficit,
            deficit.to_string(),
        ));
        self.slot_held = false;
        deficit
    }

    /// Handle a neighbor's broadcast. Ignored while inactive.
    pub fn on_receive<S: Scheduler>(
        &mut self,
        sched: &mut S,
        sender: NodeId,
        degree: u32,
        encoded_path_vector: &str,
    ) -> Result<(), NodeError> {
        if !self.active {
            trace!(node = self.node_id, sender, "inactive, dropping receive");
            return Ok(());
        }

        let now = sched.now();
        if self.slot_held {
            self.close_slot(now);
        }
        self.neighbor_map.insert(sender, now);

        let sender_pv = wire::decode(encoded_path_vector).map_err(|source| NodeError::Decode {
            node: self.node_id,
            sender,
            source,
        })?;
        self.rebalance(sched, sender, degree, &sender_pv);
        Ok(())
    }

    /// Periodic timer expired: broadcast and rearm. Ignored while inactive.
    pub fn on_timer_fire<S: Scheduler>(&mut self, sched: &mut S) {
        if !self.active {
            trace!(node = self.node_id, "inactive, dropping timer");
            return;
        }

        let now = sched.now();
        self.broadcast(sched);
        self.next_broadcast = now + self.config.period();
        self.set_timer(sched, self.next_broadcast);
    }

    /// Move the next broadcast so the sender gets at least its fair share of
    /// the period before this node transmits again.
    pub fn rebalance<S: Scheduler>(
        &mut self,
        sched: &mut S,
        sender: NodeId,
        sender_degree: u32,
        sender_path_vector: &[NodeId],
    ) -> Rebalance {
        let now = sched.now();
        let period = i64::try_from(self.config.period).unwrap_or(i64::MAX);

        let sender_share = period / (i64::from(sender_degree.max(1)) + 1);
        let own_share = self.next_broadcast.signed_diff(now);
        let slack = period.saturating_mul(i64::from(self.config.tolerance_per_mille));
        if (own_share - sender_share).saturating_mul(i64::from(PER_MILLE)) > -slack {
            return Rebalance::Satisfied;
        }

        if self.config.path_vector_enabled {
            if sender_path_vector.contains(&self.node_id) {
                let reactivate_at = self.reset(sched);
                return Rebalance::LoopReset { reactivate_at };
            }
            self.path_vector.clear();
            self.path_vector.extend_from_slice(sender_path_vector);
            self.path_vector.push(self.node_id);
        }

        let mut target = now.offset(sender_share);
        if self.config.clamping_enabled {
            if let Some(successor) = self.successor_expiry() {
                target = target.min(successor);
            }
        }

        let from = self.next_broadcast;
        let alpha = u128::from(self.config.alpha);
        let blended = (u128::from(from.as_ticks()) * (100 - alpha)
            + u128::from(target.as_ticks()) * alpha)
            / 100;
        // Blending can land at or before now when the schedule is overdue.
        let to = Timestamp::from_ticks(u64::try_from(blended).unwrap_or(u64::MAX))
            .max(now + Duration::TICK);

        debug!(
            node = self.node_id,
            time = %now,
            sender,
            sender_share,
            own_share,
            from = %from,
            to = %to,
            "rebalance"
        );
        self.next_broadcast = to;
        self.set_timer(sched, to);
        Rebalance::Adjusted { from, to }
    }

    /// Fair share of the period for this node given its known neighbors.
    pub fn fair_share(&self) -> Duration {
        self.config
            .period()
            .checked_div(self.neighbor_map.len() as u64 + 1)
            .unwrap_or(Duration::ZERO)
    }

    /// Soonest projected broadcast of any known neighbor at or after
    /// `next_broadcast`, projecting each last-heard time cyclically over the
    /// period. `None` without neighbors.
    pub fn successor_expiry(&self) -> Option<Timestamp> {
        let period = self.config.period;
        let base = self.next_broadcast.as_ticks();
        self.neighbor_map
            .values()
            .map(|heard| cyclic_distance(heard.as_ticks(), base, period))
            .min()
            .map(|distance| self.next_broadcast + Duration::from_ticks(distance))
    }

    /// Drop out after a detected adjustment loop and schedule a fresh start.
    fn reset<S: Scheduler>(&mut self, sched: &mut S) -> Timestamp {
        let now = sched.now();
        self.log
            .push(LogRecord::bare(now, self.node_id, LogKind::Reset));

        self.active = false;
        self.slot_held = false;
        self.latest_broadcast = None;
        self.path_vector.clear();
        self.neighbor_map.clear();
        if let Some(timer) = self.timer.take() {
            sched.cancel(timer);
        }

        let delay = self.rng.gen_range(0..self.config.period);
        let reactivate_at = now + Duration::from_ticks(delay);
        sched.schedule(reactivate_at, self.node_id, Action::Activate);

        info!(
            node = self.node_id,
            time = %now,
            reactivate_at = %reactivate_at,
            "adjustment loop detected, backing off"
        );
        reactivate_at
    }

    /// Replace the pending timer with one due at `nominal` plus fresh jitter.
    fn set_timer<S: Scheduler>(&mut self, sched: &mut S, nominal: Timestamp) {
        let now = sched.now();
        if let Some(previous) = self.timer.take() {
            sched.cancel(previous);
        }

        let due = nominal.offset(self.jitter()).max(now + Duration::TICK);
        self.timer = Some(sched.schedule(due, self.node_id, Action::TimerFire));
    }

    fn jitter(&mut self) -> i64 {
        let bound = i64::try_from(self.config.jitter_bound).unwrap_or(i64::MAX);
        self.rng.gen_range(-bound..=bound)
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("state", &self.state())
            .field("latest_broadcast", &self.latest_broadcast)
            .field("next_broadcast", &self.next_broadcast)
            .field("neighbors", &self.neighbor_map.len())
            .field("path_vector", &self.path_vector)
            .finish()
    }
}
