//! The logical process: one sequential event timeline.
//!
//! A [`LogicalProcess`] owns a future event list, a clock triple
//! `(ts, context, uid)`, a monotonic uid counter, and its lookahead to
//! the rest of the topology. At most one worker drives a process per
//! round; the executor moves the process into that worker's thread-local
//! slot for the duration, so no field here needs synchronisation.

use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use skein_core::{Event, EventId, EventKey, EventQueue, Time, NO_CONTEXT, UID_INVALID, UID_VALID};
use skein_topo::{decode_hybrid, Topology};
use smallvec::SmallVec;

use crate::mailbox::{Envelope, Mailbox};

/// How node labels map to logical processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelMode {
    /// The label is the owning process id.
    Flat,
    /// The label packs `(local process, host rank)`.
    Hybrid {
        /// This host's rank.
        rank: u16,
    },
}

impl LabelMode {
    /// Decode a node label into `(process, rank)`; flat labels report
    /// rank 0.
    pub fn owner(self, system_id: u32) -> (u32, u16) {
        match self {
            LabelMode::Flat => (system_id, 0),
            LabelMode::Hybrid { .. } => {
                let (lp, rank) = decode_hybrid(system_id);
                (lp as u32, rank)
            }
        }
    }

    /// This host's rank (0 in flat mode).
    pub fn local_rank(self) -> u16 {
        match self {
            LabelMode::Flat => 0,
            LabelMode::Hybrid { rank } => rank,
        }
    }
}

/// One event timeline, driven by at most one worker per round.
pub struct LogicalProcess {
    system_id: u32,
    stop: bool,
    uid: u32,
    current_ts: u64,
    current_context: u32,
    current_uid: u32,
    event_count: u64,
    pending_event_count: u64,
    events: EventQueue,
    lookahead: Time,
    /// System ids of processes this one exchanges mailbox traffic with.
    peers: SmallVec<[u32; 4]>,
    exec_nanos: u64,
    round_exec_nanos: Vec<u64>,
    rng: ChaCha8Rng,
}

impl LogicalProcess {
    /// Create a process. Id 0 is the public process.
    pub fn new(system_id: u32, rng_seed: u32) -> LogicalProcess {
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed as u64);
        rng.set_stream(system_id as u64);
        LogicalProcess {
            system_id,
            stop: false,
            uid: UID_VALID,
            current_ts: 0,
            current_context: NO_CONTEXT,
            current_uid: 0,
            event_count: 0,
            pending_event_count: 0,
            events: EventQueue::new(),
            lookahead: Time::ZERO,
            peers: SmallVec::new(),
            exec_nanos: 0,
            round_exec_nanos: Vec::new(),
            rng,
        }
    }

    // ── Identity and clock ───────────────────────────────────────

    /// This process's id.
    pub fn system_id(&self) -> u32 {
        self.system_id
    }

    /// Current simulation time.
    pub fn now(&self) -> Time {
        Time::from_ts(self.current_ts)
    }

    /// Context of the event being executed.
    pub fn context(&self) -> u32 {
        self.current_context
    }

    /// Events executed so far.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Events drained from the mailbox at the last round boundary.
    pub fn pending_event_count(&self) -> u64 {
        self.pending_event_count
    }

    /// Wall-clock nanoseconds of the last round's event processing.
    pub fn exec_nanos(&self) -> u64 {
        self.exec_nanos
    }

    /// Per-round execution-time history.
    pub fn round_exec_history(&self) -> &[u64] {
        &self.round_exec_nanos
    }

    /// Lookahead to the nearest foreign process.
    pub fn lookahead(&self) -> Time {
        self.lookahead
    }

    /// Registered mailbox peers.
    pub fn peers(&self) -> &[u32] {
        &self.peers
    }

    /// Deterministic per-process random stream.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    // ── Lookahead ────────────────────────────────────────────────

    /// Recompute this process's lookahead from the labelled topology.
    ///
    /// The public process has zero lookahead. Every other process takes
    /// the minimum delay over point-to-point links leaving its node set,
    /// and registers the same-host processes on the far ends as mailbox
    /// peers. Links to other hosts bound the lookahead but exchange
    /// events over the bus, not the mailbox.
    pub fn calculate_lookahead(&mut self, topo: &Topology, mode: LabelMode) {
        self.peers.clear();
        if self.system_id == 0 {
            self.lookahead = Time::ZERO;
            return;
        }
        self.lookahead = Time::MAX;
        let local_rank = mode.local_rank();
        for node in 0..topo.node_count() {
            let (owner, rank) = mode.owner(topo.system_id(node));
            if owner != self.system_id || rank != local_rank {
                continue;
            }
            for (remote, delay) in topo.p2p_neighbors(node) {
                let (remote_owner, remote_rank) = mode.owner(topo.system_id(remote));
                if remote_owner == self.system_id && remote_rank == local_rank {
                    continue;
                }
                if delay < self.lookahead {
                    self.lookahead = delay;
                }
                if remote_rank == local_rank && !self.peers.contains(&remote_owner) {
                    self.peers.push(remote_owner);
                }
            }
        }
    }

    /// Tighten the lookahead to at most `bound`.
    ///
    /// Used by co-simulation couplings whose external constraint is
    /// tighter than any cut link.
    pub fn bound_lookahead(&mut self, bound: Time) {
        self.lookahead = self.lookahead.min(bound);
    }

    // ── Scheduling ───────────────────────────────────────────────

    fn next_uid(&mut self) -> u32 {
        let uid = self.uid;
        self.uid += 1;
        uid
    }

    /// Schedule `event` after `delay` under the current context.
    pub fn schedule(&mut self, delay: Time, event: Event) -> EventId {
        let key = EventKey {
            ts: self.current_ts + delay.ts(),
            context: self.current_context,
            uid: self.next_uid(),
        };
        self.events.insert(key, event.clone());
        EventId::new(event, key.ts, key.context, key.uid)
    }

    /// Schedule `event` at an absolute timestamp under an explicit
    /// context. Used for global events and partition transfer.
    pub fn schedule_at(&mut self, context: u32, ts: u64, event: Event) {
        let key = EventKey {
            ts,
            context,
            uid: self.next_uid(),
        };
        self.events.insert(key, event);
    }

    /// The local fast path of a cross-context schedule: the target node
    /// lives on this process.
    pub fn schedule_local_with_context(&mut self, context: u32, delay: Time, event: Event) {
        let ts = self.current_ts + delay.ts();
        self.schedule_at(context, ts, event);
    }

    /// Build the envelope for a cross-process schedule.
    ///
    /// The event keeps an invalid uid; the receiver assigns one when it
    /// drains its mailbox. The sender's current uid counter rides along
    /// as a deterministic tie-break.
    pub fn envelope_for(&self, context: u32, delay: Time, event: Event) -> Envelope {
        Envelope {
            sender_ts: self.current_ts,
            sender_id: self.system_id,
            sender_uid: self.uid,
            key: EventKey {
                ts: self.current_ts + delay.ts(),
                context,
                uid: UID_INVALID,
            },
            event,
        }
    }

    // ── Round execution ──────────────────────────────────────────

    /// Drain the inbound mailbox into the future event list, assigning
    /// fresh uids in deterministic sender order.
    pub fn receive_messages(&mut self, mailbox: &Mailbox) {
        self.pending_event_count = 0;
        let mut inserts: Vec<(EventKey, Event)> = Vec::new();
        mailbox.drain(|envelope| {
            debug_assert_eq!(envelope.key.uid, UID_INVALID);
            inserts.push((envelope.key, envelope.event));
        });
        for (mut key, event) in inserts {
            key.uid = self.next_uid();
            debug_assert!(
                key.ts >= self.current_ts,
                "mailbox event at {} behind process clock {} on system {}",
                key.ts,
                self.current_ts,
                self.system_id
            );
            self.events.insert(key, event);
            self.pending_event_count += 1;
        }
    }

    /// Pop the next event due at or before `granted`, advancing the
    /// clock triple. Returns `None` when the process is stopped or no
    /// due event remains. Cancelled events still advance the clock but
    /// the caller's invoke will report that nothing ran.
    pub fn pop_due(&mut self, granted: Time) -> Option<Event> {
        if self.stop {
            return None;
        }
        let key = self.events.peek()?;
        if Time::from_ts(key.ts) > granted {
            return None;
        }
        let (key, event) = self.events.pop().expect("peeked entry exists");
        self.current_ts = key.ts;
        self.current_context = key.context;
        self.current_uid = key.uid;
        Some(event)
    }

    /// Record one executed event. Called after an invoke that ran.
    pub fn note_executed(&mut self) {
        self.event_count += 1;
    }

    /// Prepare an immediate invocation: advance the clock to the event's
    /// key without queueing it. The executor invokes the event right
    /// after, on this process's thread-local binding.
    pub fn prepare_invoke(&mut self, key: EventKey) {
        self.current_ts = key.ts;
        self.current_context = key.context;
        self.current_uid = key.uid;
    }

    /// Record the wall-clock cost of the last round.
    pub fn record_round(&mut self, nanos: u64) {
        self.exec_nanos = nanos;
        self.round_exec_nanos.push(nanos);
    }

    /// Timestamp of the next pending event, or [`Time::MAX`] when the
    /// process is stopped or drained.
    pub fn next(&self) -> Time {
        if self.stop || self.events.is_empty() {
            Time::MAX
        } else {
            Time::from_ts(self.events.peek().expect("non-empty queue").ts)
        }
    }

    /// Whether this process has nothing left to do.
    pub fn is_local_finished(&self) -> bool {
        self.stop || self.events.is_empty()
    }

    /// Request a cooperative stop: the current event completes, the
    /// round loop then observes the flag and winds down.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    // ── Handle operations ────────────────────────────────────────

    /// Whether the handle no longer refers to a pending event.
    pub fn is_expired(&self, id: &EventId) -> bool {
        let event = match id.event() {
            Some(event) => event,
            None => return true,
        };
        event.is_cancelled()
            || id.ts() < self.current_ts
            || (id.ts() == self.current_ts && id.uid() <= self.current_uid)
    }

    /// Remove the handle's entry from the future event list and cancel
    /// the event. No-op on expired handles.
    pub fn remove(&mut self, id: &EventId) {
        if self.is_expired(id) {
            return;
        }
        self.events.remove(&id.key());
        if let Some(event) = id.event() {
            event.cancel();
        }
    }

    /// Time remaining until the handle's event is due; zero if expired.
    pub fn delay_left(&self, id: &EventId) -> Time {
        if self.is_expired(id) {
            Time::ZERO
        } else {
            Time::from_ts(id.ts()) - self.now()
        }
    }

    // ── Partition transfer ───────────────────────────────────────

    /// Drain every pending event in ascending key order. Used once, when
    /// seed events move to the freshly partitioned processes.
    pub fn take_events(&mut self) -> Vec<(EventKey, Event)> {
        self.events.drain_ordered()
    }

    /// Number of pending events in the future event list.
    pub fn queue_len(&self) -> usize {
        self.events.len()
    }
}

impl fmt::Debug for LogicalProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalProcess")
            .field("system_id", &self.system_id)
            .field("now", &self.now())
            .field("pending", &self.events.len())
            .field("event_count", &self.event_count)
            .field("lookahead", &self.lookahead)
            .field("stopped", &self.stop)
            .finish()
    }
}
