//! The granted-time window driver.
//!
//! One driver per host wraps that host's [`RoundEngine`] in the LBTS
//! protocol: drain inbound events, flush and count outbound ones, post
//! the local LBTS record, fold everyone's records, and advance one local
//! round only when the system is quiescent (`Σ tx == Σ rx`). The fold's
//! minimum time is stored into the engine as the global smallest time,
//! so every process's granted window is bounded by it plus that
//! process's own lookahead.

use std::sync::{Arc, Mutex};

use skein_core::{Event, Time};
use skein_engine::{EngineShared, RemoteHook, RoundEngine};

use crate::bus::{Bus, BusError};
use crate::codec::{decode_remote, encode_remote, EventCodec};
use crate::lbts::{LbtsFold, LbtsMessage};

// ── Outbound queue ───────────────────────────────────────────────

/// Buffer between worker threads and the bus.
///
/// Workers produce cross-host events mid-round; the bus is only touched
/// by the driver thread between windows, so the hook just queues.
#[derive(Default)]
pub(crate) struct OutboundQueue {
    queue: Mutex<Vec<(u16, u32, u64, Event)>>,
}

impl OutboundQueue {
    fn drain(&self) -> Vec<(u16, u32, u64, Event)> {
        std::mem::take(&mut *self.queue.lock().expect("outbound queue mutex poisoned"))
    }
}

impl RemoteHook for OutboundQueue {
    fn remote_event(&self, rank: u16, context: u32, ts: u64, event: Event) {
        self.queue
            .lock()
            .expect("outbound queue mutex poisoned")
            .push((rank, context, ts, event));
    }
}

// ── WindowDriver ─────────────────────────────────────────────────

/// Drives one host's engine through LBTS-granted windows.
pub struct WindowDriver {
    bus: Box<dyn Bus>,
    codec: Arc<dyn EventCodec>,
    outbound: Arc<OutboundQueue>,
    rx_count: u32,
    tx_count: u32,
    bound: Time,
}

impl WindowDriver {
    /// Create a driver over a bus and an event codec.
    pub fn new(bus: Box<dyn Bus>, codec: Arc<dyn EventCodec>) -> WindowDriver {
        WindowDriver {
            bus,
            codec,
            outbound: Arc::new(OutboundQueue::default()),
            rx_count: 0,
            tx_count: 0,
            bound: Time::MAX,
        }
    }

    /// This host's rank.
    pub fn rank(&self) -> u16 {
        self.bus.rank()
    }

    /// Number of hosts.
    pub fn size(&self) -> u16 {
        self.bus.size()
    }

    /// Install this driver's outbound hook into an engine so worker
    /// threads can hand it cross-host events.
    pub fn attach(&self, shared: &EngineShared) {
        shared.set_remote_hook(self.outbound.clone());
    }

    /// Tighten the lookahead of every process in the engine.
    ///
    /// Used in co-simulation settings where an external party has a
    /// tighter constraint than the topology's cut links. May be called
    /// more than once; the minimum wins.
    ///
    /// # Panics
    ///
    /// Panics if `lookahead` is not positive — a non-positive bound
    /// would stall the granted window forever.
    pub fn bound_lookahead(&mut self, lookahead: Time) {
        assert!(
            lookahead > Time::ZERO,
            "lookahead bound must be positive, got {lookahead}"
        );
        self.bound = self.bound.min(lookahead);
    }

    /// Events received from peers so far.
    pub fn rx_count(&self) -> u32 {
        self.rx_count
    }

    /// Events sent to peers so far.
    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }

    /// Reinject every delivered cross-host event into its target
    /// process, counting receptions.
    fn receive_messages(&mut self, shared: &EngineShared) -> Result<(), BusError> {
        while let Some(bytes) = self.bus.try_receive()? {
            let (context, ts, event) = decode_remote(self.codec.as_ref(), &bytes)
                .unwrap_or_else(|e| panic!("undecodable event from a peer: {e}"));
            shared.schedule_remote(context, ts, event);
            self.rx_count += 1;
        }
        Ok(())
    }

    /// Hand buffered outbound events to the bus, counting transmissions
    /// once the bus accepts them.
    fn flush_outbound(&mut self) -> Result<(), BusError> {
        for (rank, context, ts, event) in self.outbound.drain() {
            let frame = encode_remote(self.codec.as_ref(), context, ts, &event)
                .unwrap_or_else(|e| panic!("cross-host event cannot be encoded: {e}"));
            self.bus.send(rank, frame)?;
            self.tx_count += 1;
        }
        Ok(())
    }

    /// Run the engine to global quiescence under the window protocol.
    ///
    /// On a transport failure the current window is abandoned, the
    /// worker pool is shut down, and the error is returned; the
    /// simulation then reports finished with that error status.
    pub fn run(&mut self, engine: &mut RoundEngine) -> Result<(), BusError> {
        self.attach(engine.shared());
        engine.run_before();
        if self.bound < Time::MAX {
            let shared = engine.shared().clone();
            for index in 1..=shared.system_count() {
                let bound = self.bound;
                shared.with_slot(index, |lp| lp.bound_lookahead(bound));
            }
        }

        let result = self.window_loop(engine);
        engine.run_after();
        result
    }

    fn window_loop(&mut self, engine: &mut RoundEngine) -> Result<(), BusError> {
        loop {
            self.receive_messages(engine.shared())?;
            self.flush_outbound()?;
            engine.calculate_smallest_time();

            let local = LbtsMessage {
                rx_count: self.rx_count,
                tx_count: self.tx_count,
                rank: self.bus.rank() as u32,
                finished: engine.is_finished(),
                smallest_time: engine.shared().smallest_time(),
            };
            let gathered = self.bus.all_gather(&local.encode())?;
            let fold = LbtsFold::fold(gathered.iter().map(|bytes| {
                LbtsMessage::decode(bytes).expect("malformed LBTS record from a peer")
            }));

            engine.shared().set_smallest_time(fold.smallest_time);

            // Global halt: every host drained and nothing in flight.
            if fold.all_finished && fold.quiescent() {
                return Ok(());
            }

            // Advance only when no transients exist; otherwise freeze
            // the window until every sent event has been received.
            if fold.quiescent() && !engine.is_finished() {
                engine.process_one_round();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_queue_drains_in_push_order() {
        let queue = OutboundQueue::default();
        queue.remote_event(1, 10, 100, Event::new(|| {}));
        queue.remote_event(0, 20, 200, Event::new(|| {}));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!((drained[0].0, drained[0].1), (1, 10));
        assert_eq!((drained[1].0, drained[1].1), (0, 20));
        assert!(queue.drain().is_empty());
    }
}
