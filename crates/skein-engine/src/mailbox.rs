//! Cross-process event mailboxes.
//!
//! Every logical process owns one inbound [`Mailbox`]. Senders append
//! envelopes during stage 1 of a round; the owner drains them in stage 2,
//! after the barrier, so a given envelope is never read in the round that
//! wrote it. Queues are keyed by sender id in a sorted map, which makes
//! the drain order — and therefore the uids the receiver assigns —
//! independent of worker timing.

use std::collections::BTreeMap;
use std::sync::Mutex;

use skein_core::{Event, EventKey};

/// A cross-process event in flight.
///
/// The event key carries the arrival timestamp and target context but an
/// invalid uid; the receiving process assigns a fresh uid when it drains
/// the envelope.
#[derive(Debug)]
pub struct Envelope {
    /// Sender's clock when the event was produced.
    pub sender_ts: u64,
    /// Sender's system id.
    pub sender_id: u32,
    /// Sender's uid counter when the event was produced (tie-break).
    pub sender_uid: u32,
    /// Arrival key; `key.uid` is [`skein_core::UID_INVALID`].
    pub key: EventKey,
    /// The event itself.
    pub event: Event,
}

impl Envelope {
    /// Sort key: descending `(sender_ts, sender_id, sender_uid, arrival
    /// ts)` so the drain loop can pop from the back in ascending order.
    fn sort_key(&self) -> (u64, u32, u32, u64) {
        (self.sender_ts, self.sender_id, self.sender_uid, self.key.ts)
    }
}

/// Inbound mailbox of one logical process.
///
/// The mutex is held briefly by senders (push) and by the owner (drain);
/// the two phases are already separated by the round barrier, the lock
/// covers concurrent senders targeting the same receiver.
#[derive(Debug, Default)]
pub struct Mailbox {
    queues: Mutex<BTreeMap<u32, Vec<Envelope>>>,
}

// Compile-time assertion: mailboxes are shared across workers.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Mailbox>();
};

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Mailbox {
        Mailbox::default()
    }

    /// Append an envelope from its sender's queue.
    pub fn push(&self, envelope: Envelope) {
        let mut queues = self.queues.lock().expect("mailbox mutex poisoned");
        queues
            .entry(envelope.sender_id)
            .or_default()
            .push(envelope);
    }

    /// Drain every envelope in deterministic order.
    ///
    /// Per-sender queues are visited in ascending sender id; each queue
    /// is sorted descending and drained from the back, so envelopes
    /// arrive at `f` in ascending sender order.
    pub fn drain(&self, mut f: impl FnMut(Envelope)) {
        let mut queues = self.queues.lock().expect("mailbox mutex poisoned");
        for (_, queue) in queues.iter_mut() {
            queue.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
            while let Some(envelope) = queue.pop() {
                f(envelope);
            }
        }
    }

    /// Total envelopes currently queued.
    pub fn len(&self) -> usize {
        let queues = self.queues.lock().expect("mailbox mutex poisoned");
        queues.values().map(Vec::len).sum()
    }

    /// Whether no envelopes are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::UID_INVALID;

    fn envelope(sender_ts: u64, sender_id: u32, sender_uid: u32, ts: u64) -> Envelope {
        Envelope {
            sender_ts,
            sender_id,
            sender_uid,
            key: EventKey {
                ts,
                context: 0,
                uid: UID_INVALID,
            },
            event: Event::new(|| {}),
        }
    }

    #[test]
    fn drains_in_ascending_sender_order() {
        let mb = Mailbox::new();
        mb.push(envelope(30, 2, 5, 40));
        mb.push(envelope(10, 2, 3, 20));
        mb.push(envelope(20, 1, 9, 25));

        let mut order = Vec::new();
        mb.drain(|e| order.push((e.sender_id, e.sender_ts)));
        // Sender 1 first (lower id), then sender 2's queue ascending.
        assert_eq!(order, vec![(1, 20), (2, 10), (2, 30)]);
        assert!(mb.is_empty());
    }

    #[test]
    fn same_sender_ts_breaks_by_uid_then_arrival() {
        let mb = Mailbox::new();
        mb.push(envelope(10, 1, 7, 90));
        mb.push(envelope(10, 1, 5, 80));
        mb.push(envelope(10, 1, 5, 70));

        let mut arrivals = Vec::new();
        mb.drain(|e| arrivals.push(e.key.ts));
        assert_eq!(arrivals, vec![70, 80, 90]);
    }

    #[test]
    fn drain_count_matches_push_count() {
        // Conservation: everything pushed in one round is drained at
        // the next round boundary, nothing more, nothing less.
        let mb = Mailbox::new();
        for i in 0..37u64 {
            mb.push(envelope(i, (i % 3) as u32, i as u32, i + 1));
        }
        assert_eq!(mb.len(), 37);
        let mut drained = 0;
        mb.drain(|_| drained += 1);
        assert_eq!(drained, 37);
        assert!(mb.is_empty());
    }

    #[test]
    fn concurrent_pushes_land_in_sender_queues() {
        use std::sync::Arc;
        let mb = Arc::new(Mailbox::new());
        let mut handles = Vec::new();
        for sender in 0..4u32 {
            let mb = mb.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100u64 {
                    mb.push(envelope(i, sender, i as u32, i + 1));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mb.len(), 400);
        let mut count = 0;
        let mut last = None;
        mb.drain(|e| {
            if let Some((sid, ts)) = last {
                assert!((e.sender_id, e.sender_ts) >= (sid, ts));
            }
            last = Some((e.sender_id, e.sender_ts));
            count += 1;
        });
        assert_eq!(count, 400);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use skein_core::UID_INVALID;

    proptest! {
        /// Whatever the push order, the drain order is ascending
        /// `(sender_id, sender_ts, sender_uid, arrival_ts)`.
        #[test]
        fn drain_order_is_a_total_order(
            pushes in prop::collection::vec((0u32..4, 0u64..50, 0u32..10, 0u64..100), 0..64)
        ) {
            let mb = Mailbox::new();
            for (sender, sender_ts, sender_uid, arrival) in pushes {
                mb.push(Envelope {
                    sender_ts,
                    sender_id: sender,
                    sender_uid,
                    key: EventKey { ts: arrival, context: 0, uid: UID_INVALID },
                    event: Event::new(|| {}),
                });
            }
            let mut previous: Option<(u32, u64, u32, u64)> = None;
            mb.drain(|e| {
                let key = (e.sender_id, e.sender_ts, e.sender_uid, e.key.ts);
                if let Some(prev) = previous {
                    assert!(key >= prev, "drain order regressed: {prev:?} then {key:?}");
                }
                previous = Some(key);
            });
        }
    }
}
