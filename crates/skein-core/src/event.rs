//! Events, event keys, and external event handles.
//!
//! An [`Event`] is a single invocable unit of simulation work. Handles are
//! cheap shared clones: the future event list holds one, and the
//! [`EventId`] returned to the caller holds another so the event can later
//! be cancelled or removed. The closure itself runs at most once — it is
//! taken out of the shared cell on invocation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::time::Time;

/// Context value for events that belong to no simulated node.
///
/// The public logical process executes its events under this context.
pub const NO_CONTEXT: u32 = u32::MAX - 1;

/// Uid of an event that has not yet been assigned one by its owning
/// process (e.g. an event sitting in a remote mailbox).
pub const UID_INVALID: u32 = 0;

/// First uid handed out by a logical process's uid counter.
pub const UID_VALID: u32 = 2;

/// Uid marking a destroy event, held in the executor-wide destroy list
/// rather than in any future event list.
pub const UID_DESTROY: u32 = u32::MAX;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct EventCore {
    cancelled: AtomicBool,
    // Taken on invoke; `None` afterwards. The mutex is uncontended in
    // practice (one scheduler entry owns invocation), it exists so the
    // handle stays Send + Sync without unsafe code.
    task: Mutex<Option<Task>>,
    // Wire form for events that may cross hosts: a codec tag plus the
    // payload the registered constructor rebuilds the event from.
    wire: Option<(u32, Vec<u8>)>,
}

/// A shared handle to a single invocable simulation event.
///
/// Cloning is cheap (`Arc`). Cancellation is a flag: a cancelled event
/// stays in its queue until its timestamp is reached and is then dropped
/// without running and without counting as executed.
#[derive(Clone)]
pub struct Event {
    core: Arc<EventCore>,
}

// Compile-time assertion: events cross worker threads inside mailboxes.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Event>();
};

impl Event {
    /// Wrap a closure as an event.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Event {
        Event {
            core: Arc::new(EventCore {
                cancelled: AtomicBool::new(false),
                task: Mutex::new(Some(Box::new(f))),
                wire: None,
            }),
        }
    }

    /// Wrap a closure as an event that can cross hosts.
    ///
    /// `tag` selects the constructor registered with the receiving
    /// host's event codec; `payload` is the opaque argument it rebuilds
    /// the event from. Events without a wire form cannot be sent to
    /// another host.
    pub fn with_wire(tag: u32, payload: Vec<u8>, f: impl FnOnce() + Send + 'static) -> Event {
        Event {
            core: Arc::new(EventCore {
                cancelled: AtomicBool::new(false),
                task: Mutex::new(Some(Box::new(f))),
                wire: Some((tag, payload)),
            }),
        }
    }

    /// The codec tag and payload of an event that can cross hosts.
    pub fn wire_form(&self) -> Option<(u32, &[u8])> {
        self.core
            .wire
            .as_ref()
            .map(|(tag, payload)| (*tag, payload.as_slice()))
    }

    /// Run the event's closure.
    ///
    /// Returns `true` if the closure actually ran, `false` if the event
    /// was cancelled or had already run.
    pub fn invoke(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let task = self
            .core
            .task
            .lock()
            .expect("event task mutex poisoned")
            .take();
        match task {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    /// Mark the event cancelled. Idempotent.
    pub fn cancel(&self) {
        self.core.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Event::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.core.cancelled.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same event.
    pub fn same_as(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Event) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ── EventKey ─────────────────────────────────────────────────────

/// Ordering key of a scheduled event.
///
/// Events execute in ascending `(ts, uid)` order. `context` identifies
/// the simulated node the event belongs to ([`NO_CONTEXT`] for global
/// events); it does not participate in ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventKey {
    /// Timestamp in picoseconds.
    pub ts: u64,
    /// Node id, or [`NO_CONTEXT`].
    pub context: u32,
    /// Per-process monotonic uid; ties on `ts` break by uid.
    pub uid: u32,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.ts.cmp(&other.ts) {
            std::cmp::Ordering::Equal => {}
            ord => return ord,
        }
        self.uid.cmp(&other.uid)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ── EventId ──────────────────────────────────────────────────────

/// External handle to a scheduled event.
///
/// Returned by the scheduling calls; consumed by `cancel`, `remove`,
/// `is_expired`, and `get_delay_left`. Holds a shared [`Event`] handle so
/// cancellation works even after the scheduler entry has been popped.
#[derive(Clone, Debug)]
pub struct EventId {
    event: Option<Event>,
    ts: u64,
    context: u32,
    uid: u32,
}

impl EventId {
    /// Build a handle from an event and its scheduled key.
    pub fn new(event: Event, ts: u64, context: u32, uid: u32) -> EventId {
        EventId {
            event: Some(event),
            ts,
            context,
            uid,
        }
    }

    /// A handle that refers to no event; always expired.
    pub fn empty() -> EventId {
        EventId {
            event: None,
            ts: 0,
            context: 0,
            uid: UID_INVALID,
        }
    }

    /// The referenced event, if any.
    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    /// Scheduled timestamp in picoseconds.
    pub fn ts(&self) -> u64 {
        self.ts
    }

    /// Scheduled timestamp as a [`Time`].
    pub fn time(&self) -> Time {
        Time::from_ts(self.ts)
    }

    /// Node context the event was scheduled under.
    pub fn context(&self) -> u32 {
        self.context
    }

    /// Uid assigned at scheduling ([`UID_DESTROY`] for destroy events).
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Whether this is a destroy-event handle.
    pub fn is_destroy(&self) -> bool {
        self.uid == UID_DESTROY
    }

    /// The key this handle was scheduled under.
    pub fn key(&self) -> EventKey {
        EventKey {
            ts: self.ts,
            context: self.context,
            uid: self.uid,
        }
    }

    /// Whether both handles refer to the same scheduler entry.
    pub fn same_entry(&self, other: &EventId) -> bool {
        self.ts == other.ts
            && self.uid == other.uid
            && self.context == other.context
            && match (&self.event, &other.event) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn invoke_runs_once() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let ev = Event::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(ev.invoke());
        assert!(!ev.invoke());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_event_does_not_run() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let ev = Event::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        ev.cancel();
        assert!(ev.is_cancelled());
        assert!(!ev.invoke());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn key_orders_by_ts_then_uid() {
        let early = EventKey {
            ts: 1,
            context: 0,
            uid: 9,
        };
        let late = EventKey {
            ts: 2,
            context: 0,
            uid: 1,
        };
        let tie = EventKey {
            ts: 1,
            context: 7,
            uid: 10,
        };
        assert!(early < late);
        assert!(early < tie, "ties on ts break by uid, context ignored");
    }

    #[test]
    fn empty_id_has_no_event() {
        let id = EventId::empty();
        assert!(id.event().is_none());
        assert!(!id.is_destroy());
    }

    #[test]
    fn wire_form_is_carried_by_clones() {
        let plain = Event::new(|| {});
        assert!(plain.wire_form().is_none());

        let wired = Event::with_wire(9, vec![1, 2], || {});
        let clone = wired.clone();
        assert_eq!(clone.wire_form(), Some((9, &[1u8, 2][..])));
        assert!(wired.invoke());
        // The wire form describes the event, not its pending state.
        assert_eq!(wired.wire_form(), Some((9, &[1u8, 2][..])));
    }

    #[test]
    fn clones_share_cancellation() {
        let ev = Event::new(|| {});
        let id = EventId::new(ev.clone(), 5, NO_CONTEXT, UID_VALID);
        id.event().unwrap().cancel();
        assert!(ev.is_cancelled());
    }
}
