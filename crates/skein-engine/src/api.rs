//! The scheduling API visible to event handlers.
//!
//! Handlers run inside a logical process round and see a consistent
//! local clock through the thread-local context: [`now`], [`schedule`],
//! [`schedule_with_context`] and friends all dispatch to the process the
//! calling worker is currently driving. None of these return errors —
//! calling them outside a simulation context is a programmer error and
//! panics.

use skein_core::{Event, EventId, Time, NO_CONTEXT, UID_DESTROY};

use crate::context;
use crate::engine::Resolution;

/// Schedule a closure after `delay` on the current process.
pub fn schedule(delay: Time, f: impl FnOnce() + Send + 'static) -> EventId {
    schedule_event(delay, Event::new(f))
}

/// Schedule a prebuilt event after `delay` on the current process.
pub fn schedule_event(delay: Time, event: Event) -> EventId {
    context::with_lp(|lp| lp.schedule(delay, event))
}

/// Schedule a closure at the current timestamp.
pub fn schedule_now(f: impl FnOnce() + Send + 'static) -> EventId {
    schedule(Time::ZERO, f)
}

/// Schedule a closure onto the process owning `node`, after `delay`.
///
/// Local targets insert directly; same-host foreign targets go through
/// the target's mailbox and receive their uid when the target drains it;
/// cross-host targets are handed to the installed remote hook.
pub fn schedule_with_context(node: u32, delay: Time, f: impl FnOnce() + Send + 'static) {
    schedule_event_with_context(node, delay, Event::new(f));
}

/// Schedule a prebuilt event onto the process owning `node`.
pub fn schedule_event_with_context(node: u32, delay: Time, event: Event) {
    let engine = context::engine_expect();
    match engine.resolve(node) {
        Resolution::Local(target) => {
            let current = context::with_lp(|lp| lp.system_id());
            if target == current {
                context::with_lp(|lp| lp.schedule_local_with_context(node, delay, event));
            } else {
                let envelope = context::with_lp(|lp| lp.envelope_for(node, delay, event));
                engine.mailbox(target).push(envelope);
            }
        }
        Resolution::Remote(rank) => {
            let ts = context::with_lp(|lp| (lp.now() + delay).ts());
            engine
                .remote_hook()
                .expect("event for a foreign host but no bus is attached")
                .remote_event(rank, node, ts, event);
        }
    }
}

/// Schedule a closure on the public process at the earliest globally
/// safe timestamp, under the critical section.
///
/// The event runs in the public-process step of a later round — never
/// interleaved with per-process event execution.
pub fn schedule_global(f: impl FnOnce() + Send + 'static) {
    let event = Event::new(f);
    let engine = context::engine_expect();
    let _cs = engine.critical_section();
    let at = engine.smallest_time().min(engine.next_public_time());
    let on_public = context::with_lp_opt(|lp| lp.system_id()) == Some(0);
    if on_public {
        context::with_lp(|lp| lp.schedule_at(NO_CONTEXT, at.ts(), event));
    } else {
        engine.with_slot(0, |lp| lp.schedule_at(NO_CONTEXT, at.ts(), event));
    }
}

/// Register a closure to run when the simulation is destroyed.
///
/// Destroy events live on an executor-wide list, not in any future event
/// list; they run in registration order after the last round.
pub fn schedule_destroy(f: impl FnOnce() + Send + 'static) -> EventId {
    let event = Event::new(f);
    let id = EventId::new(event, Time::MAX.ts(), u32::MAX, UID_DESTROY);
    let engine = context::engine_expect();
    let _cs = engine.critical_section();
    engine.push_destroy(id.clone());
    id
}

/// Current simulation time of the calling process.
pub fn now() -> Time {
    context::with_lp(|lp| lp.now())
}

/// Id of the process the calling thread is driving.
pub fn system_id() -> u32 {
    context::with_lp(|lp| lp.system_id())
}

/// Context of the event currently being executed.
pub fn current_context() -> u32 {
    context::with_lp(|lp| lp.context())
}

/// Total events executed across every process of this engine.
pub fn event_count() -> u64 {
    context::engine_expect().total_event_count()
}

/// The label mode of the enabled engine (flat or hybrid).
pub fn label_mode() -> crate::lp::LabelMode {
    context::engine_expect().mode()
}

/// Picoseconds per reported time step.
pub fn time_resolution_ps() -> u64 {
    context::engine_expect().time_resolution_ps()
}

/// The largest schedulable simulation time.
pub fn maximum_simulation_time() -> Time {
    Time::MAX
}

/// Whether a handle no longer refers to a pending event.
pub fn is_expired(id: &EventId) -> bool {
    if id.is_destroy() {
        context::engine_expect().destroy_expired(id)
    } else {
        context::with_lp(|lp| lp.is_expired(id))
    }
}

/// Cancel the handle's event: it stays queued but will not run.
pub fn cancel(id: &EventId) {
    if !is_expired(id) {
        if let Some(event) = id.event() {
            event.cancel();
        }
    }
}

/// Remove the handle's event from its queue and cancel it.
pub fn remove(id: &EventId) {
    if id.is_destroy() {
        context::engine_expect().remove_destroy(id);
    } else {
        context::with_lp(|lp| lp.remove(id));
    }
}

/// Time remaining until the handle's event is due; zero if expired.
pub fn delay_left(id: &EventId) -> Time {
    if is_expired(id) {
        Time::ZERO
    } else {
        context::with_lp(|lp| lp.delay_left(id))
    }
}

/// Request a cooperative stop of the whole simulation.
pub fn stop() {
    context::engine_expect().request_stop();
}

/// Schedule a stop after `delay` on the current process.
pub fn stop_after(delay: Time) -> EventId {
    schedule(delay, stop)
}

/// Borrow the calling process's deterministic random stream.
pub fn with_rng<R>(f: impl FnOnce(&mut rand_chacha::ChaCha8Rng) -> R) -> R {
    context::with_lp(|lp| f(lp.rng()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::engine::RoundEngine;
    use crate::lp::LabelMode;
    use skein_topo::Topology;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Engine with one labelled node per process, bound to this thread
    /// with the public process adopted, like the facade does pre-run.
    fn bound_engine(systems: u32) -> RoundEngine {
        let mut topology = Topology::new();
        let first = topology.add_nodes(systems.max(1));
        for node in 0..systems.max(1) {
            topology.set_system_id(first + node, node + 1);
        }
        let engine = RoundEngine::new(
            1,
            systems,
            Arc::new(topology),
            LabelMode::Flat,
            &KernelConfig::default(),
        )
        .unwrap();
        engine.shared().bind_to_thread();
        engine.shared().adopt_public_lp();
        engine
    }

    fn unbind(engine: &RoundEngine) {
        engine.shared().return_public_lp();
        crate::engine::EngineShared::unbind_thread();
    }

    #[test]
    fn schedule_and_now_use_the_bound_process() {
        let engine = bound_engine(1);
        assert_eq!(now(), Time::ZERO);
        assert_eq!(system_id(), 0);
        let id = schedule(Time::from_ns(5), || {});
        assert_eq!(id.ts(), Time::from_ns(5).ts());
        assert!(!is_expired(&id));
        assert_eq!(delay_left(&id), Time::from_ns(5));
        unbind(&engine);
    }

    #[test]
    fn cancel_keeps_event_queued_but_dead() {
        let engine = bound_engine(1);
        let id = schedule(Time::from_ns(1), || {});
        cancel(&id);
        assert!(is_expired(&id));
        assert_eq!(delay_left(&id), Time::ZERO);
        unbind(&engine);
    }

    #[test]
    fn schedule_with_context_crosses_into_the_target_mailbox() {
        let engine = bound_engine(2);
        // Node 1 is owned by process 2; the caller drives process 0.
        schedule_with_context(1, Time::from_ns(10), || {});
        assert_eq!(engine.shared().mailbox(2).len(), 1);
        assert_eq!(engine.shared().mailbox(1).len(), 0);
        unbind(&engine);
    }

    #[test]
    fn schedule_destroy_registers_and_removes() {
        let engine = bound_engine(1);
        let hits = Arc::new(AtomicU64::new(0));
        let hits2 = hits.clone();
        let id = schedule_destroy(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(id.is_destroy());
        assert!(!is_expired(&id));
        remove(&id);
        assert!(is_expired(&id));
        assert!(engine.shared().take_destroy_list().is_empty());
        unbind(&engine);
    }

    #[test]
    fn schedule_global_lands_on_the_public_process() {
        let engine = bound_engine(2);
        // The caller currently drives the public process, so the event
        // inserts straight into its queue.
        schedule_global(|| {});
        let queued = crate::context::with_lp(|lp| lp.queue_len());
        assert_eq!(queued, 1);
        unbind(&engine);
    }

    #[test]
    fn with_rng_draws_from_the_process_stream() {
        use rand::RngCore;
        let engine = bound_engine(1);
        let a = with_rng(|rng| rng.next_u64());
        let b = with_rng(|rng| rng.next_u64());
        assert_ne!(a, b);
        unbind(&engine);
    }
}
