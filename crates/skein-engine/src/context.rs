//! Thread-local execution context.
//!
//! Each worker thread holds two slots: the engine it belongs to, bound
//! once at spawn, and the logical process it is currently driving, moved
//! in at the start of a round and out at the end. Scheduling calls made
//! from inside event handlers re-borrow these slots — plain same-thread
//! `RefCell` borrows, taken and released around each call, never held
//! across a handler invocation.

use std::cell::RefCell;
use std::sync::Arc;

use crate::engine::EngineShared;
use crate::lp::LogicalProcess;

thread_local! {
    static ENGINE: RefCell<Option<Arc<EngineShared>>> = const { RefCell::new(None) };
    static CURRENT_LP: RefCell<Option<LogicalProcess>> = const { RefCell::new(None) };
}

/// Bind this thread to an engine.
pub(crate) fn bind_engine(engine: Arc<EngineShared>) {
    ENGINE.with(|slot| *slot.borrow_mut() = Some(engine));
}

/// Remove this thread's engine binding.
pub(crate) fn unbind_engine() {
    ENGINE.with(|slot| *slot.borrow_mut() = None);
}

/// The engine bound to this thread, if any.
pub(crate) fn engine() -> Option<Arc<EngineShared>> {
    ENGINE.with(|slot| slot.borrow().clone())
}

/// The engine bound to this thread.
///
/// # Panics
///
/// Panics when the thread has no enabled simulation — a scheduling call
/// outside any simulation context is a programmer error.
pub(crate) fn engine_expect() -> Arc<EngineShared> {
    engine().expect("no enabled simulation on this thread")
}

/// Move a logical process into this thread's current slot.
///
/// # Panics
///
/// Panics if a process is already installed; a worker drives one
/// process at a time.
pub(crate) fn install_lp(lp: LogicalProcess) {
    CURRENT_LP.with(|slot| {
        let mut slot = slot.borrow_mut();
        assert!(
            slot.is_none(),
            "worker already driving process {:?}",
            slot.as_ref().map(|lp| lp.system_id())
        );
        *slot = Some(lp);
    });
}

/// Move the current logical process out of this thread's slot.
///
/// # Panics
///
/// Panics if no process is installed.
pub(crate) fn take_lp() -> LogicalProcess {
    take_lp_opt().expect("no logical process bound to this thread")
}

/// Move the current logical process out, if one is installed.
pub(crate) fn take_lp_opt() -> Option<LogicalProcess> {
    CURRENT_LP.with(|slot| slot.borrow_mut().take())
}

/// Swap the current process slot, returning the previous occupant.
pub(crate) fn swap_lp(lp: Option<LogicalProcess>) -> Option<LogicalProcess> {
    CURRENT_LP.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), lp))
}

/// Borrow the current logical process mutably.
///
/// # Panics
///
/// Panics when no process is bound — a handler-context call was made
/// from a thread that is not driving a process.
pub(crate) fn with_lp<R>(f: impl FnOnce(&mut LogicalProcess) -> R) -> R {
    with_lp_opt(f).expect("no logical process bound to this thread")
}

/// Borrow the current logical process mutably, if one is bound.
pub(crate) fn with_lp_opt<R>(f: impl FnOnce(&mut LogicalProcess) -> R) -> Option<R> {
    CURRENT_LP.with(|slot| slot.borrow_mut().as_mut().map(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lp_slot_round_trips() {
        assert!(take_lp_opt().is_none());
        install_lp(LogicalProcess::new(3, 1));
        assert_eq!(with_lp(|lp| lp.system_id()), 3);
        let lp = take_lp();
        assert_eq!(lp.system_id(), 3);
        assert!(with_lp_opt(|_| ()).is_none());
    }

    #[test]
    fn swap_restores_previous_binding() {
        install_lp(LogicalProcess::new(1, 1));
        let prev = swap_lp(Some(LogicalProcess::new(2, 1)));
        assert_eq!(with_lp(|lp| lp.system_id()), 2);
        let inner = swap_lp(prev);
        assert_eq!(inner.unwrap().system_id(), 2);
        assert_eq!(with_lp(|lp| lp.system_id()), 1);
        take_lp();
    }

    #[test]
    fn slots_are_thread_local() {
        install_lp(LogicalProcess::new(9, 1));
        std::thread::spawn(|| {
            assert!(with_lp_opt(|_| ()).is_none());
        })
        .join()
        .unwrap();
        take_lp();
    }
}
