//! Core types for the Skein parallel discrete-event simulation kernel.
//!
//! This is the leaf crate with zero internal Skein dependencies. It defines
//! the fundamental abstractions shared by every executor: virtual time,
//! events and their external handles, the per-process future event list,
//! and the atomic reference counter used by data that crosses process
//! boundaries.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod event;
pub mod queue;
pub mod refcount;
pub mod time;

// Re-export core types at crate root for convenience.
pub use event::{Event, EventId, EventKey, NO_CONTEXT, UID_DESTROY, UID_INVALID, UID_VALID};
pub use queue::EventQueue;
pub use refcount::RefCount;
pub use time::Time;
