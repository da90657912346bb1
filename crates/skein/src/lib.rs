//! Skein: a conservative parallel discrete-event simulation kernel.
//!
//! One global virtual-time simulation runs across many logical
//! processes. Within a host, worker threads drive processes through
//! barrier-synchronised rounds; across hosts, an LBTS window protocol
//! over a message bus keeps every host inside the globally safe time
//! window. Causality never relies on rollback: a process only executes
//! events up to `min(smallest_time + lookahead, next_public_time)`, and
//! the partitioner guarantees the lookahead by cutting only links whose
//! delay reaches the configured minimum.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use skein::prelude::*;
//!
//! // Two nodes joined by a 100ns link: the partitioner cuts it and
//! // each node becomes its own logical process.
//! let mut topology = Topology::new();
//! let a = topology.add_node();
//! let b = topology.add_node();
//! topology.connect_p2p(a, b, Time::from_ns(100));
//!
//! Simulator::enable(KernelConfig::default(), Arc::new(topology)).unwrap();
//!
//! let hits = Arc::new(AtomicU64::new(0));
//! let hits2 = hits.clone();
//! Simulator::schedule_with_context(a, Time::ZERO, move || {
//!     // Runs on node a's process; send work across the cut link.
//!     Simulator::schedule_with_context(b, Time::from_ns(100), move || {
//!         hits2.fetch_add(1, Ordering::SeqCst);
//!     });
//! });
//!
//! Simulator::run().unwrap();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! assert_eq!(Simulator::get_event_count(), 2);
//! Simulator::destroy();
//! ```
//!
//! # Crates
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `skein-core` | time, events, event queue, refcount |
//! | [`tags`] | `skein-tags` | copy-on-write packet tag blobs |
//! | [`topo`] | `skein-topo` | topology model and partitioner |
//! | [`engine`] | `skein-engine` | processes, round executor, API |
//! | [`dist`] | `skein-dist` | bus, LBTS protocol, executors |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod simulator;

pub use simulator::Simulator;

/// Core types: time, events, the event queue, the atomic refcount.
pub mod core {
    pub use skein_core::*;
}

/// Copy-on-write tag blobs carried by packets across processes.
pub mod tags {
    pub use skein_tags::*;
}

/// Topology model and the automatic partitioner.
pub mod topo {
    pub use skein_topo::*;
}

/// Logical processes, the round executor, and the scheduling API.
pub mod engine {
    pub use skein_engine::*;
}

/// Message bus, LBTS protocol, and the distributed executors.
pub mod dist {
    pub use skein_dist::*;
}

/// The types most simulations need.
pub mod prelude {
    pub use crate::Simulator;
    pub use skein_core::{Event, EventId, Time};
    pub use skein_dist::{Bus, MemoryBus, RegistryCodec};
    pub use skein_engine::{KernelConfig, SimulatorKind, SortMethod};
    pub use skein_topo::Topology;
}
