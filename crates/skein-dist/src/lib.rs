//! Distributed synchronisation for the Skein simulation kernel.
//!
//! Hosts cooperate through a message bus offering point-to-point sends
//! and a blocking all-gather. Each host repeatedly posts an LBTS record
//! (its smallest pending timestamp plus transmit/receive counts); the
//! fold of those records yields the globally safe time window, and a
//! host only advances its local rounds when no messages are in flight
//! (`Σ tx == Σ rx`), so an event can never arrive in its receiver's
//! past.
//!
//! The executors here wrap the shared-memory
//! [`RoundEngine`](skein_engine::RoundEngine): the
//! [`DistributedExecutor`] drives one sequential process per host, the
//! [`HybridExecutor`] a full worker pool per host.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bus;
pub mod codec;
pub mod distributed;
pub mod driver;
pub mod hybrid;
pub mod lbts;

pub use bus::{Bus, BusError, MemoryBus};
pub use codec::{CodecError, EventCodec, RegistryCodec};
pub use distributed::DistributedExecutor;
pub use driver::WindowDriver;
pub use hybrid::HybridExecutor;
pub use lbts::LbtsMessage;
