//! Logical processes, the shared-memory round executor, and the
//! scheduling API of the Skein simulation kernel.
//!
//! The executor advances one global virtual clock across many logical
//! processes. Within a host, worker threads claim processes round by
//! round and synchronise at spin barriers; each process only ever
//! executes events inside the granted window
//! `min(smallest_time + lookahead, next_public_time)`, which is what
//! keeps cross-process causality intact without rollback.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
mod context;
pub mod engine;
pub mod lp;
pub mod mailbox;
pub mod metrics;
pub mod sync;

pub use config::{ConfigError, KernelConfig, SimulatorKind, SortMethod};
pub use engine::{EngineShared, RemoteHook, Resolution, RoundEngine};
pub use lp::{LabelMode, LogicalProcess};
pub use mailbox::{Envelope, Mailbox};
pub use metrics::{RoundMetrics, RunMetrics, WorkerMetrics};
