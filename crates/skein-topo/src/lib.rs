//! Topology model and automatic partitioner for the Skein simulation
//! kernel.
//!
//! A [`Topology`] is the graph of simulated nodes and the links between
//! them. The partitioner walks this graph once, before the first round,
//! and labels every node with the logical process that will own it; links
//! whose delay is at least the minimum lookahead are the cut edges that
//! separate processes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod partition;
pub mod topology;

pub use partition::{
    median_p2p_delay, partition_flat, partition_hybrid, PartitionError, PartitionOutcome,
};
pub use topology::{decode_hybrid, encode_hybrid, Link, LinkKind, Topology};
