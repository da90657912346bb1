//! Automatic topology partitioning.
//!
//! Runs once, before the first round. A breadth-first flood fill assigns
//! every node a logical-process label, refusing to cross point-to-point
//! links whose delay reaches the minimum-lookahead threshold — those
//! links become the cut edges between processes, and their delays are
//! the lookahead the executor later relies on.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;

use skein_core::Time;

use crate::topology::{encode_hybrid, LinkKind, Topology};

// ── PartitionError ───────────────────────────────────────────────

/// Errors detected while partitioning, all fatal before rounds start.
#[derive(Debug, PartialEq, Eq)]
pub enum PartitionError {
    /// A node ended the walk without a partition label.
    Uncovered {
        /// The unlabelled node.
        node: u32,
    },
    /// A non-cut link connects nodes placed on different hosts, so the
    /// partition cannot guarantee inter-host lookahead.
    CrossRankAdjacency {
        /// Node on the local host.
        node: u32,
        /// Adjacent node stored under a different rank.
        neighbor: u32,
    },
    /// More local processes than the hybrid encoding can label.
    TooManyProcesses {
        /// Number of processes produced by the walk.
        count: u32,
    },
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncovered { node } => {
                write!(f, "node {node} not covered by any partition")
            }
            Self::CrossRankAdjacency { node, neighbor } => write!(
                f,
                "nodes {node} and {neighbor} share an uncut link but live on different hosts"
            ),
            Self::TooManyProcesses { count } => {
                write!(f, "{count} local processes exceed the 16-bit hybrid label")
            }
        }
    }
}

impl Error for PartitionError {}

// ── PartitionOutcome ─────────────────────────────────────────────

/// What a partition run produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionOutcome {
    /// Number of logical processes created (labels `1..=system_count`).
    pub system_count: u32,
    /// The cut threshold actually used (the configured minimum
    /// lookahead, or the sampled median when the configuration left it
    /// at zero).
    pub threshold: Time,
}

/// Median delay over all point-to-point links.
///
/// An empty sample yields zero. An even-sized sample yields the mean of
/// the two middle values.
pub fn median_p2p_delay(topo: &Topology) -> Time {
    let mut delays: Vec<Time> = topo.links().filter_map(|l| l.p2p_delay()).collect();
    delays.sort();
    match delays.len() {
        0 => Time::ZERO,
        n if n % 2 == 1 => delays[n / 2],
        n => (delays[n / 2 - 1] + delays[n / 2]) / 2,
    }
}

/// Partition the whole topology into logical processes.
///
/// Every node receives a label in `1..=system_count`. A zero
/// `min_lookahead` selects the sampled median as the threshold.
pub fn partition_flat(
    topo: &Topology,
    min_lookahead: Time,
) -> Result<PartitionOutcome, PartitionError> {
    let threshold = resolve_threshold(topo, min_lookahead);
    let mut visited = vec![false; topo.node_count() as usize];
    let mut system_id = 0u32;

    for start in 0..topo.node_count() {
        if visited[start as usize] {
            continue;
        }
        system_id += 1;
        flood_fill(topo, start, threshold, &mut visited, |node| {
            topo.set_system_id(node, system_id);
            Ok(())
        })?;
    }

    for node in 0..topo.node_count() {
        if topo.system_id(node) == 0 {
            return Err(PartitionError::Uncovered { node });
        }
    }

    Ok(PartitionOutcome {
        system_count: system_id,
        threshold,
    })
}

/// Partition the local host's share of the topology (hybrid mode).
///
/// Before the call every node's label holds its host rank; only nodes
/// whose rank equals `rank` are walked, and their labels are rewritten
/// to the hybrid `(local_lp << 16) | rank` encoding. Remote nodes keep
/// their bare-rank labels, which the hybrid executor reads back through
/// [`decode_hybrid`](crate::decode_hybrid) — bare ranks decode as
/// `(0, rank)` and are never resolved to a local process.
pub fn partition_hybrid(
    topo: &Topology,
    min_lookahead: Time,
    rank: u16,
) -> Result<PartitionOutcome, PartitionError> {
    let threshold = resolve_threshold(topo, min_lookahead);
    let mut visited = vec![false; topo.node_count() as usize];
    let mut local_lp = 0u32;

    for start in 0..topo.node_count() {
        if visited[start as usize] || topo.system_id(start) != rank as u32 {
            continue;
        }
        local_lp += 1;
        if local_lp > u16::MAX as u32 {
            return Err(PartitionError::TooManyProcesses { count: local_lp });
        }
        flood_fill(topo, start, threshold, &mut visited, |node| {
            if topo.system_id(node) != rank as u32 {
                return Err(PartitionError::CrossRankAdjacency {
                    node: start,
                    neighbor: node,
                });
            }
            topo.set_system_id(node, encode_hybrid(local_lp as u16, rank));
            Ok(())
        })?;
    }

    Ok(PartitionOutcome {
        system_count: local_lp,
        threshold,
    })
}

fn resolve_threshold(topo: &Topology, min_lookahead: Time) -> Time {
    if min_lookahead.is_zero() {
        median_p2p_delay(topo)
    } else {
        min_lookahead
    }
}

/// Breadth-first fill from `start`, labelling each reached node via
/// `label` and refusing to cross point-to-point links with
/// `delay >= threshold`.
fn flood_fill(
    topo: &Topology,
    start: u32,
    threshold: Time,
    visited: &mut [bool],
    mut label: impl FnMut(u32) -> Result<(), PartitionError>,
) -> Result<(), PartitionError> {
    let mut queue = VecDeque::new();
    queue.push_back(start);
    visited[start as usize] = true;
    while let Some(node) = queue.pop_front() {
        label(node)?;
        for &link_id in topo.links_of(node) {
            let link = topo.link(link_id);
            if let LinkKind::PointToPoint { delay } = link.kind {
                // Cut edge: this link separates processes.
                if delay >= threshold {
                    continue;
                }
            }
            for &peer in &link.endpoints {
                if !visited[peer as usize] {
                    visited[peer as usize] = true;
                    queue.push_back(peer);
                }
            }
        }
    }
    Ok(())
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every node is labelled exactly once, whatever the topology.
        #[test]
        fn flat_partition_covers_every_node(
            edges in prop::collection::vec((0u32..20, 0u32..20, 1i64..1000), 0..40),
            threshold in 0i64..1000,
        ) {
            let mut t = Topology::new();
            t.add_nodes(20);
            for (a, b, d) in edges {
                if a != b {
                    t.connect_p2p(a, b, Time::from_ns(d));
                }
            }
            let outcome = partition_flat(&t, Time::from_ns(threshold)).unwrap();
            prop_assert!(outcome.system_count >= 1);
            for node in 0..t.node_count() {
                let sid = t.system_id(node);
                prop_assert!(sid >= 1 && sid <= outcome.system_count);
            }
        }
    }
}
