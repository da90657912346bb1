//! The node/link graph consumed by the partitioner and the lookahead
//! computation.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use skein_core::Time;
use smallvec::SmallVec;

/// What kind of channel a link models.
///
/// Only point-to-point links carry a partition-relevant delay: they are
/// the only links the partitioner may cut, and the only links that
/// contribute lookahead. Shared links (buses, LANs) always keep their
/// endpoints in one logical process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    /// Two endpoints, fixed propagation delay.
    PointToPoint {
        /// Propagation delay of the link.
        delay: Time,
    },
    /// Any number of endpoints, never cut.
    Shared,
}

/// A link between nodes.
#[derive(Clone, Debug)]
pub struct Link {
    /// Channel kind.
    pub kind: LinkKind,
    /// Node ids attached to this link. Exactly two for point-to-point.
    pub endpoints: SmallVec<[u32; 4]>,
}

impl Link {
    /// The point-to-point delay, if this is a point-to-point link.
    pub fn p2p_delay(&self) -> Option<Time> {
        match self.kind {
            LinkKind::PointToPoint { delay } => Some(delay),
            LinkKind::Shared => None,
        }
    }

    /// The opposite endpoint of a point-to-point link.
    pub fn p2p_peer(&self, node: u32) -> Option<u32> {
        match self.kind {
            LinkKind::PointToPoint { .. } => {
                if self.endpoints[0] == node {
                    Some(self.endpoints[1])
                } else if self.endpoints[1] == node {
                    Some(self.endpoints[0])
                } else {
                    None
                }
            }
            LinkKind::Shared => None,
        }
    }
}

struct NodeRecord {
    /// Partition label. Written by the partitioner while readers hold
    /// `&Topology`, hence atomic; plain relaxed accesses, there is no
    /// concurrent relabelling.
    system_id: AtomicU32,
    /// Indices into `links`.
    links: SmallVec<[u32; 4]>,
}

/// The graph of simulated nodes and links.
///
/// Nodes are dense `u32` ids in creation order. The node's `system_id`
/// is its partition label: `0` means unassigned, `1..=S` is the owning
/// logical process in flat mode, and `(lp << 16) | rank` in hybrid mode.
#[derive(Default)]
pub struct Topology {
    nodes: Vec<NodeRecord>,
    links: Vec<Link>,
}

// Compile-time assertion: the topology is shared read-only with workers.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Topology>();
};

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Add one node, returning its id.
    pub fn add_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(NodeRecord {
            system_id: AtomicU32::new(0),
            links: SmallVec::new(),
        });
        id
    }

    /// Add `n` nodes, returning the id of the first.
    pub fn add_nodes(&mut self, n: u32) -> u32 {
        let first = self.nodes.len() as u32;
        for _ in 0..n {
            self.add_node();
        }
        first
    }

    /// Connect two nodes with a point-to-point link of the given delay.
    ///
    /// # Panics
    ///
    /// Panics if either node id is out of range or the nodes are equal.
    pub fn connect_p2p(&mut self, a: u32, b: u32, delay: Time) -> u32 {
        assert!(a != b, "point-to-point link endpoints must differ");
        let id = self.links.len() as u32;
        self.links.push(Link {
            kind: LinkKind::PointToPoint { delay },
            endpoints: SmallVec::from_slice(&[a, b]),
        });
        self.nodes[a as usize].links.push(id);
        self.nodes[b as usize].links.push(id);
        id
    }

    /// Connect a set of nodes with a shared (never cut) link.
    pub fn connect_shared(&mut self, members: &[u32]) -> u32 {
        let id = self.links.len() as u32;
        self.links.push(Link {
            kind: LinkKind::Shared,
            endpoints: SmallVec::from_slice(members),
        });
        for &m in members {
            self.nodes[m as usize].links.push(id);
        }
        id
    }

    /// Number of nodes.
    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Number of links.
    pub fn link_count(&self) -> u32 {
        self.links.len() as u32
    }

    /// The link with the given id.
    pub fn link(&self, id: u32) -> &Link {
        &self.links[id as usize]
    }

    /// All links, in creation order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Ids of the links attached to `node`.
    pub fn links_of(&self, node: u32) -> &[u32] {
        &self.nodes[node as usize].links
    }

    /// The node's partition label.
    pub fn system_id(&self, node: u32) -> u32 {
        self.nodes[node as usize].system_id.load(Ordering::Relaxed)
    }

    /// Set the node's partition label.
    ///
    /// Before an automatic hybrid partition this holds the node's host
    /// rank; the partitioner rewrites it to the full hybrid encoding.
    pub fn set_system_id(&self, node: u32, system_id: u32) {
        self.nodes[node as usize]
            .system_id
            .store(system_id, Ordering::Relaxed);
    }

    /// Whether any node carries a nonzero label (manual partition).
    pub fn is_labelled(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.system_id.load(Ordering::Relaxed) != 0)
    }

    /// Point-to-point neighbours of `node` as `(remote, delay)` pairs.
    pub fn p2p_neighbors(&self, node: u32) -> impl Iterator<Item = (u32, Time)> + '_ {
        self.nodes[node as usize].links.iter().filter_map(move |&l| {
            let link = &self.links[l as usize];
            link.p2p_peer(node).map(|peer| {
                (
                    peer,
                    link.p2p_delay().expect("p2p_peer implies a p2p link"),
                )
            })
        })
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .finish()
    }
}

/// Pack a hybrid partition label: local LP id in the high 16 bits, host
/// rank in the low 16.
pub fn encode_hybrid(local_lp: u16, rank: u16) -> u32 {
    ((local_lp as u32) << 16) | rank as u32
}

/// Unpack a hybrid partition label into `(local_lp, rank)`.
pub fn decode_hybrid(system_id: u32) -> (u16, u16) {
    ((system_id >> 16) as u16, (system_id & 0xffff) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2p_peer_resolves_both_directions() {
        let mut t = Topology::new();
        let a = t.add_node();
        let b = t.add_node();
        let l = t.connect_p2p(a, b, Time::from_ns(5));
        assert_eq!(t.link(l).p2p_peer(a), Some(b));
        assert_eq!(t.link(l).p2p_peer(b), Some(a));
        assert_eq!(t.link(l).p2p_delay(), Some(Time::from_ns(5)));
    }

    #[test]
    fn shared_link_contributes_no_p2p_neighbors() {
        let mut t = Topology::new();
        let first = t.add_nodes(3);
        t.connect_shared(&[first, first + 1, first + 2]);
        assert_eq!(t.p2p_neighbors(first).count(), 0);
    }

    #[test]
    fn labels_default_to_unassigned() {
        let mut t = Topology::new();
        let n = t.add_node();
        assert_eq!(t.system_id(n), 0);
        assert!(!t.is_labelled());
        t.set_system_id(n, 3);
        assert!(t.is_labelled());
    }

    #[test]
    fn hybrid_encoding_round_trips() {
        let sid = encode_hybrid(12, 3);
        assert_eq!(decode_hybrid(sid), (12, 3));
        assert_eq!(sid, 12 << 16 | 3);
    }
}
