//! The message bus seam and an in-process implementation.
//!
//! The kernel treats its transport as a bus with five primitives:
//! `rank`, `size`, `send`, `try_receive`, and a blocking `all_gather`.
//! An MPI binding implements the same trait out of tree; [`MemoryBus`]
//! implements it over channels so multi-host simulations run inside one
//! process, one thread per host, which is how the distributed executors
//! are tested.

use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

// ── BusError ─────────────────────────────────────────────────────

/// Transport failure surfaced by a bus operation.
#[derive(Debug, PartialEq, Eq)]
pub enum BusError {
    /// A peer endpoint is gone; collectives can no longer complete.
    Disconnected {
        /// The rank this endpoint was talking to, if known.
        peer: Option<u16>,
    },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer: Some(peer) } => {
                write!(f, "bus peer {peer} disconnected")
            }
            Self::Disconnected { peer: None } => write!(f, "bus disconnected"),
        }
    }
}

impl Error for BusError {}

// ── Bus ──────────────────────────────────────────────────────────

/// Inter-host message transport.
///
/// Delivery must be in order per sender pair; the window protocol
/// tolerates arbitrary latency but not reordering.
pub trait Bus: Send + Sync {
    /// This host's rank, `0..size`.
    fn rank(&self) -> u16;

    /// Number of hosts on the bus.
    fn size(&self) -> u16;

    /// Queue `payload` for delivery to `dest`. Returns once the bus has
    /// accepted responsibility for the message; acceptance is what the
    /// transmit count in the LBTS record reflects.
    fn send(&self, dest: u16, payload: Vec<u8>) -> Result<(), BusError>;

    /// Take the next delivered payload, if one is waiting.
    fn try_receive(&self) -> Result<Option<Vec<u8>>, BusError>;

    /// Contribute `local` to a blocking collective; returns every
    /// host's contribution in rank order. All hosts must call this the
    /// same number of times.
    fn all_gather(&self, local: &[u8]) -> Result<Vec<Vec<u8>>, BusError>;
}

// ── MemoryBus ────────────────────────────────────────────────────

/// One endpoint of an in-process bus.
///
/// Built as a cluster: [`MemoryBus::cluster(n)`](MemoryBus::cluster)
/// returns `n` endpoints wired to each other over unbounded channels.
/// Point-to-point payloads and all-gather records travel on separate
/// channels so a collective never swallows an event message.
pub struct MemoryBus {
    rank: u16,
    size: u16,
    event_tx: Vec<Sender<Vec<u8>>>,
    event_rx: Receiver<Vec<u8>>,
    gather_tx: Vec<Sender<(u16, Vec<u8>)>>,
    gather_rx: Receiver<(u16, Vec<u8>)>,
    /// Records from peers that have already raced ahead into their next
    /// collective; consumed before blocking on the channel.
    gather_pending: Mutex<Vec<(u16, Vec<u8>)>>,
}

// Compile-time assertion: the bus is shared with the engine's workers
// through the remote hook.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<MemoryBus>();
};

impl MemoryBus {
    /// Build `n` endpoints wired into one bus.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn cluster(n: u16) -> Vec<MemoryBus> {
        assert!(n > 0, "a bus needs at least one endpoint");
        let mut event_channels = Vec::with_capacity(n as usize);
        let mut gather_channels = Vec::with_capacity(n as usize);
        for _ in 0..n {
            event_channels.push(unbounded::<Vec<u8>>());
            gather_channels.push(unbounded::<(u16, Vec<u8>)>());
        }
        let event_tx: Vec<Sender<Vec<u8>>> =
            event_channels.iter().map(|(tx, _)| tx.clone()).collect();
        let gather_tx: Vec<Sender<(u16, Vec<u8>)>> =
            gather_channels.iter().map(|(tx, _)| tx.clone()).collect();

        event_channels
            .into_iter()
            .zip(gather_channels)
            .enumerate()
            .map(|(rank, ((_, event_rx), (_, gather_rx)))| MemoryBus {
                rank: rank as u16,
                size: n,
                event_tx: event_tx.clone(),
                event_rx,
                gather_tx: gather_tx.clone(),
                gather_rx,
                gather_pending: Mutex::new(Vec::new()),
            })
            .collect()
    }
}

impl Bus for MemoryBus {
    fn rank(&self) -> u16 {
        self.rank
    }

    fn size(&self) -> u16 {
        self.size
    }

    fn send(&self, dest: u16, payload: Vec<u8>) -> Result<(), BusError> {
        self.event_tx[dest as usize]
            .send(payload)
            .map_err(|_| BusError::Disconnected { peer: Some(dest) })
    }

    fn try_receive(&self) -> Result<Option<Vec<u8>>, BusError> {
        Ok(self.event_rx.try_recv().ok())
    }

    fn all_gather(&self, local: &[u8]) -> Result<Vec<Vec<u8>>, BusError> {
        let mut results: Vec<Option<Vec<u8>>> = vec![None; self.size as usize];
        results[self.rank as usize] = Some(local.to_vec());

        for peer in 0..self.size {
            if peer == self.rank {
                continue;
            }
            self.gather_tx[peer as usize]
                .send((self.rank, local.to_vec()))
                .map_err(|_| BusError::Disconnected { peer: Some(peer) })?;
        }

        // Serve buffered records first: a fast peer may have posted its
        // next-generation record while we were still collecting.
        {
            let mut pending = self
                .gather_pending
                .lock()
                .expect("gather buffer mutex poisoned");
            let mut index = 0;
            while index < pending.len() {
                let from = pending[index].0 as usize;
                if results[from].is_none() {
                    let (_, bytes) = pending.remove(index);
                    results[from] = Some(bytes);
                } else {
                    index += 1;
                }
            }
        }

        while results.iter().any(Option::is_none) {
            let (from, bytes) = self
                .gather_rx
                .recv()
                .map_err(|_| BusError::Disconnected { peer: None })?;
            if results[from as usize].is_none() {
                results[from as usize] = Some(bytes);
            } else {
                self.gather_pending
                    .lock()
                    .expect("gather buffer mutex poisoned")
                    .push((from, bytes));
            }
        }

        Ok(results
            .into_iter()
            .map(|entry| entry.expect("collective complete"))
            .collect())
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn send_and_try_receive_round_trip() {
        let mut cluster = MemoryBus::cluster(2);
        let b = cluster.pop().unwrap();
        let a = cluster.pop().unwrap();
        assert_eq!((a.rank(), b.rank()), (0, 1));

        a.send(1, vec![1, 2, 3]).unwrap();
        assert_eq!(b.try_receive().unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(b.try_receive().unwrap(), None);
    }

    #[test]
    fn all_gather_returns_rank_ordered_records() {
        let cluster = MemoryBus::cluster(3);
        let handles: Vec<_> = cluster
            .into_iter()
            .map(|bus| {
                thread::spawn(move || {
                    let local = vec![bus.rank() as u8; 2];
                    bus.all_gather(&local).unwrap()
                })
            })
            .collect();
        for handle in handles {
            let gathered = handle.join().unwrap();
            assert_eq!(gathered, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);
        }
    }

    #[test]
    fn repeated_gathers_do_not_mix_generations() {
        let cluster = MemoryBus::cluster(2);
        let handles: Vec<_> = cluster
            .into_iter()
            .map(|bus| {
                thread::spawn(move || {
                    for generation in 0u8..50 {
                        let gathered = bus.all_gather(&[generation]).unwrap();
                        assert_eq!(gathered, vec![vec![generation], vec![generation]]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn gather_after_peer_drop_reports_disconnect() {
        let mut cluster = MemoryBus::cluster(2);
        let b = cluster.pop().unwrap();
        drop(cluster); // rank 0 gone
        let err = b.all_gather(&[1]).unwrap_err();
        assert!(matches!(err, BusError::Disconnected { .. }));
    }
}
