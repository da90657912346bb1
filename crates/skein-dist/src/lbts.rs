//! The LBTS wire record.
//!
//! Each host contributes one fixed-size record per window iteration:
//! its receive and transmit counts, rank, local-finished flag, and the
//! smallest pending timestamp. The fold over all records gives the
//! lower bound on time stamp that gates window advance.

use skein_core::Time;

/// Byte length of an encoded record.
pub const LBTS_MESSAGE_LEN: usize = 21;

/// One host's contribution to the LBTS collective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LbtsMessage {
    /// Cross-host events received so far.
    pub rx_count: u32,
    /// Cross-host events transmitted so far.
    pub tx_count: u32,
    /// Sender's rank.
    pub rank: u32,
    /// Whether the sender has no more local work.
    pub finished: bool,
    /// Sender's smallest pending timestamp.
    pub smallest_time: Time,
}

impl LbtsMessage {
    /// Encode as the fixed 21-byte little-endian record:
    /// `rx: u32 | tx: u32 | rank: u32 | finished: u8 | smallest: i64`.
    pub fn encode(&self) -> [u8; LBTS_MESSAGE_LEN] {
        let mut out = [0u8; LBTS_MESSAGE_LEN];
        out[0..4].copy_from_slice(&self.rx_count.to_le_bytes());
        out[4..8].copy_from_slice(&self.tx_count.to_le_bytes());
        out[8..12].copy_from_slice(&self.rank.to_le_bytes());
        out[12] = self.finished as u8;
        out[13..21].copy_from_slice(&self.smallest_time.ps().to_le_bytes());
        out
    }

    /// Decode a record produced by [`encode`](LbtsMessage::encode).
    ///
    /// Returns `None` when the buffer has the wrong length.
    pub fn decode(bytes: &[u8]) -> Option<LbtsMessage> {
        if bytes.len() != LBTS_MESSAGE_LEN {
            return None;
        }
        Some(LbtsMessage {
            rx_count: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            tx_count: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            rank: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
            finished: bytes[12] != 0,
            smallest_time: Time::from_ps(i64::from_le_bytes(bytes[13..21].try_into().ok()?)),
        })
    }
}

/// The fold of every host's record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LbtsFold {
    /// Minimum smallest-time over all hosts.
    pub smallest_time: Time,
    /// Σ rx over all hosts.
    pub total_rx: u32,
    /// Σ tx over all hosts.
    pub total_tx: u32,
    /// Whether every host reported local-finished.
    pub all_finished: bool,
}

impl LbtsFold {
    /// Fold a gathered set of records.
    pub fn fold(records: impl IntoIterator<Item = LbtsMessage>) -> LbtsFold {
        let mut out = LbtsFold {
            smallest_time: Time::MAX,
            total_rx: 0,
            total_tx: 0,
            all_finished: true,
        };
        for record in records {
            out.smallest_time = out.smallest_time.min(record.smallest_time);
            out.total_rx += record.rx_count;
            out.total_tx += record.tx_count;
            out.all_finished &= record.finished;
        }
        out
    }

    /// No transient messages: every transmitted event was received.
    pub fn quiescent(&self) -> bool {
        self.total_rx == self.total_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_bytes() {
        let record = LbtsMessage {
            rx_count: 3,
            tx_count: 7,
            rank: 2,
            finished: true,
            smallest_time: Time::from_ns(500),
        };
        let bytes = record.encode();
        assert_eq!(bytes.len(), LBTS_MESSAGE_LEN);
        assert_eq!(LbtsMessage::decode(&bytes), Some(record));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(LbtsMessage::decode(&[0; 20]), None);
        assert_eq!(LbtsMessage::decode(&[0; 22]), None);
    }

    #[test]
    fn fold_takes_min_time_and_sums_counts() {
        let fold = LbtsFold::fold([
            LbtsMessage {
                rx_count: 1,
                tx_count: 2,
                rank: 0,
                finished: true,
                smallest_time: Time::from_ns(900),
            },
            LbtsMessage {
                rx_count: 1,
                tx_count: 1,
                rank: 1,
                finished: false,
                smallest_time: Time::from_ns(400),
            },
        ]);
        assert_eq!(fold.smallest_time, Time::from_ns(400));
        assert_eq!((fold.total_rx, fold.total_tx), (2, 3));
        assert!(!fold.all_finished);
        assert!(!fold.quiescent());
    }

    #[test]
    fn sentinel_times_survive_the_record() {
        // The smallest-time field is signed; a host that has not started
        // yet may legitimately report zero or the initial sentinel.
        let record = LbtsMessage {
            rx_count: 0,
            tx_count: 0,
            rank: 0,
            finished: false,
            smallest_time: Time::MAX,
        };
        assert_eq!(
            LbtsMessage::decode(&record.encode()).unwrap().smallest_time,
            Time::MAX
        );
    }
}
