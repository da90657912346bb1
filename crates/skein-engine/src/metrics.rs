//! Per-round and per-run performance metrics.
//!
//! The executor records wall-clock timings as it drives rounds; the
//! caller reads them back after `run()`. This is the kernel's only
//! telemetry surface — there is no logging dependency and no file
//! output.

/// Timings for a single round, in nanoseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundMetrics {
    /// Time spent re-sorting the process priority order (zero on rounds
    /// that fall outside the sort period).
    pub sort_nanos: u64,
    /// Stage 1: event processing including the closing barrier.
    pub process_nanos: u64,
    /// Stage 2: mailbox draining including the closing barrier.
    pub message_nanos: u64,
}

/// Per-worker totals across a whole run, in nanoseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerMetrics {
    /// Time spent executing logical-process rounds.
    pub exec_nanos: u64,
    /// Time spent spinning at barriers.
    pub sync_nanos: u64,
}

/// Aggregate metrics for one `run()`.
#[derive(Clone, Debug, Default)]
pub struct RunMetrics {
    /// Number of rounds executed.
    pub rounds: u64,
    /// One entry per round.
    pub per_round: Vec<RoundMetrics>,
    /// One entry per worker; index 0 is the caller thread.
    pub workers: Vec<WorkerMetrics>,
    /// Events executed across all logical processes.
    pub event_count: u64,
}

impl RunMetrics {
    /// Total stage-1 processing time over the run.
    pub fn total_process_nanos(&self) -> u64 {
        self.per_round.iter().map(|r| r.process_nanos).sum()
    }

    /// Total mailbox-drain time over the run.
    pub fn total_message_nanos(&self) -> u64 {
        self.per_round.iter().map(|r| r.message_nanos).sum()
    }

    /// Total priority-sort time over the run.
    pub fn total_sort_nanos(&self) -> u64 {
        self.per_round.iter().map(|r| r.sort_nanos).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_per_round_entries() {
        let m = RunMetrics {
            rounds: 2,
            per_round: vec![
                RoundMetrics {
                    sort_nanos: 1,
                    process_nanos: 10,
                    message_nanos: 100,
                },
                RoundMetrics {
                    sort_nanos: 2,
                    process_nanos: 20,
                    message_nanos: 200,
                },
            ],
            workers: Vec::new(),
            event_count: 0,
        };
        assert_eq!(m.total_sort_nanos(), 3);
        assert_eq!(m.total_process_nanos(), 30);
        assert_eq!(m.total_message_nanos(), 300);
    }
}
