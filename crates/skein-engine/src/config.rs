//! Kernel configuration, validation, and error types.
//!
//! [`KernelConfig`] is the input to enabling a simulation.
//! [`validate()`](KernelConfig::validate) checks structural invariants
//! up front; scheduling calls made later never return errors — they
//! succeed or abort.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use skein_core::Time;

// ── SortMethod ───────────────────────────────────────────────────

/// Comparator used to order logical processes before workers claim
/// them. All comparators sort descending, so the heaviest process is
/// claimed first and the round's critical path shrinks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortMethod {
    /// By last-round execution time (default).
    #[default]
    ByExecutionTime,
    /// By events drained from the mailbox at the last round boundary.
    ByPendingEventCount,
    /// By total executed event count.
    ByEventCount,
    /// By current simulation time.
    BySimulationTime,
}

impl FromStr for SortMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "by_execution_time" => Ok(Self::ByExecutionTime),
            "by_pending_event_count" => Ok(Self::ByPendingEventCount),
            "by_event_count" => Ok(Self::ByEventCount),
            "by_simulation_time" => Ok(Self::BySimulationTime),
            other => Err(ConfigError::UnknownSortMethod {
                name: other.to_string(),
            }),
        }
    }
}

// ── SimulatorKind ────────────────────────────────────────────────

/// Which executor drives the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SimulatorKind {
    /// Single host, worker threads, round barriers (default).
    #[default]
    Multithreaded,
    /// One sequential timeline per host, LBTS windows across hosts.
    Distributed,
    /// Multithreaded inside each host, LBTS windows across hosts.
    Hybrid,
    /// Recognised but not implemented; rejected at enable time.
    NullMessage,
}

impl FromStr for SimulatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "multithreaded" => Ok(Self::Multithreaded),
            "distributed" => Ok(Self::Distributed),
            "hybrid" => Ok(Self::Hybrid),
            "null_message" => Ok(Self::NullMessage),
            other => Err(ConfigError::UnknownImpl {
                name: other.to_string(),
            }),
        }
    }
}

// ── KernelConfig ─────────────────────────────────────────────────

/// Configuration consumed when the simulator is enabled.
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Worker threads per host, caller thread included.
    /// Zero selects the hardware concurrency.
    pub max_threads: u32,
    /// Link-delay threshold for partition cuts. Zero selects the median
    /// point-to-point delay sampled from the topology.
    pub min_lookahead: Time,
    /// Process priority comparator.
    pub sort_method: SortMethod,
    /// Rounds between priority re-sorts. Zero selects
    /// `ceil(log2(systems) / 4 + 1)`.
    pub sort_period: u32,
    /// Executor variant.
    pub simulator: SimulatorKind,
    /// Picoseconds per time step reported by the facade.
    pub time_resolution_ps: u64,
    /// Seed for the per-process deterministic RNG streams.
    pub rng_seed: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_threads: 0,
            min_lookahead: Time::ZERO,
            sort_method: SortMethod::default(),
            sort_period: 0,
            simulator: SimulatorKind::default(),
            time_resolution_ps: 1,
            rng_seed: 1,
        }
    }
}

impl KernelConfig {
    /// Check structural invariants. Called by `enable()`; no partial
    /// state exists if this fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulator == SimulatorKind::NullMessage {
            return Err(ConfigError::UnsupportedImpl {
                name: "null_message".to_string(),
            });
        }
        if self.time_resolution_ps == 0 {
            return Err(ConfigError::ZeroTimeResolution);
        }
        if self.min_lookahead < Time::ZERO {
            return Err(ConfigError::NegativeLookahead {
                value: self.min_lookahead,
            });
        }
        Ok(())
    }

    /// The worker-thread cap, with hardware-concurrency fallback.
    pub fn resolved_max_threads(&self) -> u32 {
        if self.max_threads != 0 {
            return self.max_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    }

    /// The priority-sort period for a given process count.
    pub fn resolved_sort_period(&self, system_count: u32) -> u32 {
        if self.sort_period != 0 {
            return self.sort_period;
        }
        ((system_count.max(1) as f64).log2() / 4.0 + 1.0).ceil() as u32
    }
}

// ── ConfigError ──────────────────────────────────────────────────

/// Errors detected when enabling the simulator.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The simulator is already enabled on this thread.
    AlreadyEnabled,
    /// An operation needed an enabled simulator and found none.
    NotEnabled,
    /// Thread count resolved to zero.
    ZeroThreads,
    /// Manual partition requested zero logical processes.
    EmptyExecutor,
    /// Unrecognised sort-method name.
    UnknownSortMethod {
        /// The offending name.
        name: String,
    },
    /// Unrecognised simulator-implementation name.
    UnknownImpl {
        /// The offending name.
        name: String,
    },
    /// Recognised implementation with no executor behind it.
    UnsupportedImpl {
        /// The implementation name.
        name: String,
    },
    /// A bus-backed implementation was selected without supplying a
    /// bus.
    MissingBus,
    /// `time_resolution_ps` was zero.
    ZeroTimeResolution,
    /// Negative minimum lookahead.
    NegativeLookahead {
        /// The offending value.
        value: Time,
    },
    /// A manual partition labelled a node outside `1..=systems`.
    BadManualLabel {
        /// The offending node.
        node: u32,
        /// Its label.
        label: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyEnabled => write!(f, "simulator already enabled on this thread"),
            Self::NotEnabled => write!(f, "no enabled simulator on this thread"),
            Self::ZeroThreads => write!(f, "there must be at least one thread"),
            Self::EmptyExecutor => write!(f, "there must be at least one logical process"),
            Self::UnknownSortMethod { name } => write!(f, "unknown scheduling method '{name}'"),
            Self::UnknownImpl { name } => write!(f, "unknown simulator implementation '{name}'"),
            Self::UnsupportedImpl { name } => {
                write!(f, "simulator implementation '{name}' is not supported")
            }
            Self::MissingBus => {
                write!(f, "a bus-backed simulator implementation needs a message bus")
            }
            Self::ZeroTimeResolution => write!(f, "time resolution must be at least 1ps"),
            Self::NegativeLookahead { value } => {
                write!(f, "minimum lookahead must not be negative, got {value}")
            }
            Self::BadManualLabel { node, label } => {
                write!(f, "node {node} labelled {label}, outside the process range")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert_eq!(KernelConfig::default().validate(), Ok(()));
    }

    #[test]
    fn null_message_is_recognised_but_rejected() {
        assert_eq!(
            "null_message".parse::<SimulatorKind>(),
            Ok(SimulatorKind::NullMessage)
        );
        let config = KernelConfig {
            simulator: SimulatorKind::NullMessage,
            ..KernelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedImpl { .. })
        ));
    }

    #[test]
    fn unknown_names_are_rejected_at_parse() {
        assert!(matches!(
            "fastest".parse::<SortMethod>(),
            Err(ConfigError::UnknownSortMethod { .. })
        ));
        assert!(matches!(
            "optimistic".parse::<SimulatorKind>(),
            Err(ConfigError::UnknownImpl { .. })
        ));
    }

    #[test]
    fn sort_period_auto_rule() {
        let config = KernelConfig::default();
        // ceil(log2(S)/4 + 1)
        assert_eq!(config.resolved_sort_period(1), 1);
        assert_eq!(config.resolved_sort_period(2), 2);
        assert_eq!(config.resolved_sort_period(16), 2);
        assert_eq!(config.resolved_sort_period(256), 3);
        let explicit = KernelConfig {
            sort_period: 7,
            ..KernelConfig::default()
        };
        assert_eq!(explicit.resolved_sort_period(256), 7);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let config = KernelConfig {
            time_resolution_ps: 0,
            ..KernelConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeResolution));
    }
}
