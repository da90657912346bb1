//! The distributed executor: one sequential timeline per host.
//!
//! Every host owns a single logical process holding all of its nodes
//! (plus the public process), and the [`WindowDriver`] advances it one
//! round per granted window. Parallelism comes from the hosts, not from
//! threads; the hybrid executor adds intra-host threading on top of the
//! same protocol.

use std::sync::Arc;

use skein_core::Time;
use skein_engine::{ConfigError, EngineShared, KernelConfig, LabelMode, RoundEngine, RunMetrics};
use skein_topo::{encode_hybrid, Topology};

use crate::bus::{Bus, BusError};
use crate::codec::EventCodec;
use crate::driver::WindowDriver;

/// Conservative distributed executor over a message bus.
pub struct DistributedExecutor {
    engine: RoundEngine,
    driver: WindowDriver,
}

impl DistributedExecutor {
    /// Build the executor for this host.
    ///
    /// Nodes must be labelled with their bare host rank before the call
    /// (the default label 0 places a node on rank 0). Local nodes are
    /// relabelled onto this host's single process.
    pub fn new(
        config: &KernelConfig,
        topology: Arc<Topology>,
        bus: Box<dyn Bus>,
        codec: Arc<dyn EventCodec>,
    ) -> Result<DistributedExecutor, ConfigError> {
        config.validate()?;
        let rank = bus.rank();
        for node in 0..topology.node_count() {
            if topology.system_id(node) == rank as u32 {
                topology.set_system_id(node, encode_hybrid(1, rank));
            }
        }
        let engine = RoundEngine::new(1, 1, topology, LabelMode::Hybrid { rank }, config)?;
        let driver = WindowDriver::new(bus, codec);
        driver.attach(engine.shared());
        Ok(DistributedExecutor { engine, driver })
    }

    /// This host's rank.
    pub fn rank(&self) -> u16 {
        self.driver.rank()
    }

    /// The engine's shared state.
    pub fn shared(&self) -> &Arc<EngineShared> {
        self.engine.shared()
    }

    /// Metrics accumulated by the engine.
    pub fn metrics(&self) -> &RunMetrics {
        self.engine.metrics()
    }

    /// Cross-host events received so far.
    pub fn rx_count(&self) -> u32 {
        self.driver.rx_count()
    }

    /// Cross-host events sent so far.
    pub fn tx_count(&self) -> u32 {
        self.driver.tx_count()
    }

    /// Tighten every process's lookahead (co-simulation coupling).
    pub fn bound_lookahead(&mut self, lookahead: Time) {
        self.driver.bound_lookahead(lookahead);
    }

    /// Run to global quiescence.
    ///
    /// The calling thread participates as worker 0 of the engine; its
    /// adopted public process is parked for the duration and re-adopted
    /// before returning, so destroy events and post-run queries keep a
    /// process to run against.
    pub fn run(&mut self) -> Result<(), BusError> {
        self.engine.shared().return_public_lp();
        let result = self.driver.run(&mut self.engine);
        self.engine.shared().adopt_public_lp();
        result
    }
}
