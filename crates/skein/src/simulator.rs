//! The simulator facade: one entry point over three executors.
//!
//! [`Simulator`] is a set of associated functions over thread-local
//! state: enabling installs an executor on the calling thread, and every
//! scheduling call dispatches through the worker's thread-local process
//! binding. Handlers running inside a round use exactly the same calls.
//!
//! Lifecycle calls ([`enable`](Simulator::enable), [`run`](Simulator::run),
//! [`destroy`](Simulator::destroy)) must be made from the enabling
//! thread, outside any event handler.

use std::cell::RefCell;
use std::sync::Arc;

use skein_core::{Event, EventId, Time};
use skein_dist::{Bus, BusError, DistributedExecutor, EventCodec, HybridExecutor};
use skein_engine::{
    api, ConfigError, EngineShared, KernelConfig, LabelMode, RoundEngine, RunMetrics,
    SimulatorKind,
};
use skein_topo::{partition_flat, Topology};

// ── Executors ────────────────────────────────────────────────────

/// Single-host executor with automatic or manual partitioning.
struct MultithreadedExecutor {
    engine: RoundEngine,
    config: KernelConfig,
    topology: Arc<Topology>,
    partitioned: bool,
}

impl MultithreadedExecutor {
    fn new_auto(
        config: KernelConfig,
        topology: Arc<Topology>,
    ) -> Result<MultithreadedExecutor, ConfigError> {
        config.validate()?;
        let engine = RoundEngine::new(1, 0, topology.clone(), LabelMode::Flat, &config)?;
        Ok(MultithreadedExecutor {
            engine,
            config,
            topology,
            partitioned: false,
        })
    }

    fn new_manual(
        config: KernelConfig,
        topology: Arc<Topology>,
        threads: u32,
        systems: u32,
    ) -> Result<MultithreadedExecutor, ConfigError> {
        config.validate()?;
        if threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if systems == 0 {
            return Err(ConfigError::EmptyExecutor);
        }
        for node in 0..topology.node_count() {
            let label = topology.system_id(node);
            if label == 0 || label > systems {
                return Err(ConfigError::BadManualLabel { node, label });
            }
        }
        let engine = RoundEngine::new(threads, systems, topology.clone(), LabelMode::Flat, &config)?;
        Ok(MultithreadedExecutor {
            engine,
            config,
            topology,
            partitioned: true,
        })
    }

    /// Automatic partition: label the topology, rebuild the engine at
    /// the discovered process count, and move seed events over.
    ///
    /// # Panics
    ///
    /// Panics when the partition fails or produces no processes; both
    /// are fatal before rounds start.
    fn partition(&mut self) {
        let outcome = partition_flat(&self.topology, self.config.min_lookahead)
            .unwrap_or_else(|e| panic!("automatic partition failed: {e}"));
        assert!(
            outcome.system_count > 0,
            "automatic partition found no nodes to simulate"
        );
        let threads = self
            .config
            .resolved_max_threads()
            .min(outcome.system_count)
            .max(1);

        let seeds = self.engine.shared().with_slot(0, |lp| lp.take_events());
        let engine = RoundEngine::new(
            threads,
            outcome.system_count,
            self.topology.clone(),
            LabelMode::Flat,
            &self.config,
        )
        .expect("partitioned engine configuration is valid");
        engine.shared().bind_to_thread();
        self.engine = engine;
        self.engine.shared().transfer_seed_events(seeds);
        self.partitioned = true;
    }

    fn run(&mut self) {
        self.engine.shared().return_public_lp();
        if !self.partitioned {
            self.partition();
        }
        self.engine.run();
        self.engine.shared().adopt_public_lp();
    }
}

enum Executor {
    Multithreaded(MultithreadedExecutor),
    Distributed(DistributedExecutor),
    Hybrid(HybridExecutor),
}

impl Executor {
    fn shared(&self) -> &Arc<EngineShared> {
        match self {
            Executor::Multithreaded(executor) => executor.engine.shared(),
            Executor::Distributed(executor) => executor.shared(),
            Executor::Hybrid(executor) => executor.shared(),
        }
    }

    fn run(&mut self) -> Result<(), BusError> {
        match self {
            Executor::Multithreaded(executor) => {
                executor.run();
                Ok(())
            }
            Executor::Distributed(executor) => executor.run(),
            Executor::Hybrid(executor) => executor.run(),
        }
    }

    fn metrics(&self) -> RunMetrics {
        match self {
            Executor::Multithreaded(executor) => executor.engine.metrics().clone(),
            Executor::Distributed(executor) => executor.metrics().clone(),
            Executor::Hybrid(executor) => executor.metrics().clone(),
        }
    }
}

thread_local! {
    static EXECUTOR: RefCell<Option<Executor>> = const { RefCell::new(None) };
}

fn install(executor: Executor) -> Result<(), ConfigError> {
    EXECUTOR.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(ConfigError::AlreadyEnabled);
        }
        executor.shared().bind_to_thread();
        executor.shared().adopt_public_lp();
        *slot = Some(executor);
        Ok(())
    })
}

fn with_executor<R>(f: impl FnOnce(&mut Executor) -> R) -> R {
    EXECUTOR.with(|slot| {
        let mut slot = slot.borrow_mut();
        f(slot
            .as_mut()
            .expect("no enabled simulator on this thread"))
    })
}

// ── Simulator ────────────────────────────────────────────────────

/// The public face of the kernel.
///
/// All functions are associated functions over the calling thread's
/// enabled executor; scheduling functions additionally dispatch through
/// the thread-local process binding, so they behave identically on the
/// enabling thread and inside event handlers on worker threads.
pub struct Simulator;

impl Simulator {
    // ── Lifecycle ────────────────────────────────────────────────

    /// Enable the single-host multithreaded simulator with automatic
    /// topology partitioning at the first [`run`](Simulator::run).
    pub fn enable(config: KernelConfig, topology: Arc<Topology>) -> Result<(), ConfigError> {
        match config.simulator {
            SimulatorKind::Multithreaded => {}
            SimulatorKind::Distributed | SimulatorKind::Hybrid => {
                return Err(ConfigError::MissingBus)
            }
            SimulatorKind::NullMessage => {
                return Err(ConfigError::UnsupportedImpl {
                    name: "null_message".to_string(),
                })
            }
        }
        install(Executor::Multithreaded(MultithreadedExecutor::new_auto(
            config, topology,
        )?))
    }

    /// Enable the single-host simulator with a manual partition: the
    /// topology is already labelled with `1..=systems` and `threads`
    /// workers drive it.
    pub fn enable_manual(
        config: KernelConfig,
        topology: Arc<Topology>,
        threads: u32,
        systems: u32,
    ) -> Result<(), ConfigError> {
        install(Executor::Multithreaded(MultithreadedExecutor::new_manual(
            config, topology, threads, systems,
        )?))
    }

    /// Enable the distributed executor: one sequential timeline on this
    /// host, LBTS windows across the bus.
    pub fn enable_distributed(
        config: KernelConfig,
        topology: Arc<Topology>,
        bus: Box<dyn Bus>,
        codec: Arc<dyn EventCodec>,
    ) -> Result<(), ConfigError> {
        install(Executor::Distributed(DistributedExecutor::new(
            &config, topology, bus, codec,
        )?))
    }

    /// Enable the hybrid executor: a worker pool on this host, LBTS
    /// windows across the bus, automatic intra-host partitioning.
    pub fn enable_hybrid(
        config: KernelConfig,
        topology: Arc<Topology>,
        bus: Box<dyn Bus>,
        codec: Arc<dyn EventCodec>,
    ) -> Result<(), ConfigError> {
        install(Executor::Hybrid(HybridExecutor::new(
            config, topology, bus, codec,
        )?))
    }

    /// Whether an executor is enabled on this thread.
    pub fn is_enabled() -> bool {
        EXECUTOR.with(|slot| slot.borrow().is_some())
    }

    /// Run rounds until every process is finished and, in bus-backed
    /// modes, no transient message remains.
    ///
    /// A transport failure abandons the run and is returned; the
    /// simulation reports finished with that error status.
    pub fn run() -> Result<(), BusError> {
        with_executor(|executor| executor.run())
    }

    /// Invoke every registered destroy event in insertion order
    /// (cancelled ones are skipped), then disable the executor.
    pub fn destroy() {
        let executor = EXECUTOR.with(|slot| slot.borrow_mut().take());
        if let Some(executor) = executor {
            for id in executor.shared().take_destroy_list() {
                if let Some(event) = id.event() {
                    event.invoke();
                }
            }
            executor.shared().return_public_lp();
            EngineShared::unbind_thread();
        }
    }

    // ── Scheduling ───────────────────────────────────────────────

    /// Schedule a closure after `delay` on the calling process.
    pub fn schedule(delay: Time, f: impl FnOnce() + Send + 'static) -> EventId {
        api::schedule(delay, f)
    }

    /// Schedule a prebuilt event after `delay` on the calling process.
    pub fn schedule_event(delay: Time, event: Event) -> EventId {
        api::schedule_event(delay, event)
    }

    /// Schedule a closure at the current timestamp.
    pub fn schedule_now(f: impl FnOnce() + Send + 'static) -> EventId {
        api::schedule_now(f)
    }

    /// Schedule a closure onto the process (or host) owning `node`.
    pub fn schedule_with_context(node: u32, delay: Time, f: impl FnOnce() + Send + 'static) {
        api::schedule_with_context(node, delay, f)
    }

    /// Schedule a prebuilt event onto the process owning `node`.
    pub fn schedule_event_with_context(node: u32, delay: Time, event: Event) {
        api::schedule_event_with_context(node, delay, event)
    }

    /// Schedule a closure on the public process at the earliest
    /// globally safe time.
    pub fn schedule_global(f: impl FnOnce() + Send + 'static) {
        api::schedule_global(f)
    }

    /// Register a closure to run at [`destroy`](Simulator::destroy).
    pub fn schedule_destroy(f: impl FnOnce() + Send + 'static) -> EventId {
        api::schedule_destroy(f)
    }

    // ── Handles ──────────────────────────────────────────────────

    /// Remove the handle's event from its queue and cancel it.
    pub fn remove(id: &EventId) {
        api::remove(id)
    }

    /// Cancel the handle's event without removing it.
    pub fn cancel(id: &EventId) {
        api::cancel(id)
    }

    /// Whether the handle no longer refers to a pending event.
    pub fn is_expired(id: &EventId) -> bool {
        api::is_expired(id)
    }

    /// Time remaining until the handle's event runs; zero if expired.
    pub fn get_delay_left(id: &EventId) -> Time {
        api::delay_left(id)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Current simulation time on the calling process.
    pub fn now() -> Time {
        api::now()
    }

    /// The calling process's id on a single host, or this host's rank
    /// in bus-backed modes.
    pub fn get_system_id() -> u32 {
        match api::label_mode() {
            LabelMode::Flat => api::system_id(),
            LabelMode::Hybrid { rank } => rank as u32,
        }
    }

    /// Context of the event currently being executed.
    pub fn get_context() -> u32 {
        api::current_context()
    }

    /// Total events executed on this host.
    pub fn get_event_count() -> u64 {
        api::event_count()
    }

    /// The largest schedulable simulation time.
    pub fn get_maximum_simulation_time() -> Time {
        api::maximum_simulation_time()
    }

    /// Picoseconds per reported time step.
    pub fn get_time_resolution_ps() -> u64 {
        api::time_resolution_ps()
    }

    /// Tighten every process's lookahead (co-simulation coupling).
    ///
    /// Only meaningful in bus-backed modes, where an external simulator
    /// may constrain the window more than any cut link; the single-host
    /// executor ignores it. Call before [`run`](Simulator::run).
    pub fn bound_lookahead(lookahead: Time) {
        with_executor(|executor| match executor {
            Executor::Multithreaded(_) => {}
            Executor::Distributed(executor) => executor.bound_lookahead(lookahead),
            Executor::Hybrid(executor) => executor.bound_lookahead(lookahead),
        })
    }

    /// Whether the last round recompute reported everything finished.
    pub fn is_finished() -> bool {
        with_executor(|executor| executor.shared().is_finished())
    }

    /// Metrics of the current (or completed) run.
    pub fn metrics() -> RunMetrics {
        with_executor(|executor| executor.metrics())
    }

    // ── Stop ─────────────────────────────────────────────────────

    /// Request a cooperative stop: the current event completes, the
    /// round finishes, and the run winds down. Idempotent.
    pub fn stop() {
        api::stop()
    }

    /// Schedule a stop after `delay`.
    pub fn stop_after(delay: Time) -> EventId {
        api::stop_after(delay)
    }
}
