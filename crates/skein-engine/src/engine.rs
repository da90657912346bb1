//! The shared-memory round executor.
//!
//! [`RoundEngine`] drives every logical process through repeated rounds.
//! One round is:
//!
//! 1. optional priority re-sort of the process claim order;
//! 2. stage 1 — workers claim processes off an atomic index and run each
//!    one's events up to the granted window, then spin at a barrier;
//! 3. the public process (id 0) runs on the caller thread;
//! 4. stage 2 — the same claim pattern drains every mailbox, then a
//!    second barrier;
//! 5. the caller recomputes the global clock state.
//!
//! The caller thread is worker 0 and participates in both claim loops;
//! `T - 1` additional workers are spawned when the run starts. Workers
//! never park: they spin at the stage gate, which is opened by storing
//! zero to the claim index.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use skein_core::{Event, EventId, EventKey, Time, NO_CONTEXT};
use skein_topo::Topology;

use crate::config::{ConfigError, KernelConfig, SortMethod};
use crate::context;
use crate::lp::{LabelMode, LogicalProcess};
use crate::mailbox::Mailbox;
use crate::metrics::{RoundMetrics, RunMetrics, WorkerMetrics};
use crate::sync::{spin_until, SpinGuard, SpinLock};

// ── Remote hook ──────────────────────────────────────────────────

/// Sink for events whose target node lives on another host.
///
/// Installed by the distributed layer; the shared-memory executor calls
/// it from worker threads during stage 1, so implementations buffer
/// under their own lock and flush between windows.
pub trait RemoteHook: Send + Sync {
    /// Hand off an event for `context` on host `rank` at the absolute
    /// timestamp `ts`.
    fn remote_event(&self, rank: u16, context: u32, ts: u64, event: Event);
}

/// Where a target node's events should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The node belongs to a process on this host.
    Local(u32),
    /// The node belongs to another host.
    Remote(u16),
}

// ── EngineShared ─────────────────────────────────────────────────

/// State shared between the caller thread and every worker.
///
/// Processes live in `slots`; a worker takes a process out for the
/// duration of a round and puts it back afterwards, so each slot mutex
/// is uncontended in steady state.
pub struct EngineShared {
    slots: Vec<Mutex<Option<LogicalProcess>>>,
    mailboxes: Vec<Mailbox>,
    sorted: Vec<AtomicU32>,
    topology: Arc<Topology>,
    mode: LabelMode,

    system_index: AtomicU32,
    finished_count: AtomicU32,
    recv_msg_stage: AtomicBool,
    shutdown: AtomicBool,
    stop_flag: AtomicBool,

    smallest_time: AtomicI64,
    next_public_time: AtomicI64,
    global_finished: AtomicBool,

    critical: SpinLock,
    destroy_list: Mutex<Vec<EventId>>,
    remote_hook: Mutex<Option<Arc<dyn RemoteHook>>>,
    time_resolution_ps: u64,
}

// Compile-time assertion: the shared state crosses worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<EngineShared>();
};

impl EngineShared {
    /// Number of non-public processes.
    pub fn system_count(&self) -> u32 {
        self.slots.len() as u32 - 1
    }

    /// The labelled topology this engine partitions over.
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// The label mode (flat or hybrid).
    pub fn mode(&self) -> LabelMode {
        self.mode
    }

    /// Picoseconds per reported time step.
    pub fn time_resolution_ps(&self) -> u64 {
        self.time_resolution_ps
    }

    // ── Process slots ────────────────────────────────────────────

    fn take_lp(&self, index: u32) -> LogicalProcess {
        self.slots[index as usize]
            .lock()
            .expect("process slot mutex poisoned")
            .take()
            .unwrap_or_else(|| panic!("process {index} absent from its slot"))
    }

    fn put_lp(&self, index: u32, lp: LogicalProcess) {
        let mut slot = self.slots[index as usize]
            .lock()
            .expect("process slot mutex poisoned");
        debug_assert!(slot.is_none(), "process slot {index} already occupied");
        *slot = Some(lp);
    }

    /// Run `f` against the process parked in slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if the process is currently out being driven by a worker.
    pub fn with_slot<R>(&self, index: u32, f: impl FnOnce(&mut LogicalProcess) -> R) -> R {
        let mut slot = self.slots[index as usize]
            .lock()
            .expect("process slot mutex poisoned");
        f(slot
            .as_mut()
            .unwrap_or_else(|| panic!("process {index} absent from its slot")))
    }

    /// Run `f` against the parked process, skipping in-flight ones.
    fn try_with_slot<R>(&self, index: u32, f: impl FnOnce(&mut LogicalProcess) -> R) -> Option<R> {
        let mut slot = self.slots[index as usize]
            .lock()
            .expect("process slot mutex poisoned");
        slot.as_mut().map(f)
    }

    /// The mailbox of process `index`.
    pub fn mailbox(&self, index: u32) -> &Mailbox {
        &self.mailboxes[index as usize]
    }

    fn sorted_lp(&self, claim: u32) -> u32 {
        self.sorted[claim as usize].load(Ordering::Relaxed)
    }

    // ── Global clock state ───────────────────────────────────────

    /// Smallest pending timestamp across all processes, as of the last
    /// recompute.
    pub fn smallest_time(&self) -> Time {
        Time::from_ps(self.smallest_time.load(Ordering::Acquire))
    }

    /// Override the smallest time. The distributed layer stores the
    /// LBTS fold result here before granting a window.
    pub fn set_smallest_time(&self, t: Time) {
        self.smallest_time.store(t.ps(), Ordering::Release);
    }

    /// Next pending timestamp on the public process.
    pub fn next_public_time(&self) -> Time {
        Time::from_ps(self.next_public_time.load(Ordering::Acquire))
    }

    /// Whether every process reported local-finished at the last
    /// recompute.
    pub fn is_finished(&self) -> bool {
        self.global_finished.load(Ordering::Acquire)
    }

    /// Request a cooperative stop of every process.
    ///
    /// The flag is observed inside the round loops; the current event
    /// completes, the round finishes normally, and the next recompute
    /// reports global-finished. Idempotent.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    // ── Critical section ─────────────────────────────────────────

    /// Enter the executor-wide critical section.
    pub fn critical_section(&self) -> SpinGuard<'_> {
        self.critical.lock()
    }

    // ── Destroy list ─────────────────────────────────────────────

    /// Append a destroy event. Caller holds the critical section.
    pub fn push_destroy(&self, id: EventId) {
        self.destroy_list
            .lock()
            .expect("destroy list mutex poisoned")
            .push(id);
    }

    /// Remove a destroy event by handle identity.
    pub fn remove_destroy(&self, id: &EventId) {
        let mut list = self.destroy_list.lock().expect("destroy list mutex poisoned");
        if let Some(pos) = list.iter().position(|d| d.same_entry(id)) {
            list.remove(pos);
        }
    }

    /// Whether a destroy handle no longer refers to a pending destroy
    /// event.
    pub fn destroy_expired(&self, id: &EventId) -> bool {
        match id.event() {
            None => true,
            Some(event) if event.is_cancelled() => true,
            Some(_) => {
                let list = self.destroy_list.lock().expect("destroy list mutex poisoned");
                !list.iter().any(|d| d.same_entry(id))
            }
        }
    }

    /// Take the destroy list in insertion order.
    pub fn take_destroy_list(&self) -> Vec<EventId> {
        std::mem::take(
            &mut *self
                .destroy_list
                .lock()
                .expect("destroy list mutex poisoned"),
        )
    }

    // ── Remote hook ──────────────────────────────────────────────

    /// Install the cross-host event sink.
    pub fn set_remote_hook(&self, hook: Arc<dyn RemoteHook>) {
        *self.remote_hook.lock().expect("remote hook mutex poisoned") = Some(hook);
    }

    /// The installed cross-host sink, if any.
    pub fn remote_hook(&self) -> Option<Arc<dyn RemoteHook>> {
        self.remote_hook
            .lock()
            .expect("remote hook mutex poisoned")
            .clone()
    }

    // ── Resolution ───────────────────────────────────────────────

    /// Resolve a node to its owning process or host.
    ///
    /// Before partitioning (a lone public process), everything resolves
    /// to process 0 so initialisation-stage scheduling stays local.
    pub fn resolve(&self, node: u32) -> Resolution {
        if self.system_count() == 0 {
            return Resolution::Local(0);
        }
        let system_id = self.topology.system_id(node);
        let (lp, rank) = self.mode.owner(system_id);
        if rank != self.mode.local_rank() {
            return Resolution::Remote(rank);
        }
        assert!(
            lp >= 1 && lp <= self.system_count(),
            "node {node} resolves to process {lp}, outside 1..={}",
            self.system_count()
        );
        Resolution::Local(lp)
    }

    // ── Per-round work items ─────────────────────────────────────

    /// Drive one process through its round: take it from its slot, bind
    /// it to this thread, run every due event, put it back.
    fn run_lp_round(&self, index: u32) {
        let lp = self.take_lp(index);
        let granted = self
            .smallest_time()
            .saturating_add(lp.lookahead())
            .min(self.next_public_time());
        let start = Instant::now();
        context::install_lp(lp);
        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                context::with_lp(|lp| lp.stop());
                break;
            }
            let event = context::with_lp(|lp| lp.pop_due(granted));
            match event {
                Some(event) => {
                    if event.invoke() {
                        context::with_lp(|lp| lp.note_executed());
                    }
                }
                None => break,
            }
        }
        let mut lp = context::take_lp();
        lp.record_round(start.elapsed().as_nanos() as u64);
        self.put_lp(index, lp);
    }

    fn drain_mailbox(&self, index: u32) {
        let mailbox = &self.mailboxes[index as usize];
        self.with_slot(index, |lp| lp.receive_messages(mailbox));
    }

    // ── Seed and inbound injection ───────────────────────────────

    /// Invoke a time-zero seed event on process `index`, immediately and
    /// on the calling thread. Rebinds the thread's current process
    /// around the invocation and restores it afterwards.
    pub fn invoke_seed(&self, index: u32, key: EventKey, event: Event) {
        let lp = self.take_lp(index);
        let previous = context::swap_lp(Some(lp));
        context::with_lp(|lp| lp.prepare_invoke(key));
        let ran = event.invoke();
        if ran {
            context::with_lp(|lp| lp.note_executed());
        }
        let lp = context::swap_lp(previous).expect("seed process vanished from the thread slot");
        self.put_lp(index, lp);
    }

    /// Inject an inbound cross-host event at an absolute timestamp.
    ///
    /// Called by the distributed layer between rounds, when every
    /// process is parked in its slot.
    pub fn schedule_remote(&self, node: u32, ts: u64, event: Event) {
        match self.resolve(node) {
            Resolution::Local(index) => {
                self.with_slot(index, |lp| lp.schedule_at(node, ts, event));
            }
            Resolution::Remote(rank) => {
                panic!("inbound event for node {node} resolves to foreign rank {rank}")
            }
        }
    }

    /// Move events scheduled before partitioning onto the freshly
    /// created processes.
    ///
    /// Time-zero events run immediately, in their original insertion
    /// order, on their owning process — their relative order is part of
    /// initialisation semantics and must not be parallelised. Later
    /// context-free events reschedule onto the public process.
    /// Node-bound events take the cross-process path: the public
    /// process is the sender and real nodes never live on it, so each
    /// goes into its owner's mailbox with an invalid uid and surfaces
    /// at that process's next drain, uid minted there. Time-zero events
    /// for nodes on other hosts are skipped; each host seeds its own.
    pub fn transfer_seed_events(&self, events: Vec<(EventKey, Event)>) {
        for (key, event) in events {
            if key.ts == 0 {
                let target = if key.context == NO_CONTEXT {
                    0
                } else {
                    match self.resolve(key.context) {
                        Resolution::Local(index) => index,
                        Resolution::Remote(_) => continue,
                    }
                };
                self.invoke_seed(target, key, event);
            } else if key.context == NO_CONTEXT {
                self.with_slot(0, |lp| lp.schedule_at(NO_CONTEXT, key.ts, event));
            } else {
                match self.resolve(key.context) {
                    Resolution::Local(index) => {
                        let envelope = self.with_slot(0, |lp| {
                            debug_assert!(lp.now().is_zero(), "transfer after time zero");
                            lp.envelope_for(key.context, Time::from_ts(key.ts), event)
                        });
                        self.mailbox(index).push(envelope);
                    }
                    Resolution::Remote(rank) => {
                        let hook = self
                            .remote_hook()
                            .expect("seed event for a foreign host but no bus is attached");
                        hook.remote_event(rank, key.context, key.ts, event);
                    }
                }
            }
        }
    }

    // ── Aggregates ───────────────────────────────────────────────

    /// Total events executed across every process.
    ///
    /// Exact between rounds; during a round, processes currently out on
    /// other workers are not included, matching the precision of the
    /// round loop itself.
    pub fn total_event_count(&self) -> u64 {
        let mut sum = context::with_lp_opt(|lp| lp.event_count()).unwrap_or(0);
        for index in 0..self.slots.len() as u32 {
            sum += self.try_with_slot(index, |lp| lp.event_count()).unwrap_or(0);
        }
        sum
    }

    /// Recompute the global clock state. Single writer: the caller
    /// thread, after the stage-2 barrier.
    pub fn calculate_smallest_time(&self) {
        if self.stop_flag.load(Ordering::Acquire) {
            for index in 0..self.slots.len() as u32 {
                self.with_slot(index, |lp| lp.stop());
            }
        }
        let mut smallest = Time::MAX;
        let mut finished = true;
        for index in 0..self.slots.len() as u32 {
            self.with_slot(index, |lp| {
                smallest = smallest.min(lp.next());
                finished &= lp.is_local_finished();
            });
        }
        let next_public = self.with_slot(0, |lp| lp.next());
        self.smallest_time.store(smallest.ps(), Ordering::Release);
        self.next_public_time
            .store(next_public.ps(), Ordering::Release);
        self.global_finished.store(finished, Ordering::Release);
    }

    // ── Thread binding ───────────────────────────────────────────

    /// Bind the calling thread to this engine.
    pub fn bind_to_thread(self: &Arc<Self>) {
        context::bind_engine(self.clone());
    }

    /// Remove the calling thread's engine binding.
    pub fn unbind_thread() {
        context::unbind_engine();
    }

    /// Move the public process into the calling thread's slot so facade
    /// calls outside `run()` have a process to schedule against.
    pub fn adopt_public_lp(&self) {
        let lp = self.take_lp(0);
        context::install_lp(lp);
    }

    /// Park the calling thread's process back into slot 0.
    pub fn return_public_lp(&self) {
        if let Some(lp) = context::take_lp_opt() {
            let index = lp.system_id();
            self.put_lp(index, lp);
        }
    }
}

// ── Worker loop ──────────────────────────────────────────────────

fn worker_loop(shared: Arc<EngineShared>) -> WorkerMetrics {
    shared.bind_to_thread();
    let mut metrics = WorkerMetrics::default();
    let count = shared.system_count();
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let index = shared.system_index.fetch_add(1, Ordering::Acquire);
        if index >= count {
            let start = Instant::now();
            spin_until(|| {
                shared.system_index.load(Ordering::Acquire) < count
                    || shared.shutdown.load(Ordering::Acquire)
            });
            metrics.sync_nanos += start.elapsed().as_nanos() as u64;
            continue;
        }
        let lp_index = shared.sorted_lp(index);
        if shared.recv_msg_stage.load(Ordering::Acquire) {
            shared.drain_mailbox(lp_index);
        } else {
            let start = Instant::now();
            shared.run_lp_round(lp_index);
            metrics.exec_nanos += start.elapsed().as_nanos() as u64;
        }
        shared.finished_count.fetch_add(1, Ordering::Release);
    }
    EngineShared::unbind_thread();
    metrics
}

// ── RoundEngine ──────────────────────────────────────────────────

/// The shared-memory multithreaded executor.
///
/// Owns the worker pool and the round state machine. The distributed
/// layer reuses the same engine per host, wrapping each round in the
/// LBTS window protocol.
pub struct RoundEngine {
    shared: Arc<EngineShared>,
    workers: Vec<JoinHandle<WorkerMetrics>>,
    thread_count: u32,
    sort_method: SortMethod,
    sort_period: u32,
    round: u32,
    main_worker: WorkerMetrics,
    metrics: RunMetrics,
    started: bool,
}

impl std::fmt::Debug for RoundEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundEngine")
            .field("thread_count", &self.thread_count)
            .field("sort_method", &self.sort_method)
            .field("sort_period", &self.sort_period)
            .field("round", &self.round)
            .field("started", &self.started)
            .finish()
    }
}

impl RoundEngine {
    /// Build an engine with `system_count` processes plus the public
    /// process, sharing `thread_count` workers (caller included).
    pub fn new(
        thread_count: u32,
        system_count: u32,
        topology: Arc<Topology>,
        mode: LabelMode,
        config: &KernelConfig,
    ) -> Result<RoundEngine, ConfigError> {
        if thread_count == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        config.validate()?;

        let mut slots = Vec::with_capacity(system_count as usize + 1);
        let mut mailboxes = Vec::with_capacity(system_count as usize + 1);
        for system_id in 0..=system_count {
            slots.push(Mutex::new(Some(LogicalProcess::new(
                system_id,
                config.rng_seed,
            ))));
            mailboxes.push(Mailbox::new());
        }
        let sorted = (1..=system_count).map(AtomicU32::new).collect();

        let shared = Arc::new(EngineShared {
            slots,
            mailboxes,
            sorted,
            topology,
            mode,
            system_index: AtomicU32::new(system_count),
            finished_count: AtomicU32::new(0),
            recv_msg_stage: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            stop_flag: AtomicBool::new(false),
            smallest_time: AtomicI64::new(0),
            next_public_time: AtomicI64::new(0),
            global_finished: AtomicBool::new(false),
            critical: SpinLock::new(),
            destroy_list: Mutex::new(Vec::new()),
            remote_hook: Mutex::new(None),
            time_resolution_ps: config.time_resolution_ps,
        });

        Ok(RoundEngine {
            shared,
            workers: Vec::new(),
            thread_count,
            sort_method: config.sort_method,
            sort_period: config.resolved_sort_period(system_count),
            round: 0,
            main_worker: WorkerMetrics::default(),
            metrics: RunMetrics::default(),
            started: false,
        })
    }

    /// The shared state, for the facade and the distributed layer.
    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    /// Metrics accumulated so far; complete after
    /// [`run_after`](RoundEngine::run_after).
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Recompute lookahead, initialise claim order, spawn workers.
    pub fn run_before(&mut self) {
        assert!(!self.started, "executor already running");
        self.started = true;
        let shared = &self.shared;
        let count = shared.system_count();
        for index in 1..=count {
            shared.with_slot(index, |lp| {
                lp.calculate_lookahead(shared.topology(), shared.mode())
            });
        }
        for (claim, slot) in shared.sorted.iter().enumerate() {
            slot.store(claim as u32 + 1, Ordering::Relaxed);
        }
        // Gate closed until the first stage opens it.
        shared.system_index.store(count, Ordering::Release);

        for _ in 1..self.thread_count {
            let shared = shared.clone();
            self.workers
                .push(std::thread::spawn(move || worker_loop(shared)));
        }
    }

    /// Re-sort the claim order by the configured comparator, heaviest
    /// first. Runs on the caller thread between rounds.
    fn sort_priorities(&self) {
        let shared = &self.shared;
        let count = shared.system_count() as usize;
        let mut weight = vec![0i128; count + 1];
        for index in 1..=count as u32 {
            weight[index as usize] = shared.with_slot(index, |lp| match self.sort_method {
                SortMethod::ByExecutionTime => lp.exec_nanos() as i128,
                SortMethod::ByPendingEventCount => lp.pending_event_count() as i128,
                SortMethod::ByEventCount => lp.event_count() as i128,
                SortMethod::BySimulationTime => lp.now().ps() as i128,
            });
        }
        let mut order: Vec<u32> = (1..=count as u32).collect();
        order.sort_by(|a, b| weight[*b as usize].cmp(&weight[*a as usize]));
        for (claim, lp_index) in order.into_iter().enumerate() {
            shared.sorted[claim].store(lp_index, Ordering::Relaxed);
        }
    }

    /// Claim loop the caller thread runs inside each stage.
    fn claim_loop(&mut self) {
        let shared = self.shared.clone();
        let count = shared.system_count();
        loop {
            let index = shared.system_index.fetch_add(1, Ordering::Acquire);
            if index >= count {
                break;
            }
            let lp_index = shared.sorted_lp(index);
            if shared.recv_msg_stage.load(Ordering::Acquire) {
                shared.drain_mailbox(lp_index);
            } else {
                let start = Instant::now();
                shared.run_lp_round(lp_index);
                self.main_worker.exec_nanos += start.elapsed().as_nanos() as u64;
            }
            shared.finished_count.fetch_add(1, Ordering::Release);
        }
    }

    fn barrier(&mut self) {
        let shared = self.shared.clone();
        let count = shared.system_count();
        let start = Instant::now();
        spin_until(|| shared.finished_count.load(Ordering::Acquire) == count);
        self.main_worker.sync_nanos += start.elapsed().as_nanos() as u64;
    }

    /// Execute one full round.
    pub fn process_one_round(&mut self) {
        let mut round_metrics = RoundMetrics::default();
        let count = self.shared.system_count();

        let sort_start = Instant::now();
        if count > 1 && self.round % self.sort_period == 0 {
            self.sort_priorities();
        }
        self.round += 1;
        round_metrics.sort_nanos = sort_start.elapsed().as_nanos() as u64;

        // Stage 1: process events.
        let process_start = Instant::now();
        self.shared.recv_msg_stage.store(false, Ordering::Release);
        self.shared.finished_count.store(0, Ordering::Relaxed);
        self.shared.system_index.store(0, Ordering::Release);
        self.claim_loop();
        self.barrier();
        round_metrics.process_nanos = process_start.elapsed().as_nanos() as u64;

        // The public process runs between the barriers, on this thread
        // only, so its events never interleave with per-process stages.
        self.shared.run_lp_round(0);

        // Stage 2: drain mailboxes.
        let message_start = Instant::now();
        self.shared.recv_msg_stage.store(true, Ordering::Release);
        self.shared.finished_count.store(0, Ordering::Relaxed);
        self.shared.system_index.store(0, Ordering::Release);
        self.claim_loop();
        self.barrier();
        round_metrics.message_nanos = message_start.elapsed().as_nanos() as u64;

        self.metrics.per_round.push(round_metrics);
        self.metrics.rounds += 1;
    }

    /// Recompute the global clock state after a round.
    pub fn calculate_smallest_time(&self) {
        self.shared.calculate_smallest_time();
    }

    /// Whether the last recompute reported every process finished.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Shut the worker pool down and collect worker metrics.
    pub fn run_after(&mut self) {
        if !self.started {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.system_index.store(0, Ordering::Release);
        let mut workers = vec![self.main_worker];
        for handle in self.workers.drain(..) {
            workers.push(handle.join().expect("worker thread panicked"));
        }
        self.metrics.workers = workers;
        self.metrics.event_count = self.shared.total_event_count();
        self.started = false;
    }

    /// Run rounds until every process is finished, then stop the pool.
    ///
    /// The calling thread must not hold a process; the facade parks the
    /// public process before calling.
    pub fn run(&mut self) {
        self.run_before();
        while !self.is_finished() {
            self.process_one_round();
            self.calculate_smallest_time();
        }
        self.run_after();
    }
}

impl Drop for RoundEngine {
    fn drop(&mut self) {
        if self.started {
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.system_index.store(0, Ordering::Release);
            for handle in self.workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
