//! The process manager: registry, worker pool, and batch generator.
//!
//! The manager owns the machine. It holds the validated configuration, the
//! scheduling policy, the cycle clock, the utilization monitor, and the
//! process registry (insertion-ordered list plus name map). Starting the
//! scheduler spawns one named worker thread per core; starting batch mode
//! spawns one generator thread that emits a fresh process every
//! `batch-process-freq` cycles.
//!
//! Lock order is registry -> per-process -> utilization, and a worker never
//! holds the registry lock across `run_one_tick`: the lock is taken only
//! to pop the queue head or to re-enqueue an unfinished process.
//!
//! Shutdown drops a `crossbeam_channel` sender whose receivers double as
//! the workers' inter-tick sleeps: the disconnect wakes every sleeper
//! immediately, the `running`/`batching` flags stop the loops, and the
//! manager joins each thread.

use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use coresim_core::clock::CycleClock;
use coresim_core::process::Process;
use coresim_core::program;

use crate::config::EngineConfig;
use crate::report::{render, SystemSnapshot};
use crate::scheduler::{self, SchedulerPolicy};
use crate::utilization::CpuUtilization;

/// Pace of the simulation: wall-clock delay after each executed tick.
pub const TICK_INTERVAL: Duration = Duration::from_millis(30);
/// How long an idle worker dozes before re-checking the queue.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(10);
/// Cadence of the batch generator's outer loop.
pub const BATCH_INTERVAL: Duration = Duration::from_millis(20);

/// Per-process log files land in `<root>/logs/`.
pub const LOG_DIR: &str = "logs";
/// Utilization reports append to this file under the output root.
pub const REPORT_FILE: &str = "csopesy-log.txt";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why attaching to a process screen failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachError {
    #[error("process {0} not found")]
    NotFound(String),
    #[error("process {0} has already finished")]
    AlreadyFinished(String),
}

// ---------------------------------------------------------------------------
// Shared engine state
// ---------------------------------------------------------------------------

/// Registry of every process the machine has seen, in creation order.
#[derive(Default)]
struct Registry {
    procs: Vec<Arc<Process>>,
    by_name: HashMap<String, Arc<Process>>,
}

impl Registry {
    fn insert(&mut self, process: Arc<Process>) {
        self.by_name
            .insert(process.name().to_string(), Arc::clone(&process));
        self.procs.push(process);
    }
}

/// State shared between the manager, its workers, and the batch thread.
struct Shared {
    config: EngineConfig,
    clock: CycleClock,
    policy: Box<dyn SchedulerPolicy>,
    registry: Mutex<Registry>,
    util: CpuUtilization,
    next_id: AtomicU64,
    running: AtomicBool,
    batching: AtomicBool,
    output_root: PathBuf,
}

impl Shared {
    fn log_root(&self) -> PathBuf {
        self.output_root.join(LOG_DIR)
    }

    /// Build a process from the configured generator bounds, seeding the
    /// program from the allocated id so regeneration is reproducible.
    fn build_process(&self, name: &str, id: u64) -> Arc<Process> {
        let cfg = &self.config;
        let code = program::generate(name, cfg.min_ins, cfg.max_ins, cfg.delays_per_exec, id);
        Arc::new(Process::with_log_root(name, id, code, &self.log_root()))
    }
}

// ---------------------------------------------------------------------------
// ProcessManager
// ---------------------------------------------------------------------------

/// Owns the worker pool, the batch thread, and the process registry.
pub struct ProcessManager {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_stop: Mutex<Option<Sender<()>>>,
    batch: Mutex<Option<JoinHandle<()>>>,
    batch_stop: Mutex<Option<Sender<()>>>,
}

impl ProcessManager {
    /// Create a manager writing `logs/` and the report file under the
    /// current directory.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_output_root(config, ".")
    }

    /// Create a manager with an explicit output root (tests point this at
    /// a temp dir).
    ///
    /// Configs loaded from a file always carry `num_cpu` in `[1, 128]`; a
    /// hand-built config may pass 0 to mean "use the host's core count".
    pub fn with_output_root(config: EngineConfig, output_root: impl Into<PathBuf>) -> Self {
        let cores = if config.num_cpu == 0 {
            num_cpus::get().max(1)
        } else {
            config.num_cpu as usize
        };
        let policy = scheduler::build(config.scheduler, u64::from(config.quantum_cycles));
        Self {
            shared: Arc::new(Shared {
                config,
                clock: CycleClock::new(),
                policy,
                registry: Mutex::new(Registry::default()),
                util: CpuUtilization::new(cores),
                next_id: AtomicU64::new(1),
                running: AtomicBool::new(false),
                batching: AtomicBool::new(false),
                output_root: output_root.into(),
            }),
            workers: Mutex::new(Vec::new()),
            worker_stop: Mutex::new(None),
            batch: Mutex::new(None),
            batch_stop: Mutex::new(None),
        }
    }

    /// The validated configuration the machine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Handle to the machine-wide cycle clock.
    pub fn clock(&self) -> CycleClock {
        self.shared.clock.clone()
    }

    /// `true` while worker threads are live.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// `true` while the batch generator is live.
    pub fn is_batching(&self) -> bool {
        self.shared.batching.load(Ordering::Acquire)
    }

    /// Number of registered processes.
    pub fn process_count(&self) -> usize {
        self.shared.registry.lock().unwrap().procs.len()
    }

    // -- registry ---------------------------------------------------------

    /// Get or create a process by name.
    ///
    /// An existing handle is returned as-is; otherwise a program is
    /// generated from the configured bounds, the process is registered,
    /// and it joins the tail of the ready queue.
    pub fn add_process(&self, name: &str) -> Arc<Process> {
        if let Some(existing) = self.get_process(name) {
            return existing;
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        // Program generation can be sizeable; do it before taking the lock.
        let process = self.shared.build_process(name, id);

        let mut registry = self.shared.registry.lock().unwrap();
        if let Some(existing) = registry.by_name.get(name) {
            return Arc::clone(existing);
        }
        registry.insert(Arc::clone(&process));
        self.shared.policy.add_process(Arc::clone(&process));
        process
    }

    /// Register an externally constructed process and enqueue it.
    ///
    /// Returns the registered handle (the existing one if the name is
    /// already taken.
    pub fn register_process(&self, process: Arc<Process>) -> Arc<Process> {
        let mut registry = self.shared.registry.lock().unwrap();
        if let Some(existing) = registry.by_name.get(process.name()) {
            return Arc::clone(existing);
        }
        registry.insert(Arc::clone(&process));
        self.shared.policy.add_process(Arc::clone(&process));
        process
    }

    /// O(1) lookup by name.
    pub fn get_process(&self, name: &str) -> Option<Arc<Process>> {
        self.shared.registry.lock().unwrap().by_name.get(name).cloned()
    }

    /// Resolve a process for screen attachment.
    pub fn attach(&self, name: &str) -> Result<Arc<Process>, AttachError> {
        let process = self
            .get_process(name)
            .ok_or_else(|| AttachError::NotFound(name.to_string()))?;
        if process.is_finished() {
            return Err(AttachError::AlreadyFinished(name.to_string()));
        }
        Ok(process)
    }

    // -- lifecycle --------------------------------------------------------

    /// Spawn one worker thread per core. Idempotent while running.
    pub fn start_scheduler(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = bounded::<()>(0);
        *self.worker_stop.lock().unwrap() = Some(tx);

        let mut workers = self.workers.lock().unwrap();
        for core in 0..self.shared.util.total_cores() {
            let shared = Arc::clone(&self.shared);
            let stop = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("coresim-worker-{core}"))
                .spawn(move || worker_loop(shared, core, stop))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
    }

    /// Stop and join every worker. Idempotent.
    pub fn stop_scheduler(&self) {
        self.shared.running.store(false, Ordering::Release);
        // Dropping the sender disconnects the channel and wakes sleepers.
        self.worker_stop.lock().unwrap().take();
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Spawn the batch generator thread. Idempotent while batching.
    pub fn start_batch(&self) {
        if self.shared.batching.swap(true, Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = bounded::<()>(0);
        *self.batch_stop.lock().unwrap() = Some(tx);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("coresim-batch".to_string())
            .spawn(move || batch_loop(shared, rx))
            .expect("failed to spawn batch thread");
        *self.batch.lock().unwrap() = Some(handle);
    }

    /// Stop and join the batch generator. Idempotent.
    pub fn stop_batch(&self) {
        self.shared.batching.store(false, Ordering::Release);
        self.batch_stop.lock().unwrap().take();
        if let Some(handle) = self.batch.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Stop batch generation, then the workers, joining everything.
    pub fn shutdown(&self) {
        self.stop_batch();
        self.stop_scheduler();
    }

    // -- reporting --------------------------------------------------------

    /// Freeze a consistent view of the whole machine.
    ///
    /// The registry lock is held only long enough to clone the handle
    /// list; per-process snapshots are taken afterwards, one lock at a
    /// time.
    pub fn system_snapshot(&self) -> SystemSnapshot {
        let procs: Vec<Arc<Process>> = self.shared.registry.lock().unwrap().procs.clone();
        let snapshots = procs.iter().map(|p| p.snapshot()).collect();
        SystemSnapshot::new(self.shared.util.snapshot(), snapshots)
    }

    /// Render the status block to the given sink.
    pub fn print_system_status(&self, out: &mut dyn Write) -> io::Result<()> {
        render(&self.system_snapshot(), out)
    }

    /// Append the status block to the report file, returning its path.
    pub fn generate_utilization_report(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.shared.output_root)?;
        let path = self.shared.output_root.join(REPORT_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        render(&self.system_snapshot(), &mut file)?;
        writeln!(file)?;
        Ok(path)
    }

    /// Where per-process log files are written.
    pub fn log_root(&self) -> PathBuf {
        self.shared.log_root()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessManager")
            .field("scheduler", &self.shared.policy.kind())
            .field("cores", &self.shared.util.total_cores())
            .field("processes", &self.process_count())
            .field("running", &self.is_running())
            .field("batching", &self.is_batching())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Worker & batch loops
// ---------------------------------------------------------------------------

/// Sleep for `interval`, waking early on shutdown.
///
/// The stop channel never carries messages; a timeout means "keep going"
/// and a disconnect (sender dropped) means "stop now".
fn pause(stop: &Receiver<()>, interval: Duration) -> bool {
    matches!(stop.recv_timeout(interval), Err(RecvTimeoutError::Timeout))
}

fn worker_loop(shared: Arc<Shared>, core: usize, stop: Receiver<()>) {
    while shared.running.load(Ordering::Acquire) {
        let next = {
            let _registry = shared.registry.lock().unwrap();
            shared.policy.next_process()
        };

        let Some(process) = next else {
            shared.util.mark_idle(core);
            if !pause(&stop, IDLE_INTERVAL) {
                break;
            }
            continue;
        };

        shared.util.mark_busy(core);
        process.bind_core(core);

        let slice = shared.policy.slice_cycles();
        let mut ticks: u64 = 0;
        while ticks < slice && !process.is_finished() && shared.running.load(Ordering::Acquire) {
            process.run_one_tick();
            shared.clock.tick();
            ticks += 1;
            if !pause(&stop, TICK_INTERVAL) {
                break;
            }
        }

        process.unbind_core();
        shared.util.mark_idle(core);

        if !process.is_finished() {
            let _registry = shared.registry.lock().unwrap();
            shared.policy.add_process(process);
        }
    }
    shared.util.mark_idle(core);
}

fn batch_loop(shared: Arc<Shared>, stop: Receiver<()>) {
    let freq = u64::from(shared.config.batch_process_freq);
    let mut last_emitted: Option<u64> = None;

    while shared.batching.load(Ordering::Acquire) {
        if !pause(&stop, BATCH_INTERVAL) {
            break;
        }
        let cycles = shared.clock.cycles();
        if cycles % freq != 0 || last_emitted == Some(cycles) {
            continue;
        }
        last_emitted = Some(cycles);

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("p{id}");
        // Construct outside the registry lock; generation may be costly.
        let process = shared.build_process(&name, id);

        let mut registry = shared.registry.lock().unwrap();
        if registry.by_name.contains_key(&name) {
            continue;
        }
        registry.insert(Arc::clone(&process));
        shared.policy.add_process(process);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerKind;

    fn test_config(kind: SchedulerKind) -> EngineConfig {
        EngineConfig {
            num_cpu: 2,
            scheduler: kind,
            quantum_cycles: 3,
            batch_process_freq: 1,
            min_ins: 3,
            max_ins: 5,
            delays_per_exec: 0,
        }
    }

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("coresim-mgr-{tag}-{}", std::process::id()))
    }

    #[test]
    fn add_process_is_idempotent() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("idem"));
        let a = mgr.add_process("x");
        let b = mgr.add_process("x");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mgr.process_count(), 1);
    }

    #[test]
    fn processes_get_monotonic_ids() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("ids"));
        let a = mgr.add_process("a");
        let b = mgr.add_process("b");
        let c = mgr.add_process("c");
        assert!(a.id() < b.id() && b.id() < c.id());
    }

    #[test]
    fn generated_programs_respect_config_bounds() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("len"));
        for name in ["a", "b", "c", "d"] {
            let p = mgr.add_process(name);
            assert!((3..=5).contains(&p.code_len()), "len={}", p.code_len());
        }
    }

    #[test]
    fn get_process_finds_registered_names_only() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Rr), temp_root("get"));
        mgr.add_process("known");
        assert!(mgr.get_process("known").is_some());
        assert!(mgr.get_process("unknown").is_none());
    }

    #[test]
    fn attach_rejects_unknown_and_finished() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("att"));
        assert_eq!(
            mgr.attach("ghost").unwrap_err(),
            AttachError::NotFound("ghost".to_string())
        );

        let done = Arc::new(Process::new("done", 99, vec![]));
        done.run_one_tick();
        assert!(done.is_finished());
        mgr.register_process(Arc::clone(&done));
        assert_eq!(
            mgr.attach("done").unwrap_err(),
            AttachError::AlreadyFinished("done".to_string())
        );
    }

    #[test]
    fn register_process_keeps_first_handle_for_a_name() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("reg"));
        let first = mgr.register_process(Arc::new(Process::new("n", 1, vec![])));
        let second = mgr.register_process(Arc::new(Process::new("n", 2, vec![])));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mgr.process_count(), 1);
    }

    #[test]
    fn lifecycle_flags_track_start_and_stop() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("life"));
        assert!(!mgr.is_running());
        mgr.start_scheduler();
        assert!(mgr.is_running());
        mgr.start_scheduler(); // idempotent
        mgr.stop_scheduler();
        assert!(!mgr.is_running());
        // Stopping again is harmless.
        mgr.stop_scheduler();
    }

    #[test]
    fn batch_flag_tracks_start_and_stop() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("bat"));
        mgr.start_scheduler();
        assert!(!mgr.is_batching());
        mgr.start_batch();
        assert!(mgr.is_batching());
        mgr.stop_batch();
        assert!(!mgr.is_batching());
        mgr.shutdown();
    }

    #[test]
    fn zero_cores_falls_back_to_host_core_count() {
        let mut cfg = test_config(SchedulerKind::Fcfs);
        cfg.num_cpu = 0;
        let mgr = ProcessManager::with_output_root(cfg, temp_root("zero"));
        assert_eq!(
            mgr.system_snapshot().utilization.total_cores,
            num_cpus::get().max(1)
        );
    }

    #[test]
    fn snapshot_lists_registered_processes() {
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), temp_root("snap"));
        mgr.add_process("one");
        mgr.add_process("two");
        let snap = mgr.system_snapshot();
        assert_eq!(snap.running.len() + snap.finished.len(), 2);
        assert_eq!(snap.utilization.total_cores, 2);
    }

    #[test]
    fn report_file_accumulates_blocks() {
        let root = temp_root("report");
        let mgr = ProcessManager::with_output_root(test_config(SchedulerKind::Fcfs), root.clone());
        let path = mgr.generate_utilization_report().unwrap();
        mgr.generate_utilization_report().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.matches("CPU utilization :").count(), 2);
        let _ = std::fs::remove_dir_all(&root);
    }
}
