//! Scheduling policies over a shared FIFO ready queue.
//!
//! Both policies keep strictly FIFO order: `add_process` appends to the
//! tail, `next_process` pops the head, and ties between concurrent adds
//! are broken by queue-lock acquisition order. They differ only in how
//! long a worker may keep a pulled process:
//!
//! * [`FcfsScheduler`] grants an effectively unbounded slice: the worker
//!   runs the process to completion before pulling the next one.
//! * [`RoundRobinScheduler`] grants `quantum` ticks; the manager
//!   re-enqueues the process at the tail if it is not finished.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use coresim_core::process::Process;

use crate::config::SchedulerKind;

// ---------------------------------------------------------------------------
// SchedulerPolicy
// ---------------------------------------------------------------------------

/// A thread-safe FIFO ready queue with a per-policy slice length.
pub trait SchedulerPolicy: Send + Sync {
    /// Append a process to the tail of the ready queue.
    ///
    /// A handle already in the queue is not enqueued twice.
    fn add_process(&self, process: Arc<Process>);

    /// Remove and return the head of the queue, if any.
    fn next_process(&self) -> Option<Arc<Process>>;

    /// `true` iff the queue is non-empty.
    fn has_processes(&self) -> bool;

    /// Number of queued processes.
    fn queue_len(&self) -> usize;

    /// Drop everything in the queue.
    fn reset(&self);

    /// Maximum consecutive ticks a worker grants one process.
    fn slice_cycles(&self) -> u64;

    /// Which policy this is.
    fn kind(&self) -> SchedulerKind;
}

impl fmt::Debug for dyn SchedulerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerPolicy")
            .field("kind", &self.kind())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

/// Construct the policy named by the configuration.
pub fn build(kind: SchedulerKind, quantum: u64) -> Box<dyn SchedulerPolicy> {
    match kind {
        SchedulerKind::Fcfs => Box::new(FcfsScheduler::new()),
        SchedulerKind::Rr => Box::new(RoundRobinScheduler::new(quantum)),
    }
}

// ---------------------------------------------------------------------------
// Shared queue plumbing
// ---------------------------------------------------------------------------

/// The FIFO queue both policies share.
#[derive(Default)]
struct ReadyQueue {
    inner: Mutex<VecDeque<Arc<Process>>>,
}

impl ReadyQueue {
    fn push(&self, process: Arc<Process>) {
        let mut q = self.inner.lock().unwrap();
        if q.iter().any(|queued| Arc::ptr_eq(queued, &process)) {
            return;
        }
        q.push_back(process);
    }

    fn pop(&self) -> Option<Arc<Process>> {
        self.inner.lock().unwrap().pop_front()
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// FCFS
// ---------------------------------------------------------------------------

/// First come, first served. A pulled process keeps its core until done.
#[derive(Default)]
pub struct FcfsScheduler {
    queue: ReadyQueue,
}

impl FcfsScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulerPolicy for FcfsScheduler {
    fn add_process(&self, process: Arc<Process>) {
        self.queue.push(process);
    }

    fn next_process(&self) -> Option<Arc<Process>> {
        self.queue.pop()
    }

    fn has_processes(&self) -> bool {
        self.queue.len() > 0
    }

    fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn reset(&self) {
        self.queue.clear();
    }

    fn slice_cycles(&self) -> u64 {
        u64::MAX
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Fcfs
    }
}

// ---------------------------------------------------------------------------
// Round-Robin
// ---------------------------------------------------------------------------

/// Round-Robin with a configurable quantum.
pub struct RoundRobinScheduler {
    queue: ReadyQueue,
    quantum: u64,
}

impl RoundRobinScheduler {
    /// A quantum of 0 is lifted to 1 so every slice makes progress.
    pub fn new(quantum: u64) -> Self {
        Self {
            queue: ReadyQueue::default(),
            quantum: quantum.max(1),
        }
    }
}

impl SchedulerPolicy for RoundRobinScheduler {
    fn add_process(&self, process: Arc<Process>) {
        self.queue.push(process);
    }

    fn next_process(&self) -> Option<Arc<Process>> {
        self.queue.pop()
    }

    fn has_processes(&self) -> bool {
        self.queue.len() > 0
    }

    fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn reset(&self) {
        self.queue.clear();
    }

    fn slice_cycles(&self) -> u64 {
        self.quantum
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Rr
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
