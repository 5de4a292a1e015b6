//! Virtual cycle clock shared across the machine.
//!
//! The emulator's only notion of time is a monotonically increasing cycle
//! counter. Workers advance it once per executed process tick; the batch
//! generator reads it to decide when to emit a new process. The counter is
//! an explicitly owned collaborator (handed out by cloning), not a global.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A cheaply cloneable handle to the machine-wide cycle counter.
///
/// All clones observe the same counter. Reads and increments are atomic;
/// no lock is ever taken.
#[derive(Clone, Default)]
pub struct CycleClock {
    cycles: Arc<AtomicU64>,
}

impl CycleClock {
    /// Create a new clock starting at cycle 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by one cycle and return the previous value.
    pub fn tick(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Relaxed)
    }

    /// Read the current cycle count.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for CycleClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleClock")
            .field("cycles", &self.cycles())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
