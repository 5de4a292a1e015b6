//! Per-core CPU utilization accounting.
//!
//! Workers mark their core busy when they pull a process and idle when the
//! slice ends. Busy time accumulates per core as wall-clock durations; the
//! utilization percentage weighs accumulated (plus in-flight) busy time
//! against `cores x elapsed-since-start`. All operations go through the
//! monitor's own lock, never the registry or a process lock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

// ---------------------------------------------------------------------------
// CpuUtilization
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct CoreState {
    busy: bool,
    busy_since: Option<Instant>,
    accumulated: Duration,
}

/// Tracks busy/idle transitions for a fixed set of cores.
#[derive(Debug)]
pub struct CpuUtilization {
    t0: Instant,
    total: usize,
    cores: Mutex<Vec<CoreState>>,
}

impl CpuUtilization {
    /// Create a monitor for `total` cores; the report window starts now.
    pub fn new(total: usize) -> Self {
        Self {
            t0: Instant::now(),
            total,
            cores: Mutex::new(vec![CoreState::default(); total]),
        }
    }

    /// Record that `core` started doing work. Idempotent while busy.
    pub fn mark_busy(&self, core: usize) {
        let mut cores = self.cores.lock().unwrap();
        if let Some(state) = cores.get_mut(core) {
            if !state.busy {
                state.busy = true;
                state.busy_since = Some(Instant::now());
            }
        }
    }

    /// Record that `core` went idle, folding the open busy interval into
    /// the accumulated total. Idempotent while idle.
    pub fn mark_idle(&self, core: usize) {
        let now = Instant::now();
        let mut cores = self.cores.lock().unwrap();
        if let Some(state) = cores.get_mut(core) {
            if state.busy {
                if let Some(since) = state.busy_since.take() {
                    state.accumulated += now.duration_since(since);
                }
                state.busy = false;
            }
        }
    }

    /// Number of cores currently marked busy.
    pub fn busy_cores(&self) -> usize {
        self.cores.lock().unwrap().iter().filter(|c| c.busy).count()
    }

    /// Total number of cores.
    pub fn total_cores(&self) -> usize {
        self.total
    }

    /// Cores not currently running a process.
    pub fn available_cores(&self) -> usize {
        self.total - self.busy_cores()
    }

    /// Time-weighted utilization percentage over the whole run, in
    /// `[0.0, 100.0]`.
    pub fn utilization_percent(&self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.t0);
        if elapsed.is_zero() || self.total == 0 {
            return 0.0;
        }

        let cores = self.cores.lock().unwrap();
        let busy: Duration = cores
            .iter()
            .map(|c| {
                let in_flight = c
                    .busy_since
                    .filter(|_| c.busy)
                    .map(|since| now.duration_since(since))
                    .unwrap_or_default();
                c.accumulated + in_flight
            })
            .sum();

        let percent = 100.0 * busy.as_secs_f64() / (elapsed.as_secs_f64() * self.total as f64);
        percent.clamp(0.0, 100.0)
    }

    /// A consistent point-in-time view for reporting.
    pub fn snapshot(&self) -> UtilizationSnapshot {
        let busy = self.busy_cores();
        UtilizationSnapshot {
            percent: self.utilization_percent(),
            busy_cores: busy,
            total_cores: self.total,
            available_cores: self.total - busy,
        }
    }
}

// ---------------------------------------------------------------------------
// UtilizationSnapshot
// ---------------------------------------------------------------------------

/// Utilization figures frozen at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct UtilizationSnapshot {
    pub percent: f64,
    pub busy_cores: usize,
    pub total_cores: usize,
    pub available_cores: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_monitor_is_idle() {
        let util = CpuUtilization::new(4);
        assert_eq!(util.total_cores(), 4);
        assert_eq!(util.busy_cores(), 0);
        assert_eq!(util.available_cores(), 4);
        assert_eq!(util.utilization_percent(), 0.0);
    }

    #[test]
    fn busy_and_available_always_sum_to_total() {
        let util = CpuUtilization::new(3);
        util.mark_busy(0);
        util.mark_busy(2);
        assert_eq!(util.busy_cores(), 2);
        assert_eq!(util.available_cores(), 1);
        assert_eq!(util.busy_cores() + util.available_cores(), util.total_cores());

        util.mark_idle(0);
        assert_eq!(util.busy_cores() + util.available_cores(), util.total_cores());
    }

    #[test]
    fn mark_busy_is_idempotent() {
        let util = CpuUtilization::new(1);
        util.mark_busy(0);
        util.mark_busy(0);
        assert_eq!(util.busy_cores(), 1);
        util.mark_idle(0);
        util.mark_idle(0);
        assert_eq!(util.busy_cores(), 0);
    }

    #[test]
    fn out_of_range_core_is_ignored() {
        let util = CpuUtilization::new(2);
        util.mark_busy(99);
        util.mark_idle(99);
        assert_eq!(util.busy_cores(), 0);
    }

    #[test]
    fn busy_interval_accumulates() {
        let util = CpuUtilization::new(1);
        util.mark_busy(0);
        thread::sleep(Duration::from_millis(30));
        util.mark_idle(0);
        // One core, busy for most of the elapsed window.
        let percent = util.utilization_percent();
        assert!(percent > 10.0, "percent={percent}");
        assert!(percent <= 100.0);
    }

    #[test]
    fn in_flight_busy_time_counts() {
        let util = CpuUtilization::new(1);
        util.mark_busy(0);
        thread::sleep(Duration::from_millis(20));
        // Still busy: the open interval must contribute.
        let percent = util.utilization_percent();
        assert!(percent > 10.0, "percent={percent}");
    }

    #[test]
    fn one_busy_core_of_four_stays_under_its_share() {
        let util = CpuUtilization::new(4);
        util.mark_busy(1);
        thread::sleep(Duration::from_millis(40));
        util.mark_idle(1);
        let percent = util.utilization_percent();
        // A single core can contribute at most a quarter.
        assert!(percent <= 26.0, "percent={percent}");
        assert!(percent > 5.0, "percent={percent}");
    }

    #[test]
    fn percent_is_always_in_bounds() {
        let util = CpuUtilization::new(2);
        for _ in 0..10 {
            util.mark_busy(0);
            util.mark_busy(1);
            util.mark_idle(0);
            util.mark_idle(1);
            let p = util.utilization_percent();
            assert!((0.0..=100.0).contains(&p));
        }
    }

    #[test]
    fn snapshot_is_internally_consistent() {
        let util = CpuUtilization::new(4);
        util.mark_busy(0);
        let snap = util.snapshot();
        assert_eq!(snap.total_cores, 4);
        assert_eq!(snap.busy_cores + snap.available_cores, snap.total_cores);
        assert!((0.0..=100.0).contains(&snap.percent));
    }
}
