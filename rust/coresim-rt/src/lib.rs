//! The coresim execution engine.
//!
//! Everything with a thread of its own lives here: the
//! [`scheduler`] policies (FCFS and Round-Robin) over a shared ready
//! queue, the per-core [`utilization`] monitor, and the
//! [`manager`](manager::ProcessManager) that owns the worker pool, the
//! process registry, and the batch generator. [`config`] parses the
//! machine configuration file and [`report`] renders system status and
//! utilization reports to any text sink.

pub mod config;
pub mod manager;
pub mod report;
pub mod scheduler;
pub mod utilization;

pub use config::{ConfigError, EngineConfig, SchedulerKind};
pub use manager::{AttachError, ProcessManager};
