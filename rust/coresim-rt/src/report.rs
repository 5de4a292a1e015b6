//! System status and utilization reporting.
//!
//! Reporting always works from a [`SystemSnapshot`]: the manager collects
//! per-process snapshots and a utilization snapshot, drops every lock, and
//! only then formats. [`render`] writes the human-readable block to any
//! text sink; the same snapshot serializes to JSON for the `snapshot`
//! console command.

use std::io::{self, Write};

use chrono::{DateTime, Local};
use serde::Serialize;

use coresim_core::instruction::TIME_FORMAT;
use coresim_core::process::ProcessSnapshot;

use crate::utilization::UtilizationSnapshot;

// ---------------------------------------------------------------------------
// SystemSnapshot
// ---------------------------------------------------------------------------

/// Everything one report needs, frozen at a single instant.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Local>,
    /// Utilization figures.
    pub utilization: UtilizationSnapshot,
    /// Unfinished processes, in registry insertion order.
    pub running: Vec<ProcessSnapshot>,
    /// Finished processes, in registry insertion order.
    pub finished: Vec<ProcessSnapshot>,
}

impl SystemSnapshot {
    /// Partition the registry's processes into running/finished lists,
    /// preserving their insertion order.
    pub fn new(utilization: UtilizationSnapshot, processes: Vec<ProcessSnapshot>) -> Self {
        let (finished, running) = processes.into_iter().partition(|p| p.finished);
        Self {
            generated_at: Local::now(),
            utilization,
            running,
            finished,
        }
    }

    /// Pretty-printed JSON for the `snapshot` console command.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn stamp(t: &DateTime<Local>) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn core_label(core: Option<usize>) -> i64 {
    core.map(|c| c as i64).unwrap_or(-1)
}

/// Write the status block to `out`.
pub fn render(snapshot: &SystemSnapshot, out: &mut dyn Write) -> io::Result<()> {
    let util = &snapshot.utilization;
    writeln!(out, "Report generated at: {}", stamp(&snapshot.generated_at))?;
    writeln!(out, "CPU utilization : {:.1} %", util.percent)?;
    writeln!(
        out,
        "Cores used      : {}/{}",
        util.busy_cores, util.total_cores
    )?;
    writeln!(out, "Cores available : {}", util.available_cores)?;
    writeln!(out)?;

    writeln!(out, "Running processes:")?;
    for p in &snapshot.running {
        writeln!(
            out,
            "{:<15} {}  Core:{}  {}/{}",
            p.name,
            stamp(&p.created_at),
            core_label(p.core),
            p.pc,
            p.code_len
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Finished processes:")?;
    for p in &snapshot.finished {
        let finished = p
            .finished_at
            .map(|t| stamp(&t))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<15} {}  FINISHED  {}/{}",
            p.name, finished, p.code_len, p.code_len
        )?;
    }
    writeln!(out, "___________________________________________________________")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
