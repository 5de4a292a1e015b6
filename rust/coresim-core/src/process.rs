//! The process: a named unit of execution owning a program.
//!
//! A [`Process`] pairs immutable identity (name, id, code, creation time)
//! with mutable state behind a single [`Mutex`]: program counter, sleep
//! counter, variable map, core binding, lifecycle timestamps, and a bounded
//! ring of recent log lines. Worker threads share processes through
//! `Arc<Process>`; every mutation goes through the inner lock, so at most
//! one worker can advance a process at a time.
//!
//! Each process may also own an append-only log file (`<root>/<name>.txt`)
//! opened once at construction. Write failures are swallowed; losing a log
//! line never aborts a worker.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::instruction::{resolve, ExecFrame, Instruction, TIME_FORMAT};

/// Maximum number of log lines retained in the in-memory ring.
pub const LOG_RING_CAP: usize = 50;

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

/// Mutable process state guarded by the per-process lock.
struct ProcessInner {
    pc: usize,
    sleep_ticks: u32,
    vars: HashMap<String, u16>,
    logs: VecDeque<String>,
    core: Option<usize>,
    done: bool,
    started_at: Option<DateTime<Local>>,
    finished_at: Option<DateTime<Local>>,
    log_file: Option<File>,
}

impl ProcessInner {
    fn append(&mut self, line: String) {
        if self.logs.len() == LOG_RING_CAP {
            self.logs.pop_front();
        }
        if let Some(file) = self.log_file.as_mut() {
            let _ = writeln!(file, "{line}");
        }
        self.logs.push_back(line);
    }
}

/// A synthetic process: immutable program plus lock-guarded execution state.
pub struct Process {
    name: String,
    id: u64,
    code: Vec<Instruction>,
    created_at: DateTime<Local>,
    inner: Mutex<ProcessInner>,
}

impl Process {
    /// Create a process with no log file (in-memory ring only).
    pub fn new(name: impl Into<String>, id: u64, code: Vec<Instruction>) -> Self {
        Self::build(name.into(), id, code, None)
    }

    /// Create a process whose log lines are also appended to
    /// `<log_root>/<name>.txt`.
    ///
    /// The directory is created on demand; open or write failures leave the
    /// process running with the ring only.
    pub fn with_log_root(
        name: impl Into<String>,
        id: u64,
        code: Vec<Instruction>,
        log_root: &Path,
    ) -> Self {
        let name = name.into();
        let _ = fs::create_dir_all(log_root);
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_root.join(format!("{name}.txt")))
            .ok();
        Self::build(name, id, code, log_file)
    }

    fn build(name: String, id: u64, code: Vec<Instruction>, log_file: Option<File>) -> Self {
        Self {
            name,
            id,
            code,
            created_at: Local::now(),
            inner: Mutex::new(ProcessInner {
                pc: 0,
                sleep_ticks: 0,
                vars: HashMap::new(),
                logs: VecDeque::new(),
                core: None,
                done: false,
                started_at: None,
                finished_at: None,
                log_file,
            }),
        }
    }

    // -- identity ---------------------------------------------------------

    /// Unique process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric id assigned by the manager.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of top-level instructions in the program.
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    // -- execution --------------------------------------------------------

    /// Advance the process by one tick.
    ///
    /// A no-op once finished. The first tick stamps `started_at`. A sleeping
    /// process consumes the tick by decrementing its sleep counter without
    /// advancing the program counter. Otherwise the instruction at `pc` is
    /// fetched, `pc` advances, and the instruction executes, appending its
    /// log lines to the ring and the log file. Reaching the end of the
    /// program marks the process done exactly once and appends the
    /// `FINISHED at <ts>` marker.
    pub fn run_one_tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.done {
            return;
        }
        if inner.started_at.is_none() {
            inner.started_at = Some(Local::now());
        }
        if inner.sleep_ticks > 0 {
            inner.sleep_ticks -= 1;
            return;
        }

        let pc = inner.pc;
        if let Some(inst) = self.code.get(pc) {
            inner.pc += 1;
            let mut lines = Vec::with_capacity(inst.log_lines());
            {
                let ProcessInner {
                    vars,
                    sleep_ticks,
                    core,
                    ..
                } = &mut *inner;
                let mut frame = ExecFrame {
                    vars,
                    sleep_ticks,
                    core: *core,
                    pc,
                    out: &mut lines,
                };
                frame.run(inst);
            }
            for line in lines {
                inner.append(line);
            }
        }

        if inner.pc >= self.code.len() {
            let finished = Local::now();
            inner.done = true;
            inner.finished_at = Some(finished);
            inner.append(format!("FINISHED at {}", finished.format(TIME_FORMAT)));
        }
    }

    /// Bind the process to a core for the duration of a slice.
    pub fn bind_core(&self, core: usize) {
        self.inner.lock().unwrap().core = Some(core);
    }

    /// Drop the core binding (the process is back on the ready queue).
    pub fn unbind_core(&self) {
        self.inner.lock().unwrap().core = None;
    }

    // -- observers --------------------------------------------------------

    /// Current program counter (index of the next instruction).
    pub fn pc(&self) -> usize {
        self.inner.lock().unwrap().pc
    }

    /// Core the process is currently bound to, if any.
    pub fn core(&self) -> Option<usize> {
        self.inner.lock().unwrap().core
    }

    /// `true` once every instruction has executed.
    pub fn is_finished(&self) -> bool {
        self.inner.lock().unwrap().done
    }

    /// Time of the first executed tick, if any.
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.inner.lock().unwrap().started_at
    }

    /// Completion time, set exactly once.
    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        self.inner.lock().unwrap().finished_at
    }

    /// Remaining forced-idle ticks.
    pub fn sleep_ticks(&self) -> u32 {
        self.inner.lock().unwrap().sleep_ticks
    }

    /// Store a variable through the clamping rule.
    pub fn set_var(&self, var: &str, value: i32) {
        let mut inner = self.inner.lock().unwrap();
        let clamped = crate::instruction::clamp16(value);
        inner.vars.insert(var.to_string(), clamped);
    }

    /// Read a declared variable.
    pub fn var(&self, name: &str) -> Option<u16> {
        self.inner.lock().unwrap().vars.get(name).copied()
    }

    /// Resolve an operand token against this process's variables.
    pub fn value_of(&self, token: &str) -> u16 {
        resolve(&self.inner.lock().unwrap().vars, token)
    }

    /// The newest `n` log lines, oldest first.
    pub fn recent_logs(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.logs.len().saturating_sub(n);
        inner.logs.iter().skip(skip).cloned().collect()
    }

    /// A consistent point-in-time view for reporting.
    pub fn snapshot(&self) -> ProcessSnapshot {
        let inner = self.inner.lock().unwrap();
        ProcessSnapshot {
            name: self.name.clone(),
            id: self.id,
            pc: inner.pc,
            code_len: self.code.len(),
            core: inner.core,
            finished: inner.done,
            created_at: self.created_at,
            started_at: inner.started_at,
            finished_at: inner.finished_at,
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("pc", &inner.pc)
            .field("code_len", &self.code.len())
            .field("core", &inner.core)
            .field("done", &inner.done)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ProcessSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a process, safe to format without holding locks.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub id: u64,
    pub pc: usize,
    pub code_len: usize,
    pub core: Option<usize>,
    pub finished: bool,
    pub created_at: DateTime<Local>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
