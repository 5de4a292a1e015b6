//! Core data model for the coresim emulator.
//!
//! This crate holds the pieces of the machine that have no threads of their
//! own: the virtual [`clock`](clock::CycleClock), the
//! [`instruction`](instruction::Instruction) set, the
//! [`Process`](process::Process) unit of execution, and the
//! [`program`] generator that synthesizes random-but-reproducible programs
//! for batch-created processes. The worker pool, scheduling policies, and
//! the process manager that drive these types live in `coresim-rt`.

pub mod clock;
pub mod instruction;
pub mod process;
pub mod program;
pub mod rng;
