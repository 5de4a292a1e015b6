//! The instruction set executed by synthetic processes.
//!
//! Six variants: `Print`, `Declare`, `Add`, `Sub`, `Sleep`, and a nestable
//! `For`. Arithmetic is 16-bit with saturation (every variable write is
//! clamped into `[0, 65535]`) and operands are *tokens*: a token whose
//! first character is a digit is parsed as a decimal literal, anything else
//! is looked up in the process's variable map (missing means 0).
//!
//! Execution happens against an [`ExecFrame`], a mutable borrow of the
//! fields of a process that one tick is allowed to touch. The frame also
//! collects the fully formatted log lines the tick produced, so the process
//! can append them to its ring and its log file under its own lock without
//! the instruction code knowing about either. `For` bodies are executed by
//! recursion, one full expansion per tick.

use std::collections::HashMap;

use chrono::Local;
use strum_macros::AsRefStr;

/// Timestamp format used on every log line, e.g. `09/14/2025 03:22:41PM`.
pub const TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S%p";

fn now_stamp() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

/// One instruction of a process program.
///
/// The `AsRefStr` derive provides the uppercase opcode used in log lines
/// (`PRINT`, `DECLARE`, `ADD`, `SUB`, `SLEEP`, `FOR`).
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Instruction {
    /// Append a message line to the process log.
    Print(String),
    /// `vars[var] := clamp16(value)`.
    Declare { var: String, value: u16 },
    /// `vars[dest] := clamp16(resolve(op1) + resolve(op2))`.
    Add { dest: String, op1: String, op2: String },
    /// `vars[dest] := clamp16(resolve(op1) - resolve(op2))`.
    Sub { dest: String, op1: String, op2: String },
    /// Put the process to sleep for the given number of ticks.
    Sleep(u8),
    /// Execute `body` `repeats` times in document order.
    For { body: Vec<Instruction>, repeats: u16 },
}

impl Instruction {
    /// Uppercase opcode tag for log lines.
    pub fn opcode(&self) -> &str {
        self.as_ref()
    }

    /// Number of log lines one execution of this instruction produces.
    ///
    /// Every instruction logs exactly one line for itself; a `For` adds one
    /// line per contained instruction per repetition, recursively.
    pub fn log_lines(&self) -> usize {
        match self {
            Instruction::For { body, repeats } => {
                1 + usize::from(*repeats) * body.iter().map(Instruction::log_lines).sum::<usize>()
            }
            _ => 1,
        }
    }
}

/// Saturate a 32-bit intermediate into the 16-bit variable range.
pub fn clamp16(value: i32) -> u16 {
    value.clamp(0, i32::from(u16::MAX)) as u16
}

/// Map an operand token to a 16-bit value.
///
/// A token starting with a digit parses as base-10 (parse failure or
/// overflow yields 0); any other token is a variable lookup (missing
/// yields 0).
pub fn resolve(vars: &HashMap<String, u16>, token: &str) -> u16 {
    let starts_with_digit = token
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);
    if starts_with_digit {
        token.parse::<u16>().unwrap_or(0)
    } else {
        vars.get(token).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// ExecFrame
// ---------------------------------------------------------------------------

/// The slice of process state one tick may mutate.
///
/// Borrowed out of the process's locked inner state by `run_one_tick`;
/// `out` receives one formatted line per executed instruction.
pub struct ExecFrame<'a> {
    /// The process's variable map.
    pub vars: &'a mut HashMap<String, u16>,
    /// Remaining forced-idle ticks; set by `Sleep`.
    pub sleep_ticks: &'a mut u32,
    /// Core the process is currently bound to (`None` renders as -1).
    pub core: Option<usize>,
    /// Index of the top-level instruction being executed this tick.
    pub pc: usize,
    /// Collected log lines, in execution order.
    pub out: &'a mut Vec<String>,
}

impl ExecFrame<'_> {
    fn core_label(&self) -> i64 {
        self.core.map(|c| c as i64).unwrap_or(-1)
    }

    fn store(&mut self, var: &str, value: i32) {
        self.vars.insert(var.to_string(), clamp16(value));
    }

    /// Execute one instruction, appending its log line(s) to `out`.
    ///
    /// `Print` logs its message; every other variant logs a
    /// `PC=<pc> <OPCODE>` entry. A `For` then recurses through its body,
    /// so each contained instruction logs once per repetition.
    pub fn run(&mut self, inst: &Instruction) {
        if let Instruction::Print(msg) = inst {
            self.out.push(format!(
                "({}) Core:{} \"{}\"",
                now_stamp(),
                self.core_label(),
                msg
            ));
            return;
        }

        self.out.push(format!(
            "({}) Core:{} PC={} {}",
            now_stamp(),
            self.core_label(),
            self.pc,
            inst.opcode()
        ));

        match inst {
            Instruction::Print(_) => unreachable!("handled above"),
            Instruction::Declare { var, value } => self.store(var, i32::from(*value)),
            Instruction::Add { dest, op1, op2 } => {
                let a = i32::from(resolve(self.vars, op1));
                let b = i32::from(resolve(self.vars, op2));
                self.store(dest, a + b);
            }
            Instruction::Sub { dest, op1, op2 } => {
                let a = i32::from(resolve(self.vars, op1));
                let b = i32::from(resolve(self.vars, op2));
                self.store(dest, a - b);
            }
            Instruction::Sleep(ticks) => {
                *self.sleep_ticks = u32::from(*ticks);
            }
            Instruction::For { body, repeats } => {
                for _ in 0..*repeats {
                    for nested in body {
                        self.run(nested);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame<'a>(
        vars: &'a mut HashMap<String, u16>,
        sleep: &'a mut u32,
        out: &'a mut Vec<String>,
    ) -> ExecFrame<'a> {
        ExecFrame {
            vars,
            sleep_ticks: sleep,
            core: Some(0),
            pc: 0,
            out,
        }
    }

    #[test]
    fn opcodes_are_uppercase() {
        assert_eq!(Instruction::Print("x".into()).opcode(), "PRINT");
        assert_eq!(
            Instruction::Declare {
                var: "v".into(),
                value: 1
            }
            .opcode(),
            "DECLARE"
        );
        assert_eq!(Instruction::Sleep(1).opcode(), "SLEEP");
        assert_eq!(
            Instruction::For {
                body: vec![],
                repeats: 1
            }
            .opcode(),
            "FOR"
        );
    }

    #[test]
    fn clamp16_saturates_both_ends() {
        assert_eq!(clamp16(-1), 0);
        assert_eq!(clamp16(0), 0);
        assert_eq!(clamp16(65535), 65535);
        assert_eq!(clamp16(65536), 65535);
        assert_eq!(clamp16(i32::MIN), 0);
        assert_eq!(clamp16(i32::MAX), 65535);
    }

    #[test]
    fn resolve_literal_round_trips() {
        let vars = HashMap::new();
        assert_eq!(resolve(&vars, "123"), 123);
        assert_eq!(resolve(&vars, "0"), 0);
    }

    #[test]
    fn resolve_declared_variable() {
        let mut vars = HashMap::new();
        vars.insert("v".to_string(), 77);
        assert_eq!(resolve(&vars, "v"), 77);
    }

    #[test]
    fn resolve_missing_variable_is_zero() {
        let vars = HashMap::new();
        assert_eq!(resolve(&vars, "nope"), 0);
    }

    #[test]
    fn resolve_overflow_and_garbage_are_zero() {
        let vars = HashMap::new();
        // Too large for 16 bits.
        assert_eq!(resolve(&vars, "70000"), 0);
        // Digit-led but not a number.
        assert_eq!(resolve(&vars, "12x"), 0);
        // Empty token falls through to the (empty) variable map.
        assert_eq!(resolve(&vars, ""), 0);
    }

    #[test]
    fn declare_add_sub_semantics() {
        let mut vars = HashMap::new();
        let mut sleep = 0u32;
        let mut out = Vec::new();
        let mut f = frame(&mut vars, &mut sleep, &mut out);

        f.run(&Instruction::Declare {
            var: "x".into(),
            value: 10,
        });
        f.run(&Instruction::Declare {
            var: "y".into(),
            value: 5,
        });
        // x := y - 20, clamped to 0.
        f.run(&Instruction::Sub {
            dest: "x".into(),
            op1: "y".into(),
            op2: "20".into(),
        });
        f.run(&Instruction::Print("done".into()));

        assert_eq!(vars.get("x"), Some(&0));
        assert_eq!(vars.get("y"), Some(&5));
        assert_eq!(out.len(), 4);
        assert!(out[3].ends_with("\"done\""));
    }

    #[test]
    fn add_saturates_high() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), 65000);
        let mut sleep = 0u32;
        let mut out = Vec::new();
        let mut f = frame(&mut vars, &mut sleep, &mut out);
        f.run(&Instruction::Add {
            dest: "a".into(),
            op1: "a".into(),
            op2: "60000".into(),
        });
        assert_eq!(vars.get("a"), Some(&65535));
    }

    #[test]
    fn sleep_sets_remaining_ticks() {
        let mut vars = HashMap::new();
        let mut sleep = 0u32;
        let mut out = Vec::new();
        let mut f = frame(&mut vars, &mut sleep, &mut out);
        f.run(&Instruction::Sleep(3));
        assert_eq!(sleep, 3);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("PC=0 SLEEP"));
    }

    #[test]
    fn for_executes_body_per_repetition() {
        let mut vars = HashMap::new();
        let mut sleep = 0u32;
        let mut out = Vec::new();
        let mut f = frame(&mut vars, &mut sleep, &mut out);
        f.run(&Instruction::For {
            body: vec![Instruction::Print("hi".into())],
            repeats: 3,
        });
        // One FOR line plus three PRINT lines.
        assert_eq!(out.len(), 4);
        assert!(out[0].contains("FOR"));
        assert_eq!(out.iter().filter(|l| l.ends_with("\"hi\"")).count(), 3);
    }

    #[test]
    fn nested_for_recurses() {
        let inner = Instruction::For {
            body: vec![Instruction::Add {
                dest: "n".into(),
                op1: "n".into(),
                op2: "1".into(),
            }],
            repeats: 2,
        };
        let outer = Instruction::For {
            body: vec![inner],
            repeats: 3,
        };
        let mut vars = HashMap::new();
        let mut sleep = 0u32;
        let mut out = Vec::new();
        let mut f = frame(&mut vars, &mut sleep, &mut out);
        f.run(&outer);
        assert_eq!(vars.get("n"), Some(&6));
        // Outer FOR + 3 * (inner FOR + 2 ADD).
        assert_eq!(out.len(), 1 + 3 * 3);
        assert_eq!(outer.log_lines(), 10);
    }

    #[test]
    fn unbound_core_renders_minus_one() {
        let mut vars = HashMap::new();
        let mut sleep = 0u32;
        let mut out = Vec::new();
        let mut f = ExecFrame {
            vars: &mut vars,
            sleep_ticks: &mut sleep,
            core: None,
            pc: 4,
            out: &mut out,
        };
        f.run(&Instruction::Print("x".into()));
        assert!(out[0].contains("Core:-1"));
    }

    #[test]
    fn log_lines_counts_plain_instructions() {
        assert_eq!(Instruction::Sleep(1).log_lines(), 1);
        assert_eq!(Instruction::Print("m".into()).log_lines(), 1);
    }
}
