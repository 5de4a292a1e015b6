//! Random program synthesis for batch-created processes.
//!
//! Given length bounds and a sleep delay from the machine configuration,
//! [`generate`] produces a program that alternates progress `Print` lines
//! with randomly chosen work: fresh variable declarations, Add/Sub
//! arithmetic over the variables declared so far, and short `For` loops of
//! `Sleep` instructions. The same `(seed, name, bounds, delay)` always
//! yields the same program, which is what the test suite and the batch
//! generator's reproducibility depend on.

use crate::instruction::Instruction;
use crate::rng::XorShift32;

/// Synthesize a program of `min_ins..=max_ins` instructions.
///
/// Even indices carry a `Step <i+1> of <name>` print; odd indices pick one
/// of Declare / Add / Sub / For uniformly. If the result somehow carries no
/// `Print`, a greeting is prepended so every process logs at least once.
pub fn generate(name: &str, min_ins: u32, max_ins: u32, delay: u32, seed: u64) -> Vec<Instruction> {
    let mut rng = XorShift32::new(seed);
    let count = rng.range_inclusive(min_ins.max(1), max_ins.max(min_ins));

    let mut code: Vec<Instruction> = Vec::with_capacity(count as usize);
    let mut var_names: Vec<String> = Vec::new();

    for i in 0..count {
        if i % 2 == 0 {
            code.push(Instruction::Print(format!("Step {} of {}", i + 1, name)));
            continue;
        }
        match rng.below(4) {
            0 => {
                let var = format!("v{}", var_names.len());
                let value = rng.below(100) as u16;
                var_names.push(var.clone());
                code.push(Instruction::Declare { var, value });
            }
            t @ (1 | 2) => {
                let dest = format!("v{}", rng.below(var_names.len() as u32 + 1));
                let op1 = if var_names.is_empty() {
                    "0".to_string()
                } else {
                    var_names[rng.below(var_names.len() as u32) as usize].clone()
                };
                let op2 = rng.below(50).to_string();
                code.push(if t == 1 {
                    Instruction::Add { dest, op1, op2 }
                } else {
                    Instruction::Sub { dest, op1, op2 }
                });
            }
            _ => {
                let repeats = rng.range_inclusive(1, 2) as u16;
                let body_len = rng.range_inclusive(1, 2);
                let ticks = delay.clamp(1, u32::from(u8::MAX)) as u8;
                let body = (0..body_len).map(|_| Instruction::Sleep(ticks)).collect();
                code.push(Instruction::For { body, repeats });
            }
        }
    }

    if !contains_print(&code) {
        code.insert(0, Instruction::Print(format!("Auto: Hello from {name}")));
    }
    code
}

fn contains_print(code: &[Instruction]) -> bool {
    code.iter().any(|inst| match inst {
        Instruction::Print(_) => true,
        Instruction::For { body, .. } => contains_print(body),
        _ => false,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
