//! Peephole optimiser.
//!
//! Rewrite rules are plain data: an opcode pattern and the slots that
//! replace it. Passes repeat until nothing matches. Every rule shortens
//! the program, so optimisation always terminates.

use super::instructions::{Instruction, Opcode};

enum Slot {
    /// Keep the matched instruction at this offset.
    Keep(usize),
    Emit(fn() -> Instruction),
}

struct Rule {
    pattern: &'static [Opcode],
    replacement: &'static [Slot],
}

fn to_bool() -> Instruction {
    Instruction::ToBool
}

static RULES: &[Rule] = &[
    // Double negation coerces.
    Rule {
        pattern: &[Opcode::Not, Opcode::Not],
        replacement: &[Slot::Emit(to_bool)],
    },
    Rule {
        pattern: &[Opcode::ToBool, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    // Coercing something that already yields a boolean.
    Rule {
        pattern: &[Opcode::Not, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    Rule {
        pattern: &[Opcode::And, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    Rule {
        pattern: &[Opcode::Or, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    Rule {
        pattern: &[Opcode::Eq, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    Rule {
        pattern: &[Opcode::Lt, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    Rule {
        pattern: &[Opcode::Gt, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
    Rule {
        pattern: &[Opcode::Property, Opcode::ToBool],
        replacement: &[Slot::Keep(0)],
    },
];

impl Rule {
    fn matches(&self, window: &[Instruction]) -> bool {
        window.len() >= self.pattern.len()
            && self
                .pattern
                .iter()
                .zip(window)
                .all(|(opcode, instruction)| instruction.opcode() == *opcode)
    }

    fn rewrite(&self, window: &[Instruction], output: &mut Vec<Instruction>) {
        for slot in self.replacement {
            match slot {
                Slot::Keep(offset) => output.push(window[*offset].clone()),
                Slot::Emit(make) => output.push(make()),
            }
        }
    }
}

/// Rewrite `instructions` to a fixed point of the peephole rules.
pub fn optimise(instructions: &[Instruction]) -> Vec<Instruction> {
    let mut current = instructions.to_vec();
    loop {
        let (next, changed) = optimise_pass(&current);
        if !changed {
            return next;
        }
        current = next;
    }
}

fn optimise_pass(instructions: &[Instruction]) -> (Vec<Instruction>, bool) {
    let mut output = Vec::with_capacity(instructions.len());
    let mut changed = false;
    let mut index = 0;

    'scan: while index < instructions.len() {
        let window = &instructions[index..];
        for rule in RULES {
            if rule.matches(window) {
                rule.rewrite(window, &mut output);
                index += rule.pattern.len();
                changed = true;
                continue 'scan;
            }
        }
        output.push(instructions[index].clone());
        index += 1;
    }

    (output, changed)
}
