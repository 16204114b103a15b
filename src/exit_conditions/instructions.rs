//! Stack-machine instructions produced by the exit condition compiler.

use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single instruction of a compiled exit condition.
///
/// Programs run on a value stack: loads push, operators pop their operands
/// (right operand on top) and push one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Push a constant.
    Literal(Value),
    /// Push the variable at a dotted path.
    Lookup(Vec<String>),
    /// Pop one argument per preposition (last preposition on top), then the
    /// subject, and push the result of the named property.
    Property {
        adjectives: Vec<String>,
        prepositions: Vec<String>,
    },
    Eq,
    Lt,
    Gt,
    And,
    Or,
    Not,
    ToBool,
}

/// The payload-free shape of an [`Instruction`], used for pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Literal,
    Lookup,
    Property,
    Eq,
    Lt,
    Gt,
    And,
    Or,
    Not,
    ToBool,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Literal(_) => Opcode::Literal,
            Instruction::Lookup(_) => Opcode::Lookup,
            Instruction::Property { .. } => Opcode::Property,
            Instruction::Eq => Opcode::Eq,
            Instruction::Lt => Opcode::Lt,
            Instruction::Gt => Opcode::Gt,
            Instruction::And => Opcode::And,
            Instruction::Or => Opcode::Or,
            Instruction::Not => Opcode::Not,
            Instruction::ToBool => Opcode::ToBool,
        }
    }
}

impl Hash for Instruction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opcode().hash(state);
        match self {
            Instruction::Literal(value) => value.to_string().hash(state),
            Instruction::Lookup(path) => path.hash(state),
            Instruction::Property {
                adjectives,
                prepositions,
            } => {
                adjectives.hash(state);
                prepositions.hash(state);
            }
            _ => {}
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Literal(value) => write!(f, "LITERAL {value}"),
            Instruction::Lookup(path) => write!(f, "LOOKUP {}", path.join(".")),
            Instruction::Property {
                adjectives,
                prepositions,
            } => {
                write!(f, "PROPERTY")?;
                for word in adjectives.iter().chain(prepositions) {
                    write!(f, " {word}")?;
                }
                Ok(())
            }
            Instruction::Eq => f.write_str("EQ"),
            Instruction::Lt => f.write_str("LT"),
            Instruction::Gt => f.write_str("GT"),
            Instruction::And => f.write_str("AND"),
            Instruction::Or => f.write_str("OR"),
            Instruction::Not => f.write_str("NOT"),
            Instruction::ToBool => f.write_str("TO_BOOL"),
        }
    }
}
