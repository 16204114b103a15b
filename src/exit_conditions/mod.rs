//! The exit condition language.
//!
//! Gates leave their state when an exit condition holds. Conditions are
//! small English-flavoured boolean expressions:
//!
//! ```text
//! metadata.approved = true and 1d has passed since history.entered_state
//! feeds.billing.balance > 0 or "vip" is in metadata.tags
//! ```
//!
//! Sources compile through [`tokenize`] and [`parse`] into stack
//! [`Instruction`]s, pass through the peephole [`optimise`]r, and run on
//! the [`evaluate`] stack machine. [`ExitConditionProgram`] bundles these.

mod error;
mod evaluator;
mod instructions;
mod optimiser;
mod parser;
mod program;
mod properties;
mod tokenizer;

pub use error::{CompileError, EvaluationError, ParseError};
pub use evaluator::{evaluate, truthy, values_equal};
pub use instructions::{Instruction, Opcode};
pub use optimiser::optimise;
pub use parser::parse;
pub use program::{EvaluationTime, ExitConditionProgram, Variables};
pub use properties::{parse_timestamp, standard_property};
pub use tokenizer::{parse_duration, tokenize, Token, TokenKind, Tokens};
