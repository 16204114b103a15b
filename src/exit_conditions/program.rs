use super::error::{CompileError, EvaluationError};
use super::evaluator::{evaluate, truthy};
use super::instructions::Instruction;
use super::optimiser::optimise;
use super::parser::parse;
use super::properties::standard_property;
use crate::core::metadata::get_path;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Source of variables and properties for a running program.
///
/// Implementors resolve dotted paths. Missing variables resolve to null.
pub trait Variables {
    fn lookup(&self, path: &[String]) -> Value;

    /// Answer a property clause. Defaults to the built-in properties.
    fn property(
        &self,
        adjectives: &[String],
        subject: Value,
        arguments: &[(String, Value)],
        now: DateTime<FixedOffset>,
    ) -> Result<Value, EvaluationError> {
        standard_property(adjectives, subject, arguments, now)
    }
}

impl Variables for Value {
    fn lookup(&self, path: &[String]) -> Value {
        get_path(self, path).cloned().unwrap_or(Value::Null)
    }
}

/// The instant a program is evaluated at.
///
/// Only timezone-aware instants are accepted by [`ExitConditionProgram::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl<Tz: TimeZone> From<DateTime<Tz>> for EvaluationTime {
    fn from(time: DateTime<Tz>) -> Self {
        let offset = time.offset().fix();
        EvaluationTime::Aware(time.with_timezone(&offset))
    }
}

impl From<NaiveDateTime> for EvaluationTime {
    fn from(time: NaiveDateTime) -> Self {
        EvaluationTime::Naive(time)
    }
}

/// A compiled and optimised exit condition.
///
/// Programs compare and hash by their instructions, so sources that differ
/// only in layout, comments or redundant negations are equal. They
/// serialize as their source text.
///
/// # Example
///
/// ```
/// use labelflow::exit_conditions::ExitConditionProgram;
/// use serde_json::json;
///
/// let program = ExitConditionProgram::compile("metadata.age >= 18").unwrap();
/// let adult = json!({"metadata": {"age": 21}});
///
/// assert!(program.run(&adult, chrono::Utc::now()).unwrap());
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExitConditionProgram {
    source: Arc<str>,
    instructions: Arc<[Instruction]>,
}

impl ExitConditionProgram {
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let instructions = parse(source).map_err(|error| CompileError::new(source, error))?;
        Ok(Self {
            source: source.into(),
            instructions: optimise(&instructions).into(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Dotted paths of every variable the program reads.
    pub fn accessed_variables(&self) -> BTreeSet<String> {
        self.instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Lookup(path) => Some(path.join(".")),
                _ => None,
            })
            .collect()
    }

    /// Evaluate against `variables` at `now`, returning the truthiness of
    /// the result.
    pub fn run<V>(&self, variables: &V, now: impl Into<EvaluationTime>) -> Result<bool, EvaluationError>
    where
        V: Variables + ?Sized,
    {
        let now = match now.into() {
            EvaluationTime::Aware(now) => now,
            EvaluationTime::Naive(_) => return Err(EvaluationError::NaiveTime),
        };

        let result = evaluate(
            &self.instructions,
            |path| variables.lookup(path),
            |adjectives, subject, arguments| variables.property(adjectives, subject, arguments, now),
        )?;
        Ok(truthy(&result))
    }
}

impl PartialEq for ExitConditionProgram {
    fn eq(&self, other: &Self) -> bool {
        self.instructions == other.instructions
    }
}

impl Eq for ExitConditionProgram {}

impl Hash for ExitConditionProgram {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instructions.hash(state);
    }
}

impl fmt::Debug for ExitConditionProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExitConditionProgram")
            .field(&&*self.source)
            .finish()
    }
}

impl fmt::Display for ExitConditionProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for ExitConditionProgram {
    type Err = CompileError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::compile(source)
    }
}

impl TryFrom<String> for ExitConditionProgram {
    type Error = CompileError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::compile(&source)
    }
}

impl From<ExitConditionProgram> for String {
    fn from(program: ExitConditionProgram) -> Self {
        program.source.to_string()
    }
}
