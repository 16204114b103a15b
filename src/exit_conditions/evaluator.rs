//! Stack-machine evaluator.

use super::error::EvaluationError;
use super::instructions::Instruction;
use serde_json::Value;
use std::cmp::Ordering;

/// Run `instructions` and return the single value left on the stack.
///
/// `lookup` resolves dotted paths and `property_handler` answers
/// `PROPERTY` instructions with `(adjectives, subject, arguments)`.
pub fn evaluate<L, P>(
    instructions: &[Instruction],
    lookup: L,
    property_handler: P,
) -> Result<Value, EvaluationError>
where
    L: Fn(&[String]) -> Value,
    P: Fn(&[String], Value, &[(String, Value)]) -> Result<Value, EvaluationError>,
{
    let mut stack: Vec<Value> = Vec::new();

    for instruction in instructions {
        match instruction {
            Instruction::Literal(value) => stack.push(value.clone()),
            Instruction::Lookup(path) => stack.push(lookup(path)),
            Instruction::Property {
                adjectives,
                prepositions,
            } => {
                let mut arguments = Vec::with_capacity(prepositions.len());
                for preposition in prepositions.iter().rev() {
                    arguments.push((preposition.clone(), pop(&mut stack, instruction)?));
                }
                arguments.reverse();
                let subject = pop(&mut stack, instruction)?;
                stack.push(property_handler(adjectives, subject, &arguments)?);
            }
            Instruction::Eq => {
                let (left, right) = pop_pair(&mut stack, instruction)?;
                stack.push(Value::Bool(values_equal(&left, &right)));
            }
            Instruction::Lt => {
                let (left, right) = pop_pair(&mut stack, instruction)?;
                stack.push(Value::Bool(compare(&left, &right)? == Ordering::Less));
            }
            Instruction::Gt => {
                let (left, right) = pop_pair(&mut stack, instruction)?;
                stack.push(Value::Bool(compare(&left, &right)? == Ordering::Greater));
            }
            Instruction::And => {
                let (left, right) = pop_pair(&mut stack, instruction)?;
                stack.push(Value::Bool(truthy(&left) && truthy(&right)));
            }
            Instruction::Or => {
                let (left, right) = pop_pair(&mut stack, instruction)?;
                stack.push(Value::Bool(truthy(&left) || truthy(&right)));
            }
            Instruction::Not => {
                let value = pop(&mut stack, instruction)?;
                stack.push(Value::Bool(!truthy(&value)));
            }
            Instruction::ToBool => {
                let value = pop(&mut stack, instruction)?;
                stack.push(Value::Bool(truthy(&value)));
            }
        }
    }

    match (stack.pop(), stack.len()) {
        (Some(result), 0) => Ok(result),
        (None, _) => Err(EvaluationError::MalformedProgram(
            "program left no result".into(),
        )),
        (Some(_), remaining) => Err(EvaluationError::MalformedProgram(format!(
            "program left {} values on the stack",
            remaining + 1
        ))),
    }
}

fn pop(stack: &mut Vec<Value>, instruction: &Instruction) -> Result<Value, EvaluationError> {
    stack.pop().ok_or_else(|| {
        EvaluationError::MalformedProgram(format!("stack underflow at {instruction}"))
    })
}

fn pop_pair(
    stack: &mut Vec<Value>,
    instruction: &Instruction,
) -> Result<(Value, Value), EvaluationError> {
    let right = pop(stack, instruction)?;
    let left = pop(stack, instruction)?;
    Ok((left, right))
}

/// Truthiness: null, false, zero, and empty strings, arrays and objects are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Structural equality that compares numbers by value, so `1 = 1.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, EvaluationError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    ordering.ok_or_else(|| EvaluationError::Incomparable {
        left: type_name(left).to_string(),
        right: type_name(right).to_string(),
    })
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
