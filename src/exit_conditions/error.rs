//! Errors raised while compiling and evaluating exit conditions.

use std::ops::Range;
use thiserror::Error;

/// A malformed expression, carrying the half-open byte span that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Render the error against the source it came from.
    ///
    /// The output names the line, repeats it, and underlines the offending
    /// span with a caret followed by tildes:
    ///
    /// ```text
    /// Error on line 1: Unknown operator '=>'
    /// metadata.age => 18
    ///              ^~
    /// ```
    pub fn render(&self, source: &str) -> String {
        let start = clamp_to_boundary(source, self.span.start);
        let line_start = source[..start].rfind('\n').map_or(0, |index| index + 1);
        let line_end = source[start..]
            .find('\n')
            .map_or(source.len(), |index| start + index);
        let line_number = source[..line_start].matches('\n').count() + 1;
        let column = source[line_start..start].chars().count();
        let end = clamp_to_boundary(source, self.span.end.clamp(start, line_end));
        let width = source[start..end].chars().count().max(1);

        format!(
            "Error on line {}: {}\n{}\n{}^{}",
            line_number,
            self.message,
            &source[line_start..line_end],
            " ".repeat(column),
            "~".repeat(width - 1),
        )
    }
}

fn clamp_to_boundary(source: &str, mut index: usize) -> usize {
    index = index.min(source.len());
    while !source.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// An exit condition that failed to compile, with its rendered diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic}")]
pub struct CompileError {
    diagnostic: String,
    parse_error: ParseError,
}

impl CompileError {
    pub fn new(source: &str, parse_error: ParseError) -> Self {
        Self {
            diagnostic: parse_error.render(source),
            parse_error,
        }
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }

    pub fn parse_error(&self) -> &ParseError {
        &self.parse_error
    }
}

/// Errors raised while running a compiled program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    #[error("Cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    #[error("Cannot test membership in {0}")]
    NotAContainer(String),

    #[error("'{0}' is not a valid timestamp")]
    InvalidTimestamp(String),

    #[error("'{0}' is not a duration")]
    InvalidDuration(String),

    #[error("Exit conditions must be evaluated against a timezone-aware time")]
    NaiveTime,

    #[error("Malformed program: {0}")]
    MalformedProgram(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_points_at_span() {
        let source = "metadata.age => 18";
        let error = ParseError::new("Unknown operator '=>'", 13..15);

        assert_eq!(
            error.render(source),
            "Error on line 1: Unknown operator '=>'\nmetadata.age => 18\n             ^~"
        );
    }

    #[test]
    fn render_uses_the_line_containing_the_error() {
        let source = "metadata.a\nand $";
        let error = ParseError::new("Unexpected character '$'", 15..16);

        assert_eq!(
            error.render(source),
            "Error on line 2: Unexpected character '$'\nand $\n    ^"
        );
    }

    #[test]
    fn render_handles_end_of_input() {
        let source = "metadata.a and";
        let error = ParseError::new("Unexpected end of input", 14..14);

        let rendered = error.render(source);
        assert!(rendered.starts_with("Error on line 1: Unexpected end of input"));
        assert!(rendered.ends_with(&format!("{}^", " ".repeat(14))));
    }

    #[test]
    fn compile_error_displays_diagnostic() {
        let error = CompileError::new("(", ParseError::new("Unexpected end of input", 1..1));
        assert_eq!(error.to_string(), error.diagnostic());
        assert_eq!(error.parse_error().span, 1..1);
    }
}
