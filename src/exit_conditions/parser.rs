//! Recursive-descent compiler from tokens to stack instructions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or         := and ("or" and)*
//! and        := comparison ("and" comparison)*
//! comparison := property [OPERATOR property]
//! property   := unary [COPULA ["not"] ADJECTIVE* (PREPOSITION unary)*]
//! unary      := "not" unary | value
//! value      := ATOM | LITERAL | NUMBER | DURATION | "(" or ")"
//! ```

use super::error::ParseError;
use super::instructions::Instruction;
use super::tokenizer::{tokenize, Token, TokenKind};
use serde_json::Value;

/// Compile `source` into unoptimised instructions.
pub fn parse(source: &str) -> Result<Vec<Instruction>, ParseError> {
    let tokens = tokenize(source).collect::<Result<Vec<_>, _>>()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        output: Vec::new(),
    };

    parser.parse_or()?;
    if let Some(token) = parser.current() {
        return Err(unexpected(token));
    }
    Ok(parser.output)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    output: Vec<Instruction>,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, predicate: impl Fn(&TokenKind) -> bool) -> bool {
        self.current().is_some_and(|token| predicate(&token.kind))
    }

    fn emit(&mut self, instruction: Instruction) {
        self.output.push(instruction);
    }

    fn end_of_input(&self) -> ParseError {
        ParseError::new("Unexpected end of input", self.end..self.end)
    }

    fn parse_or(&mut self) -> Result<(), ParseError> {
        self.parse_and()?;
        if !self.check(|kind| matches!(kind, TokenKind::Or)) {
            return Ok(());
        }

        self.emit(Instruction::ToBool);
        while self.check(|kind| matches!(kind, TokenKind::Or)) {
            self.advance();
            self.parse_and()?;
            self.emit(Instruction::ToBool);
            self.emit(Instruction::Or);
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<(), ParseError> {
        self.parse_comparison()?;
        if !self.check(|kind| matches!(kind, TokenKind::And)) {
            return Ok(());
        }

        self.emit(Instruction::ToBool);
        while self.check(|kind| matches!(kind, TokenKind::And)) {
            self.advance();
            self.parse_comparison()?;
            self.emit(Instruction::ToBool);
            self.emit(Instruction::And);
        }
        Ok(())
    }

    fn parse_comparison(&mut self) -> Result<(), ParseError> {
        self.parse_property()?;

        let Some(Token {
            kind: TokenKind::Operator(operator),
            span,
            ..
        }) = self.current().cloned()
        else {
            return Ok(());
        };
        self.advance();

        let (instruction, negate) = match operator.as_str() {
            "=" => (Instruction::Eq, false),
            "/=" => (Instruction::Eq, true),
            "<" => (Instruction::Lt, false),
            ">" => (Instruction::Gt, false),
            "<=" => (Instruction::Gt, true),
            ">=" => (Instruction::Lt, true),
            _ => {
                return Err(ParseError::new(
                    format!("Unknown operator '{operator}'"),
                    span,
                ))
            }
        };

        self.parse_property()?;
        self.emit(instruction);
        if negate {
            self.emit(Instruction::Not);
        }
        Ok(())
    }

    fn parse_property(&mut self) -> Result<(), ParseError> {
        self.parse_unary()?;

        let Some(copula) = self.current().cloned() else {
            return Ok(());
        };
        if !matches!(copula.kind, TokenKind::Copula(_)) {
            return Ok(());
        }
        self.advance();

        let negated = self.check(|kind| matches!(kind, TokenKind::Not));
        if negated {
            self.advance();
        }

        let mut adjectives = Vec::new();
        while let Some(token) = self.current().cloned() {
            let TokenKind::Atom(path) = &token.kind else {
                break;
            };
            if path.len() != 1 {
                return Err(ParseError::new(
                    format!("Expected an adjective, found '{}'", token.value),
                    token.span,
                ));
            }
            adjectives.push(path[0].clone());
            self.advance();
        }

        let mut prepositions = Vec::new();
        while let Some(Token {
            kind: TokenKind::Preposition(preposition),
            ..
        }) = self.current().cloned()
        {
            self.advance();
            self.parse_unary()?;
            prepositions.push(preposition);
        }

        if adjectives.is_empty() && prepositions.is_empty() {
            return Err(match self.current() {
                Some(token) => ParseError::new(
                    format!("Expected a property after '{}'", copula.value),
                    token.span.clone(),
                ),
                None => self.end_of_input(),
            });
        }

        self.emit(Instruction::Property {
            adjectives,
            prepositions,
        });
        if negated {
            self.emit(Instruction::Not);
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<(), ParseError> {
        if self.check(|kind| matches!(kind, TokenKind::Not)) {
            self.advance();
            self.parse_unary()?;
            self.emit(Instruction::ToBool);
            self.emit(Instruction::Not);
            return Ok(());
        }
        self.parse_value()
    }

    fn parse_value(&mut self) -> Result<(), ParseError> {
        let Some(token) = self.advance() else {
            return Err(self.end_of_input());
        };

        match token.kind {
            TokenKind::Atom(path) => self.emit(Instruction::Lookup(path)),
            TokenKind::Number(value) | TokenKind::Literal(value) => {
                self.emit(Instruction::Literal(value))
            }
            TokenKind::Duration(seconds) => self.emit(Instruction::Literal(Value::from(seconds))),
            TokenKind::LeftParen => {
                self.parse_or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RightParen,
                        ..
                    }) => {}
                    Some(other) => return Err(unexpected(&other)),
                    None => {
                        return Err(ParseError::new(
                            "Expected ')' before end of input",
                            self.end..self.end,
                        ))
                    }
                }
            }
            _ => return Err(unexpected(&token)),
        }
        Ok(())
    }
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::new(format!("Unexpected '{}'", token.value), token.span.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup(path: &str) -> Instruction {
        Instruction::Lookup(path.split('.').map(String::from).collect())
    }

    fn literal(value: Value) -> Instruction {
        Instruction::Literal(value)
    }

    #[test]
    fn single_value_compiles_to_a_load() {
        assert_eq!(parse("true").unwrap(), vec![literal(json!(true))]);
        assert_eq!(parse("metadata.x").unwrap(), vec![lookup("metadata.x")]);
    }

    #[test]
    fn operators_lower_to_eq_lt_gt() {
        let cases = [
            ("a = 1", vec![Instruction::Eq]),
            ("a /= 1", vec![Instruction::Eq, Instruction::Not]),
            ("a < 1", vec![Instruction::Lt]),
            ("a > 1", vec![Instruction::Gt]),
            ("a <= 1", vec![Instruction::Gt, Instruction::Not]),
            ("a >= 1", vec![Instruction::Lt, Instruction::Not]),
        ];

        for (source, tail) in cases {
            let mut expected = vec![lookup("a"), literal(json!(1))];
            expected.extend(tail);
            assert_eq!(parse(source).unwrap(), expected, "{source}");
        }
    }

    #[test]
    fn boolean_operands_are_coerced() {
        assert_eq!(
            parse("a and b or c").unwrap(),
            vec![
                lookup("a"),
                Instruction::ToBool,
                lookup("b"),
                Instruction::ToBool,
                Instruction::And,
                Instruction::ToBool,
                lookup("c"),
                Instruction::ToBool,
                Instruction::Or,
            ]
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let instructions = parse("a or b and c").unwrap();
        assert_eq!(instructions.last(), Some(&Instruction::Or));
        assert_eq!(
            instructions.iter().filter(|i| **i == Instruction::And).count(),
            1
        );
    }

    #[test]
    fn not_coerces_its_operand() {
        assert_eq!(
            parse("not not true").unwrap(),
            vec![
                literal(json!(true)),
                Instruction::ToBool,
                Instruction::Not,
                Instruction::ToBool,
                Instruction::Not,
            ]
        );
    }

    #[test]
    fn property_with_preposition() {
        assert_eq!(
            parse("3h has passed since metadata.started").unwrap(),
            vec![
                literal(json!(10_800)),
                lookup("metadata.started"),
                Instruction::Property {
                    adjectives: vec!["passed".into()],
                    prepositions: vec!["since".into()],
                },
            ]
        );
    }

    #[test]
    fn negated_copula_appends_not() {
        assert_eq!(
            parse("metadata.x is not defined").unwrap(),
            vec![
                lookup("metadata.x"),
                Instruction::Property {
                    adjectives: vec!["defined".into()],
                    prepositions: vec![],
                },
                Instruction::Not,
            ]
        );
    }

    #[test]
    fn membership_has_no_adjectives() {
        assert_eq!(
            parse(r#""a" is in metadata.tags"#).unwrap(),
            vec![
                literal(json!("a")),
                lookup("metadata.tags"),
                Instruction::Property {
                    adjectives: vec![],
                    prepositions: vec!["in".into()],
                },
            ]
        );
    }

    #[test]
    fn parentheses_group() {
        assert_eq!(
            parse("(a = 1)").unwrap(),
            vec![lookup("a"), literal(json!(1)), Instruction::Eq]
        );
    }

    #[test]
    fn unknown_operator_is_rejected_with_span() {
        let error = parse("a => 1").unwrap_err();
        assert_eq!(error.message, "Unknown operator '=>'");
        assert_eq!(error.span, 2..4);
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let error = parse("a b").unwrap_err();
        assert_eq!(error.message, "Unexpected 'b'");
        assert_eq!(error.span, 2..3);
    }

    #[test]
    fn missing_operand_reports_end_of_input() {
        let error = parse("a and").unwrap_err();
        assert_eq!(error.span, 5..5);
    }

    #[test]
    fn unclosed_parenthesis_is_rejected() {
        let error = parse("(a").unwrap_err();
        assert_eq!(error.span, 2..2);
    }

    #[test]
    fn copula_requires_a_property() {
        assert!(parse("a is").is_err());
        assert!(parse("a is 1").is_err());
    }

    #[test]
    fn dotted_adjective_is_rejected() {
        let error = parse("a is very.defined").unwrap_err();
        assert_eq!(error.span, 5..17);
    }

    #[test]
    fn tokenizer_errors_propagate() {
        let error = parse("a = $").unwrap_err();
        assert_eq!(error.span, 4..5);
    }
}
