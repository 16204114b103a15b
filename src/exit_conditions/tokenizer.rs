//! Tokenizer for the exit condition language.
//!
//! Raw tokens are cut by a character-category state table, then atoms are
//! classified into numbers, durations, keywords and dotted identifiers.
//! Whitespace and `#` comments are discarded.

use super::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::ops::Range;

const PREPOSITIONS: &[&str] = &["since", "in"];
const COPULAE: &[&str] = &["is", "has", "was"];

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("duration pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Dotted identifier, split into its segments.
    Atom(Vec<String>),
    Number(Value),
    /// Duration in seconds.
    Duration(i64),
    /// `true`, `false`, `null` or a quoted string.
    Literal(Value),
    Operator(String),
    And,
    Or,
    Not,
    Copula(String),
    Preposition(String),
    LeftParen,
    RightParen,
}

/// A classified token with its raw text and source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Letter,
    Digit,
    Connector,
    Dash,
    Symbol,
    OpenParen,
    CloseParen,
    Quote,
    Hash,
    Newline,
    Space,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawClass {
    Atom,
    Operator,
    LeftParen,
    RightParen,
    Text,
    Comment,
    Whitespace,
}

enum Step {
    Extend,
    Close,
    Begin(RawClass),
    Reject,
}

fn categorise(c: char) -> Category {
    match c {
        '(' => Category::OpenParen,
        ')' => Category::CloseParen,
        '"' => Category::Quote,
        '#' => Category::Hash,
        '\n' => Category::Newline,
        '_' | '.' => Category::Connector,
        '-' => Category::Dash,
        '=' | '<' | '>' | '/' => Category::Symbol,
        c if c.is_whitespace() => Category::Space,
        c if c.is_alphabetic() => Category::Letter,
        c if c.is_numeric() => Category::Digit,
        _ => Category::Other,
    }
}

fn transition(state: Option<RawClass>, category: Category) -> Step {
    use Category as C;
    use RawClass as R;

    match (state, category) {
        (Some(R::Text), C::Quote) => Step::Close,
        (Some(R::Text), _) => Step::Extend,
        (Some(R::Comment), C::Newline) => Step::Begin(R::Whitespace),
        (Some(R::Comment), _) => Step::Extend,
        (Some(R::Atom), C::Letter | C::Digit | C::Connector | C::Dash) => Step::Extend,
        (Some(R::Operator), C::Symbol) => Step::Extend,
        (Some(R::Whitespace), C::Space | C::Newline) => Step::Extend,
        (_, C::Letter | C::Digit | C::Connector | C::Dash) => Step::Begin(R::Atom),
        (_, C::Symbol) => Step::Begin(R::Operator),
        (_, C::OpenParen) => Step::Begin(R::LeftParen),
        (_, C::CloseParen) => Step::Begin(R::RightParen),
        (_, C::Quote) => Step::Begin(R::Text),
        (_, C::Hash) => Step::Begin(R::Comment),
        (_, C::Space | C::Newline) => Step::Begin(R::Whitespace),
        (_, C::Other) => Step::Reject,
    }
}

/// Tokenize `source`.
///
/// The returned iterator is lazy and cheap to clone, so a token stream can
/// be restarted. It stops after the first error.
pub fn tokenize(source: &str) -> Tokens<'_> {
    Tokens {
        source,
        position: 0,
        failed: false,
    }
}

#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    source: &'a str,
    position: usize,
    failed: bool,
}

impl<'a> Tokens<'a> {
    fn scan_raw(&mut self) -> Option<Result<(RawClass, Range<usize>), ParseError>> {
        let start = self.position;
        let mut chars = self.source[start..].char_indices();
        let (_, first) = chars.next()?;

        let class = match transition(None, categorise(first)) {
            Step::Begin(class) => class,
            _ => {
                return Some(Err(ParseError::new(
                    format!("Unexpected character {first:?}"),
                    start..start + first.len_utf8(),
                )))
            }
        };

        let mut end = start + first.len_utf8();
        let mut closed = false;
        if !matches!(class, RawClass::LeftParen | RawClass::RightParen) {
            for (offset, c) in chars {
                match transition(Some(class), categorise(c)) {
                    Step::Extend => end = start + offset + c.len_utf8(),
                    Step::Close => {
                        end = start + offset + c.len_utf8();
                        closed = true;
                        break;
                    }
                    Step::Begin(_) | Step::Reject => break,
                }
            }
        }

        if class == RawClass::Text && !closed {
            return Some(Err(ParseError::new("Unterminated string", start..end)));
        }

        self.position = end;
        Some(Ok((class, start..end)))
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed {
            let (class, span) = match self.scan_raw()? {
                Ok(raw) => raw,
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            };

            let text = &self.source[span.clone()];
            let kind = match class {
                RawClass::Whitespace | RawClass::Comment => continue,
                RawClass::LeftParen => TokenKind::LeftParen,
                RawClass::RightParen => TokenKind::RightParen,
                RawClass::Operator => TokenKind::Operator(text.to_string()),
                RawClass::Text => {
                    TokenKind::Literal(Value::String(text[1..text.len() - 1].to_string()))
                }
                RawClass::Atom => match classify_atom(text) {
                    Some(kind) => kind,
                    None => {
                        self.failed = true;
                        return Some(Err(ParseError::new(
                            format!("Invalid identifier '{text}'"),
                            span,
                        )));
                    }
                },
            };

            return Some(Ok(Token {
                kind,
                value: text.to_string(),
                span,
            }));
        }
        None
    }
}

fn classify_atom(text: &str) -> Option<TokenKind> {
    if PREPOSITIONS.contains(&text) {
        return Some(TokenKind::Preposition(text.to_string()));
    }
    if let Ok(integer) = text.parse::<i64>() {
        return Some(TokenKind::Number(Value::from(integer)));
    }
    if looks_numeric(text) {
        if let Ok(float) = text.parse::<f64>() {
            return Some(TokenKind::Number(Value::from(float)));
        }
    }
    if let Some(seconds) = parse_duration(text) {
        return Some(TokenKind::Duration(seconds));
    }

    let kind = match text {
        "true" => TokenKind::Literal(Value::Bool(true)),
        "false" => TokenKind::Literal(Value::Bool(false)),
        "null" => TokenKind::Literal(Value::Null),
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        copula if COPULAE.contains(&copula) => TokenKind::Copula(copula.to_string()),
        _ => {
            let segments: Vec<String> = text.split('.').map(str::to_string).collect();
            if segments.iter().any(String::is_empty) {
                return None;
            }
            TokenKind::Atom(segments)
        }
    };
    Some(kind)
}

// Restricts float parsing so that words such as `inf` or `nan` stay identifiers.
fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-' | '.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Parse a duration such as `1d2h30m` into seconds.
pub fn parse_duration(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    let captures = DURATION.captures(text)?;
    const UNITS: [i64; 4] = [86_400, 3_600, 60, 1];

    let mut total: i64 = 0;
    for (group, unit) in UNITS.iter().enumerate() {
        if let Some(amount) = captures.get(group + 1) {
            let amount: i64 = amount.as_str().parse().ok()?;
            total = total.checked_add(amount.checked_mul(*unit)?)?;
        }
    }
    Some(total)
}
