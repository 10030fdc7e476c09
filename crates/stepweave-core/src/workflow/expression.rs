//! Condition expression evaluator for workflow routing and inline scripts.
//!
//! The grammar is deliberately tiny: an expression is a boolean literal, a
//! bare operand, or exactly one comparison between two operands.
//!
//! ```text
//! expr    := operand | operand OP operand
//! OP      := == | != | <= | >= | < | >
//! operand := 'quoted' | "quoted" | number | word
//! ```
//!
//! There is no precedence and no `&&` / `||`. A word operand is a dot-path
//! lookup into the data context (`table.stats.rows`). Missing paths resolve to
//! `null`, except on the right-hand side of a comparison where an unresolved
//! word is taken as an unquoted string literal (`status == ok`).

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::context::{lookup_path, value_to_string};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an expression.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("unterminated string literal in '{0}'")]
    UnterminatedString(String),

    #[error("unexpected character '{ch}' in '{expr}'")]
    UnexpectedChar { ch: char, expr: String },

    #[error("expected a single comparison or operand, got '{0}'")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Tokens and parse tree
// ---------------------------------------------------------------------------

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(CompareOp),
}

/// A parsed operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A quoted string, number, or `true`/`false`/`null` keyword.
    Literal(Value),
    /// Dot-path lookup. `raw` is kept for the literal fallback.
    Path { raw: String, segments: Vec<String> },
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Operand(Operand),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn is_op_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == c {
                    closed = true;
                    break;
                }
                text.push(next);
            }
            if !closed {
                return Err(ExpressionError::UnterminatedString(input.to_string()));
            }
            tokens.push(Token::Quoted(text));
            continue;
        }

        if is_op_char(c) {
            chars.next();
            let followed_by_eq = chars.peek() == Some(&'=');
            let op = match (c, followed_by_eq) {
                ('=', true) => CompareOp::Eq,
                ('!', true) => CompareOp::Ne,
                ('<', true) => CompareOp::Le,
                ('>', true) => CompareOp::Ge,
                ('<', false) => CompareOp::Lt,
                ('>', false) => CompareOp::Gt,
                _ => {
                    return Err(ExpressionError::UnexpectedChar {
                        ch: c,
                        expr: input.to_string(),
                    });
                }
            };
            if followed_by_eq {
                chars.next();
            }
            tokens.push(Token::Op(op));
            continue;
        }

        let mut word = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_whitespace() || is_op_char(next) || next == '"' || next == '\'' {
                break;
            }
            word.push(next);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

fn operand_from_token(token: Token, expr: &str) -> Result<Operand, ExpressionError> {
    match token {
        Token::Quoted(text) => Ok(Operand::Literal(Value::String(text))),
        Token::Word(word) => Ok(match word.as_str() {
            "true" => Operand::Literal(Value::Bool(true)),
            "false" => Operand::Literal(Value::Bool(false)),
            "null" => Operand::Literal(Value::Null),
            _ => match parse_number(&word) {
                Some(n) => Operand::Literal(number_value(n)),
                None => Operand::Path {
                    segments: word.split('.').map(str::to_string).collect(),
                    raw: word,
                },
            },
        }),
        Token::Op(_) => Err(ExpressionError::Malformed(expr.to_string())),
    }
}

/// Parse an expression string into a tree.
pub fn parse(expression: &str) -> Result<Expr, ExpressionError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut tokens = tokenize(trimmed)?.into_iter();
    match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some(single), None, None, None) => {
            Ok(Expr::Operand(operand_from_token(single, trimmed)?))
        }
        (Some(left), Some(Token::Op(op)), Some(right), None) => Ok(Expr::Compare {
            left: operand_from_token(left, trimmed)?,
            op,
            right: operand_from_token(right, trimmed)?,
        }),
        _ => Err(ExpressionError::Malformed(trimmed.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Expr {
    /// Evaluate against a data context. Comparisons yield `Value::Bool`.
    pub fn evaluate(&self, data: &Map<String, Value>) -> Value {
        match self {
            Expr::Operand(operand) => resolve(operand, data, false),
            Expr::Compare { left, op, right } => {
                let lhs = resolve(left, data, false);
                let rhs = resolve(right, data, true);
                Value::Bool(compare(&lhs, *op, &rhs))
            }
        }
    }
}

/// Parse and evaluate in one call.
pub fn evaluate(expression: &str, data: &Map<String, Value>) -> Result<Value, ExpressionError> {
    Ok(parse(expression)?.evaluate(data))
}

/// Parse, evaluate and apply truthiness.
pub fn evaluate_bool(expression: &str, data: &Map<String, Value>) -> Result<bool, ExpressionError> {
    Ok(is_truthy(&evaluate(expression, data)?))
}

fn resolve(operand: &Operand, data: &Map<String, Value>, literal_fallback: bool) -> Value {
    match operand {
        Operand::Literal(value) => value.clone(),
        Operand::Path { raw, segments } => match lookup_path(data, segments.as_slice()) {
            Some(value) => value.clone(),
            None if literal_fallback => Value::String(raw.clone()),
            None => Value::Null,
        },
    }
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(lhs), as_number(rhs)) {
        return match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            CompareOp::Le => l <= r,
            CompareOp::Ge => l >= r,
            CompareOp::Lt => l < r,
            CompareOp::Gt => l > r,
        };
    }

    match op {
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ne => lhs != rhs,
        _ => {
            let ordering = value_to_string(lhs).cmp(&value_to_string(rhs));
            match op {
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                _ => ordering == Ordering::Greater,
            }
        }
    }
}

/// Apply branch truthiness to an evaluated value.
///
/// `null` is false, strings are false when empty, `"false"` or `"0"`,
/// numbers are false when zero. Arrays and objects are always true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !(s.is_empty() || s == "false" || s == "0"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let n: f64 = text.trim().parse().ok()?;
    n.is_finite().then_some(n)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Integral literals stay integers so they compare structurally with data.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
