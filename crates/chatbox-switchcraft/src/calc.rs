//! The `calc` command: a small arithmetic evaluator.
//!
//! Integers stay exact until they overflow, then continue as floats.
//! Operator precedence, lowest first:
//!
//! | Operators              | Notes                          |
//! |------------------------|--------------------------------|
//! | `\|`                   | integers only                  |
//! | `^`                    | XOR, integers only             |
//! | `&`                    | integers only                  |
//! | `+` `-`                |                                |
//! | `*` `/` `//` `%`       | `/` always yields a float      |
//! | unary `-` `+` `~`      |                                |
//! | `**`                   | right-associative              |
//!
//! Any literal or intermediate result above [`MAX_VALUE`] in magnitude is
//! rejected, as is an exponent above [`MAX_POWER`]. Expressions nested more
//! than [`MAX_DEPTH`] levels are bad input.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use chatbox_core::{CommandInvocation, ConnectionHandle};

/// Largest magnitude a value may reach.
pub const MAX_VALUE: f64 = 1e50;

/// Largest exponent `**` accepts.
pub const MAX_POWER: f64 = 100.0;

/// Deepest nesting of parentheses, unary operators and `**` exponents.
pub const MAX_DEPTH: usize = 100;

/// Sender label for replies.
pub const SENDER: &str = "calc";

/// A calculator value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }

    fn check_magnitude(self) -> Result<Self, CalcError> {
        let magnitude = self.as_f64().abs();
        if magnitude > MAX_VALUE || magnitude.is_nan() {
            Err(CalcError::TooLarge(self))
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            // Debug keeps a trailing `.0` on whole floats and switches to
            // exponent form for very large or small ones.
            Self::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    /// Not an expression, or an operation on the wrong kind of value.
    #[error("bad input")]
    BadInput,

    #[error("Value {0} is too large")]
    TooLarge(Number),

    #[error("Power {0} is too large")]
    PowerTooLarge(Number),

    #[error("division by zero")]
    DivisionByZero,

    /// A result that is not a real number, such as `(-8) ** 0.5`.
    #[error("math domain error")]
    Domain,
}

/// Evaluates an expression.
pub fn evaluate(expr: &str) -> Result<Number, CalcError> {
    let tokens = lex(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::BadInput);
    }
    Ok(value)
}

/// The chat reply for `expr`.
pub fn reply(expr: &str) -> String {
    match evaluate(expr) {
        Ok(value) => format!("&e{expr} = {value}"),
        Err(CalcError::BadInput) => "&aFailed: bad input".to_string(),
        Err(e) => format!("&aFailed: {e}"),
    }
}

/// Handler for `calc <expression>`.
///
/// Evaluation failures become replies; only a dead connection is an error.
pub async fn calc_command(cmd: CommandInvocation, conn: ConnectionHandle) -> anyhow::Result<()> {
    let expr = cmd.args_text();
    let text = reply(&expr);
    debug!(player = %cmd.invoker.name, expr = %expr, reply = %text, "Calculated");
    conn.tell(&cmd.invoker.name, SENDER, text)?;
    Ok(())
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Amp,
    Pipe,
    Tilde,
    LParen,
    RParen,
}

fn lex(input: &str) -> Result<Vec<Token>, CalcError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        let (token, width) = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'0'..=b'9' | b'.' => {
                let (number, width) = lex_number(&input[i..])?;
                (Token::Num(number), width)
            }
            b'*' if next == Some(b'*') => (Token::DoubleStar, 2),
            b'*' => (Token::Star, 1),
            b'/' if next == Some(b'/') => (Token::DoubleSlash, 2),
            b'/' => (Token::Slash, 1),
            b'+' => (Token::Plus, 1),
            b'-' => (Token::Minus, 1),
            b'%' => (Token::Percent, 1),
            b'^' => (Token::Caret, 1),
            b'&' => (Token::Amp, 1),
            b'|' => (Token::Pipe, 1),
            b'~' => (Token::Tilde, 1),
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            _ => return Err(CalcError::BadInput),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// Lexes one numeric literal at the start of `s`.
fn lex_number(s: &str) -> Result<(Number, usize), CalcError> {
    let bytes = s.as_bytes();
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let int_len = digits(0);
    let mut end = int_len;
    let mut is_float = false;

    if bytes.get(end) == Some(&b'.') {
        let frac_len = digits(end + 1);
        if int_len == 0 && frac_len == 0 {
            return Err(CalcError::BadInput);
        }
        end += 1 + frac_len;
        is_float = true;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_len = digits(exp_end);
        if exp_len == 0 {
            return Err(CalcError::BadInput);
        }
        end = exp_end + exp_len;
        is_float = true;
    }

    let literal = &s[..end];
    let number = if is_float {
        Number::Float(literal.parse().map_err(|_| CalcError::BadInput)?)
    } else {
        match literal.parse::<i128>() {
            Ok(i) => Number::Int(i),
            Err(_) => Number::Float(literal.parse().map_err(|_| CalcError::BadInput)?),
        }
    };

    Ok((number.check_magnitude()?, end))
}

// =============================================================================
// Parser / evaluator
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Number, CalcError>,
    ) -> Result<Number, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::BadInput);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut value = self.xor()?;
        while self.eat(Token::Pipe) {
            let rhs = self.xor()?;
            value = bitwise(value, rhs, |a, b| a | b)?;
        }
        Ok(value)
    }

    fn xor(&mut self) -> Result<Number, CalcError> {
        let mut value = self.and()?;
        while self.eat(Token::Caret) {
            let rhs = self.and()?;
            value = bitwise(value, rhs, |a, b| a ^ b)?;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<Number, CalcError> {
        let mut value = self.arith()?;
        while self.eat(Token::Amp) {
            let rhs = self.arith()?;
            value = bitwise(value, rhs, |a, b| a & b)?;
        }
        Ok(value)
    }

    fn arith(&mut self) -> Result<Number, CalcError> {
        let mut value = self.term()?;
        loop {
            value = match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    add(value, self.term()?)?
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    sub(value, self.term()?)?
                }
                _ => return Ok(value),
            };
        }
    }

    fn term(&mut self) -> Result<Number, CalcError> {
        let mut value = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent)) => op,
                _ => return Ok(value),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            value = match op {
                Token::Star => mul(value, rhs)?,
                Token::Slash => div(value, rhs)?,
                Token::DoubleSlash => floor_div(value, rhs)?,
                _ => modulo(value, rhs)?,
            };
        }
    }

    fn factor(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let value = self.nested(Self::factor)?;
                let negated = match value {
                    Number::Int(i) => i.checked_neg().map(Number::Int),
                    Number::Float(f) => Some(Number::Float(-f)),
                };
                negated
                    .unwrap_or(Number::Float(-value.as_f64()))
                    .check_magnitude()
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::factor)
            }
            Some(Token::Tilde) => {
                self.pos += 1;
                match self.nested(Self::factor)? {
                    Number::Int(i) => Ok(Number::Int(!i)),
                    Number::Float(_) => Err(CalcError::BadInput),
                }
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.eat(Token::DoubleStar) {
            let exponent = self.nested(Self::factor)?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.nested(Self::expr)?;
                if !self.eat(Token::RParen) {
                    return Err(CalcError::BadInput);
                }
                Ok(value)
            }
            _ => Err(CalcError::BadInput),
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

/// Applies an integer operation, falling back to floats on overflow.
fn arithmetic(
    a: Number,
    b: Number,
    int_op: impl Fn(i128, i128) -> Option<i128>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Number, CalcError> {
    let result = match (a, b) {
        (Number::Int(x), Number::Int(y)) => int_op(x, y)
            .map(Number::Int)
            .unwrap_or_else(|| Number::Float(float_op(x as f64, y as f64))),
        _ => Number::Float(float_op(a.as_f64(), b.as_f64())),
    };
    result.check_magnitude()
}

fn add(a: Number, b: Number) -> Result<Number, CalcError> {
    arithmetic(a, b, i128::checked_add, |x, y| x + y)
}

fn sub(a: Number, b: Number) -> Result<Number, CalcError> {
    arithmetic(a, b, i128::checked_sub, |x, y| x - y)
}

fn mul(a: Number, b: Number) -> Result<Number, CalcError> {
    arithmetic(a, b, i128::checked_mul, |x, y| x * y)
}

fn div(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivisionByZero);
    }
    Number::Float(a.as_f64() / b.as_f64()).check_magnitude()
}

fn floor_div(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivisionByZero);
    }
    arithmetic(
        a,
        b,
        |x, y| {
            let q = x.checked_div(y)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q.checked_sub(1)
            } else {
                Some(q)
            }
        },
        |x, y| (x / y).floor(),
    )
}

fn modulo(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivisionByZero);
    }
    // The result takes the sign of the divisor.
    arithmetic(
        a,
        b,
        |x, y| {
            let r = x.checked_rem(y)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r.checked_add(y)
            } else {
                Some(r)
            }
        },
        |x, y| {
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        },
    )
}

fn pow(base: Number, exponent: Number) -> Result<Number, CalcError> {
    if exponent.as_f64() > MAX_POWER {
        return Err(CalcError::PowerTooLarge(exponent));
    }
    if base.is_zero() && exponent.as_f64() < 0.0 {
        return Err(CalcError::DivisionByZero);
    }

    let result = match (base, exponent) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => b
            .checked_pow(e as u32)
            .map(Number::Int)
            .unwrap_or_else(|| Number::Float((b as f64).powf(e as f64))),
        _ => {
            let value = base.as_f64().powf(exponent.as_f64());
            if value.is_nan() {
                return Err(CalcError::Domain);
            }
            Number::Float(value)
        }
    };
    result.check_magnitude()
}

fn bitwise(a: Number, b: Number, op: impl Fn(i128, i128) -> i128) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Ok(Number::Int(op(x, y))),
        _ => Err(CalcError::BadInput),
    }
}
