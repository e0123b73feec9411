//! Color expressions.
//!
//! A style may compute a color directly from record properties:
//!
//! ```text
//! @@=[properties.r, properties.g, properties.b]
//! @@=[properties.r * 0.5 + 100, 0, 255 - properties.g, 200]
//! ```
//!
//! The `@@=` sentinel introduces an array of three or four channel
//! expressions over `properties.<name>` references, numeric literals and
//! `+ - * /` with parentheses. An expression compiles once; evaluation
//! failures (missing property, non-numeric value) yield no color for that
//! record and the renderer falls back to its default.

use crate::{ColorError, ColorResult};
use crate::palette::Rgba;
use tilewash_decode::Row;

/// Prefix marking a string color config as an expression.
pub const EXPRESSION_SENTINEL: &str = "@@=";

/// One channel expression.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(f64),
    Property(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, row: &Row) -> Option<f64> {
        match self {
            Expr::Literal(v) => Some(*v),
            Expr::Property(name) => row.number(name),
            Expr::Neg(e) => Some(-e.eval(row)?),
            Expr::Add(a, b) => Some(a.eval(row)? + b.eval(row)?),
            Expr::Sub(a, b) => Some(a.eval(row)? - b.eval(row)?),
            Expr::Mul(a, b) => Some(a.eval(row)? * b.eval(row)?),
            Expr::Div(a, b) => Some(a.eval(row)? / b.eval(row)?),
        }
    }
}

/// A compiled color expression.
#[derive(Debug, Clone)]
pub struct ColorExpression {
    channels: Vec<Expr>,
}

impl ColorExpression {
    /// Compile an expression source, sentinel included.
    pub fn compile(source: &str) -> ColorResult<ColorExpression> {
        let body = source
            .strip_prefix(EXPRESSION_SENTINEL)
            .ok_or_else(|| ColorError::BadExpression("missing @@= sentinel".to_string()))?;
        let mut parser = Parser::new(body);
        let channels = parser.parse_channel_array()?;
        if !(3..=4).contains(&channels.len()) {
            return Err(ColorError::BadExpression(format!(
                "expected 3 or 4 channels, got {}",
                channels.len()
            )));
        }
        Ok(ColorExpression { channels })
    }

    /// Evaluate against one record. `None` means "no color".
    pub fn eval(&self, row: &Row) -> Option<Rgba> {
        let mut out: Rgba = [0, 0, 0, 255];
        for (i, expr) in self.channels.iter().enumerate() {
            let v = expr.eval(row)?;
            if !v.is_finite() {
                return None;
            }
            out[i] = v.round().clamp(0.0, 255.0) as u8;
        }
        Some(out)
    }
}

/// Hand-rolled recursive-descent parser over a byte cursor.
struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> ColorError {
        ColorError::BadExpression(format!("{message} at offset {}", self.pos))
    }

    fn skip_ws(&mut self) {
        while self.src.get(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> ColorResult<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn parse_channel_array(&mut self) -> ColorResult<Vec<Expr>> {
        self.eat(b'[')?;
        let mut channels = vec![self.parse_expr()?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            channels.push(self.parse_expr()?);
        }
        self.eat(b']')?;
        self.skip_ws();
        if self.pos != self.src.len() {
            return Err(self.error("trailing input"));
        }
        Ok(channels)
    }

    fn parse_expr(&mut self) -> ColorResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    lhs = Expr::Add(Box::new(lhs), Box::new(self.parse_term()?));
                }
                Some(b'-') => {
                    self.pos += 1;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(self.parse_term()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_term(&mut self) -> ColorResult<Expr> {
        let mut lhs = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(self.parse_factor()?));
                }
                Some(b'/') => {
                    self.pos += 1;
                    lhs = Expr::Div(Box::new(lhs), Box::new(self.parse_factor()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_factor(&mut self) -> ColorResult<Expr> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_factor()?)))
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.eat(b')')?;
                Ok(inner)
            }
            Some(b) if b.is_ascii_digit() || b == b'.' => self.parse_number(),
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.parse_property(),
            _ => Err(self.error("expected a value")),
        }
    }

    fn parse_number(&mut self) -> ColorResult<Expr> {
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ascii digits");
        text.parse()
            .map(Expr::Literal)
            .map_err(|_| self.error("bad number"))
    }

    fn parse_property(&mut self) -> ColorResult<Expr> {
        let ident = self.parse_ident();
        if ident != "properties" {
            return Err(self.error("only properties.<name> references are allowed"));
        }
        self.eat(b'.')?;
        let name = self.parse_ident();
        if name.is_empty() {
            return Err(self.error("expected a property name"));
        }
        Ok(Expr::Property(name))
    }

    fn parse_ident(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}
