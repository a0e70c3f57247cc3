//! Tokenizer and precedence-climbing parser for formula text
//!
//! The grammar is a closed arithmetic subset:
//!
//! ```text
//! formula    := expr ("," expr)* [","]
//! expr       := additive (cmp_op additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("+" | "-") unary | power
//! power      := postfix ["**" unary]
//! postfix    := atom ("[" ["-"] integer "]")*
//! atom       := number | name | name "(" args ")" | "(" [formula] ")"
//! ```
//!
//! Only named functions can be called and subscripts are integer literals.

use errors::{ExplainError, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Parsed formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    Tuple(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison: `a < b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: i64,
    },
}

impl Expr {
    /// Names read as values and names called as functions
    pub fn referenced_names(&self) -> (BTreeSet<&str>, BTreeSet<&str>) {
        let mut values = BTreeSet::new();
        let mut calls = BTreeSet::new();
        self.collect_names(&mut values, &mut calls);
        (values, calls)
    }

    fn collect_names<'a>(&'a self, values: &mut BTreeSet<&'a str>, calls: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) => {},
            Expr::Name(name) => {
                values.insert(name);
            },
            Expr::Tuple(items) => items.iter().for_each(|e| e.collect_names(values, calls)),
            Expr::Unary { operand, .. } => operand.collect_names(values, calls),
            Expr::Binary { left, right, .. } => {
                left.collect_names(values, calls);
                right.collect_names(values, calls);
            },
            Expr::Compare { first, rest } => {
                first.collect_names(values, calls);
                rest.iter().for_each(|(_, e)| e.collect_names(values, calls));
            },
            Expr::Call { function, args } => {
                calls.insert(function);
                args.iter().for_each(|e| e.collect_names(values, calls));
            },
            Expr::Index { target, .. } => target.collect_names(values, calls),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Compare(CompareOp),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Ident(name) => format!("name '{}'", name),
            Token::Eof => "end of formula".to_string(),
            other => format!("{:?}", other),
        }
    }
}

struct Lexer<'a> {
    formula: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(formula: &'a str) -> Self {
        Self {
            formula,
            chars: formula.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> ExplainError {
        ExplainError::syntax(self.formula, reason)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek_at(0) {
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }

            let token = if c.is_ascii_digit() || (c == '.' && self.next_is_digit(1)) {
                self.number()?
            } else if c.is_ascii_alphabetic() || c == '_' {
                self.ident()
            } else {
                self.symbol(c)?
            };
            tokens.push(token);
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn next_is_digit(&self, offset: usize) -> bool {
        self.peek_at(offset).is_some_and(|c| c.is_ascii_digit())
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        while self.next_is_digit(0) {
            self.pos += 1;
        }
        if self.peek_at(0) == Some('.') {
            self.pos += 1;
            while self.next_is_digit(0) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_at(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.next_is_digit(1 + sign) {
                self.pos += 1 + sign;
                while self.next_is_digit(0) {
                    self.pos += 1;
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if self.peek_at(0).is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return Err(self.error(format!("invalid number literal near '{}'", text)));
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number literal '{}'", text)))
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        Token::Ident(self.chars[start..self.pos].iter().collect())
    }

    fn symbol(&mut self, c: char) -> Result<Token> {
        let next = self.peek_at(1);
        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::DoubleStar, 2),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('<', Some('=')) => (Token::Compare(CompareOp::Le), 2),
            ('>', Some('=')) => (Token::Compare(CompareOp::Ge), 2),
            ('=', Some('=')) => (Token::Compare(CompareOp::Eq), 2),
            ('!', Some('=')) => (Token::Compare(CompareOp::Ne), 2),
            ('<', _) => (Token::Compare(CompareOp::Lt), 1),
            ('>', _) => (Token::Compare(CompareOp::Gt), 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            (other, _) => return Err(self.error(format!("unexpected character '{}'", other))),
        };
        self.pos += width;
        Ok(token)
    }
}

/// Binding strength of infix arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Additive,
    Multiplicative,
}

impl Precedence {
    fn tighter(self) -> Option<Self> {
        match self {
            Precedence::Additive => Some(Precedence::Multiplicative),
            Precedence::Multiplicative => None,
        }
    }
}

fn infix(token: &Token) -> Option<(BinaryOp, Precedence)> {
    match token {
        Token::Plus => Some((BinaryOp::Add, Precedence::Additive)),
        Token::Minus => Some((BinaryOp::Sub, Precedence::Additive)),
        Token::Star => Some((BinaryOp::Mul, Precedence::Multiplicative)),
        Token::Slash => Some((BinaryOp::Div, Precedence::Multiplicative)),
        Token::DoubleSlash => Some((BinaryOp::FloorDiv, Precedence::Multiplicative)),
        Token::Percent => Some((BinaryOp::Mod, Precedence::Multiplicative)),
        _ => None,
    }
}

/// Nesting depth past which a formula is refused
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    formula: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// Parse formula text into an expression tree
pub fn parse(formula: &str) -> Result<Expr> {
    let tokens = Lexer::new(formula).tokenize()?;
    let mut parser = Parser {
        formula,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.formula_list(&Token::Eof)?;
    parser.expect(&Token::Eof)?;
    Ok(expr)
}

impl Parser<'_> {
    fn error(&self, reason: impl Into<String>) -> ExplainError {
        ExplainError::syntax(self.formula, reason)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                token.describe(),
                self.peek().describe()
            )))
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("formula is nested too deeply"));
        }
        Ok(())
    }

    /// Comma-separated expressions; a comma anywhere makes a tuple
    fn formula_list(&mut self, close: &Token) -> Result<Expr> {
        let first = self.expression()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == close {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let first = self.binary(Precedence::Additive)?;
        let mut rest = Vec::new();
        while let Token::Compare(op) = *self.peek() {
            self.advance();
            rest.push((op, self.binary(Precedence::Additive)?));
        }
        self.depth -= 1;

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn binary(&mut self, min: Precedence) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some((op, precedence)) = infix(self.peek()) {
            if precedence < min {
                break;
            }
            self.advance();
            let right = match precedence.tighter() {
                Some(tighter) => self.binary(tighter)?,
                None => self.unary()?,
            };
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            _ => return self.power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// `**` binds tighter than a unary operator on its left and is right-associative
    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if !self.eat(&Token::DoubleStar) {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        while self.eat(&Token::LBracket) {
            let negative = self.eat(&Token::Minus);
            let index = match self.advance() {
                Token::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => n as i64,
                other => {
                    return Err(self.error(format!(
                        "subscript must be an integer literal, found {}",
                        other.describe()
                    )))
                },
            };
            self.expect(&Token::RBracket)?;
            expr = Expr::Index {
                target: Box::new(expr),
                index: if negative { -index } else { index },
            };
        }
        if self.peek() == &Token::LParen {
            return Err(self.error("only named functions can be called"));
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Name(name));
                }
                self.enter()?;
                let mut args = Vec::new();
                while self.peek() != &Token::RParen {
                    args.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen)?;
                self.depth -= 1;
                Ok(Expr::Call {
                    function: name,
                    args,
                })
            },
            Token::LParen => {
                self.enter()?;
                let expr = if self.peek() == &Token::RParen {
                    Expr::Tuple(Vec::new())
                } else {
                    self.formula_list(&Token::RParen)?
                };
                self.expect(&Token::RParen)?;
                self.depth -= 1;
                Ok(expr)
            },
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }
}
