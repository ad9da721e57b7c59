//! Expressions: the parenthesized conditions of `if`/`while`/`do`/`for`/
//! `switch` and the `$( ... )` data item.
//!
//! Plain precedence climbing over [`BinaryOp::precedence`].  All binary
//! operators are left-associative.  Operands are numeric literals, quoted
//! or bare strings, parenthesized subexpressions, and data items (`%var`,
//! `$fn(...)`, `@...`) evaluated at run time.

use crate::ast::{BinaryOp, Data, DataKind, Expr, ExprKind, UnaryOp};
use crate::error::{describe_char, ParseError};

use super::Parser;

impl<'a> Parser<'a> {
    /// Parse an expression up to and including `terminator`.
    ///
    /// `Ok(None)` means the expression was empty (the terminator came
    /// first); callers that require a condition treat that as an error,
    /// the `for` command accepts it.
    pub(crate) fn parse_expression(
        &mut self,
        terminator: char,
    ) -> Result<Option<Expr>, ParseError> {
        self.skip_spaces_and_newlines();
        if self.cur.eat(terminator) {
            return Ok(None);
        }
        let e = self.parse_binary(1, terminator)?;
        self.skip_spaces_and_newlines();
        if !self.cur.eat(terminator) {
            return Err(ParseError::new(
                self.cur.pos(),
                format!(
                    "found {} where an operator or '{}' was expected in the expression",
                    describe_char(self.cur.cur()),
                    terminator
                ),
            ));
        }
        Ok(Some(e))
    }

    fn parse_binary(&mut self, min_prec: u8, terminator: char) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary(terminator)?;
        loop {
            self.skip_spaces_and_newlines();
            let op = match self.peek_binary_op(terminator)? {
                Some(op) if op.precedence() >= min_prec => op,
                _ => return Ok(lhs),
            };
            self.consume_binary_op(op);
            let pos = lhs.pos;
            let rhs = self.parse_binary(op.precedence() + 1, terminator)?;
            lhs = Expr {
                pos,
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }
    }

    /// Identify the operator at the cursor without consuming it.
    fn peek_binary_op(&self, terminator: char) -> Result<Option<BinaryOp>, ParseError> {
        let c = match self.cur.cur() {
            None => return Ok(None),
            Some(c) if c == terminator => return Ok(None),
            Some(c) => c,
        };
        let next = self.cur.peek(1);
        let op = match c {
            '|' if next == Some('|') => BinaryOp::Or,
            '&' if next == Some('&') => BinaryOp::And,
            '|' => BinaryOp::BitOr,
            '^' => BinaryOp::BitXor,
            '&' => BinaryOp::BitAnd,
            '=' if next == Some('=') => BinaryOp::Eq,
            '=' => {
                return Err(ParseError::new(
                    self.cur.pos(),
                    "unexpected '=' in expression (use '==' to compare)",
                ))
            }
            '!' if next == Some('=') => BinaryOp::Ne,
            '<' if next == Some('=') => BinaryOp::Le,
            '<' if next == Some('<') => BinaryOp::Shl,
            '<' => BinaryOp::Lt,
            '>' if next == Some('=') => BinaryOp::Ge,
            '>' if next == Some('>') => BinaryOp::Shr,
            '>' => BinaryOp::Gt,
            '+' => BinaryOp::Add,
            '-' => BinaryOp::Sub,
            '*' => BinaryOp::Mul,
            '/' => BinaryOp::Div,
            '%' => BinaryOp::Mod,
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    fn consume_binary_op(&mut self, op: BinaryOp) {
        use BinaryOp::*;
        let width = match op {
            Or | And | Eq | Ne | Le | Ge | Shl | Shr => 2,
            _ => 1,
        };
        for _ in 0..width {
            self.cur.skip();
        }
    }

    fn parse_unary(&mut self, terminator: char) -> Result<Expr, ParseError> {
        self.skip_spaces_and_newlines();
        let pos = self.cur.pos();
        match self.cur.cur() {
            Some('!') => {
                self.cur.skip();
                let rhs = self.parse_unary(terminator)?;
                Ok(Expr {
                    pos,
                    kind: ExprKind::Unary {
                        op: UnaryOp::Not,
                        rhs: Box::new(rhs),
                    },
                })
            }
            Some('~') => {
                self.cur.skip();
                let rhs = self.parse_unary(terminator)?;
                Ok(Expr {
                    pos,
                    kind: ExprKind::Unary {
                        op: UnaryOp::BitNot,
                        rhs: Box::new(rhs),
                    },
                })
            }
            Some('-') => {
                self.cur.skip();
                let rhs = self.parse_unary(terminator)?;
                Ok(Expr {
                    pos,
                    kind: ExprKind::Unary {
                        op: UnaryOp::Neg,
                        rhs: Box::new(rhs),
                    },
                })
            }
            Some('(') => {
                self.cur.skip();
                match self.parse_expression(')')? {
                    Some(e) => Ok(e),
                    None => Err(ParseError::new(pos, "empty parenthesized expression")),
                }
            }
            Some(c) if c.is_ascii_digit() => self.parse_number(pos),
            Some('"') => self.parse_string_operand(pos),
            Some('%') | Some('$') | Some('@') => {
                let d = self.parse_percent_or_dollar()?;
                Ok(Expr {
                    pos,
                    kind: ExprKind::Data(Box::new(d)),
                })
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                // A bare word compares as a string.
                let start = self.cur.pos();
                while matches!(self.cur.cur(), Some(c) if c.is_alphanumeric() || c == '_') {
                    self.cur.skip();
                }
                Ok(Expr {
                    pos,
                    kind: ExprKind::Str(self.cur.slice(start, self.cur.pos())),
                })
            }
            None => Err(ParseError::new(
                pos,
                "unexpected end of buffer in the expression",
            )),
            other => Err(ParseError::new(
                pos,
                format!(
                    "found {} where an expression operand was expected",
                    describe_char(other)
                ),
            )),
        }
    }

    fn parse_number(&mut self, pos: usize) -> Result<Expr, ParseError> {
        let start = self.cur.pos();
        while matches!(self.cur.cur(), Some(c) if c.is_ascii_digit()) {
            self.cur.skip();
        }
        let mut real = false;
        if self.cur.cur() == Some('.')
            && matches!(self.cur.peek(1), Some(c) if c.is_ascii_digit())
        {
            real = true;
            self.cur.skip();
            while matches!(self.cur.cur(), Some(c) if c.is_ascii_digit()) {
                self.cur.skip();
            }
        }
        let text = self.cur.slice(start, self.cur.pos());
        if real {
            match text.parse::<f64>() {
                Ok(x) => Ok(Expr {
                    pos,
                    kind: ExprKind::Real(x),
                }),
                Err(_) => Err(ParseError::new(pos, format!("malformed real constant '{text}'"))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => Ok(Expr {
                    pos,
                    kind: ExprKind::Integer(n),
                }),
                Err(_) => Err(ParseError::new(
                    pos,
                    format!("integer constant '{text}' is out of range"),
                )),
            }
        }
    }

    /// A quoted string operand; interpolation applies here too, so the
    /// operand may come out as a data item rather than a plain string.
    fn parse_string_operand(&mut self, pos: usize) -> Result<Expr, ParseError> {
        let mut b = QuotedOperand::default();
        self.read_quoted_operand(&mut b)?;
        if b.pieces.len() == 1 {
            if let DataKind::Literal(s) = &b.pieces[0].kind {
                return Ok(Expr {
                    pos,
                    kind: ExprKind::Str(s.clone()),
                });
            }
        }
        let d = if b.pieces.len() == 1 {
            b.pieces.into_iter().next().unwrap()
        } else {
            Data {
                pos,
                kind: DataKind::Composite(b.pieces),
            }
        };
        Ok(Expr {
            pos,
            kind: ExprKind::Data(Box::new(d)),
        })
    }

    fn read_quoted_operand(&mut self, out: &mut QuotedOperand) -> Result<(), ParseError> {
        let start = self.cur.pos();
        self.cur.skip(); // '"'
        let mut lit = String::new();
        let mut lit_pos = self.cur.pos();
        loop {
            match self.cur.cur() {
                None => {
                    return Err(ParseError::new(
                        start,
                        "unterminated string constant (missing closing '\"')",
                    ))
                }
                Some('"') => {
                    self.cur.skip();
                    if !lit.is_empty() || out.pieces.is_empty() {
                        out.pieces.push(Data::literal(lit_pos, lit));
                    }
                    return Ok(());
                }
                Some('\\') => {
                    self.cur.skip();
                    match self.cur.cur() {
                        None => {
                            return Err(ParseError::new(
                                start,
                                "unterminated string constant (missing closing '\"')",
                            ))
                        }
                        Some(c) => {
                            lit.push(c);
                            self.cur.skip();
                        }
                    }
                }
                Some('%') if matches!(self.cur.peek(1), Some(c) if c.is_alphabetic() || c == '_') =>
                {
                    if !lit.is_empty() {
                        out.pieces.push(Data::literal(lit_pos, std::mem::take(&mut lit)));
                    }
                    let d = self.parse_percent_or_dollar()?;
                    out.pieces.push(d);
                    lit_pos = self.cur.pos();
                }
                Some('$')
                    if matches!(self.cur.peek(1), Some(c) if c.is_alphanumeric() || c == '_' || c == '(') =>
                {
                    if !lit.is_empty() {
                        out.pieces.push(Data::literal(lit_pos, std::mem::take(&mut lit)));
                    }
                    let d = self.parse_percent_or_dollar()?;
                    out.pieces.push(d);
                    lit_pos = self.cur.pos();
                }
                Some(c) => {
                    lit.push(c);
                    self.cur.skip();
                }
            }
        }
    }
}

#[derive(Default)]
struct QuotedOperand {
    pieces: Vec<Data>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
