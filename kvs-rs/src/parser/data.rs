//! Data items: the stuff command parameters, operation sides and expression
//! operands are made of.
//!
//! A data item is a concatenation of pieces — literal runs, `"quoted"`
//! segments (with `%var`/`$fn` interpolation inside), variables with their
//! subscript/scope chains, function calls and `$( expression )` blocks.
//! Which characters terminate the item depends on where it appears; the
//! [`DataContext`] passed by the caller decides.

use crate::ast::{Data, DataKind, FunctionCall, TargetBase, TargetChain, TargetSeg};
use crate::error::{describe_char, ParseError};

use super::Parser;

/// Where a data item is being parsed; decides its terminating characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataContext {
    /// A space-separated command parameter.
    CommandParam,
    /// The right-hand side of an operation: runs to the command terminator.
    CommandRhs,
    /// An element of a comma-separated parameter list.
    CommaList,
    /// The single parameter of a `case`/`match`/`regexp` label.
    SingleParam,
    /// A `{...}` hash subscript.
    HashKey,
}

impl DataContext {
    fn stops_at(self, c: char) -> bool {
        match self {
            DataContext::CommandParam => matches!(c, ' ' | '\t' | ';' | '\n' | '}'),
            DataContext::CommandRhs => matches!(c, ';' | '\n' | '}'),
            DataContext::CommaList => matches!(c, ',' | ')'),
            DataContext::SingleParam => c == ')',
            DataContext::HashKey => c == '}',
        }
    }

    /// Unescaped trailing blanks are not part of the value in these contexts.
    fn trims_trailing_blanks(self) -> bool {
        matches!(
            self,
            DataContext::CommandRhs | DataContext::CommaList | DataContext::SingleParam
        )
    }
}

/// Piece accumulator for [`Parser::parse_data`].
struct PieceBuilder {
    pieces: Vec<Data>,
    lit: String,
    lit_pos: usize,
    /// Everything below this index in `lit` came from an escape or a quoted
    /// segment and survives trailing-blank trimming.
    protected: usize,
    had_quote: bool,
}

impl PieceBuilder {
    fn new(pos: usize) -> Self {
        PieceBuilder {
            pieces: Vec::new(),
            lit: String::new(),
            lit_pos: pos,
            protected: 0,
            had_quote: false,
        }
    }

    fn push_char(&mut self, c: char) {
        self.lit.push(c);
    }

    fn push_protected(&mut self, c: char) {
        self.lit.push(c);
        self.protected = self.lit.chars().count();
    }

    fn flush_literal(&mut self, next_pos: usize) {
        if !self.lit.is_empty() {
            let text = std::mem::take(&mut self.lit);
            self.pieces.push(Data::literal(self.lit_pos, text));
        }
        self.protected = 0;
        self.lit_pos = next_pos;
    }

    fn push_piece(&mut self, d: Data, next_pos: usize) {
        self.flush_literal(next_pos);
        self.pieces.push(d);
        self.lit_pos = next_pos;
    }

    fn finish(mut self, pos: usize, ctx: DataContext) -> Option<Data> {
        if ctx.trims_trailing_blanks() {
            let mut count = self.lit.chars().count();
            while count > self.protected {
                match self.lit.chars().last() {
                    Some(' ') | Some('\t') => {
                        self.lit.pop();
                        count -= 1;
                    }
                    _ => break,
                }
            }
        }
        self.flush_literal(pos);
        if self.pieces.is_empty() {
            if self.had_quote {
                return Some(Data::literal(pos, ""));
            }
            return None;
        }
        if self.pieces.len() == 1 {
            return Some(self.pieces.into_iter().next().unwrap());
        }
        Some(Data {
            pos: self.pieces[0].pos,
            kind: DataKind::Composite(self.pieces),
        })
    }
}

impl<'a> Parser<'a> {
    /// Parse one data item in the given context.  `Ok(None)` means the item
    /// was empty (the cursor sat on a terminator already).  The terminating
    /// character is never consumed.
    pub(crate) fn parse_data(&mut self, ctx: DataContext) -> Result<Option<Data>, ParseError> {
        let start = self.cur.pos();
        let mut b = PieceBuilder::new(start);
        loop {
            match self.cur.cur() {
                None => break,
                Some(c) if ctx.stops_at(c) => break,
                Some('"') => {
                    b.had_quote = true;
                    self.parse_quoted_segment(&mut b)?;
                }
                Some('\\') => {
                    self.cur.skip();
                    match self.cur.cur() {
                        None => break,
                        Some('\n') => self.cur.skip(), // line continuation
                        Some(c) => {
                            b.push_protected(c);
                            self.cur.skip();
                        }
                    }
                }
                Some('%') if starts_variable(self.cur.peek(1)) => {
                    let d = self.parse_percent_or_dollar()?;
                    b.push_piece(d, self.cur.pos());
                }
                Some('$') if starts_function(self.cur.peek(1)) => {
                    let d = self.parse_percent_or_dollar()?;
                    b.push_piece(d, self.cur.pos());
                }
                Some('@') if starts_this_chain(self.cur.peek(1)) => {
                    let d = self.parse_percent_or_dollar()?;
                    b.push_piece(d, self.cur.pos());
                }
                Some(c) => {
                    b.push_char(c);
                    self.cur.skip();
                }
            }
        }
        Ok(b.finish(self.cur.pos(), ctx))
    }

    /// `"..."` with interpolation; the closing quote is mandatory.
    fn parse_quoted_segment(&mut self, b: &mut PieceBuilder) -> Result<(), ParseError> {
        let start = self.cur.pos();
        self.cur.skip(); // '"'
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
                    // Mark everything gathered so far as quoted content.
                    b.protected = b.lit.chars().count();
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
                        Some('\n') => self.cur.skip(),
                        Some(c) => {
                            b.push_protected(c);
                            self.cur.skip();
                        }
                    }
                }
                Some('%') if starts_variable(self.cur.peek(1)) => {
                    let d = self.parse_percent_or_dollar()?;
                    b.push_piece(d, self.cur.pos());
                }
                Some('$') if starts_function(self.cur.peek(1)) => {
                    let d = self.parse_percent_or_dollar()?;
                    b.push_piece(d, self.cur.pos());
                }
                Some(c) => {
                    b.push_char(c);
                    self.cur.skip();
                }
            }
        }
    }

    /// A data item starting at `%`, `$` or `@` (the cursor sits on it).
    pub(crate) fn parse_percent_or_dollar(&mut self) -> Result<Data, ParseError> {
        match self.cur.cur() {
            Some('%') => self.parse_percent(),
            Some('$') => self.parse_dollar(),
            Some('@') => {
                let pos = self.cur.pos();
                self.cur.skip();
                // A field or function may follow the `@` directly:
                // `@%field`, `@$fn()`.  Deeper hops use `->` as usual.
                let mut path = Vec::new();
                match self.cur.cur() {
                    Some('%') => path.push(self.parse_field_seg()?),
                    Some('$') => path.push(self.parse_method_seg()?),
                    _ => {}
                }
                self.parse_target_chain(pos, TargetBase::This, path)
            }
            other => Err(ParseError::new(
                self.cur.pos(),
                format!(
                    "found {} where '%', '$' or '@' was expected",
                    describe_char(other)
                ),
            )),
        }
    }

    /// `%name` plus its subscript/scope chain.
    fn parse_percent(&mut self) -> Result<Data, ParseError> {
        let pos = self.cur.pos();
        self.cur.skip(); // '%'
        let name = match self.read_identifier() {
            Some(n) => n,
            None => {
                return Err(ParseError::new(
                    self.cur.pos(),
                    format!(
                        "found {} where a variable name was expected after '%'",
                        describe_char(self.cur.cur())
                    ),
                ))
            }
        };
        let base = if self.globals.contains(&name)
            || name.chars().next().is_some_and(|c| c.is_uppercase())
        {
            TargetBase::Global(name)
        } else {
            TargetBase::Local(name)
        };
        self.parse_target_chain(pos, base, Vec::new())
    }

    /// `$name(...)`, `$N` positional parameter, or `$( expression )`.
    fn parse_dollar(&mut self) -> Result<Data, ParseError> {
        let pos = self.cur.pos();
        self.cur.skip(); // '$'
        match self.cur.cur() {
            Some('(') => {
                self.cur.skip();
                let expr = match self.parse_expression(')')? {
                    Some(e) => e,
                    None => {
                        return Err(ParseError::new(
                            pos,
                            "empty expression inside '$( ... )'",
                        ))
                    }
                };
                Ok(Data {
                    pos,
                    kind: DataKind::Expression(Box::new(expr)),
                })
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.cur.pos();
                while matches!(self.cur.cur(), Some(d) if d.is_ascii_digit()) {
                    self.cur.skip();
                }
                let name = self.cur.slice(start, self.cur.pos());
                Ok(Data {
                    pos,
                    kind: DataKind::FunctionCall(FunctionCall {
                        name,
                        args: Vec::new(),
                    }),
                })
            }
            _ => {
                let name = match self.read_identifier() {
                    Some(n) => n,
                    None => {
                        return Err(ParseError::new(
                            self.cur.pos(),
                            format!(
                                "found {} where a function name was expected after '$'",
                                describe_char(self.cur.cur())
                            ),
                        ))
                    }
                };
                let args = if self.cur.cur() == Some('(') {
                    self.parse_comma_separated_parameter_list("function call")?
                } else {
                    Vec::new()
                };
                Ok(Data {
                    pos,
                    kind: DataKind::FunctionCall(FunctionCall { name, args }),
                })
            }
        }
    }

    /// `->%name` (the cursor sits on the `%`).
    fn parse_field_seg(&mut self) -> Result<TargetSeg, ParseError> {
        self.cur.skip(); // '%'
        match self.read_identifier() {
            Some(n) => Ok(TargetSeg::Field(n)),
            None => Err(ParseError::new(
                self.cur.pos(),
                format!(
                    "found {} where an object field name was expected after '%'",
                    describe_char(self.cur.cur())
                ),
            )),
        }
    }

    /// `->$name(...)` or `->$class:name(...)` (the cursor sits on the `$`).
    fn parse_method_seg(&mut self) -> Result<TargetSeg, ParseError> {
        self.cur.skip(); // '$'
        let first = match self.read_identifier() {
            Some(n) => n,
            None => {
                return Err(ParseError::new(
                    self.cur.pos(),
                    format!(
                        "found {} where an object function name was expected after '$'",
                        describe_char(self.cur.cur())
                    ),
                ))
            }
        };
        // `$class:fn` explicitly names the class to resolve the function in.
        let (qualifier, name) = if self.cur.cur() == Some(':')
            && matches!(self.cur.peek(1), Some(c) if c.is_alphabetic() || c == '_')
        {
            self.cur.skip();
            let n = self.read_identifier().unwrap_or_default();
            (Some(first), n)
        } else {
            (None, first)
        };
        let args = if self.cur.cur() == Some('(') {
            self.parse_comma_separated_parameter_list("object function call")?
        } else {
            Vec::new()
        };
        Ok(TargetSeg::Method {
            qualifier,
            name,
            args,
        })
    }

    /// Subscripts and `->` hops after a variable or `@`.
    fn parse_target_chain(
        &mut self,
        pos: usize,
        base: TargetBase,
        mut path: Vec<TargetSeg>,
    ) -> Result<Data, ParseError> {
        loop {
            match self.cur.cur() {
                Some('[') => {
                    let sub_pos = self.cur.pos();
                    self.cur.skip();
                    let expr = match self.parse_expression(']')? {
                        Some(e) => e,
                        None => {
                            return Err(ParseError::new(
                                sub_pos,
                                "empty array index in '[ ]' subscript",
                            ))
                        }
                    };
                    path.push(TargetSeg::Index(Box::new(expr)));
                }
                Some('{') => {
                    let sub_pos = self.cur.pos();
                    self.cur.skip();
                    self.skip_spaces();
                    let key = self
                        .parse_data(DataContext::HashKey)?
                        .unwrap_or_else(|| Data::literal(sub_pos, ""));
                    if !self.cur.eat('}') {
                        return Err(ParseError::new(
                            self.cur.pos(),
                            format!(
                                "found {} where '}}' was expected to close the hash subscript",
                                describe_char(self.cur.cur())
                            ),
                        ));
                    }
                    path.push(TargetSeg::Key(Box::new(key)));
                }
                Some('-') if self.cur.peek(1) == Some('>') => {
                    self.cur.skip();
                    self.cur.skip();
                    match self.cur.cur() {
                        Some('%') => path.push(self.parse_field_seg()?),
                        Some('$') => path.push(self.parse_method_seg()?),
                        other => {
                            return Err(ParseError::new(
                                self.cur.pos(),
                                format!(
                                    "found {} where '%' or '$' was expected after '->'",
                                    describe_char(other)
                                ),
                            ))
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(Data {
            pos,
            kind: DataKind::Target(TargetChain { base, path }),
        })
    }

    /// `( a , b , ... )` — the cursor sits on the `(` (or, for callers that
    /// already consumed part of the list, on a `,`).
    pub(crate) fn parse_comma_separated_parameter_list(
        &mut self,
        construct: &str,
    ) -> Result<Vec<Data>, ParseError> {
        self.cur.skip(); // '(' or ','
        let mut items: Vec<Data> = Vec::new();
        loop {
            self.skip_spaces_and_newlines();
            let p = self.cur.pos();
            let d = self.parse_data(DataContext::CommaList)?;
            match self.cur.cur() {
                Some(',') => {
                    self.cur.skip();
                    items.push(d.unwrap_or_else(|| Data::literal(p, "")));
                }
                Some(')') => {
                    self.cur.skip();
                    match d {
                        Some(d) => items.push(d),
                        // `()` is an empty list; `(a,)` has a trailing
                        // empty parameter.
                        None if !items.is_empty() => items.push(Data::literal(p, "")),
                        None => {}
                    }
                    return Ok(items);
                }
                other => {
                    return Err(ParseError::new(
                        self.cur.pos(),
                        format!(
                            "found {} where ',' or ')' was expected in the '{}' parameter list",
                            describe_char(other),
                            construct
                        ),
                    ))
                }
            }
        }
    }

    /// `( <data> )` — the cursor sits on the `(`.
    pub(crate) fn parse_single_parameter_in_parenthesis(
        &mut self,
        construct: &str,
    ) -> Result<Data, ParseError> {
        self.cur.skip(); // '('
        self.skip_spaces();
        let p = self.cur.pos();
        let d = self
            .parse_data(DataContext::SingleParam)?
            .unwrap_or_else(|| Data::literal(p, ""));
        if !self.cur.eat(')') {
            return Err(ParseError::bad_char(
                self.cur.pos(),
                self.cur.cur(),
                ')',
                construct,
            ));
        }
        Ok(d)
    }
}

/// `%` starts a variable only when an identifier follows; a lone `%` (as in
/// `100%`) is literal text.
fn starts_variable(next: Option<char>) -> bool {
    matches!(next, Some(c) if c.is_alphabetic() || c == '_')
}

/// `$` starts a function call, positional parameter or `$( expr )`.
fn starts_function(next: Option<char>) -> bool {
    matches!(next, Some(c) if c.is_alphanumeric() || c == '_' || c == '(')
}

/// `@` begins a scope chain only when a subscript, `->` or nothing that
/// could be plain text follows (`user@host` stays literal).
fn starts_this_chain(next: Option<char>) -> bool {
    match next {
        Some('-') | Some('%') | Some('$') | Some('[') | Some('{') => true,
        Some(c) => c.is_whitespace() || c == ';' || c == ')' || c == ',' || c == '}',
        None => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
