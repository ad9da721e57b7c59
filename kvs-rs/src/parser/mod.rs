//! Recursive-descent compiler from script text to AST.
//!
//! The parser operates purely by lookahead on code points through a
//! [`Cursor`].  Fatal errors abort the current top-level unit and carry the
//! offending position; recoverable problems (trailing garbage after a
//! recognized construct, senseless-but-legal constructs) are accumulated as
//! warnings and parsing resynchronizes at the next command terminator.
//!
//! One production per language construct: plain commands and variable
//! operations here, data items in [`data`], expressions in [`expr`], the
//! special commands (`if`, `while`, `do`, `for`, `foreach`, `switch`,
//! `class`, `privateimpl`, `unset`, `global`, `break`, `halt`) in
//! [`special`].

pub mod data;
pub mod expr;
pub mod special;

use std::collections::HashSet;

use crate::ast::{Command, CommandKind, Instruction, OpKind, Operation};
use crate::cursor::{is_letter, is_letter_or_digit, Cursor, Pos};
use crate::error::{describe_char, ParseError, ParseWarning};

pub(crate) use data::DataContext;

/// Parse a complete script into a list of instructions.
///
/// Returns the AST plus any non-fatal warnings the parser produced.
pub fn parse(src: &str) -> Result<(Vec<Instruction>, Vec<ParseWarning>), ParseError> {
    let mut parser = Parser::new(src);
    let items = parser.parse_script()?;
    Ok((items, parser.into_warnings()))
}

pub struct Parser<'a> {
    pub(crate) cur: Cursor<'a>,
    /// Identifiers pre-declared into global storage by the `global` command;
    /// lives for the rest of this parse.
    pub(crate) globals: HashSet<String>,
    warnings: Vec<ParseWarning>,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Parser {
            cur: Cursor::new(src),
            globals: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<ParseWarning> {
        self.warnings
    }

    pub(crate) fn warn(&mut self, pos: Pos, msg: impl Into<String>) {
        self.warnings.push(ParseWarning::new(pos, msg));
    }

    /// Parse instructions until end of buffer.
    pub fn parse_script(&mut self) -> Result<Vec<Instruction>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_spaces_and_newlines();
            if self.cur.at_end() {
                return Ok(items);
            }
            if let Some(i) = self.parse_instruction()? {
                items.push(i);
            }
        }
    }

    // ── Low-level scanning ───────────────────────────────────────────────────

    /// Skip spaces and tabs; a backslash-newline pair is a line continuation.
    pub(crate) fn skip_spaces(&mut self) {
        loop {
            match self.cur.cur() {
                Some(' ') | Some('\t') => self.cur.skip(),
                Some('\\') if matches!(self.cur.peek(1), Some('\n') | Some('\r')) => {
                    self.cur.skip();
                    if self.cur.cur() == Some('\r') {
                        self.cur.skip();
                    }
                    if self.cur.cur() == Some('\n') {
                        self.cur.skip();
                    }
                }
                _ => return,
            }
        }
    }

    pub(crate) fn skip_spaces_and_newlines(&mut self) {
        loop {
            match self.cur.cur() {
                Some(' ') | Some('\t') | Some('\n') | Some('\r') => self.cur.skip(),
                Some('\\') if matches!(self.cur.peek(1), Some('\n') | Some('\r')) => {
                    self.cur.skip();
                    self.cur.skip();
                }
                _ => return,
            }
        }
    }

    /// `true` at `;`, newline, end of buffer, or a block-closing `}` (which
    /// terminates the command but belongs to the enclosing block).
    pub(crate) fn at_end_of_command(&self) -> bool {
        matches!(self.cur.cur(), None | Some(';') | Some('\n') | Some('}'))
    }

    /// Consume up to and including the next command terminator.  A `}` stops
    /// the scan but is left for the enclosing block to consume.
    pub(crate) fn skip_to_end_of_command(&mut self) {
        while !self.at_end_of_command() {
            self.cur.skip();
        }
        if matches!(self.cur.cur(), Some(';') | Some('\n')) {
            self.cur.skip();
        }
    }

    /// Consume the command terminator, if present.
    pub(crate) fn eat_command_terminator(&mut self) {
        if matches!(self.cur.cur(), Some(';') | Some('\n')) {
            self.cur.skip();
        }
    }

    /// Read an identifier (letter or `_` first, then letters/digits/`_`).
    /// Returns `None` without consuming anything if the current character
    /// cannot start one.
    pub(crate) fn read_identifier(&mut self) -> Option<String> {
        match self.cur.cur() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return None,
        }
        let start = self.cur.pos();
        self.cur.skip();
        while matches!(self.cur.cur(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.cur.skip();
        }
        Some(self.cur.slice(start, self.cur.pos()))
    }

    /// Consume a comment: `# ...`, `// ...` (to end of line) or `/* ... */`.
    pub(crate) fn parse_comment(&mut self) -> Result<(), ParseError> {
        match self.cur.cur() {
            Some('#') => {
                while !matches!(self.cur.cur(), None | Some('\n')) {
                    self.cur.skip();
                }
                Ok(())
            }
            Some('/') => match self.cur.peek(1) {
                Some('/') => {
                    while !matches!(self.cur.cur(), None | Some('\n')) {
                        self.cur.skip();
                    }
                    Ok(())
                }
                Some('*') => {
                    let start = self.cur.pos();
                    self.cur.skip();
                    self.cur.skip();
                    loop {
                        match self.cur.cur() {
                            None => {
                                return Err(ParseError::new(
                                    start,
                                    "unterminated multiline comment",
                                ))
                            }
                            Some('*') if self.cur.peek(1) == Some('/') => {
                                self.cur.skip();
                                self.cur.skip();
                                return Ok(());
                            }
                            _ => self.cur.skip(),
                        }
                    }
                }
                other => Err(ParseError::new(
                    self.cur.pos(),
                    format!(
                        "found {} where a comment was expected after '/'",
                        describe_char(other)
                    ),
                )),
            },
            other => Err(ParseError::new(
                self.cur.pos(),
                format!("found {} where a comment was expected", describe_char(other)),
            )),
        }
    }

    // ── Instructions ─────────────────────────────────────────────────────────

    /// Parse one instruction.  `Ok(None)` is a legal empty instruction
    /// (bare `;`, end of buffer, a comment).
    pub fn parse_instruction(&mut self) -> Result<Option<Instruction>, ParseError> {
        loop {
            self.skip_spaces();
            match self.cur.cur() {
                None => return Ok(None),
                Some(';') | Some('\n') => {
                    self.cur.skip();
                    return Ok(None);
                }
                Some('{') => return self.parse_instruction_block().map(Some),
                Some('#') => {
                    self.parse_comment()?;
                    self.skip_spaces_and_newlines();
                }
                Some('/') if matches!(self.cur.peek(1), Some('/') | Some('*')) => {
                    self.parse_comment()?;
                    self.skip_spaces_and_newlines();
                }
                Some('%') | Some('$') | Some('@') => {
                    return self.parse_void_function_call_or_operation().map(Some)
                }
                Some(c) if c.is_alphabetic() => return self.parse_command(),
                other => {
                    return Err(ParseError::new(
                        self.cur.pos(),
                        format!(
                            "found {} where an instruction was expected",
                            describe_char(other)
                        ),
                    ))
                }
            }
        }
    }

    /// `{ instruction* }`
    pub(crate) fn parse_instruction_block(&mut self) -> Result<Instruction, ParseError> {
        let pos = self.cur.pos();
        self.cur.skip(); // '{'
        let mut items = Vec::new();
        loop {
            self.skip_spaces_and_newlines();
            match self.cur.cur() {
                None => {
                    return Err(ParseError::new(
                        pos,
                        "unexpected end of script in instruction block (missing closing brace)",
                    ))
                }
                Some('}') => {
                    self.cur.skip();
                    return Ok(Instruction::Block { pos, items });
                }
                _ => {
                    if let Some(i) = self.parse_instruction()? {
                        items.push(i);
                    }
                }
            }
        }
    }

    /// A command starting with a letter: either a special command or a plain
    /// named command with space-separated parameters.
    fn parse_command(&mut self) -> Result<Option<Instruction>, ParseError> {
        let pos = self.cur.pos();
        let name = match self.read_identifier() {
            Some(n) => n,
            None => {
                return Err(ParseError::new(
                    pos,
                    format!(
                        "found {} where a command name was expected",
                        describe_char(self.cur.cur())
                    ),
                ))
            }
        };

        match name.to_ascii_lowercase().as_str() {
            "if" => {
                self.skip_spaces();
                return self.parse_special_if(pos).map(Some);
            }
            "while" => {
                self.skip_spaces();
                return self.parse_special_while(pos).map(Some);
            }
            "do" => {
                self.skip_spaces();
                return self.parse_special_do(pos).map(Some);
            }
            "for" => {
                self.skip_spaces();
                return self.parse_special_for(pos).map(Some);
            }
            "foreach" => {
                self.skip_spaces();
                return self.parse_special_foreach(pos).map(Some);
            }
            "switch" => {
                self.skip_spaces();
                return self.parse_special_switch(pos).map(Some);
            }
            "class" => {
                self.skip_spaces();
                return self.parse_special_class(pos).map(Some);
            }
            "privateimpl" => {
                self.skip_spaces();
                return self.parse_special_privateimpl(pos).map(Some);
            }
            "unset" => {
                self.skip_spaces();
                return self.parse_special_unset(pos);
            }
            "global" => {
                self.skip_spaces();
                return self.parse_special_global(pos);
            }
            "break" => return self.parse_special_break(pos).map(Some),
            "halt" => return self.parse_special_halt(pos).map(Some),
            _ => {}
        }

        // Plain command: space-separated parameter data until the terminator.
        let mut params = Vec::new();
        loop {
            self.skip_spaces();
            if self.at_end_of_command() {
                break;
            }
            match self.parse_data(DataContext::CommandParam)? {
                Some(d) => params.push(d),
                None => break,
            }
        }
        self.eat_command_terminator();
        Ok(Some(Instruction::Command(Command {
            pos,
            kind: CommandKind::Simple { name, params },
        })))
    }

    /// An instruction starting with `%`, `$` or `@`: either a void function
    /// call or a variable operation.
    fn parse_void_function_call_or_operation(&mut self) -> Result<Instruction, ParseError> {
        let pos = self.cur.pos();
        let target = self.parse_percent_or_dollar()?;
        self.skip_spaces();

        if target.is_function_call() {
            if !self.at_end_of_command() {
                self.warn(
                    self.cur.pos(),
                    "trailing garbage after the function call: ignored",
                );
                self.skip_to_end_of_command();
            } else {
                self.eat_command_terminator();
            }
            return Ok(Instruction::Command(Command {
                pos,
                kind: CommandKind::VoidFunctionCall(target),
            }));
        }

        if !target.is_writable() {
            return Err(ParseError::new(
                pos,
                "the left side of an operation must be a writable variable",
            ));
        }

        let op_pos = self.cur.pos();
        let op = match self.cur.cur() {
            Some('=') => {
                self.cur.skip();
                OpKind::Assign
            }
            Some('+') => {
                self.cur.skip();
                match self.cur.cur() {
                    Some('+') => {
                        self.cur.skip();
                        OpKind::Increment
                    }
                    Some('=') => {
                        self.cur.skip();
                        OpKind::AddAssign
                    }
                    other => {
                        return Err(ParseError::new(
                            self.cur.pos(),
                            format!(
                                "found {} where '+' or '=' was expected after '+'",
                                describe_char(other)
                            ),
                        ))
                    }
                }
            }
            Some('-') => {
                self.cur.skip();
                match self.cur.cur() {
                    Some('-') => {
                        self.cur.skip();
                        OpKind::Decrement
                    }
                    Some('=') => {
                        self.cur.skip();
                        OpKind::SubAssign
                    }
                    other => {
                        return Err(ParseError::new(
                            self.cur.pos(),
                            format!(
                                "found {} where '-' or '=' was expected after '-'",
                                describe_char(other)
                            ),
                        ))
                    }
                }
            }
            Some('*') if self.cur.peek(1) == Some('=') => {
                self.cur.skip();
                self.cur.skip();
                OpKind::MulAssign
            }
            Some('/') if self.cur.peek(1) == Some('=') => {
                self.cur.skip();
                self.cur.skip();
                OpKind::DivAssign
            }
            Some('%') if self.cur.peek(1) == Some('=') => {
                self.cur.skip();
                self.cur.skip();
                OpKind::ModAssign
            }
            Some('.') if self.cur.peek(1) == Some('=') => {
                self.cur.skip();
                self.cur.skip();
                OpKind::AppendAssign
            }
            other => {
                return Err(ParseError::new(
                    op_pos,
                    format!(
                        "found {} where an assignment operator was expected",
                        describe_char(other)
                    ),
                ))
            }
        };

        let rhs = match op {
            OpKind::Increment | OpKind::Decrement => None,
            _ => {
                self.skip_spaces();
                Some(
                    self.parse_data(DataContext::CommandRhs)?
                        .unwrap_or_else(|| crate::ast::Data::literal(self.cur.pos(), "")),
                )
            }
        };

        self.skip_spaces();
        if !self.at_end_of_command() {
            self.warn(
                self.cur.pos(),
                "trailing garbage at the end of the operation: ignored",
            );
            self.skip_to_end_of_command();
        } else {
            self.eat_command_terminator();
        }

        Ok(Instruction::Command(Command {
            pos,
            kind: CommandKind::Operation(Operation {
                pos,
                target,
                op,
                rhs,
            }),
        }))
    }

    /// Expected-character failure helper used by many productions.
    pub(crate) fn err_bad_char(&self, expected: char, construct: &str) -> ParseError {
        ParseError::bad_char(self.cur.pos(), self.cur.cur(), expected, construct)
    }

    /// True if the current character is a letter.
    pub(crate) fn cur_is_letter(&self) -> bool {
        is_letter(self.cur.cur())
    }

    /// True if the current character is a letter or digit.
    pub(crate) fn cur_is_letter_or_digit(&self) -> bool {
        is_letter_or_digit(self.cur.cur())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
