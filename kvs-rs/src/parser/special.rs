//! The special commands: flow control, class definitions, variable scope.
//!
//! These productions are called from the command dispatcher with the
//! command keyword already consumed and spaces skipped.  Several of them
//! backtrack by saving and restoring cursor positions: the `else` probe of
//! `if` and the bounded re-parse of the `for` update segment.

use crate::ast::{
    ClassDef, ClassMember, Command, CommandKind, Data, Instruction, SwitchLabel, SwitchLabelKind,
};
use crate::cursor::{is_letter_or_digit, Pos};
use crate::error::{describe_char, ParseError};

use super::Parser;

impl<'a> Parser<'a> {
    /// Case-insensitive keyword probe; restores the cursor on mismatch.
    fn match_keyword_ci(&mut self, kw: &str) -> bool {
        let saved = self.cur.pos();
        for k in kw.chars() {
            match self.cur.cur() {
                Some(c) if c.eq_ignore_ascii_case(&k) => self.cur.skip(),
                _ => {
                    self.cur.set_pos(saved);
                    return false;
                }
            }
        }
        true
    }

    fn command(pos: Pos, kind: CommandKind) -> Instruction {
        Instruction::Command(Command { pos, kind })
    }

    // ── if / else ────────────────────────────────────────────────────────────

    pub(crate) fn parse_special_if(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'if' command needs an expression enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "if"));
        }
        let cond_pos = self.cur.pos();
        self.cur.skip();
        let cond = match self.parse_expression(')')? {
            Some(e) => e,
            None => {
                return Err(ParseError::new(
                    cond_pos,
                    "the 'if' condition expression is empty",
                ))
            }
        };

        self.skip_spaces_and_newlines();
        if self.cur.at_end() {
            self.warn(
                self.cur.pos(),
                "the last 'if' has no instruction to execute: it is senseless",
            );
        }
        let then_branch = self.parse_instruction()?.map(Box::new);

        // Probe for an 'else' branch; anything that is not exactly 'else'
        // (or an 'elseif' contraction) rewinds and belongs to the caller.
        self.skip_spaces_and_newlines();
        let probe = self.cur.pos();
        let else_branch = if self.match_keyword_ci("else") {
            if self.cur_is_letter_or_digit() {
                let word = self.cur.pos();
                let contraction = matches!(self.cur.cur(), Some('i') | Some('I'))
                    && matches!(self.cur.peek(1), Some('f') | Some('F'))
                    && !is_letter_or_digit(self.cur.peek(2));
                if contraction {
                    // 'elseif': rewind onto the 'if' and parse it as the
                    // else-branch instruction.
                    self.cur.set_pos(word);
                    self.parse_instruction()?.map(Box::new)
                } else {
                    // Some other word starting with 'else': not ours.
                    self.cur.set_pos(probe);
                    None
                }
            } else {
                self.skip_spaces_and_newlines();
                self.parse_instruction()?.map(Box::new)
            }
        } else {
            None
        };

        Ok(Self::command(
            pos,
            CommandKind::If {
                cond,
                then_branch,
                else_branch,
            },
        ))
    }

    // ── while ────────────────────────────────────────────────────────────────

    pub(crate) fn parse_special_while(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'while' command needs an expression enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "while"));
        }
        let cond_pos = self.cur.pos();
        self.cur.skip();
        let cond = match self.parse_expression(')')? {
            Some(e) => e,
            None => {
                return Err(ParseError::new(
                    cond_pos,
                    "the 'while' condition expression is empty",
                ))
            }
        };
        self.skip_spaces_and_newlines();
        if self.cur.at_end() {
            self.warn(
                self.cur.pos(),
                "the last 'while' has no instruction to execute: it is senseless",
            );
        }
        let body = self.parse_instruction()?.map(Box::new);
        Ok(Self::command(pos, CommandKind::While { cond, body }))
    }

    // ── do / while ───────────────────────────────────────────────────────────

    pub(crate) fn parse_special_do(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        let body = self.parse_instruction()?.map(Box::new);
        self.skip_spaces_and_newlines();
        if !self.match_keyword_ci("while") {
            return Err(ParseError::new(
                self.cur.pos(),
                if self.cur.at_end() {
                    "unexpected end of command after the 'do' block: expected the 'while' keyword"
                        .to_owned()
                } else {
                    format!(
                        "found {} where the 'while' keyword was expected after the 'do' block",
                        describe_char(self.cur.cur())
                    )
                },
            ));
        }
        self.skip_spaces_and_newlines();
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'do' command needs an expression enclosed in parenthesis after 'while'",
            );
            return Err(self.err_bad_char('(', "do"));
        }
        let cond_pos = self.cur.pos();
        self.cur.skip();
        let cond = match self.parse_expression(')')? {
            Some(e) => e,
            None => {
                return Err(ParseError::new(
                    cond_pos,
                    "the 'do' condition expression is empty",
                ))
            }
        };
        self.skip_spaces();
        if !self.at_end_of_command() {
            self.warn(
                self.cur.pos(),
                "garbage string after the expression in the 'do' command: ignored",
            );
            self.skip_to_end_of_command();
        } else {
            self.eat_command_terminator();
        }
        Ok(Self::command(pos, CommandKind::DoWhile { body, cond }))
    }

    // ── for ──────────────────────────────────────────────────────────────────

    pub(crate) fn parse_special_for(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'for' command needs three parameters enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "for"));
        }
        self.cur.skip();

        let init = self.parse_instruction()?.map(Box::new);
        let cond = self.parse_expression(';')?;

        // The update segment runs to the unnested closing ')'; locate it
        // first, then re-parse the sub-range under a soft limit.
        self.skip_spaces();
        let upd_start = self.cur.pos();
        self.skip_to_end_of_for_control_block()?;
        let upd_end = self.cur.pos();
        let update = if upd_end > upd_start {
            let old = self.cur.set_limit(upd_end);
            self.cur.set_pos(upd_start);
            let u = self.parse_instruction()?;
            self.cur.set_limit(old);
            self.cur.set_pos(upd_end);
            u.map(Box::new)
        } else {
            None
        };
        self.cur.skip(); // ')'

        self.skip_spaces_and_newlines();
        let body = self.parse_instruction()?.map(Box::new);

        if init.is_none() && cond.is_none() && update.is_none() && body.is_none() {
            return Err(ParseError::new(
                pos,
                "empty infinite 'for' loop: fix the script",
            ));
        }
        Ok(Self::command(
            pos,
            CommandKind::For {
                init,
                cond,
                update,
                body,
            },
        ))
    }

    /// Advance to the `)` that closes the `for` header, honoring nested
    /// parentheses, string constants and escapes.  Leaves the cursor on it.
    fn skip_to_end_of_for_control_block(&mut self) -> Result<(), ParseError> {
        let mut depth = 0u32;
        let mut in_string = false;
        loop {
            match self.cur.cur() {
                None => {
                    return Err(ParseError::new(
                        self.cur.pos(),
                        "unexpected end of buffer while looking for the closing ')' of the 'for' command",
                    ))
                }
                Some('"') => {
                    in_string = !in_string;
                    self.cur.skip();
                }
                Some('\\') => {
                    self.cur.skip();
                    if !self.cur.at_end() {
                        self.cur.skip();
                    }
                }
                Some('(') if !in_string => {
                    depth += 1;
                    self.cur.skip();
                }
                Some(')') if !in_string => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                    self.cur.skip();
                }
                Some(_) => self.cur.skip(),
            }
        }
    }

    // ── foreach ──────────────────────────────────────────────────────────────

    pub(crate) fn parse_special_foreach(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'foreach' command needs a variable and a list of values enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "foreach"));
        }
        self.cur.skip();
        self.skip_spaces();

        let var_pos = self.cur.pos();
        if !matches!(self.cur.cur(), Some('%') | Some('$') | Some('@')) {
            self.warn(
                var_pos,
                "the 'foreach' command expects a writable iteration variable as first parameter",
            );
            return Err(ParseError::new(
                var_pos,
                format!(
                    "found {} where '%' or '$' was expected",
                    describe_char(self.cur.cur())
                ),
            ));
        }
        let target = self.parse_percent_or_dollar()?;
        if target.is_function_call() {
            self.warn(
                var_pos,
                "the 'foreach' command expects a writable iteration variable as first parameter",
            );
            return Err(ParseError::new(
                var_pos,
                "unexpected function call as 'foreach' iteration variable",
            ));
        }
        if !target.is_writable() {
            self.warn(
                var_pos,
                "the 'foreach' command expects a writable iteration variable as first parameter",
            );
            return Err(ParseError::new(
                var_pos,
                "unexpected read-only variable as 'foreach' iteration variable",
            ));
        }

        self.skip_spaces();
        if self.cur.cur() != Some(',') {
            if self.cur.cur() == Some(')') {
                return Err(ParseError::new(
                    self.cur.pos(),
                    "the 'foreach' command needs at least one iteration data argument",
                ));
            }
            self.warn(
                self.cur.pos(),
                "the 'foreach' command expects a comma-separated list of values after the iteration variable",
            );
            return Err(self.err_bad_char(',', "foreach"));
        }
        let items = self.parse_comma_separated_parameter_list("foreach")?;

        self.skip_spaces_and_newlines();
        let body_pos = self.cur.pos();
        let body = match self.parse_instruction()? {
            Some(i) => i,
            None => {
                self.warn(
                    body_pos,
                    "found an empty 'foreach' execution block: maybe you need to fix your script?",
                );
                Instruction::Block {
                    pos: body_pos,
                    items: Vec::new(),
                }
            }
        };
        Ok(Self::command(
            pos,
            CommandKind::Foreach {
                target,
                items,
                body: Box::new(body),
            },
        ))
    }

    // ── switch ───────────────────────────────────────────────────────────────

    pub(crate) fn parse_special_switch(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'switch' command needs an expression enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "switch"));
        }
        let subj_pos = self.cur.pos();
        self.cur.skip();
        let subject = match self.parse_expression(')')? {
            Some(e) => e,
            None => {
                return Err(ParseError::new(
                    subj_pos,
                    "the 'switch' subject expression is empty",
                ))
            }
        };

        self.skip_spaces_and_newlines();
        if self.cur.cur() != Some('{') {
            return Err(self.err_bad_char('{', "switch"));
        }
        self.cur.skip();

        let mut labels: Vec<SwitchLabel> = Vec::new();
        loop {
            self.skip_spaces_and_newlines();
            match self.cur.cur() {
                None => {
                    return Err(ParseError::new(
                        pos,
                        "unexpected end of buffer in the 'switch' condition block",
                    ))
                }
                Some('}') => {
                    self.cur.skip();
                    break;
                }
                Some('#') => {
                    self.parse_comment()?;
                    continue;
                }
                Some('/') if matches!(self.cur.peek(1), Some('/') | Some('*')) => {
                    self.parse_comment()?;
                    continue;
                }
                _ => {}
            }

            let lpos = self.cur.pos();
            let start = self.cur.pos();
            while self.cur_is_letter() {
                self.cur.skip();
            }
            let word = self.cur.slice(start, self.cur.pos());
            if word.is_empty() {
                return Err(ParseError::new(
                    lpos,
                    format!(
                        "found {} where a 'case', 'match', 'regexp', 'default' or 'break' label was expected",
                        describe_char(self.cur.cur())
                    ),
                ));
            }

            let kind = match word.to_ascii_lowercase().as_str() {
                "case" => SwitchLabelKind::Case,
                "match" => SwitchLabelKind::Match,
                "regexp" => SwitchLabelKind::Regexp,
                "default" => SwitchLabelKind::Default,
                "break" => {
                    // A trailing 'break' label closes the previous label.
                    match labels.last_mut() {
                        Some(last) => {
                            last.terminating_break = true;
                            self.skip_spaces();
                            self.cur.eat(';');
                            continue;
                        }
                        None => {
                            return Err(ParseError::new(
                                lpos,
                                "found a 'break' label before any 'case', 'match', 'regexp' or 'default' label",
                            ))
                        }
                    }
                }
                other => {
                    return Err(ParseError::new(
                        lpos,
                        format!(
                            "found token '{other}' where a 'case', 'match', 'regexp', 'default' or 'break' label was expected"
                        ),
                    ))
                }
            };

            let param = if kind == SwitchLabelKind::Default {
                None
            } else {
                self.skip_spaces();
                if self.cur.cur() != Some('(') {
                    return Err(self.err_bad_char('(', "switch"));
                }
                Some(self.parse_single_parameter_in_parenthesis("switch")?)
            };

            self.skip_spaces();
            self.cur.eat(':');
            self.skip_spaces();
            let body = if self.cur.cur() == Some('}') {
                None
            } else {
                self.parse_instruction()?
            };
            labels.push(SwitchLabel {
                pos: lpos,
                kind,
                param,
                body,
                terminating_break: false,
            });
        }

        if labels.is_empty() {
            return Err(ParseError::new(
                pos,
                "senseless empty 'switch' command: fix the script",
            ));
        }
        Ok(Self::command(pos, CommandKind::Switch { subject, labels }))
    }

    // ── class ────────────────────────────────────────────────────────────────

    pub(crate) fn parse_special_class(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'class' command needs a class name (and optional parent) enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "class"));
        }
        let names = self.parse_comma_separated_parameter_list("class")?;
        if names.is_empty() {
            return Err(ParseError::new(pos, "missing class name in the 'class' command"));
        }
        if names.len() > 2 {
            return Err(ParseError::new(
                pos,
                "the 'class' command takes at most two parameters (class name and parent)",
            ));
        }

        self.skip_spaces_and_newlines();
        if self.cur.cur() != Some('{') {
            return Err(self.err_bad_char('{', "class"));
        }
        self.cur.skip();

        let mut members = Vec::new();
        loop {
            self.skip_spaces_and_newlines();
            match self.cur.cur() {
                None => {
                    return Err(ParseError::new(
                        pos,
                        "unexpected end of buffer in the 'class' definition",
                    ))
                }
                Some('}') => {
                    self.cur.skip();
                    break;
                }
                Some('#') => {
                    self.parse_comment()?;
                    continue;
                }
                Some('/') if matches!(self.cur.peek(1), Some('/') | Some('*')) => {
                    self.parse_comment()?;
                    continue;
                }
                _ => {}
            }

            let mpos = self.cur.pos();
            let mut name = match self.read_identifier() {
                Some(n) => n,
                None => {
                    return Err(ParseError::new(
                        mpos,
                        format!(
                            "found {} where a function name was expected in the 'class' definition",
                            describe_char(self.cur.cur())
                        ),
                    ))
                }
            };

            let mut internal = false;
            if name.eq_ignore_ascii_case("internal") {
                internal = true;
                self.skip_spaces();
                name = match self.read_identifier() {
                    Some(n) => n,
                    None => {
                        return Err(ParseError::new(
                            self.cur.pos(),
                            "missing function name after the 'internal' keyword in the 'class' definition",
                        ))
                    }
                };
            }
            // 'function' is a pure decoration.
            if name.eq_ignore_ascii_case("function") {
                self.skip_spaces();
                name = match self.read_identifier() {
                    Some(n) => n,
                    None => {
                        return Err(ParseError::new(
                            self.cur.pos(),
                            "missing function name after the 'function' keyword in the 'class' definition",
                        ))
                    }
                };
            }

            self.skip_spaces_and_newlines();
            if self.cur.cur() == Some('(') {
                // Parameter list reminder: documentation only, skipped.
                while !self.cur.at_end() && self.cur.cur() != Some(')') {
                    self.cur.skip();
                }
                if self.cur.at_end() {
                    return Err(ParseError::new(
                        mpos,
                        "unexpected end of buffer in the function parameter list reminder",
                    ));
                }
                self.cur.skip(); // ')'
                self.skip_spaces_and_newlines();
            }

            if self.cur.cur() != Some('{') {
                return Err(self.err_bad_char('{', "class"));
            }
            // Validate the body now, keep the raw text for lazy compilation.
            let body_start = self.cur.pos();
            self.parse_instruction_block()?;
            let body = self.cur.slice(body_start, self.cur.pos());
            members.push(ClassMember {
                pos: mpos,
                name,
                internal,
                body,
            });
        }

        Ok(Self::command(
            pos,
            CommandKind::Class(ClassDef {
                pos,
                names,
                members,
            }),
        ))
    }

    // ── privateimpl ──────────────────────────────────────────────────────────

    pub(crate) fn parse_special_privateimpl(
        &mut self,
        pos: Pos,
    ) -> Result<Instruction, ParseError> {
        if self.cur.cur() != Some('(') {
            self.warn(
                self.cur.pos(),
                "the 'privateimpl' command needs an object and a function name enclosed in parenthesis",
            );
            return Err(self.err_bad_char('(', "privateimpl"));
        }
        let mut params = self.parse_comma_separated_parameter_list("privateimpl")?;
        let (target, name) = match (params.len(), params.pop(), params.pop()) {
            (2, Some(name), Some(target)) => (target, name),
            _ => {
                return Err(ParseError::new(
                    pos,
                    "the 'privateimpl' command needs exactly two parameters (object and function name)",
                ))
            }
        };

        self.skip_spaces_and_newlines();
        if self.cur.cur() != Some('{') {
            return Err(self.err_bad_char('{', "privateimpl"));
        }
        let body_start = self.cur.pos();
        self.parse_instruction_block()?;
        let body = self.cur.slice(body_start, self.cur.pos());

        Ok(Self::command(
            pos,
            CommandKind::PrivateImpl { target, name, body },
        ))
    }

    // ── unset / global ───────────────────────────────────────────────────────

    pub(crate) fn parse_special_unset(
        &mut self,
        pos: Pos,
    ) -> Result<Option<Instruction>, ParseError> {
        let mut vars: Vec<Data> = Vec::new();
        loop {
            self.skip_spaces();
            if self.cur.cur() != Some('%') {
                break;
            }
            let vpos = self.cur.pos();
            let d = self.parse_percent_or_dollar()?;
            if d.is_function_call() || !d.is_writable() {
                return Err(ParseError::new(
                    vpos,
                    "the 'unset' command expects a writable variable",
                ));
            }
            vars.push(d);
            self.skip_spaces();
            if !self.cur.eat(',') {
                break;
            }
        }
        if !self.at_end_of_command() {
            self.warn(pos, "the 'unset' command needs a list of variables");
            return Err(ParseError::new(
                self.cur.pos(),
                format!(
                    "found {} where a variable was expected in the 'unset' command",
                    describe_char(self.cur.cur())
                ),
            ));
        }
        self.eat_command_terminator();
        if vars.is_empty() {
            self.warn(
                pos,
                "the 'unset' command used without a variable list: nothing to do",
            );
            return Ok(None);
        }
        Ok(Some(Self::command(pos, CommandKind::Unset { vars })))
    }

    /// `global %A, %b, ...` — purely a parse-time declaration: the named
    /// identifiers resolve to global storage for the rest of this parse.
    /// Produces no instruction.
    pub(crate) fn parse_special_global(
        &mut self,
        pos: Pos,
    ) -> Result<Option<Instruction>, ParseError> {
        let mut any = false;
        loop {
            self.skip_spaces();
            if self.cur.cur() != Some('%') {
                break;
            }
            self.cur.skip();
            match self.read_identifier() {
                Some(n) => {
                    self.globals.insert(n);
                    any = true;
                }
                None => {
                    return Err(ParseError::new(
                        self.cur.pos(),
                        format!(
                            "found {} where a variable name was expected after '%' in the 'global' command",
                            describe_char(self.cur.cur())
                        ),
                    ))
                }
            }
            self.skip_spaces();
            if !self.cur.eat(',') {
                break;
            }
        }
        if !self.at_end_of_command() {
            self.warn(pos, "the 'global' command needs a list of variables");
            return Err(ParseError::new(
                self.cur.pos(),
                format!(
                    "found {} where a variable was expected in the 'global' command",
                    describe_char(self.cur.cur())
                ),
            ));
        }
        self.eat_command_terminator();
        if !any {
            self.warn(
                pos,
                "the 'global' command used without a variable list: nothing to do",
            );
        }
        Ok(None)
    }

    // ── break / halt ─────────────────────────────────────────────────────────

    pub(crate) fn parse_special_break(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        self.skip_spaces();
        if !self.at_end_of_command() {
            self.warn(
                self.cur.pos(),
                "trailing garbage at the end of the 'break' command: ignored",
            );
            self.skip_to_end_of_command();
        } else {
            self.eat_command_terminator();
        }
        Ok(Self::command(pos, CommandKind::Break))
    }

    pub(crate) fn parse_special_halt(&mut self, pos: Pos) -> Result<Instruction, ParseError> {
        self.skip_spaces();
        if !self.at_end_of_command() {
            self.warn(
                self.cur.pos(),
                "trailing garbage at the end of the 'halt' command: ignored",
            );
            self.skip_to_end_of_command();
        } else {
            self.eat_command_terminator();
        }
        Ok(Self::command(pos, CommandKind::Halt))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn parse_one(src: &str) -> Instruction {
        let (items, _) = parse(src).expect("parse failed");
        assert_eq!(items.len(), 1, "expected one instruction from {src:?}");
        items.into_iter().next().unwrap()
    }

    fn kind(i: Instruction) -> CommandKind {
        match i {
            Instruction::Command(c) => c.kind,
            other => panic!("not a command: {other:?}"),
        }
    }

    #[test]
    fn if_without_else() {
        match kind(parse_one("if (1) echo yes")) {
            CommandKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(then_branch.is_some());
                assert!(else_branch.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn if_with_else() {
        match kind(parse_one("if (1) echo yes\nelse echo no")) {
            CommandKind::If { else_branch, .. } => assert!(else_branch.is_some()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn elseif_contraction_nests() {
        match kind(parse_one("if (1) echo a\nelseif (2) echo b\nelse echo c")) {
            CommandKind::If { else_branch, .. } => {
                let inner = else_branch.expect("missing else");
                match kind(*inner) {
                    CommandKind::If { else_branch, .. } => assert!(else_branch.is_some()),
                    other => panic!("inner not an if: {other:?}"),
                }
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn word_starting_with_else_is_not_an_else() {
        let (items, _) = parse("if (1) echo a\nelsewhere").unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn if_missing_parenthesis_is_fatal() {
        let err = parse("if 1 echo a").unwrap_err();
        assert!(err.msg.contains("'if'"));
    }

    #[test]
    fn while_loop() {
        match kind(parse_one("while (%i < 10) %i++")) {
            CommandKind::While { body, .. } => assert!(body.is_some()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn do_while_loop() {
        match kind(parse_one("do %i++; while (%i < 10)")) {
            CommandKind::DoWhile { body, .. } => assert!(body.is_some()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn do_while_with_block_body() {
        match kind(parse_one("do { %i++ } while (%i < 10)")) {
            CommandKind::DoWhile { body, .. } => assert!(body.is_some()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn do_body_command_needs_its_own_terminator() {
        // A non-block body is an ordinary command; without ';' the
        // 'while' clause is swallowed as its trailing garbage.
        let err = parse("do %i++ while (%i < 10)").unwrap_err();
        assert!(err.msg.contains("'while'"));
    }

    #[test]
    fn do_without_while_is_fatal() {
        let err = parse("do %i++; until (%i)").unwrap_err();
        assert!(err.msg.contains("'while'"));
    }

    #[test]
    fn do_while_keyword_is_case_insensitive() {
        assert!(parse("do %i++; WHILE (%i < 2)").is_ok());
    }

    #[test]
    fn full_for_loop() {
        match kind(parse_one("for (%i = 0; %i < 10; %i++) echo %i")) {
            CommandKind::For {
                init,
                cond,
                update,
                body,
            } => {
                assert!(init.is_some());
                assert!(cond.is_some());
                assert!(update.is_some());
                assert!(body.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn infinite_for_with_body_parses() {
        match kind(parse_one("for (;;) {}")) {
            CommandKind::For {
                init,
                cond,
                update,
                body,
            } => {
                assert!(init.is_none());
                assert!(cond.is_none());
                assert!(update.is_none());
                assert!(body.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_infinite_for_is_fatal() {
        let err = parse("for (;;);").unwrap_err();
        assert!(err.msg.contains("'for'"));
    }

    #[test]
    fn for_update_may_contain_parenthesis() {
        assert!(parse("for (%i = 0; %i < 9; %i += $( 1 + 1 )) echo %i").is_ok());
    }

    #[test]
    fn unterminated_for_header_is_fatal() {
        assert!(parse("for (%i = 0; %i < 10; %i++").is_err());
    }

    #[test]
    fn foreach_with_list() {
        match kind(parse_one("foreach (%x, a, b, c) echo %x")) {
            CommandKind::Foreach { items, .. } => assert_eq!(items.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn foreach_needs_iteration_data() {
        assert!(parse("foreach (%x) echo %x").is_err());
    }

    #[test]
    fn foreach_rejects_read_only_target() {
        assert!(parse("foreach ($fn(), a) echo hm").is_err());
        assert!(parse("foreach (@, a) echo hm").is_err());
    }

    #[test]
    fn foreach_empty_body_warns() {
        let (items, warns) = parse("foreach (%x, a, b)").unwrap();
        assert_eq!(items.len(), 1);
        assert!(warns.iter().any(|w| w.msg.contains("empty 'foreach'")));
    }

    #[test]
    fn switch_labels() {
        let src = "switch (%n) { case(1): echo one; break; match(t*): echo t; default: echo rest; }";
        match kind(parse_one(src)) {
            CommandKind::Switch { labels, .. } => {
                assert_eq!(labels.len(), 3);
                assert_eq!(labels[0].kind, SwitchLabelKind::Case);
                assert!(labels[0].terminating_break);
                assert_eq!(labels[1].kind, SwitchLabelKind::Match);
                assert!(!labels[1].terminating_break);
                assert_eq!(labels[2].kind, SwitchLabelKind::Default);
                assert!(labels[2].param.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn switch_colon_is_optional() {
        assert!(parse("switch (1) { case(1) echo one }").is_ok());
    }

    #[test]
    fn empty_switch_is_fatal() {
        let err = parse("switch (1) { }").unwrap_err();
        assert!(err.msg.contains("switch"));
    }

    #[test]
    fn leading_break_label_is_fatal() {
        assert!(parse("switch (1) { break; }").is_err());
    }

    #[test]
    fn unknown_label_is_fatal() {
        let err = parse("switch (1) { other(1): echo x }").unwrap_err();
        assert!(err.msg.contains("'case'"));
    }

    #[test]
    fn class_with_members() {
        let src = "class (counter) { constructor { @%n = 0 } internal bump { @%n++ } function value (nothing) { return @%n } }";
        match kind(parse_one(src)) {
            CommandKind::Class(def) => {
                assert_eq!(def.names.len(), 1);
                assert_eq!(def.members.len(), 3);
                assert_eq!(def.members[0].name, "constructor");
                assert!(!def.members[0].internal);
                assert_eq!(def.members[1].name, "bump");
                assert!(def.members[1].internal);
                assert_eq!(def.members[2].name, "value");
                assert!(def.members[2].body.starts_with('{'));
                assert!(def.members[2].body.ends_with('}'));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn class_with_parent() {
        match kind(parse_one("class (child, base) { }")) {
            CommandKind::Class(def) => assert_eq!(def.names.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn class_member_body_must_parse() {
        assert!(parse("class (c) { f { if } }").is_err());
    }

    #[test]
    fn privateimpl_captures_body() {
        match kind(parse_one("privateimpl (%o, tick) { echo tock }")) {
            CommandKind::PrivateImpl { body, .. } => {
                assert!(body.contains("tock"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn privateimpl_needs_two_parameters() {
        assert!(parse("privateimpl (%o) { echo x }").is_err());
    }

    #[test]
    fn unset_list() {
        match kind(parse_one("unset %a, %b")) {
            CommandKind::Unset { vars } => assert_eq!(vars.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unset_without_variables_warns() {
        let (items, warns) = parse("unset").unwrap();
        assert!(items.is_empty());
        assert!(!warns.is_empty());
    }

    #[test]
    fn unset_rejects_garbage() {
        assert!(parse("unset %a bc").is_err());
    }

    #[test]
    fn global_declares_for_rest_of_parse() {
        let (items, _) = parse("global %counter\n%counter = 1").unwrap();
        assert_eq!(items.len(), 1);
        match kind(items.into_iter().next().unwrap()) {
            CommandKind::Operation(op) => match op.target.kind {
                crate::ast::DataKind::Target(t) => {
                    assert!(matches!(t.base, crate::ast::TargetBase::Global(ref n) if n == "counter"));
                }
                other => panic!("unexpected target: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn break_trailing_garbage_warns() {
        let (items, warns) = parse("while (1) { break now }").unwrap();
        assert_eq!(items.len(), 1);
        assert!(warns.iter().any(|w| w.msg.contains("'break'")));
    }

    #[test]
    fn halt_parses() {
        match kind(parse_one("halt")) {
            CommandKind::Halt => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
