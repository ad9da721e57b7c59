//! Parse and runtime diagnostics.
//!
//! Parse errors are fatal for the current top-level unit and carry the
//! offset where parsing stopped; warnings are non-fatal and are accumulated
//! by the parser so the caller can surface them through the window-output
//! capability.  Runtime errors abort the current call chain.

use std::fmt;

use crate::cursor::Pos;

/// A fatal parse error: position + message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub pos: Pos,
    pub msg: String,
}

impl ParseError {
    pub fn new(pos: Pos, msg: impl Into<String>) -> Self {
        ParseError {
            pos,
            msg: msg.into(),
        }
    }

    /// The classic "found X where Y was expected" diagnostic.
    pub fn bad_char(pos: Pos, found: Option<char>, expected: char, construct: &str) -> Self {
        ParseError::new(
            pos,
            format!(
                "found {} where '{}' was expected in the '{}' command",
                describe_char(found),
                expected,
                construct
            ),
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at offset {}: {}", self.pos, self.msg)
    }
}

impl std::error::Error for ParseError {}

/// A non-fatal parse diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub pos: Pos,
    pub msg: String,
}

impl ParseWarning {
    pub fn new(pos: Pos, msg: impl Into<String>) -> Self {
        ParseWarning {
            pos,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warning at offset {}: {}", self.pos, self.msg)
    }
}

/// Any error the engine can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    Parse(ParseError),
    Runtime(String),
}

impl ScriptError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        ScriptError::Runtime(msg.into())
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Parse(e) => write!(f, "{e}"),
            ScriptError::Runtime(msg) => write!(f, "runtime error: {msg}"),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<ParseError> for ScriptError {
    fn from(e: ParseError) -> Self {
        ScriptError::Parse(e)
    }
}

/// Render a code point for diagnostics: `'x' (unicode 78)`.
pub fn describe_char(ch: Option<char>) -> String {
    match ch {
        Some(c) => format!("character '{}' (unicode {:x})", c, c as u32),
        None => "end of buffer".to_owned(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe() {
        assert_eq!(describe_char(Some('x')), "character 'x' (unicode 78)");
        assert_eq!(describe_char(None), "end of buffer");
    }

    #[test]
    fn display() {
        let e = ParseError::bad_char(3, Some('!'), '(', "if");
        let msg = e.to_string();
        assert!(msg.contains("offset 3"));
        assert!(msg.contains("'('"));
        assert!(msg.contains("'if'"));
    }
}
