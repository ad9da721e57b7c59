//! Positional reader over an immutable script buffer.
//!
//! The KVS parser works by direct lookahead on code points, one character at
//! a time, and several productions backtrack (the `else` probe of `if`, the
//! third segment of `for`).  The cursor therefore exposes its position as a
//! plain index that can be saved and restored freely.  It never owns the
//! script text.

/// Offset into a script buffer, counted in code points.
pub type Pos = usize;

/// A cursor over a script buffer.
///
/// An optional soft limit lets a caller re-parse a sub-range of the buffer
/// (the `for` command parses its update instruction this way); past the
/// limit the cursor reports end-of-buffer even though more text follows.
pub struct Cursor<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: Pos,
    limit: Pos,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        let chars: Vec<char> = src.chars().collect();
        let limit = chars.len();
        Cursor {
            src,
            chars,
            pos: 0,
            limit,
        }
    }

    /// The current code point, or `None` at end-of-buffer.
    pub fn cur(&self) -> Option<char> {
        if self.pos >= self.limit {
            None
        } else {
            Some(self.chars[self.pos])
        }
    }

    /// Code point at `offset` characters past the current one.
    pub fn peek(&self, offset: usize) -> Option<char> {
        let p = self.pos + offset;
        if p >= self.limit {
            None
        } else {
            Some(self.chars[p])
        }
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    /// Restore a previously saved position.
    pub fn set_pos(&mut self, pos: Pos) {
        self.pos = pos;
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    /// Advance one code point.
    pub fn skip(&mut self) {
        if self.pos < self.limit {
            self.pos += 1;
        }
    }

    /// Step back one code point.
    pub fn back(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
        }
    }

    /// Consume the current char if it equals `ch`.
    pub fn eat(&mut self, ch: char) -> bool {
        if self.cur() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Install a new end-of-buffer limit, returning the previous one.
    pub fn set_limit(&mut self, limit: Pos) -> Pos {
        let old = self.limit;
        self.limit = limit.min(self.chars.len());
        old
    }

    /// The script text between two positions.
    pub fn slice(&self, start: Pos, end: Pos) -> String {
        self.chars[start.min(self.chars.len())..end.min(self.chars.len())]
            .iter()
            .collect()
    }

    /// Total length of the buffer in code points (ignores the limit).
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// 1-based (line, column) of a position, for diagnostics.
    pub fn line_col(&self, pos: Pos) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for &ch in self.chars.iter().take(pos.min(self.chars.len())) {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// The underlying script text.
    pub fn source(&self) -> &'a str {
        self.src
    }
}

/// `true` for characters that may start an identifier-like token.
pub fn is_letter(ch: Option<char>) -> bool {
    matches!(ch, Some(c) if c.is_alphabetic())
}

/// `true` for characters that may continue an identifier-like token.
pub fn is_letter_or_digit(ch: Option<char>) -> bool {
    matches!(ch, Some(c) if c.is_alphanumeric())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
