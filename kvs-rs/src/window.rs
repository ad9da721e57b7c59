//! Host capabilities handed to the engine: somewhere to print, and a view
//! of the host's option table.
//!
//! The engine never talks to a terminal or a config store directly; the
//! embedding host passes implementations of these traits in.  Tests use
//! [`MemoryWindow`], the bundled runner uses [`StdoutWindow`].

use std::cell::RefCell;
use std::rc::Rc;

/// Where script output and engine diagnostics go.
pub trait WindowOutput {
    /// Normal script output (the `echo` command).
    fn output(&mut self, text: &str);
    /// Parse warnings and runtime trouble that does not abort the script.
    fn warning(&mut self, text: &str);
}

/// Read-only view of the host's option table, exposed to scripts through
/// the `$option` function.
pub trait Options {
    fn get_bool(&self, name: &str) -> Option<bool>;
    fn get_int(&self, name: &str) -> Option<i64>;
    fn get_str(&self, name: &str) -> Option<String>;
}

/// An option table with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOptions;

impl Options for NullOptions {
    fn get_bool(&self, _name: &str) -> Option<bool> {
        None
    }
    fn get_int(&self, _name: &str) -> Option<i64> {
        None
    }
    fn get_str(&self, _name: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default)]
struct MemoryWindowInner {
    lines: Vec<String>,
    warnings: Vec<String>,
}

/// Collects output in memory; cloning shares the buffer, so a test can keep
/// one clone and hand the other to the engine.
#[derive(Debug, Default, Clone)]
pub struct MemoryWindow {
    inner: Rc<RefCell<MemoryWindowInner>>,
}

impl MemoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.borrow().lines.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.inner.borrow().warnings.clone()
    }
}

impl WindowOutput for MemoryWindow {
    fn output(&mut self, text: &str) {
        self.inner.borrow_mut().lines.push(text.to_owned());
    }

    fn warning(&mut self, text: &str) {
        self.inner.borrow_mut().warnings.push(text.to_owned());
    }
}

/// Prints output to stdout and warnings to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutWindow;

impl WindowOutput for StdoutWindow {
    fn output(&mut self, text: &str) {
        println!("{text}");
    }

    fn warning(&mut self, text: &str) {
        eprintln!("warning: {text}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_window_shares_its_buffer_across_clones() {
        let win = MemoryWindow::new();
        let mut engine_side = win.clone();
        engine_side.output("hello");
        engine_side.warning("hm");
        assert_eq!(win.lines(), vec!["hello".to_string()]);
        assert_eq!(win.warnings(), vec!["hm".to_string()]);
    }

    #[test]
    fn null_options_is_empty() {
        assert!(NullOptions.get_bool("anything").is_none());
        assert!(NullOptions.get_str("anything").is_none());
    }
}
