//! KVS — an IRC-client scripting engine.
//!
//! A tree-walking interpreter for the KVS scripting language, covering:
//!
//! - Variables (`%local`, `%Global`), arrays, hashes and deep-copy
//!   assignment semantics
//! - Data-item interpolation (`"quoted %var"`, `$fn(...)`, `$( expr )`)
//! - Control flow: `if`/`else`, `while`, `do`/`while`, `for`, `foreach`,
//!   `switch` with `case`/`match`/`regexp`/`default` labels
//! - A class system with single inheritance, per-instance overrides
//!   (`privateimpl`), an ownership tree and handle-based object references
//! - Signal/slot connections between objects
//!
//! # Quick start
//!
//! ```rust
//! use kvs::RunContext;
//!
//! let (mut ctx, win) = RunContext::collecting();
//! ctx.run("%a = 6; echo $( %a * 7 )").unwrap();
//! assert_eq!(win.lines(), vec!["42".to_string()]);
//! ```

pub mod ast;
pub mod context;
pub mod cursor;
pub mod error;
pub mod exec;
pub mod object;
pub mod parser;
pub mod variant;
pub mod window;

pub use context::RunContext;
pub use error::{ParseError, ParseWarning, ScriptError};
pub use variant::{Handle, Variant};
pub use window::{MemoryWindow, NullOptions, Options, StdoutWindow, WindowOutput};
