//! Abstract syntax tree of the scripting language.
//!
//! Every node records the offset it was parsed at so diagnostics can point
//! back into the script text.  Nodes own their children exclusively; there
//! are no parent back-pointers — error context is reconstructed from the
//! recorded offsets instead.

use crate::cursor::Pos;

// ── Instructions and commands ─────────────────────────────────────────────────

/// A single instruction: either a brace-delimited block or one command.
#[derive(Debug, Clone)]
pub enum Instruction {
    Block { pos: Pos, items: Vec<Instruction> },
    Command(Command),
}

impl Instruction {
    pub fn pos(&self) -> Pos {
        match self {
            Instruction::Block { pos, .. } => *pos,
            Instruction::Command(c) => c.pos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    pub pos: Pos,
    pub kind: CommandKind,
}

#[derive(Debug, Clone)]
pub enum CommandKind {
    /// A plain named command with space-separated parameters
    /// (`echo`, `return`, `delete`, ... — resolved at runtime).
    Simple { name: String, params: Vec<Data> },
    /// A variable operation (`%a = ...`, `%a++`, `%a .= x`, ...).
    Operation(Operation),
    /// A data item evaluated for its side effects, result discarded
    /// (`%o->$fn()`, `$fn()`).
    VoidFunctionCall(Data),
    If {
        cond: Expr,
        then_branch: Option<Box<Instruction>>,
        else_branch: Option<Box<Instruction>>,
    },
    While {
        cond: Expr,
        body: Option<Box<Instruction>>,
    },
    DoWhile {
        body: Option<Box<Instruction>>,
        cond: Expr,
    },
    For {
        init: Option<Box<Instruction>>,
        cond: Option<Expr>,
        update: Option<Box<Instruction>>,
        body: Option<Box<Instruction>>,
    },
    Foreach {
        target: Data,
        items: Vec<Data>,
        body: Box<Instruction>,
    },
    Switch {
        subject: Expr,
        labels: Vec<SwitchLabel>,
    },
    Class(ClassDef),
    /// `privateimpl(<object>,<function>){ body }` — per-instance override.
    PrivateImpl {
        target: Data,
        name: Data,
        body: String,
    },
    Unset { vars: Vec<Data> },
    Break,
    Halt,
}

// ── Operations ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Assign,
    Increment,
    Decrement,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    /// `.=` string append.
    AppendAssign,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub pos: Pos,
    pub target: Data,
    pub op: OpKind,
    /// Absent for `++`/`--`.
    pub rhs: Option<Data>,
}

// ── Switch labels ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchLabelKind {
    Case,
    Match,
    Regexp,
    Default,
}

#[derive(Debug, Clone)]
pub struct SwitchLabel {
    pub pos: Pos,
    pub kind: SwitchLabelKind,
    /// Absent only for `default`.
    pub param: Option<Data>,
    pub body: Option<Instruction>,
    /// A trailing `break` label after the instruction.
    pub terminating_break: bool,
}

// ── Class definitions ─────────────────────────────────────────────────────────

/// A member function of a `class` definition.  The body is kept as raw
/// re-lexable script text and compiled lazily on first invocation.
#[derive(Debug, Clone)]
pub struct ClassMember {
    pub pos: Pos,
    pub name: String,
    pub internal: bool,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub pos: Pos,
    /// `class(<name>[,<parent>])` — evaluated at execution time.
    pub names: Vec<Data>,
    pub members: Vec<ClassMember>,
}

// ── Data items ────────────────────────────────────────────────────────────────

/// A data-producing node: supports read-only evaluation, and — when it
/// denotes a storage location — read-write evaluation.
#[derive(Debug, Clone)]
pub struct Data {
    pub pos: Pos,
    pub kind: DataKind,
}

#[derive(Debug, Clone)]
pub enum DataKind {
    /// Constant text.
    Literal(String),
    /// Concatenation of pieces; a single-piece datum evaluates to that
    /// piece's value, multiple pieces concatenate as a string.
    Composite(Vec<Data>),
    /// `$( expression )`.
    Expression(Box<Expr>),
    /// `$name(args)` — a core (non-object) function call.
    FunctionCall(FunctionCall),
    /// A variable or `@` with subscripts and `->` scope chains.
    Target(TargetChain),
}

impl Data {
    pub fn literal(pos: Pos, text: impl Into<String>) -> Self {
        Data {
            pos,
            kind: DataKind::Literal(text.into()),
        }
    }

    /// True if the item is (or ends in) a function call.
    pub fn is_function_call(&self) -> bool {
        match &self.kind {
            DataKind::FunctionCall(_) => true,
            DataKind::Target(t) => matches!(t.path.last(), Some(TargetSeg::Method { .. })),
            DataKind::Composite(items) => items.len() == 1 && items[0].is_function_call(),
            _ => false,
        }
    }

    /// True if the item denotes a writable storage location.
    pub fn is_writable(&self) -> bool {
        match &self.kind {
            DataKind::Target(t) => {
                if matches!(t.path.last(), Some(TargetSeg::Method { .. })) {
                    return false;
                }
                match t.base {
                    TargetBase::Local(_) | TargetBase::Global(_) => true,
                    // `@` alone is read-only; `@%field` is writable.
                    TargetBase::This => matches!(t.path.first(), Some(TargetSeg::Field(_))),
                }
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Data>,
}

/// `%name[...]{...}->%field->$fn(...)` resolved left to right.
#[derive(Debug, Clone)]
pub struct TargetChain {
    pub base: TargetBase,
    pub path: Vec<TargetSeg>,
}

#[derive(Debug, Clone)]
pub enum TargetBase {
    /// `%name` with a leading lowercase letter (unless declared `global`).
    Local(String),
    /// `%Name` with a leading uppercase letter, or declared `global`.
    Global(String),
    /// `@` — the receiving object inside a function handler.
    This,
}

#[derive(Debug, Clone)]
pub enum TargetSeg {
    /// `[expr]` array subscript.
    Index(Box<Expr>),
    /// `{data}` hash subscript.
    Key(Box<Data>),
    /// `->%name` object field.
    Field(String),
    /// `->$fn(args)` or `->$class:fn(args)`.
    Method {
        qualifier: Option<String>,
        name: String,
        args: Vec<Data>,
    },
}

// ── Expressions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Expr {
    pub pos: Pos,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Integer(i64),
    Real(f64),
    Str(String),
    Data(Box<Data>),
    Unary {
        op: UnaryOp,
        rhs: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        use BinaryOp::*;
        match self {
            Or => 1,
            And => 2,
            BitOr => 3,
            BitXor => 4,
            BitAnd => 5,
            Eq | Ne => 6,
            Lt | Gt | Le | Ge => 7,
            Shl | Shr => 8,
            Add | Sub => 9,
            Mul | Div | Mod => 10,
        }
    }
}
