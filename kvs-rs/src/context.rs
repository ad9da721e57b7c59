//! The run context: everything a script touches while executing.
//!
//! One [`RunContext`] owns the global variable table, the call-frame stack,
//! the object registry and class registry, the pending control-flow flags,
//! and the host capabilities (window output, options).  Commands receive it
//! as a single `&mut` and thread it downward; there is no shared mutable
//! state anywhere else in the engine.

use std::collections::HashMap;

use crate::error::ScriptError;
use crate::object::class::ClassRegistry;
use crate::object::ObjectRegistry;
use crate::variant::{Handle, Variant};
use crate::window::{MemoryWindow, NullOptions, Options, WindowOutput};

/// One function invocation: local variables, positional parameters, the
/// receiving object and the accumulated return value.
#[derive(Debug, Default)]
pub struct Frame {
    pub locals: HashMap<String, Variant>,
    pub params: Vec<Variant>,
    pub ret: Variant,
    pub this: Handle,
    pub fn_name: String,
}

impl Frame {
    fn root() -> Self {
        Frame::default()
    }
}

// ── Variable slots ────────────────────────────────────────────────────────────

/// Where a writable variable lives.
#[derive(Debug, Clone)]
pub enum SlotBase {
    Local(String),
    Global(String),
    /// An object field, keyed case-insensitively.
    Field(Handle, String),
}

/// One subscript hop inside a slot.
#[derive(Debug, Clone)]
pub enum PathSeg {
    Index(usize),
    Key(String),
}

/// A fully resolved storage location: a base plus subscript hops.
#[derive(Debug, Clone)]
pub struct VarSlot {
    pub base: SlotBase,
    pub path: Vec<PathSeg>,
}

// ── Run context ───────────────────────────────────────────────────────────────

pub struct RunContext {
    pub(crate) globals: HashMap<String, Variant>,
    pub(crate) frames: Vec<Frame>,
    break_pending: bool,
    halt_pending: bool,
    pub(crate) objects: ObjectRegistry,
    pub(crate) classes: ClassRegistry,
    pub(crate) out: Box<dyn WindowOutput>,
    pub(crate) opts: Box<dyn Options>,
}

impl RunContext {
    pub fn new(out: Box<dyn WindowOutput>, opts: Box<dyn Options>) -> Self {
        RunContext {
            globals: HashMap::new(),
            frames: vec![Frame::root()],
            break_pending: false,
            halt_pending: false,
            objects: ObjectRegistry::new(),
            classes: ClassRegistry::new(),
            out,
            opts,
        }
    }

    /// A context wired to an in-memory window, for tests and examples.
    pub fn collecting() -> (Self, MemoryWindow) {
        let win = MemoryWindow::new();
        let ctx = RunContext::new(Box::new(win.clone()), Box::new(NullOptions));
        (ctx, win)
    }

    /// Parse and execute a script in this context; warnings go to the
    /// window, a fatal error aborts.  Returns the script's return value.
    pub fn run(&mut self, src: &str) -> Result<Variant, ScriptError> {
        let (items, warnings) = crate::parser::parse(src)?;
        for w in &warnings {
            self.out.warning(&w.to_string());
        }
        for item in &items {
            item.execute(self)?;
            // A pending break or halt that no loop absorbed stops the
            // script here, exactly as it stops a block.
            if self.interrupted() {
                break;
            }
        }
        self.halt_pending = false;
        self.break_pending = false;
        Ok(std::mem::take(&mut self.frame_mut().ret))
    }

    // ── Frames ───────────────────────────────────────────────────────────────

    pub(crate) fn frame_mut(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::root());
        }
        let idx = self.frames.len() - 1;
        &mut self.frames[idx]
    }

    pub(crate) fn frame(&self) -> &Frame {
        match self.frames.last() {
            Some(f) => f,
            // The root frame is installed at construction and never popped;
            // this arm exists only to keep the accessor total.
            None => {
                static EMPTY: std::sync::OnceLock<Frame> = std::sync::OnceLock::new();
                EMPTY.get_or_init(Frame::default)
            }
        }
    }

    pub(crate) fn push_frame(&mut self, this: Handle, fn_name: String, params: Vec<Variant>) {
        self.frames.push(Frame {
            locals: HashMap::new(),
            params,
            ret: Variant::Nothing,
            this,
            fn_name,
        });
    }

    /// Pop the current frame and hand back its return value.  `halt` (and a
    /// stray `break`) never escapes a function call.
    pub(crate) fn pop_frame(&mut self) -> Variant {
        self.halt_pending = false;
        self.break_pending = false;
        match self.frames.pop() {
            Some(f) => f.ret,
            None => Variant::Nothing,
        }
    }

    // ── Control flow flags ───────────────────────────────────────────────────

    pub(crate) fn set_break(&mut self) {
        self.break_pending = true;
    }

    /// Consume a pending `break`, reporting whether there was one.
    pub(crate) fn absorb_break(&mut self) -> bool {
        let was = self.break_pending;
        self.break_pending = false;
        was
    }

    pub(crate) fn set_halt(&mut self) {
        self.halt_pending = true;
    }

    pub(crate) fn halt_pending(&self) -> bool {
        self.halt_pending
    }

    /// `true` when the current instruction sequence must stop unwinding.
    pub(crate) fn interrupted(&self) -> bool {
        self.break_pending || self.halt_pending
    }

    // ── Variable slots ───────────────────────────────────────────────────────

    /// Read a slot; anything missing along the way reads as `Nothing`.
    pub(crate) fn slot_get(&self, slot: &VarSlot) -> Variant {
        let base: Option<&Variant> = match &slot.base {
            SlotBase::Local(n) => self.frame().locals.get(n),
            SlotBase::Global(n) => self.globals.get(n),
            SlotBase::Field(h, n) => self
                .objects
                .get(*h)
                .and_then(|o| o.fields.get(&n.to_lowercase())),
        };
        let mut cur = match base {
            Some(v) => v,
            None => return Variant::Nothing,
        };
        for seg in &slot.path {
            cur = match (seg, cur) {
                (PathSeg::Index(i), Variant::Array(a)) => match a.get(*i) {
                    Some(v) => v,
                    None => return Variant::Nothing,
                },
                (PathSeg::Key(k), Variant::Hash(h)) => match h.get(k) {
                    Some(v) => v,
                    None => return Variant::Nothing,
                },
                _ => return Variant::Nothing,
            };
        }
        cur.clone()
    }

    /// Mutable access to a slot, creating intermediate containers on the
    /// way (an unset value grows into an array or hash as the path
    /// demands).  A subscript applied to an incompatible value is an error.
    pub(crate) fn slot_mut(&mut self, slot: &VarSlot) -> Result<&mut Variant, ScriptError> {
        let base: &mut Variant = match &slot.base {
            SlotBase::Local(n) => self
                .frames
                .last_mut()
                .map(|f| f.locals.entry(n.clone()).or_default())
                .ok_or_else(|| ScriptError::runtime("no active call frame"))?,
            SlotBase::Global(n) => self.globals.entry(n.clone()).or_default(),
            SlotBase::Field(h, n) => {
                let obj = self.objects.get_mut(*h).ok_or_else(|| {
                    ScriptError::runtime(format!("object {h} no longer exists"))
                })?;
                obj.fields.entry(n.to_lowercase()).or_default()
            }
        };
        let mut cur = base;
        for seg in &slot.path {
            match seg {
                PathSeg::Index(i) => {
                    if cur.is_nothing() {
                        *cur = Variant::Array(Vec::new());
                    }
                    match cur {
                        Variant::Array(a) => {
                            if *i >= a.len() {
                                a.resize(*i + 1, Variant::Nothing);
                            }
                            cur = &mut a[*i];
                        }
                        other => {
                            return Err(ScriptError::runtime(format!(
                                "cannot apply an array index to a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }
                PathSeg::Key(k) => {
                    if cur.is_nothing() {
                        *cur = Variant::Hash(HashMap::new());
                    }
                    match cur {
                        Variant::Hash(h) => {
                            cur = h.entry(k.clone()).or_default();
                        }
                        other => {
                            return Err(ScriptError::runtime(format!(
                                "cannot apply a hash key to a {} value",
                                other.type_name()
                            )))
                        }
                    }
                }
            }
        }
        Ok(cur)
    }

    /// Remove a slot: a bare variable disappears from its table, a hash
    /// entry is removed, an array element reverts to `Nothing`.
    pub(crate) fn unset_slot(&mut self, slot: &VarSlot) {
        if slot.path.is_empty() {
            match &slot.base {
                SlotBase::Local(n) => {
                    self.frame_mut().locals.remove(n);
                }
                SlotBase::Global(n) => {
                    self.globals.remove(n);
                }
                SlotBase::Field(h, n) => {
                    if let Some(o) = self.objects.get_mut(*h) {
                        o.fields.remove(&n.to_lowercase());
                    }
                }
            }
            return;
        }
        let base: Option<&mut Variant> = match &slot.base {
            SlotBase::Local(n) => self.frame_mut().locals.get_mut(n),
            SlotBase::Global(n) => self.globals.get_mut(n),
            SlotBase::Field(h, n) => self
                .objects
                .get_mut(*h)
                .and_then(|o| o.fields.get_mut(&n.to_lowercase())),
        };
        if let Some(base) = base {
            unset_in(base, &slot.path);
        }
    }

    pub(crate) fn warning(&mut self, text: &str) {
        self.out.warning(text);
    }
}

fn unset_in(cur: &mut Variant, path: &[PathSeg]) {
    let (seg, rest) = match path.split_first() {
        Some(p) => p,
        None => return,
    };
    if rest.is_empty() {
        match (seg, cur) {
            (PathSeg::Index(i), Variant::Array(a)) => {
                if *i < a.len() {
                    a[*i] = Variant::Nothing;
                    while matches!(a.last(), Some(Variant::Nothing)) {
                        a.pop();
                    }
                }
            }
            (PathSeg::Key(k), Variant::Hash(h)) => {
                h.remove(k);
            }
            _ => {}
        }
        return;
    }
    let next = match (seg, cur) {
        (PathSeg::Index(i), Variant::Array(a)) => a.get_mut(*i),
        (PathSeg::Key(k), Variant::Hash(h)) => h.get_mut(k),
        _ => None,
    };
    if let Some(next) = next {
        unset_in(next, rest);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, path: Vec<PathSeg>) -> VarSlot {
        VarSlot {
            base: SlotBase::Local(name.into()),
            path,
        }
    }

    #[test]
    fn unset_variable_reads_as_nothing() {
        let (ctx, _) = RunContext::collecting();
        assert!(ctx.slot_get(&local("missing", vec![])).is_nothing());
    }

    #[test]
    fn write_then_read() {
        let (mut ctx, _) = RunContext::collecting();
        let slot = local("a", vec![]);
        *ctx.slot_mut(&slot).unwrap() = "x".into();
        assert_eq!(ctx.slot_get(&slot), Variant::String("x".into()));
    }

    #[test]
    fn autovivify_array_with_holes() {
        let (mut ctx, _) = RunContext::collecting();
        let slot = local("a", vec![PathSeg::Index(2)]);
        *ctx.slot_mut(&slot).unwrap() = 5i64.into();
        match ctx.slot_get(&local("a", vec![])) {
            Variant::Array(items) => {
                assert_eq!(items.len(), 3);
                assert!(items[0].is_nothing());
                assert_eq!(items[2], Variant::Integer(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn autovivify_nested_hash() {
        let (mut ctx, _) = RunContext::collecting();
        let slot = local(
            "h",
            vec![PathSeg::Key("outer".into()), PathSeg::Key("inner".into())],
        );
        *ctx.slot_mut(&slot).unwrap() = 1i64.into();
        assert_eq!(ctx.slot_get(&slot), Variant::Integer(1));
    }

    #[test]
    fn subscript_type_mismatch_is_an_error() {
        let (mut ctx, _) = RunContext::collecting();
        let scalar = local("s", vec![]);
        *ctx.slot_mut(&scalar).unwrap() = "text".into();
        assert!(ctx.slot_mut(&local("s", vec![PathSeg::Index(0)])).is_err());
    }

    #[test]
    fn unset_array_element_trims_tail() {
        let (mut ctx, _) = RunContext::collecting();
        *ctx.slot_mut(&local("a", vec![PathSeg::Index(0)])).unwrap() = 1i64.into();
        *ctx.slot_mut(&local("a", vec![PathSeg::Index(1)])).unwrap() = 2i64.into();
        ctx.unset_slot(&local("a", vec![PathSeg::Index(1)]));
        match ctx.slot_get(&local("a", vec![])) {
            Variant::Array(items) => assert_eq!(items.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn frames_isolate_locals() {
        let (mut ctx, _) = RunContext::collecting();
        *ctx.slot_mut(&local("a", vec![])).unwrap() = 1i64.into();
        ctx.push_frame(Handle::NULL, "f".into(), vec![]);
        assert!(ctx.slot_get(&local("a", vec![])).is_nothing());
        ctx.pop_frame();
        assert_eq!(ctx.slot_get(&local("a", vec![])), Variant::Integer(1));
    }

    #[test]
    fn globals_cross_frames() {
        let (mut ctx, _) = RunContext::collecting();
        let slot = VarSlot {
            base: SlotBase::Global("G".into()),
            path: vec![],
        };
        *ctx.slot_mut(&slot).unwrap() = 9i64.into();
        ctx.push_frame(Handle::NULL, "f".into(), vec![]);
        assert_eq!(ctx.slot_get(&slot), Variant::Integer(9));
        ctx.pop_frame();
    }

    #[test]
    fn pop_frame_clears_pending_flags() {
        let (mut ctx, _) = RunContext::collecting();
        ctx.push_frame(Handle::NULL, "f".into(), vec![]);
        ctx.set_halt();
        ctx.set_break();
        ctx.pop_frame();
        assert!(!ctx.halt_pending());
        assert!(!ctx.break_pending);
    }
}
