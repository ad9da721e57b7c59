//! Class definitions and the built-in root class.
//!
//! A class is a name, an optional parent name, and a table of function
//! handlers keyed by lowercase name.  Script handlers keep their body as
//! raw text and compile it on first call; the compiled form is cached in
//! the handler so later calls and other instances reuse it.  The root
//! class `object` is always present and implemented by native functions.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Instruction;
use crate::context::RunContext;
use crate::error::ScriptError;
use crate::variant::{Handle, Variant};

/// Native function handler: receives the context, the receiving object and
/// the call parameters.
pub type CoreFn = fn(&mut RunContext, Handle, &[Variant]) -> Result<Variant, ScriptError>;

/// A script-defined function handler.
#[derive(Debug, Clone)]
pub struct ScriptHandler {
    /// Raw body text including the outer braces.
    pub code: String,
    /// Internal functions may only be called with the receiver itself as
    /// the caller.
    pub internal: bool,
    /// Compiled form, filled on first call.
    pub cache: Option<Rc<Vec<Instruction>>>,
}

impl ScriptHandler {
    pub fn new(code: impl Into<String>, internal: bool) -> Self {
        ScriptHandler {
            code: code.into(),
            internal,
            cache: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FunctionHandler {
    Script(ScriptHandler),
    Core(CoreFn),
}

impl FunctionHandler {
    pub fn is_internal(&self) -> bool {
        matches!(self, FunctionHandler::Script(s) if s.internal)
    }
}

/// One class: parent link plus handler table.
#[derive(Debug, Clone)]
pub struct ObjectClass {
    pub name: String,
    /// `None` only for the root class.
    pub parent: Option<String>,
    /// Keyed by lowercase function name.
    pub handlers: HashMap<String, FunctionHandler>,
}

impl ObjectClass {
    pub fn new(name: impl Into<String>, parent: Option<String>) -> Self {
        ObjectClass {
            name: name.into(),
            parent,
            handlers: HashMap::new(),
        }
    }
}

/// All defined classes, keyed by lowercase name.
pub struct ClassRegistry {
    classes: HashMap<String, ObjectClass>,
}

pub const ROOT_CLASS: &str = "object";

impl ClassRegistry {
    pub fn new() -> Self {
        let mut root = ObjectClass::new(ROOT_CLASS, None);
        let core: &[(&str, CoreFn)] = &[
            ("constructor", core_constructor),
            ("destructor", core_destructor),
            ("name", core_name),
            ("classname", core_classname),
            ("parent", core_parent),
            ("childcount", core_childcount),
            ("children", core_children),
            ("findchild", core_findchild),
            ("emit", core_emit),
            ("signalsender", core_signalsender),
            ("signalname", core_signalname),
        ];
        for (name, f) in core {
            root.handlers
                .insert((*name).to_owned(), FunctionHandler::Core(*f));
        }
        let mut classes = HashMap::new();
        classes.insert(ROOT_CLASS.to_owned(), root);
        ClassRegistry { classes }
    }

    pub fn get(&self, name: &str) -> Option<&ObjectClass> {
        self.classes.get(&name.to_lowercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ObjectClass> {
        self.classes.get_mut(&name.to_lowercase())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.classes.contains_key(&name.to_lowercase())
    }

    pub fn insert(&mut self, class: ObjectClass) {
        self.classes.insert(class.name.to_lowercase(), class);
    }

    pub fn remove(&mut self, name: &str) {
        self.classes.remove(&name.to_lowercase());
    }

    /// Walk the parent chain of `name` looking for `ancestor`.
    pub fn is_descendant(&self, name: &str, ancestor: &str) -> bool {
        let ancestor = ancestor.to_lowercase();
        let mut cur = self.get(name).and_then(|c| c.parent.clone());
        while let Some(p) = cur {
            if p.to_lowercase() == ancestor {
                return true;
            }
            cur = self.get(&p).and_then(|c| c.parent.clone());
        }
        false
    }

    /// All classes whose parent chain passes through `name`.
    pub fn descendants_of(&self, name: &str) -> Vec<String> {
        self.classes
            .keys()
            .filter(|k| self.is_descendant(k, name))
            .cloned()
            .collect()
    }

    /// Find a handler walking up the inheritance chain from `class`.
    /// Returns the owning class name (lowercase) and a copy of the handler.
    pub fn resolve(&self, class: &str, fn_name: &str) -> Option<(String, FunctionHandler)> {
        let fn_name = fn_name.to_lowercase();
        let mut cur = Some(class.to_lowercase());
        while let Some(name) = cur {
            let c = self.classes.get(&name)?;
            if let Some(h) = c.handlers.get(&fn_name) {
                return Some((name, h.clone()));
            }
            cur = c.parent.as_ref().map(|p| p.to_lowercase());
        }
        None
    }

    /// Write a freshly compiled body back into the handler it came from.
    pub fn store_cache(&mut self, class: &str, fn_name: &str, cache: Rc<Vec<Instruction>>) {
        if let Some(c) = self.classes.get_mut(&class.to_lowercase()) {
            if let Some(FunctionHandler::Script(s)) = c.handlers.get_mut(&fn_name.to_lowercase()) {
                s.cache = Some(cache);
            }
        }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Root class core handlers ──────────────────────────────────────────────────

fn core_constructor(
    _ctx: &mut RunContext,
    _this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    Ok(Variant::Nothing)
}

/// The base destructor announces the death of the object to anyone
/// connected to its `destroyed` signal.
fn core_destructor(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    ctx.emit_signal(this, "destroyed", &[])?;
    Ok(Variant::Nothing)
}

fn core_name(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::String(o.name.clone()))
}

fn core_classname(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::String(o.class.clone()))
}

fn core_parent(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::HObject(o.parent))
}

fn core_childcount(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::Integer(o.children.len() as i64))
}

fn core_children(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::Array(
        o.children.iter().map(|h| Variant::HObject(*h)).collect(),
    ))
}

/// `$findChild(<class>,<name>)` — empty filters match anything.
fn core_findchild(
    ctx: &mut RunContext,
    this: Handle,
    params: &[Variant],
) -> Result<Variant, ScriptError> {
    let class = params.first().map(Variant::as_string).unwrap_or_default();
    let name = params.get(1).map(Variant::as_string).unwrap_or_default();
    Ok(Variant::HObject(ctx.find_child(this, &class, &name)?))
}

/// `$emit(<signal>,params...)` — returns the number of slots reached.
fn core_emit(
    ctx: &mut RunContext,
    this: Handle,
    params: &[Variant],
) -> Result<Variant, ScriptError> {
    let signal = match params.first() {
        Some(s) => s.as_string(),
        None => return Err(ScriptError::runtime("$emit requires a signal name")),
    };
    if signal.is_empty() {
        return Err(ScriptError::runtime("$emit requires a non-empty signal name"));
    }
    let count = ctx.emit_signal(this, &signal, &params[1..])?;
    Ok(Variant::Integer(count))
}

fn core_signalsender(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::HObject(o.signal_sender))
}

fn core_signalname(
    ctx: &mut RunContext,
    this: Handle,
    _params: &[Variant],
) -> Result<Variant, ScriptError> {
    let o = ctx.object(this)?;
    Ok(Variant::String(o.signal_name.clone()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_class_is_always_present() {
        let reg = ClassRegistry::new();
        assert!(reg.exists("object"));
        assert!(reg.exists("Object")); // case-insensitive
    }

    #[test]
    fn resolve_walks_the_chain() {
        let mut reg = ClassRegistry::new();
        let mut c = ObjectClass::new("widget", Some(ROOT_CLASS.to_owned()));
        c.handlers
            .insert("draw".into(), FunctionHandler::Script(ScriptHandler::new("{}", false)));
        reg.insert(c);

        // Own handler.
        let (owner, _) = reg.resolve("widget", "draw").expect("missing draw");
        assert_eq!(owner, "widget");
        // Inherited handler.
        let (owner, _) = reg.resolve("widget", "name").expect("missing name");
        assert_eq!(owner, "object");
        // Unknown.
        assert!(reg.resolve("widget", "fly").is_none());
    }

    #[test]
    fn descendants() {
        let mut reg = ClassRegistry::new();
        reg.insert(ObjectClass::new("a", Some(ROOT_CLASS.to_owned())));
        reg.insert(ObjectClass::new("b", Some("a".to_owned())));
        reg.insert(ObjectClass::new("c", Some("b".to_owned())));

        assert!(reg.is_descendant("c", "a"));
        assert!(!reg.is_descendant("a", "c"));
        let mut d = reg.descendants_of("a");
        d.sort();
        assert_eq!(d, vec!["b".to_string(), "c".to_string()]);
    }
}
