//! The object system: instances, ownership tree, function dispatch.
//!
//! Objects live in a registry keyed by [`Handle`]; scripts only ever hold
//! handles, so a stale reference is harmless — it simply no longer
//! resolves.  Every object except roots has a parent; destroying an object
//! runs its destructor first, then destroys its children, then detaches
//! every signal connection it participates in.

pub mod class;
pub mod signal;

use std::collections::HashMap;
use std::rc::Rc;

use crate::context::RunContext;
use crate::error::ScriptError;
use crate::variant::{Handle, Variant};

use class::FunctionHandler;
use signal::{ConnId, Connection};

/// A live object instance.
pub struct Object {
    pub handle: Handle,
    pub name: String,
    pub class: String,
    pub parent: Handle,
    pub children: Vec<Handle>,
    /// Instance fields (`@%field`), keyed by lowercase name.
    pub fields: HashMap<String, Variant>,
    /// Per-instance function overrides (`privateimpl`), keyed by lowercase
    /// name.  Checked before the class chain on unqualified calls.
    pub overrides: HashMap<String, FunctionHandler>,
    /// Connections where this object is the emitting side, by signal name.
    pub signal_table: HashMap<String, Vec<ConnId>>,
    /// Connections where this object is the receiving side.
    pub connection_list: Vec<ConnId>,
    /// Set once destruction has started; a dying object cannot be
    /// destroyed again.
    pub dying: bool,
    /// While one of this object's slots runs, who emitted and what.
    pub signal_sender: Handle,
    pub signal_name: String,
}

impl Object {
    fn new(handle: Handle, name: String, class: String, parent: Handle) -> Self {
        Object {
            handle,
            name,
            class,
            parent,
            children: Vec::new(),
            fields: HashMap::new(),
            overrides: HashMap::new(),
            signal_table: HashMap::new(),
            connection_list: Vec::new(),
            dying: false,
            signal_sender: Handle::NULL,
            signal_name: String::new(),
        }
    }
}

/// All live objects plus the signal connection table.
pub struct ObjectRegistry {
    objects: HashMap<Handle, Object>,
    /// Monotonic; handle values are never reused.
    next_handle: u64,
    pub(crate) connections: HashMap<ConnId, Connection>,
    next_conn: u64,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        ObjectRegistry {
            objects: HashMap::new(),
            next_handle: 1,
            connections: HashMap::new(),
            next_conn: 1,
        }
    }

    pub fn get(&self, h: Handle) -> Option<&Object> {
        self.objects.get(&h)
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut Object> {
        self.objects.get_mut(&h)
    }

    pub fn contains(&self, h: Handle) -> bool {
        self.objects.contains_key(&h)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.objects.keys().copied().collect()
    }

    fn alloc_handle(&mut self) -> Handle {
        let h = Handle(self.next_handle);
        self.next_handle += 1;
        h
    }

    pub(crate) fn alloc_conn(&mut self) -> ConnId {
        let id = ConnId(self.next_conn);
        self.next_conn += 1;
        id
    }

    fn insert(&mut self, obj: Object) {
        self.objects.insert(obj.handle, obj);
    }

    fn remove(&mut self, h: Handle) -> Option<Object> {
        self.objects.remove(&h)
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a resolved handler lives, for cache write-back.
enum HandlerLoc {
    Override(Handle),
    Class(String),
}

impl RunContext {
    /// The object behind a handle, or a runtime error for a stale one.
    pub(crate) fn object(&self, h: Handle) -> Result<&Object, ScriptError> {
        self.objects
            .get(h)
            .ok_or_else(|| ScriptError::runtime(format!("object {h} no longer exists")))
    }

    // ── Creation ─────────────────────────────────────────────────────────────

    /// Instantiate `class` and run its constructor.  A failing constructor
    /// (error, or an explicit false return) tears the half-built object
    /// down again and yields the null handle rather than an error.
    pub fn create_object(
        &mut self,
        class: &str,
        parent: Handle,
        name: &str,
        params: Vec<Variant>,
    ) -> Result<Handle, ScriptError> {
        if !self.classes.exists(class) {
            return Err(ScriptError::runtime(format!("unknown class '{class}'")));
        }
        let mut parent = parent;
        if !parent.is_null() && !self.objects.contains(parent) {
            self.warning(&format!(
                "parent object {parent} no longer exists: creating a root object instead"
            ));
            parent = Handle::NULL;
        }

        let h = self.objects.alloc_handle();
        self.objects
            .insert(Object::new(h, name.to_owned(), class.to_owned(), parent));
        if !parent.is_null() {
            if let Some(p) = self.objects.get_mut(parent) {
                p.children.push(h);
            }
        }

        match self.call_object_function(h, "constructor", None, h, params) {
            Ok(ret) => {
                // A constructor that explicitly returns a false value
                // signals failure.
                if !ret.is_nothing() && !ret.as_boolean() {
                    self.destroy_object(h);
                    return Ok(Handle::NULL);
                }
                Ok(h)
            }
            Err(e) => {
                self.warning(&format!("constructor of class '{class}' failed: {e}"));
                self.destroy_object(h);
                Ok(Handle::NULL)
            }
        }
    }

    // ── Destruction ──────────────────────────────────────────────────────────

    /// Destroy an object: destructor first (while the children still
    /// exist), then the children recursively, then every signal connection
    /// it participates in.  Returns `false` for a stale or already-dying
    /// handle.
    pub fn destroy_object(&mut self, h: Handle) -> bool {
        match self.objects.get_mut(h) {
            Some(o) if !o.dying => o.dying = true,
            _ => return false,
        }

        if let Err(e) = self.call_object_function(h, "destructor", None, h, Vec::new()) {
            self.warning(&format!("destructor of object {h} failed: {e}"));
        }

        loop {
            let child = match self.objects.get(h) {
                Some(o) => o.children.first().copied(),
                None => None,
            };
            let child = match child {
                Some(c) => c,
                None => break,
            };
            if !self.destroy_object(child) {
                // Already dying elsewhere on the stack; detach it so this
                // loop terminates.
                if let Some(o) = self.objects.get_mut(h) {
                    o.children.retain(|&c| c != child);
                }
            }
        }

        let as_source: Vec<ConnId> = self
            .objects
            .get(h)
            .map(|o| o.signal_table.values().flatten().copied().collect())
            .unwrap_or_default();
        for id in as_source {
            self.remove_connection(id);
        }
        let as_target: Vec<ConnId> = self
            .objects
            .get(h)
            .map(|o| o.connection_list.clone())
            .unwrap_or_default();
        for id in as_target {
            self.remove_connection(id);
        }

        let parent = self.objects.get(h).map(|o| o.parent).unwrap_or(Handle::NULL);
        if !parent.is_null() {
            if let Some(p) = self.objects.get_mut(parent) {
                p.children.retain(|&c| c != h);
            }
        }
        self.objects.remove(h);
        true
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Search the subtree under `h` for a child matching the class and
    /// name filters (either may be empty).  Immediate children are
    /// examined first, the descent into grandchildren only happens when
    /// none of them matches.
    pub fn find_child(
        &self,
        h: Handle,
        class: &str,
        name: &str,
    ) -> Result<Handle, ScriptError> {
        let o = self.object(h)?;
        let children = o.children.clone();
        for &c in &children {
            if self.child_matches(c, class, name) {
                return Ok(c);
            }
        }
        for &c in &children {
            let found = self.find_child(c, class, name)?;
            if !found.is_null() {
                return Ok(found);
            }
        }
        Ok(Handle::NULL)
    }

    fn child_matches(&self, h: Handle, class: &str, name: &str) -> bool {
        let o = match self.objects.get(h) {
            Some(o) => o,
            None => return false,
        };
        let class_ok = class.is_empty()
            || o.class.eq_ignore_ascii_case(class)
            || self.classes.is_descendant(&o.class, class);
        let name_ok = name.is_empty() || o.name.eq_ignore_ascii_case(name);
        class_ok && name_ok
    }

    // ── Function dispatch ────────────────────────────────────────────────────

    /// Call an object function.
    ///
    /// Unqualified calls check the instance overrides first, then walk the
    /// class chain; a `$class:fn` qualifier skips the overrides and starts
    /// the walk at the named base class.  `caller` is the object the
    /// invoking code runs on behalf of; internal functions insist it be
    /// the receiver itself.
    pub fn call_object_function(
        &mut self,
        h: Handle,
        name: &str,
        qualifier: Option<&str>,
        caller: Handle,
        params: Vec<Variant>,
    ) -> Result<Variant, ScriptError> {
        let fn_l = name.to_lowercase();
        let (loc, handler) = {
            let obj = self.object(h)?;
            match qualifier {
                None => {
                    if let Some(hd) = obj.overrides.get(&fn_l) {
                        (HandlerLoc::Override(h), hd.clone())
                    } else {
                        match self.classes.resolve(&obj.class, &fn_l) {
                            Some((cls, hd)) => (HandlerLoc::Class(cls), hd),
                            None => {
                                return Err(ScriptError::runtime(format!(
                                    "cannot find object function '{name}' for objects of class '{}'",
                                    obj.class
                                )))
                            }
                        }
                    }
                }
                Some(q) => {
                    // The qualifier must name a class on the inheritance
                    // chain of the object.
                    let mut cur = Some(obj.class.clone());
                    let mut start = None;
                    while let Some(cn) = cur {
                        if cn.eq_ignore_ascii_case(q) {
                            start = Some(cn);
                            break;
                        }
                        cur = self.classes.get(&cn).and_then(|c| c.parent.clone());
                    }
                    let start = start.ok_or_else(|| {
                        ScriptError::runtime(format!(
                            "class '{q}' is not a base class of '{}'",
                            obj.class
                        ))
                    })?;
                    match self.classes.resolve(&start, &fn_l) {
                        Some((cls, hd)) => (HandlerLoc::Class(cls), hd),
                        None => {
                            return Err(ScriptError::runtime(format!(
                                "cannot find object function '{name}' in class '{q}'"
                            )))
                        }
                    }
                }
            }
        };

        if handler.is_internal() && caller != h {
            return Err(ScriptError::runtime(format!(
                "the function '{name}' is internal to its object and cannot be called from outside"
            )));
        }

        match handler {
            FunctionHandler::Core(f) => f(self, h, &params),
            FunctionHandler::Script(s) => {
                let code = match &s.cache {
                    Some(rc) => Rc::clone(rc),
                    None => {
                        let (items, warnings) = crate::parser::parse(&s.code)?;
                        for w in &warnings {
                            self.out.warning(&w.to_string());
                        }
                        let rc = Rc::new(items);
                        match &loc {
                            HandlerLoc::Override(oh) => {
                                if let Some(o) = self.objects.get_mut(*oh) {
                                    if let Some(FunctionHandler::Script(sh)) =
                                        o.overrides.get_mut(&fn_l)
                                    {
                                        sh.cache = Some(Rc::clone(&rc));
                                    }
                                }
                            }
                            HandlerLoc::Class(cls) => {
                                self.classes.store_cache(cls, &fn_l, Rc::clone(&rc));
                            }
                        }
                        rc
                    }
                };

                self.push_frame(h, fn_l, params);
                let mut result = Ok(());
                for item in code.iter() {
                    result = item.execute(self);
                    if result.is_err() || self.halt_pending() {
                        break;
                    }
                }
                let ret = self.pop_frame();
                result.map(|_| ret)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_monotonic_and_never_reused() {
        let (mut ctx, _) = RunContext::collecting();
        let a = ctx.create_object("object", Handle::NULL, "a", vec![]).unwrap();
        let b = ctx.create_object("object", Handle::NULL, "b", vec![]).unwrap();
        assert!(b > a);
        assert!(ctx.destroy_object(a));
        let c = ctx.create_object("object", Handle::NULL, "c", vec![]).unwrap();
        assert!(c > b);
        assert!(ctx.object(a).is_err()); // stale handle stays stale
    }

    #[test]
    fn unknown_class_is_an_error() {
        let (mut ctx, _) = RunContext::collecting();
        assert!(ctx.create_object("ghost", Handle::NULL, "", vec![]).is_err());
    }

    #[test]
    fn destroying_a_parent_takes_the_children() {
        let (mut ctx, _) = RunContext::collecting();
        let p = ctx.create_object("object", Handle::NULL, "p", vec![]).unwrap();
        let c = ctx.create_object("object", p, "c", vec![]).unwrap();
        let gc = ctx.create_object("object", c, "gc", vec![]).unwrap();
        assert!(ctx.destroy_object(p));
        assert!(ctx.object(c).is_err());
        assert!(ctx.object(gc).is_err());
        assert!(ctx.objects.is_empty());
    }

    #[test]
    fn destroy_is_idempotent_per_handle() {
        let (mut ctx, _) = RunContext::collecting();
        let a = ctx.create_object("object", Handle::NULL, "a", vec![]).unwrap();
        assert!(ctx.destroy_object(a));
        assert!(!ctx.destroy_object(a));
    }

    #[test]
    fn find_child_prefers_immediate_children() {
        let (mut ctx, _) = RunContext::collecting();
        let root = ctx.create_object("object", Handle::NULL, "root", vec![]).unwrap();
        let a = ctx.create_object("object", root, "x", vec![]).unwrap();
        // A deeper object with the same name, created first in tree order.
        let _deep = ctx.create_object("object", a, "y", vec![]).unwrap();
        let b = ctx.create_object("object", root, "y", vec![]).unwrap();
        assert_eq!(ctx.find_child(root, "", "y").unwrap(), b);
    }

    #[test]
    fn find_child_descends_when_needed() {
        let (mut ctx, _) = RunContext::collecting();
        let root = ctx.create_object("object", Handle::NULL, "root", vec![]).unwrap();
        let mid = ctx.create_object("object", root, "mid", vec![]).unwrap();
        let deep = ctx.create_object("object", mid, "deep", vec![]).unwrap();
        assert_eq!(ctx.find_child(root, "", "deep").unwrap(), deep);
        assert_eq!(ctx.find_child(root, "", "absent").unwrap(), Handle::NULL);
    }

    #[test]
    fn core_functions_resolve_through_dispatch() {
        let (mut ctx, _) = RunContext::collecting();
        let p = ctx.create_object("object", Handle::NULL, "p", vec![]).unwrap();
        let c = ctx.create_object("object", p, "kid", vec![]).unwrap();
        let name = ctx
            .call_object_function(c, "name", None, Handle::NULL, vec![])
            .unwrap();
        assert_eq!(name, Variant::String("kid".into()));
        let parent = ctx
            .call_object_function(c, "parent", None, Handle::NULL, vec![])
            .unwrap();
        assert_eq!(parent, Variant::HObject(p));
        let count = ctx
            .call_object_function(p, "childCount", None, Handle::NULL, vec![])
            .unwrap();
        assert_eq!(count, Variant::Integer(1));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let (mut ctx, _) = RunContext::collecting();
        let a = ctx.create_object("object", Handle::NULL, "a", vec![]).unwrap();
        let err = ctx
            .call_object_function(a, "levitate", None, Handle::NULL, vec![])
            .unwrap_err();
        assert!(err.to_string().contains("levitate"));
    }
}
