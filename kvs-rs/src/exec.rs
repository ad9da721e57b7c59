//! The tree-walking evaluator.
//!
//! Instructions execute against a [`RunContext`]; data items evaluate to
//! [`Variant`]s, writable data items resolve to [`VarSlot`]s.  Loop exits
//! (`break`) and script termination (`halt`/`return`) are pending flags on
//! the context that every instruction sequence checks between steps, so a
//! pending flag unwinds the tree without threading a special result type
//! through every call.

use regex::Regex;

use crate::ast::{
    BinaryOp, ClassDef, Command, CommandKind, Data, DataKind, Expr, ExprKind, FunctionCall,
    Instruction, OpKind, Operation, SwitchLabel, SwitchLabelKind, TargetBase, TargetSeg, UnaryOp,
};
use crate::context::{PathSeg, RunContext, SlotBase, VarSlot};
use crate::error::ScriptError;
use crate::object::class::{FunctionHandler, ObjectClass, ScriptHandler, ROOT_CLASS};
use crate::variant::{Handle, Number, Variant};

impl Instruction {
    pub fn execute(&self, c: &mut RunContext) -> Result<(), ScriptError> {
        match self {
            Instruction::Block { items, .. } => {
                for item in items {
                    item.execute(c)?;
                    if c.interrupted() {
                        break;
                    }
                }
                Ok(())
            }
            Instruction::Command(cmd) => cmd.execute(c),
        }
    }
}

impl Command {
    fn execute(&self, c: &mut RunContext) -> Result<(), ScriptError> {
        match &self.kind {
            CommandKind::Simple { name, params } => execute_simple(c, name, params),
            CommandKind::Operation(op) => op.execute(c),
            CommandKind::VoidFunctionCall(d) => {
                d.evaluate(c)?;
                Ok(())
            }
            CommandKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if cond.eval(c)?.as_boolean() {
                    if let Some(b) = then_branch {
                        b.execute(c)?;
                    }
                } else if let Some(b) = else_branch {
                    b.execute(c)?;
                }
                Ok(())
            }
            CommandKind::While { cond, body } => {
                loop {
                    if !cond.eval(c)?.as_boolean() {
                        break;
                    }
                    if let Some(b) = body {
                        b.execute(c)?;
                    }
                    if c.halt_pending() || c.absorb_break() {
                        break;
                    }
                }
                Ok(())
            }
            CommandKind::DoWhile { body, cond } => {
                loop {
                    if let Some(b) = body {
                        b.execute(c)?;
                    }
                    if c.halt_pending() || c.absorb_break() {
                        break;
                    }
                    if !cond.eval(c)?.as_boolean() {
                        break;
                    }
                }
                Ok(())
            }
            CommandKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(i) = init {
                    i.execute(c)?;
                }
                loop {
                    if let Some(e) = cond {
                        if !e.eval(c)?.as_boolean() {
                            break;
                        }
                    }
                    if let Some(b) = body {
                        b.execute(c)?;
                    }
                    if c.halt_pending() || c.absorb_break() {
                        break;
                    }
                    if let Some(u) = update {
                        u.execute(c)?;
                    }
                }
                Ok(())
            }
            CommandKind::Foreach {
                target,
                items,
                body,
            } => execute_foreach(c, target, items, body),
            CommandKind::Switch { subject, labels } => execute_switch(c, subject, labels),
            CommandKind::Class(def) => execute_class(c, def),
            CommandKind::PrivateImpl { target, name, body } => {
                execute_privateimpl(c, target, name, body)
            }
            CommandKind::Unset { vars } => {
                for v in vars {
                    let slot = v.evaluate_slot(c)?;
                    c.unset_slot(&slot);
                }
                Ok(())
            }
            CommandKind::Break => {
                c.set_break();
                Ok(())
            }
            CommandKind::Halt => {
                c.set_halt();
                Ok(())
            }
        }
    }
}

// ── Plain commands ────────────────────────────────────────────────────────────

fn execute_simple(c: &mut RunContext, name: &str, params: &[Data]) -> Result<(), ScriptError> {
    match name.to_ascii_lowercase().as_str() {
        "echo" => {
            let mut parts = Vec::with_capacity(params.len());
            for p in params {
                parts.push(p.evaluate(c)?.as_string());
            }
            let line = parts.join(" ");
            c.out.output(&line);
            Ok(())
        }
        "return" => {
            let value = match params.len() {
                0 => Variant::Nothing,
                1 => params[0].evaluate(c)?,
                _ => {
                    let mut parts = Vec::with_capacity(params.len());
                    for p in params {
                        parts.push(p.evaluate(c)?.as_string());
                    }
                    Variant::String(parts.join(" "))
                }
            };
            c.frame_mut().ret = value;
            c.set_halt();
            Ok(())
        }
        "delete" => {
            let v = match params.first() {
                Some(p) => p.evaluate(c)?,
                None => {
                    return Err(ScriptError::runtime(
                        "the 'delete' command needs an object handle",
                    ))
                }
            };
            match v.as_handle() {
                Some(h) if !h.is_null() => {
                    if !c.destroy_object(h) {
                        c.warning(&format!("'delete': object {h} no longer exists"));
                    }
                }
                _ => c.warning("'delete': the parameter is not an object handle"),
            }
            Ok(())
        }
        "connect" => {
            let (source, signal, target, slot) = signal_command_params(c, params, "connect")?;
            if !c.connect_signal(source, &signal, target, &slot) {
                c.warning(&format!(
                    "'connect': cannot connect signal '{signal}' to slot '{slot}'"
                ));
            }
            Ok(())
        }
        "disconnect" => {
            let (source, signal, target, slot) = signal_command_params(c, params, "disconnect")?;
            if !c.disconnect_signal(source, &signal, target, &slot) {
                c.warning(&format!(
                    "'disconnect': signal '{signal}' was not connected to slot '{slot}'"
                ));
            }
            Ok(())
        }
        other => Err(ScriptError::runtime(format!("unknown command '{other}'"))),
    }
}

fn signal_command_params(
    c: &mut RunContext,
    params: &[Data],
    cmd: &str,
) -> Result<(Handle, String, Handle, String), ScriptError> {
    if params.len() != 4 {
        return Err(ScriptError::runtime(format!(
            "the '{cmd}' command needs four parameters: source, signal, target, slot"
        )));
    }
    let source_v = params[0].evaluate(c)?;
    let source = want_object(c, &source_v)?;
    let signal = params[1].evaluate(c)?.as_string();
    let target_v = params[2].evaluate(c)?;
    let target = want_object(c, &target_v)?;
    let slot = params[3].evaluate(c)?.as_string();
    Ok((source, signal, target, slot))
}

fn want_object(c: &RunContext, v: &Variant) -> Result<Handle, ScriptError> {
    match v.as_handle() {
        Some(h) if !h.is_null() && c.objects.contains(h) => Ok(h),
        Some(h) if !h.is_null() => Err(ScriptError::runtime(format!(
            "object {h} no longer exists"
        ))),
        _ => Err(ScriptError::runtime("null object reference")),
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

impl Operation {
    fn execute(&self, c: &mut RunContext) -> Result<(), ScriptError> {
        let slot = self.target.evaluate_slot(c)?;
        match self.op {
            OpKind::Assign => {
                let v = self.rhs_value(c)?;
                *c.slot_mut(&slot)? = v;
            }
            OpKind::Increment => {
                let cur = want_number(&c.slot_get(&slot))?;
                *c.slot_mut(&slot)? = arith(BinaryOp::Add, cur, Number::Int(1))?;
            }
            OpKind::Decrement => {
                let cur = want_number(&c.slot_get(&slot))?;
                *c.slot_mut(&slot)? = arith(BinaryOp::Sub, cur, Number::Int(1))?;
            }
            OpKind::AddAssign
            | OpKind::SubAssign
            | OpKind::MulAssign
            | OpKind::DivAssign
            | OpKind::ModAssign => {
                let cur = want_number(&c.slot_get(&slot))?;
                let rhs = want_number(&self.rhs_value(c)?)?;
                let op = match self.op {
                    OpKind::AddAssign => BinaryOp::Add,
                    OpKind::SubAssign => BinaryOp::Sub,
                    OpKind::MulAssign => BinaryOp::Mul,
                    OpKind::DivAssign => BinaryOp::Div,
                    _ => BinaryOp::Mod,
                };
                *c.slot_mut(&slot)? = arith(op, cur, rhs)?;
            }
            OpKind::AppendAssign => {
                let mut s = c.slot_get(&slot).as_string();
                s.push_str(&self.rhs_value(c)?.as_string());
                *c.slot_mut(&slot)? = Variant::String(s);
            }
        }
        Ok(())
    }

    fn rhs_value(&self, c: &mut RunContext) -> Result<Variant, ScriptError> {
        match &self.rhs {
            Some(d) => d.evaluate(c),
            None => Ok(Variant::Nothing),
        }
    }
}

// ── foreach ───────────────────────────────────────────────────────────────────

fn execute_foreach(
    c: &mut RunContext,
    target: &Data,
    items: &[Data],
    body: &Instruction,
) -> Result<(), ScriptError> {
    let slot = target.evaluate_slot(c)?;
    'outer: for item in items {
        let v = item.evaluate(c)?;
        // Arrays iterate their elements (holes are skipped), hashes their
        // values, an unset value contributes nothing, a scalar iterates
        // once.
        let values: Vec<Variant> = match v {
            Variant::Array(a) => a.into_iter().filter(|x| !x.is_nothing()).collect(),
            Variant::Hash(h) => h.into_values().collect(),
            Variant::Nothing => Vec::new(),
            other => vec![other],
        };
        for value in values {
            *c.slot_mut(&slot)? = value;
            body.execute(c)?;
            if c.halt_pending() || c.absorb_break() {
                break 'outer;
            }
        }
    }
    Ok(())
}

// ── switch ────────────────────────────────────────────────────────────────────

fn execute_switch(
    c: &mut RunContext,
    subject: &Expr,
    labels: &[SwitchLabel],
) -> Result<(), ScriptError> {
    let subj = subject.eval(c)?;
    let mut matched = false;
    for label in labels {
        if !matched {
            if !label_matches(c, label, &subj)? {
                continue;
            }
            matched = true;
        }
        // Once a label matched, every following body runs unconditionally
        // until a break.
        if let Some(body) = &label.body {
            body.execute(c)?;
        }
        if c.halt_pending() || c.absorb_break() || label.terminating_break {
            break;
        }
    }
    Ok(())
}

fn label_matches(
    c: &mut RunContext,
    label: &SwitchLabel,
    subj: &Variant,
) -> Result<bool, ScriptError> {
    let param = match &label.param {
        Some(p) => p.evaluate(c)?,
        None => return Ok(label.kind == SwitchLabelKind::Default),
    };
    match label.kind {
        SwitchLabelKind::Default => Ok(true),
        SwitchLabelKind::Case => {
            // Numeric when both sides are numbers, case-insensitive string
            // comparison otherwise.
            match (subj.as_number(), param.as_number()) {
                (Some(a), Some(b)) => Ok(a.num_eq(b)),
                _ => Ok(subj.as_string().eq_ignore_ascii_case(&param.as_string())),
            }
        }
        SwitchLabelKind::Match => {
            let re = wildcard_to_regex(&param.as_string());
            match Regex::new(&re) {
                Ok(re) => Ok(re.is_match(&subj.as_string())),
                Err(e) => Err(ScriptError::runtime(format!(
                    "invalid 'match' pattern: {e}"
                ))),
            }
        }
        SwitchLabelKind::Regexp => {
            let pat = format!("(?i)^(?:{})$", param.as_string());
            match Regex::new(&pat) {
                Ok(re) => Ok(re.is_match(&subj.as_string())),
                Err(e) => Err(ScriptError::runtime(format!(
                    "invalid 'regexp' pattern: {e}"
                ))),
            }
        }
    }
}

/// `*` and `?` wildcards to an anchored case-insensitive regex; everything
/// else is matched literally.
fn wildcard_to_regex(pat: &str) -> String {
    let mut re = String::with_capacity(pat.len() + 8);
    re.push_str("(?i)^");
    for ch in pat.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    re
}

// ── class / privateimpl ───────────────────────────────────────────────────────

fn execute_class(c: &mut RunContext, def: &ClassDef) -> Result<(), ScriptError> {
    let name = match def.names.first() {
        Some(d) => d.evaluate(c)?.as_string(),
        None => String::new(),
    };
    if name.is_empty() {
        return Err(ScriptError::runtime("empty class name in 'class'"));
    }
    if name.eq_ignore_ascii_case(ROOT_CLASS) {
        return Err(ScriptError::runtime("cannot redefine the root class"));
    }
    let parent = match def.names.get(1) {
        Some(d) => {
            let p = d.evaluate(c)?.as_string();
            if p.is_empty() {
                ROOT_CLASS.to_owned()
            } else {
                p
            }
        }
        None => ROOT_CLASS.to_owned(),
    };
    if !c.classes.exists(&parent) {
        return Err(ScriptError::runtime(format!(
            "unknown parent class '{parent}'"
        )));
    }
    if parent.eq_ignore_ascii_case(&name) || c.classes.is_descendant(&parent, &name) {
        return Err(ScriptError::runtime(format!(
            "class '{name}' cannot inherit from itself"
        )));
    }

    // Redefining an existing class first destroys every instance of it and
    // of its subclasses, and drops the subclass definitions: their bodies
    // were compiled against the old shape.
    if c.classes.exists(&name) {
        let mut doomed: Vec<String> = c.classes.descendants_of(&name);
        doomed.push(name.to_lowercase());
        for h in c.objects.handles() {
            let cls = match c.objects.get(h) {
                Some(o) => o.class.to_lowercase(),
                None => continue,
            };
            if doomed.iter().any(|d| *d == cls) {
                c.destroy_object(h);
            }
        }
        for d in &doomed {
            c.classes.remove(d);
        }
    }

    let mut class = ObjectClass::new(name, Some(parent));
    for m in &def.members {
        class.handlers.insert(
            m.name.to_lowercase(),
            FunctionHandler::Script(ScriptHandler::new(m.body.clone(), m.internal)),
        );
    }
    c.classes.insert(class);
    Ok(())
}

fn execute_privateimpl(
    c: &mut RunContext,
    target: &Data,
    name: &Data,
    body: &str,
) -> Result<(), ScriptError> {
    let v = target.evaluate(c)?;
    let h = want_object(c, &v)?;
    let fn_name = name.evaluate(c)?.as_string().to_lowercase();
    if fn_name.is_empty() {
        return Err(ScriptError::runtime(
            "'privateimpl' needs a non-empty function name",
        ));
    }
    let empty = block_inner(body).trim().is_empty();
    if let Some(o) = c.objects.get_mut(h) {
        if empty {
            // An empty body removes a previous per-instance override.
            o.overrides.remove(&fn_name);
        } else {
            o.overrides.insert(
                fn_name,
                FunctionHandler::Script(ScriptHandler::new(body, false)),
            );
        }
    }
    Ok(())
}

/// The text between the outer braces of a captured block body.
fn block_inner(body: &str) -> &str {
    body.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(body)
}

// ── Data evaluation ───────────────────────────────────────────────────────────

impl Data {
    /// Evaluate for reading.
    pub fn evaluate(&self, c: &mut RunContext) -> Result<Variant, ScriptError> {
        match &self.kind {
            DataKind::Literal(s) => Ok(Variant::String(s.clone())),
            DataKind::Composite(pieces) => {
                let mut s = String::new();
                for p in pieces {
                    s.push_str(&p.evaluate(c)?.as_string());
                }
                Ok(Variant::String(s))
            }
            DataKind::Expression(e) => e.eval(c),
            DataKind::FunctionCall(f) => call_core_function(c, f),
            DataKind::Target(chain) => {
                let mut cur = match &chain.base {
                    TargetBase::Local(n) => c.slot_get(&VarSlot {
                        base: SlotBase::Local(n.clone()),
                        path: vec![],
                    }),
                    TargetBase::Global(n) => c.slot_get(&VarSlot {
                        base: SlotBase::Global(n.clone()),
                        path: vec![],
                    }),
                    TargetBase::This => Variant::HObject(c.frame().this),
                };
                for seg in &chain.path {
                    cur = eval_segment(c, cur, seg)?;
                }
                Ok(cur)
            }
        }
    }

    /// Resolve to a writable slot.
    pub fn evaluate_slot(&self, c: &mut RunContext) -> Result<VarSlot, ScriptError> {
        let chain = match &self.kind {
            DataKind::Target(t) => t,
            _ => {
                return Err(ScriptError::runtime(
                    "the target of the operation is not a variable",
                ))
            }
        };
        let mut segs = chain.path.iter();
        let base = match &chain.base {
            TargetBase::Local(n) => SlotBase::Local(n.clone()),
            TargetBase::Global(n) => SlotBase::Global(n.clone()),
            TargetBase::This => {
                let this = c.frame().this;
                if this.is_null() {
                    return Err(ScriptError::runtime(
                        "'@' used outside of an object function",
                    ));
                }
                match segs.next() {
                    Some(TargetSeg::Field(f)) => SlotBase::Field(this, f.clone()),
                    _ => {
                        return Err(ScriptError::runtime(
                            "'@' alone is not a writable variable",
                        ))
                    }
                }
            }
        };
        let mut slot = VarSlot { base, path: vec![] };
        for seg in segs {
            match seg {
                TargetSeg::Index(e) => {
                    let idx = want_index(&e.eval(c)?)?;
                    slot.path.push(PathSeg::Index(idx));
                }
                TargetSeg::Key(d) => {
                    let key = d.evaluate(c)?.as_string();
                    slot.path.push(PathSeg::Key(key));
                }
                TargetSeg::Field(f) => {
                    // Hop onto the object the value so far names.
                    let v = c.slot_get(&slot);
                    let h = want_object(c, &v)?;
                    slot = VarSlot {
                        base: SlotBase::Field(h, f.clone()),
                        path: vec![],
                    };
                }
                TargetSeg::Method { .. } => {
                    return Err(ScriptError::runtime(
                        "cannot assign to the result of a function call",
                    ))
                }
            }
        }
        Ok(slot)
    }
}

fn eval_segment(
    c: &mut RunContext,
    cur: Variant,
    seg: &TargetSeg,
) -> Result<Variant, ScriptError> {
    match seg {
        TargetSeg::Index(e) => {
            let idx = want_index(&e.eval(c)?)?;
            Ok(match cur {
                Variant::Array(a) => a.into_iter().nth(idx).unwrap_or(Variant::Nothing),
                _ => Variant::Nothing,
            })
        }
        TargetSeg::Key(d) => {
            let key = d.evaluate(c)?.as_string();
            Ok(match cur {
                Variant::Hash(mut h) => h.remove(&key).unwrap_or(Variant::Nothing),
                _ => Variant::Nothing,
            })
        }
        TargetSeg::Field(f) => {
            let h = want_object(c, &cur)?;
            Ok(c.object(h)?
                .fields
                .get(&f.to_lowercase())
                .cloned()
                .unwrap_or(Variant::Nothing))
        }
        TargetSeg::Method {
            qualifier,
            name,
            args,
        } => {
            let h = want_object(c, &cur)?;
            let mut argv = Vec::with_capacity(args.len());
            for a in args {
                argv.push(a.evaluate(c)?);
            }
            let caller = c.frame().this;
            c.call_object_function(h, name, qualifier.as_deref(), caller, argv)
        }
    }
}

fn want_index(v: &Variant) -> Result<usize, ScriptError> {
    match v.as_integer() {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(ScriptError::runtime(format!(
            "array index {n} is negative"
        ))),
        None => Err(ScriptError::runtime(format!(
            "the value '{v}' is not a valid array index"
        ))),
    }
}

// ── Core functions ────────────────────────────────────────────────────────────

fn call_core_function(c: &mut RunContext, f: &FunctionCall) -> Result<Variant, ScriptError> {
    // $0, $1, ...: positional parameters of the running function.
    if f.name.chars().all(|ch| ch.is_ascii_digit()) {
        let idx: usize = f
            .name
            .parse()
            .map_err(|_| ScriptError::runtime(format!("bad parameter index '${}'", f.name)))?;
        return Ok(c.frame().params.get(idx).cloned().unwrap_or(Variant::Nothing));
    }

    let mut argv = Vec::with_capacity(f.args.len());
    for a in &f.args {
        argv.push(a.evaluate(c)?);
    }

    match f.name.to_ascii_lowercase().as_str() {
        "new" => {
            let class = argv.first().map(Variant::as_string).unwrap_or_default();
            if class.is_empty() {
                return Err(ScriptError::runtime("$new requires a class name"));
            }
            // An omitted or empty parent parameter creates a root object.
            let parent = match argv.get(1) {
                Some(v) if !v.as_string().is_empty() => v.as_handle().ok_or_else(|| {
                    ScriptError::runtime("$new: the parent parameter is not an object handle")
                })?,
                _ => Handle::NULL,
            };
            let name = argv.get(2).map(Variant::as_string).unwrap_or_default();
            let params = if argv.len() > 3 {
                argv[3..].to_vec()
            } else {
                Vec::new()
            };
            let h = c.create_object(&class, parent, &name, params)?;
            Ok(Variant::HObject(h))
        }
        "option" => {
            let name = argv.first().map(Variant::as_string).unwrap_or_default();
            if let Some(s) = c.opts.get_str(&name) {
                return Ok(Variant::String(s));
            }
            if let Some(n) = c.opts.get_int(&name) {
                return Ok(Variant::Integer(n));
            }
            if let Some(b) = c.opts.get_bool(&name) {
                return Ok(Variant::Boolean(b));
            }
            Ok(Variant::Nothing)
        }
        "length" => Ok(Variant::Integer(match argv.first() {
            Some(Variant::Array(a)) => a.len() as i64,
            Some(Variant::Hash(h)) => h.len() as i64,
            Some(v) => v.as_string().chars().count() as i64,
            None => 0,
        })),
        "typeof" => Ok(Variant::String(
            argv.first()
                .map(|v| v.type_name().to_owned())
                .unwrap_or_else(|| Variant::Nothing.type_name().to_owned()),
        )),
        other => Err(ScriptError::runtime(format!("unknown function '${other}'"))),
    }
}

// ── Expressions ───────────────────────────────────────────────────────────────

impl Expr {
    pub fn eval(&self, c: &mut RunContext) -> Result<Variant, ScriptError> {
        match &self.kind {
            ExprKind::Integer(n) => Ok(Variant::Integer(*n)),
            ExprKind::Real(x) => Ok(Variant::Real(*x)),
            ExprKind::Str(s) => Ok(Variant::String(s.clone())),
            ExprKind::Data(d) => d.evaluate(c),
            ExprKind::Unary { op, rhs } => {
                let v = rhs.eval(c)?;
                match op {
                    UnaryOp::Not => Ok(Variant::Boolean(!v.as_boolean())),
                    UnaryOp::BitNot => Ok(Variant::Integer(!want_integer(&v)?)),
                    UnaryOp::Neg => match want_number(&v)? {
                        Number::Int(n) => Ok(Variant::Integer(n.wrapping_neg())),
                        Number::Real(x) => Ok(Variant::Real(-x)),
                    },
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    if !lhs.eval(c)?.as_boolean() {
                        return Ok(Variant::Boolean(false));
                    }
                    Ok(Variant::Boolean(rhs.eval(c)?.as_boolean()))
                }
                BinaryOp::Or => {
                    if lhs.eval(c)?.as_boolean() {
                        return Ok(Variant::Boolean(true));
                    }
                    Ok(Variant::Boolean(rhs.eval(c)?.as_boolean()))
                }
                BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl
                | BinaryOp::Shr => {
                    let a = want_integer(&lhs.eval(c)?)?;
                    let b = want_integer(&rhs.eval(c)?)?;
                    Ok(Variant::Integer(match op {
                        BinaryOp::BitAnd => a & b,
                        BinaryOp::BitOr => a | b,
                        BinaryOp::BitXor => a ^ b,
                        BinaryOp::Shl => a.wrapping_shl(b as u32),
                        _ => a.wrapping_shr(b as u32),
                    }))
                }
                BinaryOp::Eq | BinaryOp::Ne => {
                    let a = lhs.eval(c)?;
                    let b = rhs.eval(c)?;
                    let eq = values_equal(&a, &b);
                    Ok(Variant::Boolean(if *op == BinaryOp::Eq { eq } else { !eq }))
                }
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    let a = lhs.eval(c)?;
                    let b = rhs.eval(c)?;
                    let ord = compare_values(&a, &b);
                    Ok(Variant::Boolean(match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::Le => ord.is_le(),
                        BinaryOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    }))
                }
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    let a = want_number(&lhs.eval(c)?)?;
                    let b = want_number(&rhs.eval(c)?)?;
                    arith(*op, a, b)
                }
            },
        }
    }
}

/// Numeric when both sides look numeric, case-insensitive strings
/// otherwise.
fn values_equal(a: &Variant, b: &Variant) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.num_eq(y),
        _ => a.as_string().eq_ignore_ascii_case(&b.as_string()),
    }
}

fn compare_values(a: &Variant, b: &Variant) -> std::cmp::Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x
            .as_real()
            .partial_cmp(&y.as_real())
            .unwrap_or(std::cmp::Ordering::Equal),
        _ => a
            .as_string()
            .to_lowercase()
            .cmp(&b.as_string().to_lowercase()),
    }
}

// ── Numeric helpers ───────────────────────────────────────────────────────────

/// Numeric coercion for arithmetic contexts; an unset value counts as 0.
fn want_number(v: &Variant) -> Result<Number, ScriptError> {
    if v.is_nothing() {
        return Ok(Number::Int(0));
    }
    v.as_number().ok_or_else(|| {
        ScriptError::runtime(format!("the value '{v}' didn't evaluate to a number"))
    })
}

fn want_integer(v: &Variant) -> Result<i64, ScriptError> {
    want_number(v).map(Number::as_int)
}

fn arith(op: BinaryOp, a: Number, b: Number) -> Result<Variant, ScriptError> {
    use Number::Int;
    // Integer arithmetic stays exact; any real operand widens both sides.
    match (a, b) {
        (Int(x), Int(y)) => Ok(Variant::Integer(match op {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    return Err(ScriptError::runtime("division by zero"));
                }
                x.wrapping_div(y)
            }
            BinaryOp::Mod => {
                if y == 0 {
                    return Err(ScriptError::runtime("division by zero"));
                }
                x.wrapping_rem(y)
            }
            _ => return Err(ScriptError::runtime("not an arithmetic operator")),
        })),
        (a, b) => {
            let (x, y) = (a.as_real(), b.as_real());
            Ok(Variant::Real(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => {
                    if y == 0.0 {
                        return Err(ScriptError::runtime("division by zero"));
                    }
                    x / y
                }
                BinaryOp::Mod => {
                    if y == 0.0 {
                        return Err(ScriptError::runtime("division by zero"));
                    }
                    x % y
                }
                _ => return Err(ScriptError::runtime("not an arithmetic operator")),
            }))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> (Variant, Vec<String>) {
        let (mut ctx, win) = RunContext::collecting();
        let ret = ctx.run(src).expect("script failed");
        (ret, win.lines())
    }

    fn run_err(src: &str) -> ScriptError {
        let (mut ctx, _) = RunContext::collecting();
        ctx.run(src).expect_err("script should have failed")
    }

    #[test]
    fn echo_joins_params() {
        let (_, lines) = run("echo a b c");
        assert_eq!(lines, vec!["a b c".to_string()]);
    }

    #[test]
    fn assignment_and_expression() {
        let (_, lines) = run("%a = 6; echo $( %a * 7 )");
        assert_eq!(lines, vec!["42".to_string()]);
    }

    #[test]
    fn increment_starts_from_zero() {
        let (_, lines) = run("%n++; %n++; echo %n");
        assert_eq!(lines, vec!["2".to_string()]);
    }

    #[test]
    fn append_assign_concatenates() {
        let (_, lines) = run("%s = ab; %s .= cd; echo %s");
        assert_eq!(lines, vec!["abcd".to_string()]);
    }

    #[test]
    fn compound_assignment() {
        let (_, lines) = run("%n = 10; %n -= 3; %n *= 2; echo %n");
        assert_eq!(lines, vec!["14".to_string()]);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let e = run_err("%n = 1; %n /= 0");
        assert!(e.to_string().contains("division by zero"));
    }

    #[test]
    fn return_sets_the_script_value() {
        let (mut ctx, win) = RunContext::collecting();
        let ret = ctx.run("return 7; echo never").unwrap();
        assert_eq!(ret, Variant::String("7".into()));
        assert!(win.lines().is_empty());
    }

    #[test]
    fn halt_stops_without_value() {
        let (mut ctx, win) = RunContext::collecting();
        let ret = ctx.run("echo once; halt; echo never").unwrap();
        assert!(ret.is_nothing());
        assert_eq!(win.lines(), vec!["once".to_string()]);
    }

    #[test]
    fn while_loop_and_break() {
        let (_, lines) = run("%i = 0; while (1) { %i++; if (%i == 3) break; }; echo %i");
        assert_eq!(lines, vec!["3".to_string()]);
    }

    #[test]
    fn do_while_runs_at_least_once() {
        let (_, lines) = run("%i = 9; do %i++; while (%i < 5); echo %i");
        assert_eq!(lines, vec!["10".to_string()]);
    }

    #[test]
    fn for_loop_counts() {
        let (_, lines) = run("for (%i = 0; %i < 3; %i++) echo %i");
        assert_eq!(lines, vec!["0", "1", "2"]);
    }

    #[test]
    fn foreach_iterates_scalars_and_arrays() {
        let (_, lines) = run("%a[0] = x; %a[2] = y; foreach (%v, %a, z) echo %v");
        // The hole at index 1 is skipped.
        assert_eq!(lines, vec!["x", "y", "z"]);
    }

    #[test]
    fn unknown_command_is_fatal() {
        let e = run_err("frobnicate now");
        assert!(e.to_string().contains("frobnicate"));
    }

    #[test]
    fn hash_subscripts() {
        let (_, lines) = run("%h{name} = kvs; echo %h{name}");
        assert_eq!(lines, vec!["kvs".to_string()]);
    }

    #[test]
    fn unset_removes_values() {
        let (_, lines) = run("%a = 1; unset %a; echo $typeof(%a)");
        assert_eq!(lines, vec!["nothing".to_string()]);
    }

    #[test]
    fn string_comparison_ignores_case() {
        let (_, lines) = run("if (ABC == abc) echo same");
        assert_eq!(lines, vec!["same".to_string()]);
    }

    #[test]
    fn wildcard_regex_shapes() {
        assert_eq!(wildcard_to_regex("a*b?"), "(?i)^a.*b.$");
        assert!(Regex::new(&wildcard_to_regex("he[l]lo*")).is_ok());
    }
}
