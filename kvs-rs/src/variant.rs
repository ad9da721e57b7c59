//! The dynamic runtime value type.
//!
//! Every KVS value is a [`Variant`]: nothing, boolean, integer, real,
//! string, array, hash, or object handle.  Assignment deep-copies string,
//! array and hash payloads (`Clone` does exactly that); object handles are
//! copied shallowly — a handle is a token, not the object.

use std::collections::HashMap;
use std::fmt;

// ── Handle ────────────────────────────────────────────────────────────────────

/// Opaque token identifying a live object instance.
///
/// Zero is the universal "no object" value.  Handles are allocated
/// monotonically by the registry and are never reused within a process, so
/// two distinct handle values never denote the same object even if one of
/// them is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Number ────────────────────────────────────────────────────────────────────

/// Numeric view of a variant: exact integer or real.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    pub fn as_real(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Real(x) => x,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            Number::Int(n) => n,
            Number::Real(x) => x as i64,
        }
    }

    /// Exact comparison: integer-vs-integer compares exactly, any other
    /// combination widens to real.
    pub fn num_eq(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_real() == b.as_real(),
        }
    }
}

// ── Variant ───────────────────────────────────────────────────────────────────

/// A KVS runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Nothing,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    /// Ordered, sparse indices allowed (holes are `Nothing`).
    Array(Vec<Variant>),
    Hash(HashMap<String, Variant>),
    HObject(Handle),
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Nothing
    }
}

impl Variant {
    pub fn is_nothing(&self) -> bool {
        matches!(self, Variant::Nothing)
    }

    /// Extended truthiness: zero/non-zero arithmetic, numeric strings by
    /// their numeric value, other strings by non-emptiness, non-empty array
    /// (by element count), non-empty hash (by entry count), non-null object
    /// handle.
    pub fn as_boolean(&self) -> bool {
        match self {
            Variant::Nothing => false,
            Variant::Boolean(b) => *b,
            Variant::Integer(n) => *n != 0,
            Variant::Real(x) => *x != 0.0,
            Variant::String(s) => match self.as_number() {
                Some(Number::Int(n)) => n != 0,
                Some(Number::Real(x)) => x != 0.0,
                None => !s.is_empty(),
            },
            Variant::Array(a) => !a.is_empty(),
            Variant::Hash(h) => !h.is_empty(),
            Variant::HObject(h) => !h.is_null(),
        }
    }

    /// Numeric view, if this variant is numeric-coercible.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Variant::Boolean(b) => Some(Number::Int(i64::from(*b))),
            Variant::Integer(n) => Some(Number::Int(*n)),
            Variant::Real(x) => Some(Number::Real(*x)),
            Variant::String(s) => {
                let t = s.trim();
                if let Ok(n) = t.parse::<i64>() {
                    Some(Number::Int(n))
                } else if let Ok(x) = t.parse::<f64>() {
                    Some(Number::Real(x))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Integer view (reals truncate, as in arithmetic contexts).
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().map(Number::as_int)
    }

    /// Object-handle view: a handle, or an integer value naming one.
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Variant::HObject(h) => Some(*h),
            Variant::Nothing => Some(Handle::NULL),
            other => match other.as_integer() {
                Some(n) if n >= 0 => Some(Handle(n as u64)),
                _ => None,
            },
        }
    }

    /// Render as a string (arrays join elements with a comma).
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Nothing => "nothing",
            Variant::Boolean(_) => "boolean",
            Variant::Integer(_) => "integer",
            Variant::Real(_) => "real",
            Variant::String(_) => "string",
            Variant::Array(_) => "array",
            Variant::Hash(_) => "hash",
            Variant::HObject(_) => "hobject",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nothing => Ok(()),
            Variant::Boolean(b) => write!(f, "{}", if *b { "1" } else { "0" }),
            Variant::Integer(n) => write!(f, "{n}"),
            Variant::Real(x) => write!(f, "{x}"),
            Variant::String(s) => write!(f, "{s}"),
            Variant::Array(a) => {
                let mut first = true;
                for item in a {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Variant::Hash(h) => {
                let mut first = true;
                for item in h.values() {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Variant::HObject(h) => write!(f, "{h}"),
        }
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Boolean(b)
    }
}

impl From<i64> for Variant {
    fn from(n: i64) -> Self {
        Variant::Integer(n)
    }
}

impl From<f64> for Variant {
    fn from(x: f64) -> Self {
        Variant::Real(x)
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::String(s)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::String(s.to_owned())
    }
}

impl From<Handle> for Variant {
    fn from(h: Handle) -> Self {
        Variant::HObject(h)
    }
}

impl From<Number> for Variant {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(v) => Variant::Integer(v),
            Number::Real(v) => Variant::Real(v),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Variant::Nothing.as_boolean());
        assert!(Variant::Integer(1).as_boolean());
        assert!(!Variant::Integer(0).as_boolean());
        assert!(!Variant::String("0".into()).as_boolean()); // numeric value wins
        assert!(!Variant::String("0.0".into()).as_boolean());
        assert!(Variant::String("2".into()).as_boolean());
        assert!(Variant::String("no".into()).as_boolean()); // non-numeric, non-empty
        assert!(!Variant::String(String::new()).as_boolean());
        assert!(Variant::Array(vec![Variant::Nothing]).as_boolean()); // count, not content
        assert!(!Variant::Array(vec![]).as_boolean());
        assert!(!Variant::HObject(Handle::NULL).as_boolean());
        assert!(Variant::HObject(Handle(7)).as_boolean());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Variant::String(" 42 ".into()).as_number(), Some(Number::Int(42)));
        assert_eq!(Variant::String("2.5".into()).as_number(), Some(Number::Real(2.5)));
        assert_eq!(Variant::String("abc".into()).as_number(), None);
        assert_eq!(Variant::Boolean(true).as_integer(), Some(1));
    }

    #[test]
    fn number_equality_widens() {
        assert!(Number::Int(3).num_eq(Number::Real(3.0)));
        assert!(!Number::Int(3).num_eq(Number::Real(3.5)));
        assert!(Number::Int(i64::MAX).num_eq(Number::Int(i64::MAX)));
    }

    #[test]
    fn display() {
        assert_eq!(Variant::Nothing.as_string(), "");
        assert_eq!(Variant::Boolean(true).as_string(), "1");
        assert_eq!(
            Variant::Array(vec![1i64.into(), 2i64.into()]).as_string(),
            "1,2"
        );
        assert_eq!(Variant::HObject(Handle(9)).as_string(), "9");
    }

    #[test]
    fn clone_is_deep_for_collections() {
        let mut a = Variant::Array(vec!["x".into()]);
        let b = a.clone();
        if let Variant::Array(items) = &mut a {
            items.push("y".into());
        }
        assert_eq!(b, Variant::Array(vec!["x".into()]));
    }

    #[test]
    fn default_handle_is_null() {
        assert!(Handle::default().is_null());
        assert_eq!(Handle::default(), Handle::NULL);
    }

    #[test]
    fn handle_view() {
        assert_eq!(Variant::String("12".into()).as_handle(), Some(Handle(12)));
        assert_eq!(Variant::Nothing.as_handle(), Some(Handle::NULL));
        assert_eq!(Variant::String("no".into()).as_handle(), None);
    }
}
