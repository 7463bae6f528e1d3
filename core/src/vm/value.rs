use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use rustc_hash::FxHashMap;

use super::builtins::Builtin;
use super::code::Code;
use super::error::{ErrorKind, raise};

pub type MapRef = Rc<RefCell<FxHashMap<MapKey, Value>>>;

/// Hashable subset of [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{}", i),
            MapKey::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Lazily advancing integer range. Shared by reference so `FOR_ITER` can
/// advance the iterator left on the operand stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeIter {
    next: i64,
    stop: i64,
}

impl RangeIter {
    pub fn new(start: i64, stop: i64) -> Self {
        Self { next: start, stop }
    }
}

impl Iterator for RangeIter {
    type Item = i64;

    #[inline]
    fn next(&mut self) -> Option<i64> {
        if self.next < self.stop {
            let value = self.next;
            self.next += 1;
            Some(value)
        } else {
            None
        }
    }
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Function(Rc<Code>),
    Builtin(Builtin),
    Range(Rc<RefCell<RangeIter>>),
    Map(MapRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Range(_) => "range_iterator",
            Value::Map(_) => "map",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Map(m) => !m.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Range(_) => true,
        }
    }

    pub fn new_map(capacity: usize) -> Self {
        let map = FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        Value::Map(Rc::new(RefCell::new(map)))
    }

    pub fn range(start: i64, stop: i64) -> Self {
        Value::Range(Rc::new(RefCell::new(RangeIter::new(start, stop))))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn to_map_key(&self) -> Result<MapKey> {
        match self {
            Value::Int(i) => Ok(MapKey::Int(*i)),
            Value::Str(s) => Ok(MapKey::Str(Rc::clone(s))),
            other => Err(raise(
                ErrorKind::Type,
                format!("unhashable type: '{}'", other.type_name()),
            )),
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Int(i) => Value::Int(i),
            MapKey::Str(s) => Value::Str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

// Functions, iterators and maps compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => f.write_str(s),
            Value::Function(code) => write!(f, "<function {}>", code.name()),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::Range(_) => f.write_str("<range_iterator>"),
            Value::Map(m) => write!(f, "<map len={}>", m.borrow().len()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Bool(b) => write!(f, "Bool({})", b),
            other => write!(f, "{}", other),
        }
    }
}
