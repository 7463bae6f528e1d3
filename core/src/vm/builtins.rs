use std::rc::Rc;

use anyhow::Result;

use super::error::{ErrorKind, raise};
use super::value::Value;
use super::vm::Vm;

/// Native functions resolved by `LOAD_GLOBAL` when no global of that name
/// exists. Calls to builtins never create a frame, so they are invisible to
/// tracers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Range,
    Str,
    Len,
    Print,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Range => "range",
            Builtin::Str => "str",
            Builtin::Len => "len",
            Builtin::Print => "print",
        }
    }

    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "range" => Some(Builtin::Range),
            "str" => Some(Builtin::Str),
            "len" => Some(Builtin::Len),
            "print" => Some(Builtin::Print),
            _ => None,
        }
    }
}

pub(super) fn call_builtin(vm: &mut Vm, builtin: Builtin, args: Vec<Value>) -> Result<Value> {
    match builtin {
        Builtin::Range => match args.as_slice() {
            [Value::Int(stop)] => Ok(Value::range(0, *stop)),
            [Value::Int(start), Value::Int(stop)] => Ok(Value::range(*start, *stop)),
            _ => Err(raise(
                ErrorKind::Type,
                format!("range() expects 1 or 2 int arguments, got {}", describe(&args)),
            )),
        },
        Builtin::Str => match args.as_slice() {
            [Value::Str(s)] => Ok(Value::Str(Rc::clone(s))),
            [other] => Ok(Value::Str(Rc::from(other.to_string()))),
            _ => Err(arity(builtin, 1, args.len())),
        },
        Builtin::Len => match args.as_slice() {
            [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
            [Value::Map(m)] => Ok(Value::Int(m.borrow().len() as i64)),
            [other] => Err(raise(
                ErrorKind::Type,
                format!("object of type '{}' has no len()", other.type_name()),
            )),
            _ => Err(arity(builtin, 1, args.len())),
        },
        Builtin::Print => {
            let line = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
            vm.write_line(line);
            Ok(Value::None)
        }
    }
}

fn arity(builtin: Builtin, expected: usize, got: usize) -> anyhow::Error {
    raise(
        ErrorKind::Type,
        format!("{}() takes {} argument(s), got {}", builtin.name(), expected, got),
    )
}

fn describe(args: &[Value]) -> String {
    let types: Vec<&str> = args.iter().map(Value::type_name).collect();
    format!("({})", types.join(", "))
}
