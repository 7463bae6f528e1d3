use std::cmp::Ordering;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::builtins::{Builtin, call_builtin};
use super::code::Code;
use super::error::{ErrorKind, raise};
use super::opcode::{CmpOp, Opcode};
use super::trace::{FrameView, TraceAction, TraceEvent, TraceFlags, TraceScope, Tracer};
use super::value::Value;

pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

enum Output {
    Stdout,
    Captured(Vec<String>),
}

struct Frame {
    code: Rc<Code>,
    locals: Vec<Option<Value>>,
    stack: Vec<Value>,
    pc: usize,
    lasti: usize,
    last_line: Option<u32>,
    trace: TraceFlags,
}

impl Frame {
    fn new(code: Rc<Code>, args: Vec<Value>) -> Self {
        let mut locals: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        locals.resize(code.nlocals(), None);
        Self {
            code,
            locals,
            stack: Vec::with_capacity(8),
            pc: 0,
            lasti: 0,
            last_line: None,
            trace: TraceFlags::default(),
        }
    }

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(|| self.underflow())
    }

    #[inline]
    fn top(&self) -> Result<&Value> {
        self.stack.last().ok_or_else(|| self.underflow())
    }

    fn underflow(&self) -> anyhow::Error {
        raise(
            ErrorKind::Internal,
            format!("stack underflow in {} at offset {}", self.code.name(), self.lasti),
        )
    }
}

/// Holds one level of call depth for as long as it lives, so the depth
/// unwinds with the frame even when a tracer panics.
struct DepthGuard<'a> {
    vm: &'a mut Vm,
}

impl<'a> DepthGuard<'a> {
    fn enter(vm: &'a mut Vm) -> Self {
        vm.depth += 1;
        Self { vm }
    }
}

impl Deref for DepthGuard<'_> {
    type Target = Vm;

    fn deref(&self) -> &Vm {
        self.vm
    }
}

impl DerefMut for DepthGuard<'_> {
    fn deref_mut(&mut self) -> &mut Vm {
        self.vm
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.vm.depth -= 1;
    }
}

/// Stack bytecode interpreter. One `Vm` owns the globals shared by every
/// function it runs; frames live on the Rust stack for the duration of a
/// call.
pub struct Vm {
    globals: FxHashMap<Rc<str>, Value>,
    output: Output,
    depth: usize,
    recursion_limit: usize,
    tracing: bool,
    executed: u64,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            globals: FxHashMap::default(),
            output: Output::Stdout,
            depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            tracing: false,
            executed: 0,
        }
    }

    /// A VM whose `print` output is kept in memory; see [`Vm::take_output`].
    pub fn capturing() -> Self {
        Self {
            output: Output::Captured(Vec::new()),
            ..Self::new()
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(Rc::from(name), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Executes a module body (a code object without parameters).
    pub fn run(&mut self, module: &Rc<Code>) -> Result<Value> {
        self.eval_code(Rc::clone(module), Vec::new(), None)
    }

    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> Result<Value> {
        self.invoke(func, args, None)
    }

    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let func = self.lookup_global(name)?;
        self.invoke(&func, args, None)
    }

    /// Installs `tracer` until the returned scope is dropped.
    pub fn trace<'a>(&'a mut self, tracer: &'a mut dyn Tracer) -> TraceScope<'a> {
        TraceScope::install(self, tracer)
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// Instructions executed by this VM so far, traced or not.
    pub fn instructions_executed(&self) -> u64 {
        self.executed
    }

    /// Drains captured `print` lines. Always empty for a stdout VM.
    pub fn take_output(&mut self) -> Vec<String> {
        match &mut self.output {
            Output::Captured(lines) => mem::take(lines),
            Output::Stdout => Vec::new(),
        }
    }

    pub(super) fn write_line(&mut self, line: String) {
        match &mut self.output {
            Output::Stdout => println!("{}", line),
            Output::Captured(lines) => lines.push(line),
        }
    }

    pub(super) fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
    }

    pub(super) fn lookup_global(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| raise(ErrorKind::Name, format!("name '{}' is not defined", name)))
    }

    pub(super) fn invoke(
        &mut self,
        func: &Value,
        args: Vec<Value>,
        tracer: Option<&mut (dyn Tracer + '_)>,
    ) -> Result<Value> {
        match func {
            Value::Function(code) => self.eval_code(Rc::clone(code), args, tracer),
            Value::Builtin(builtin) => call_builtin(self, *builtin, args),
            other => Err(raise(
                ErrorKind::Type,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    pub(super) fn eval_code(
        &mut self,
        code: Rc<Code>,
        args: Vec<Value>,
        tracer: Option<&mut (dyn Tracer + '_)>,
    ) -> Result<Value> {
        if args.len() != code.argcount() {
            return Err(raise(
                ErrorKind::Type,
                format!(
                    "{}() takes {} positional argument(s) but {} were given",
                    code.name(),
                    code.argcount(),
                    args.len()
                ),
            ));
        }
        if self.depth >= self.recursion_limit {
            debug!(target: "opbench::vm", limit = self.recursion_limit, function = code.name(), "recursion limit hit");
            return Err(raise(
                ErrorKind::Recursion,
                format!("maximum recursion depth exceeded in {}", code.name()),
            ));
        }
        let mut frame = Frame::new(code, args);
        let mut vm = DepthGuard::enter(self);
        trace!(target: "opbench::vm", function = frame.code.name(), depth = vm.depth, "enter frame");
        vm.run_frame(&mut frame, tracer)
    }

    fn run_frame(&mut self, frame: &mut Frame, mut tracer: Option<&mut (dyn Tracer + '_)>) -> Result<Value> {
        if let Some(t) = tracer.as_deref_mut() {
            frame.trace.local = self.dispatch(t, frame, TraceEvent::Call) == TraceAction::Continue;
        }
        let result = self.execute(frame, tracer.as_deref_mut());
        if frame.trace.local {
            if let Some(t) = tracer.as_deref_mut() {
                match &result {
                    Ok(value) => {
                        self.dispatch(t, frame, TraceEvent::Return(value));
                    }
                    Err(err) => {
                        let message = err.to_string();
                        self.dispatch(t, frame, TraceEvent::Exception(&message));
                    }
                }
            }
        }
        result
    }

    fn dispatch(&self, tracer: &mut (dyn Tracer + '_), frame: &mut Frame, event: TraceEvent<'_>) -> TraceAction {
        let mut view = FrameView::new(&frame.code, frame.lasti, self.depth, &mut frame.trace);
        tracer.on_event(&mut view, event)
    }

    fn trace_instruction(&self, tracer: &mut (dyn Tracer + '_), frame: &mut Frame, offset: usize) {
        if frame.trace.lines {
            let line = frame.code.line_at(offset);
            if frame.code.is_line_start(offset) || frame.last_line != Some(line) {
                frame.last_line = Some(line);
                if self.dispatch(tracer, frame, TraceEvent::Line(line)) == TraceAction::Stop {
                    frame.trace.local = false;
                    return;
                }
            }
        }
        if frame.trace.opcodes && self.dispatch(tracer, frame, TraceEvent::Opcode) == TraceAction::Stop {
            frame.trace.local = false;
        }
    }

    fn execute(&mut self, frame: &mut Frame, mut tracer: Option<&mut (dyn Tracer + '_)>) -> Result<Value> {
        let code = Rc::clone(&frame.code);
        let mut ext: u32 = 0;
        loop {
            let offset = frame.pc;
            let Some(&[byte, low]) = code.bytes().get(offset..offset + 2) else {
                return Err(raise(
                    ErrorKind::Internal,
                    format!("{} ran past the end of its code at offset {}", code.name(), offset),
                ));
            };
            let Some(opcode) = Opcode::from_byte(byte) else {
                return Err(raise(
                    ErrorKind::Internal,
                    format!("invalid opcode byte {} at offset {}", byte, offset),
                ));
            };
            let arg = ext | u32::from(low);
            ext = 0;
            frame.lasti = offset;
            frame.pc = offset + 2;
            self.executed += 1;

            if frame.trace.local {
                if let Some(t) = tracer.as_deref_mut() {
                    self.trace_instruction(t, frame, offset);
                }
            }

            let idx = arg as usize;
            match opcode {
                Opcode::Nop => {}
                Opcode::ExtendedArg => ext = arg << 8,
                Opcode::PopTop => {
                    frame.pop()?;
                }
                Opcode::LoadConst => {
                    let value = code.consts().get(idx).cloned().ok_or_else(|| bad_operand(&code, opcode, arg))?;
                    frame.push(value);
                }
                Opcode::LoadFast => {
                    let value = match frame.locals.get(idx) {
                        Some(Some(value)) => value.clone(),
                        Some(None) => {
                            return Err(raise(
                                ErrorKind::Name,
                                format!("local variable '{}' referenced before assignment", code.varnames()[idx]),
                            ));
                        }
                        None => return Err(bad_operand(&code, opcode, arg)),
                    };
                    frame.push(value);
                }
                Opcode::StoreFast => {
                    let value = frame.pop()?;
                    let slot = frame.locals.get_mut(idx).ok_or_else(|| bad_operand(&code, opcode, arg))?;
                    *slot = Some(value);
                }
                Opcode::LoadGlobal => {
                    let name = code.names().get(idx).ok_or_else(|| bad_operand(&code, opcode, arg))?;
                    let value = self.lookup_global(name)?;
                    frame.push(value);
                }
                Opcode::StoreGlobal => {
                    let name = code.names().get(idx).ok_or_else(|| bad_operand(&code, opcode, arg))?;
                    let value = frame.pop()?;
                    self.globals.insert(Rc::clone(name), value);
                }
                Opcode::BinaryAdd => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(binary_add(&lhs, &rhs)?);
                }
                Opcode::BinarySubtract => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(binary_subtract(&lhs, &rhs)?);
                }
                Opcode::BinarySubscr => {
                    let key = frame.pop()?;
                    let container = frame.pop()?;
                    frame.push(subscript(&container, &key)?);
                }
                Opcode::StoreSubscr => {
                    let key = frame.pop()?;
                    let container = frame.pop()?;
                    let value = frame.pop()?;
                    store_subscript(&container, &key, value)?;
                }
                Opcode::BuildMap => frame.push(Value::new_map(idx)),
                Opcode::CompareOp => {
                    let op = CmpOp::from_arg(arg).ok_or_else(|| bad_operand(&code, opcode, arg))?;
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(Value::Bool(compare(op, &lhs, &rhs)?));
                }
                Opcode::PopJumpIfFalse => {
                    if !frame.pop()?.is_truthy() {
                        frame.pc = idx * 2;
                    }
                }
                Opcode::PopJumpIfTrue => {
                    if frame.pop()?.is_truthy() {
                        frame.pc = idx * 2;
                    }
                }
                Opcode::JumpAbsolute => frame.pc = idx * 2,
                Opcode::GetIter => {
                    let value = frame.pop()?;
                    if !matches!(value, Value::Range(_)) {
                        return Err(raise(
                            ErrorKind::Type,
                            format!("'{}' object is not iterable", value.type_name()),
                        ));
                    }
                    frame.push(value);
                }
                Opcode::ForIter => {
                    let next = match frame.top()? {
                        Value::Range(iter) => iter.borrow_mut().next(),
                        other => {
                            return Err(raise(
                                ErrorKind::Type,
                                format!("'{}' object is not an iterator", other.type_name()),
                            ));
                        }
                    };
                    match next {
                        Some(i) => frame.push(Value::Int(i)),
                        None => {
                            frame.pop()?;
                            frame.pc = idx * 2;
                        }
                    }
                }
                Opcode::CallFunction => {
                    if frame.stack.len() < idx + 1 {
                        return Err(frame.underflow());
                    }
                    let args = frame.stack.split_off(frame.stack.len() - idx);
                    let func = frame.pop()?;
                    let result = self.invoke(&func, args, tracer.as_deref_mut())?;
                    frame.push(result);
                }
                Opcode::ReturnValue => return frame.pop(),
                Opcode::RaiseAssertion => {
                    let message = code.consts().get(idx).ok_or_else(|| bad_operand(&code, opcode, arg))?;
                    return Err(raise(ErrorKind::Assertion, message.to_string()));
                }
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_operand(code: &Code, opcode: Opcode, arg: u32) -> anyhow::Error {
    raise(
        ErrorKind::Internal,
        format!("{} argument {} out of range in {}", opcode, arg, code.name()),
    )
}

fn unsupported(symbol: &str, lhs: &Value, rhs: &Value) -> anyhow::Error {
    raise(
        ErrorKind::Type,
        format!(
            "unsupported operand types for {}: '{}' and '{}'",
            symbol,
            lhs.type_name(),
            rhs.type_name()
        ),
    )
}

fn binary_add(lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| raise(ErrorKind::Overflow, "integer overflow in addition")),
        (Value::Str(a), Value::Str(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::Str(Rc::from(joined)))
        }
        _ => Err(unsupported("+", lhs, rhs)),
    }
}

fn binary_subtract(lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| raise(ErrorKind::Overflow, "integer overflow in subtraction")),
        _ => Err(unsupported("-", lhs, rhs)),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match (op, ordering) {
        (CmpOp::Eq, _) => Ok(lhs == rhs),
        (CmpOp::Ne, _) => Ok(lhs != rhs),
        (CmpOp::Lt, Some(ord)) => Ok(ord == Ordering::Less),
        (CmpOp::Le, Some(ord)) => Ok(ord != Ordering::Greater),
        (CmpOp::Gt, Some(ord)) => Ok(ord == Ordering::Greater),
        (CmpOp::Ge, Some(ord)) => Ok(ord != Ordering::Less),
        (_, None) => Err(unsupported(op.symbol(), lhs, rhs)),
    }
}

fn subscript(container: &Value, key: &Value) -> Result<Value> {
    match container {
        Value::Map(map) => {
            let key = key.to_map_key()?;
            map.borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| raise(ErrorKind::Key, key.to_string()))
        }
        other => Err(raise(
            ErrorKind::Type,
            format!("'{}' object is not subscriptable", other.type_name()),
        )),
    }
}

fn store_subscript(container: &Value, key: &Value, value: Value) -> Result<()> {
    match container {
        Value::Map(map) => {
            let key = key.to_map_key()?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(raise(
            ErrorKind::Type,
            format!("'{}' object does not support item assignment", other.type_name()),
        )),
    }
}
