//! Instruction-level instrumentation.
//!
//! A [`Tracer`] is handed to [`Vm::trace`], which installs it for the
//! lifetime of the returned [`TraceScope`]. Only calls made through the scope
//! are traced, and dropping the scope uninstalls the hook whether the traced
//! call returned, failed, or unwound.
//!
//! Event flow per frame:
//! - `Call` when the frame is entered. `Continue` makes the frame locally
//!   traced; `Stop` leaves it untraced.
//! - `Line` before the first instruction of a new line (if line events are on).
//! - `Opcode` before every instruction, only while the frame's
//!   `trace_opcodes` flag is set. The flag starts cleared and tracers must set
//!   it themselves through [`FrameView::set_trace_opcodes`].
//! - `Return` / `Exception` when the frame is left.
//!
//! Returning `Stop` from any local event turns local tracing off for the rest
//! of that frame.

use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use super::code::Code;
use super::opcode::Opcode;
use super::value::Value;
use super::vm::Vm;

#[derive(Debug, Clone, Copy)]
pub enum TraceEvent<'a> {
    Call,
    Line(u32),
    Opcode,
    Return(&'a Value),
    Exception(&'a str),
}

impl TraceEvent<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            TraceEvent::Call => "call",
            TraceEvent::Line(_) => "line",
            TraceEvent::Opcode => "opcode",
            TraceEvent::Return(_) => "return",
            TraceEvent::Exception(_) => "exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceAction {
    Continue,
    Stop,
}

pub trait Tracer {
    fn on_event(&mut self, frame: &mut FrameView<'_>, event: TraceEvent<'_>) -> TraceAction;
}

/// Per-frame tracing switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct TraceFlags {
    pub(super) local: bool,
    pub(super) lines: bool,
    pub(super) opcodes: bool,
}

impl Default for TraceFlags {
    fn default() -> Self {
        Self {
            local: false,
            lines: true,
            opcodes: false,
        }
    }
}

/// What a tracer can see of, and change about, the frame that raised an
/// event.
pub struct FrameView<'a> {
    code: &'a Code,
    lasti: usize,
    depth: usize,
    flags: &'a mut TraceFlags,
}

impl<'a> FrameView<'a> {
    pub(super) fn new(code: &'a Code, lasti: usize, depth: usize, flags: &'a mut TraceFlags) -> Self {
        Self {
            code,
            lasti,
            depth,
            flags,
        }
    }

    pub fn code(&self) -> &Code {
        self.code
    }

    pub fn function_name(&self) -> &str {
        self.code.name()
    }

    /// Byte offset of the instruction being executed.
    pub fn lasti(&self) -> usize {
        self.lasti
    }

    pub fn line(&self) -> u32 {
        self.code.line_at(self.lasti)
    }

    /// Call depth; the outermost traced frame is 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn current_opcode(&self) -> Option<Opcode> {
        self.code.bytes().get(self.lasti).copied().and_then(Opcode::from_byte)
    }

    pub fn trace_opcodes(&self) -> bool {
        self.flags.opcodes
    }

    pub fn set_trace_opcodes(&mut self, enabled: bool) {
        self.flags.opcodes = enabled;
    }

    pub fn trace_lines(&self) -> bool {
        self.flags.lines
    }

    pub fn set_trace_lines(&mut self, enabled: bool) {
        self.flags.lines = enabled;
    }
}

/// Installed trace hook. See the module docs.
pub struct TraceScope<'a> {
    vm: &'a mut Vm,
    tracer: &'a mut dyn Tracer,
}

impl<'a> TraceScope<'a> {
    pub(super) fn install(vm: &'a mut Vm, tracer: &'a mut dyn Tracer) -> Self {
        vm.set_tracing(true);
        debug!(target: "opbench::vm::trace", "trace hook installed");
        Self { vm, tracer }
    }

    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> Result<Value> {
        self.vm.invoke(func, args, Some(&mut *self.tracer))
    }

    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let func = self.vm.lookup_global(name)?;
        self.call(&func, args)
    }

    /// Always true while the scope is alive; the hook goes with it.
    pub fn is_tracing(&self) -> bool {
        self.vm.is_tracing()
    }

    pub fn run(&mut self, module: &Rc<Code>) -> Result<Value> {
        self.vm.eval_code(Rc::clone(module), Vec::new(), Some(&mut *self.tracer))
    }
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        self.vm.set_tracing(false);
        debug!(target: "opbench::vm::trace", "trace hook released");
    }
}
