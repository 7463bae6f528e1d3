//! Stack bytecode VM with an instruction-level trace hook.
//!
//! Functions are assembled with [`CodeBuilder`] into wordcode [`Code`]
//! objects and executed by [`Vm`]. A [`Tracer`] installed through
//! [`Vm::trace`] observes call, line, opcode and return events.

mod builder;
mod builtins;
mod code;
mod error;
mod opcode;
mod opcount;
pub mod programs;
mod trace;
mod value;
#[allow(clippy::module_inception)]
mod vm;

pub use builder::{BuildError, CodeBuilder, Label};
pub use builtins::Builtin;
pub use code::{Code, Instruction, Instructions, LineEntry};
pub use error::{ErrorKind, VmError};
pub use opcode::{CmpOp, Opcode, opname};
pub use opcount::{OpcodeCounter, OpcodeHistogram, OpcodeProfile, OpcodeProfiler};
pub use trace::{FrameView, TraceAction, TraceEvent, TraceScope, Tracer};
pub use value::{MapKey, RangeIter, Value};
pub use vm::{DEFAULT_RECURSION_LIMIT, Vm};
