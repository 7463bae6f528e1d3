//! Hand-assembled programs for the VM workloads.
//!
//! Each `*_module` function returns a module body that, when run, binds one
//! function as a global. Line numbers follow the layout of the source each
//! program is written from (shown in the function docs).

use std::rc::Rc;

use anyhow::{Context, Result};

use super::builder::CodeBuilder;
use super::code::Code;
use super::opcode::{CmpOp, Opcode};
use super::opcount::{OpcodeCounter, OpcodeHistogram, OpcodeProfile, OpcodeProfiler};
use super::value::Value;
use super::vm::Vm;

/// Iterations of the loop traced by the `trace_opcodes` executable.
pub const TRACE_LOOP_ITERATIONS: i64 = 1800;

fn define(name: &str, function: Code) -> Result<Rc<Code>> {
    let mut module = CodeBuilder::new("<module>");
    module
        .line(1)
        .load_const(Value::Function(Rc::new(function)))
        .store_global(name)
        .load_const(Value::None)
        .ret();
    Ok(Rc::new(module.build()?))
}

/// ```text
/// 1 def fib(n):
/// 2     if n == 1 or n == 2:
/// 3         return 1
/// 4     return fib(n - 1) + fib(n - 2)
/// ```
pub fn fib_module() -> Result<Rc<Code>> {
    let mut b = CodeBuilder::new("fib");
    b.param("n");
    let base = b.new_label();
    let recurse = b.new_label();

    b.line(2)
        .load_fast("n")
        .load_const(Value::Int(1))
        .compare(CmpOp::Eq)
        .emit_jump(Opcode::PopJumpIfTrue, base)
        .load_fast("n")
        .load_const(Value::Int(2))
        .compare(CmpOp::Eq)
        .emit_jump(Opcode::PopJumpIfFalse, recurse);
    b.line(3).bind(base).load_const(Value::Int(1)).ret();
    b.line(4)
        .bind(recurse)
        .load_global("fib")
        .load_fast("n")
        .load_const(Value::Int(1))
        .emit(Opcode::BinarySubtract)
        .call(1)
        .load_global("fib")
        .load_fast("n")
        .load_const(Value::Int(2))
        .emit(Opcode::BinarySubtract)
        .call(1)
        .emit(Opcode::BinaryAdd)
        .ret();

    define("fib", b.build()?)
}

/// ```text
/// 1 def abc():
/// 2     for i in range(iterations):
/// 3         if i == 0:
/// 4             pass
/// ```
pub fn count_loop_module(iterations: i64) -> Result<Rc<Code>> {
    let mut b = CodeBuilder::new("abc");
    let head = b.new_label();
    let done = b.new_label();

    b.line(2)
        .load_global("range")
        .load_const(Value::Int(iterations))
        .call(1)
        .emit(Opcode::GetIter)
        .bind(head)
        .emit_jump(Opcode::ForIter, done)
        .store_fast("i");
    b.line(3)
        .load_fast("i")
        .load_const(Value::Int(0))
        .compare(CmpOp::Eq)
        .emit_jump(Opcode::PopJumpIfFalse, head);
    b.line(4)
        .emit(Opcode::Nop)
        .emit_jump(Opcode::JumpAbsolute, head)
        .bind(done)
        .load_const(Value::None)
        .ret();

    define("abc", b.build()?)
}

/// Instructions `abc()` from [`count_loop_module`] executes for a given
/// iteration count: 4 to set up the loop, 6 per iteration, 2 more on the
/// iteration where `i == 0`, and 3 to leave.
pub fn count_loop_instructions(iterations: u64) -> u64 {
    let first_hit = if iterations > 0 { 2 } else { 0 };
    4 + 6 * iterations + first_hit + 3
}

/// ```text
/// 1 def getter(n, probe):
/// 2     a = {}
/// 3     for i in range(n):
/// 4         a[i] = i
/// 5     for i in range(probe):
/// 6         b = a[i]
/// 7         if b != i:
/// 8             raise AssertionError("Value mismatch")
/// 9     return len(a)
/// ```
pub fn hashmap_getter_module() -> Result<Rc<Code>> {
    let mut b = CodeBuilder::new("getter");
    b.param("n").param("probe");
    let fill = b.new_label();
    let fill_done = b.new_label();
    let check = b.new_label();
    let check_done = b.new_label();

    b.line(2).emit_arg(Opcode::BuildMap, 0).store_fast("a");
    b.line(3)
        .load_global("range")
        .load_fast("n")
        .call(1)
        .emit(Opcode::GetIter)
        .bind(fill)
        .emit_jump(Opcode::ForIter, fill_done)
        .store_fast("i");
    b.line(4)
        .load_fast("i")
        .load_fast("a")
        .load_fast("i")
        .emit(Opcode::StoreSubscr)
        .emit_jump(Opcode::JumpAbsolute, fill);
    b.line(5)
        .bind(fill_done)
        .load_global("range")
        .load_fast("probe")
        .call(1)
        .emit(Opcode::GetIter)
        .bind(check)
        .emit_jump(Opcode::ForIter, check_done)
        .store_fast("i");
    b.line(6).load_fast("a").load_fast("i").emit(Opcode::BinarySubscr).store_fast("b");
    b.line(7)
        .load_fast("b")
        .load_fast("i")
        .compare(CmpOp::Ne)
        .emit_jump(Opcode::PopJumpIfFalse, check);
    b.line(8).raise_assertion("Value mismatch");
    b.line(9)
        .bind(check_done)
        .load_global("len")
        .load_fast("a")
        .call(1)
        .ret();

    define("getter", b.build()?)
}

/// Runs `module` and returns the global it defines under `name`.
pub fn load(vm: &mut Vm, module: &Rc<Code>, name: &str) -> Result<Value> {
    vm.run(module)?;
    vm.global(name)
        .cloned()
        .with_context(|| format!("module did not define '{}'", name))
}

/// Traces one call of the count loop and returns its opcode histogram.
pub fn count_opcodes(vm: &mut Vm, iterations: i64) -> Result<OpcodeHistogram> {
    let abc = load(vm, &count_loop_module(iterations)?, "abc")?;
    let mut counter = OpcodeCounter::new();
    vm.trace(&mut counter).call(&abc, Vec::new())?;
    Ok(counter.into_histogram())
}

/// Like [`count_opcodes`], also timing each opcode.
pub fn profile_opcodes(vm: &mut Vm, iterations: i64) -> Result<OpcodeProfile> {
    let abc = load(vm, &count_loop_module(iterations)?, "abc")?;
    let mut profiler = OpcodeProfiler::new();
    vm.trace(&mut profiler).call(&abc, Vec::new())?;
    Ok(profiler.into_profile())
}
