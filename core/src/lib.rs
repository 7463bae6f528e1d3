//! Fixed micro-benchmark workloads and the bytecode VM used to count opcodes.

pub mod heap;
pub mod workload;

// Stack bytecode VM with the instruction-level trace hook
pub mod vm;

// Named, self-checking workloads shared by benches and tests
pub mod perf;
