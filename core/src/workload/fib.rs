/// Argument used by the `bench_fib` executable.
pub const FIB_ARG: u32 = 29;

/// `fib(FIB_ARG)`.
pub const FIB_RESULT: u64 = 514_229;

/// Naive doubly recursive Fibonacci.
///
/// Deliberately not memoized: the point is to measure call overhead.
/// `fib(1) == fib(2) == 1`; `fib(0)` is defined as 0.
pub fn fib(n: u32) -> u64 {
    match n {
        0 => 0,
        1 | 2 => 1,
        _ => fib(n - 1) + fib(n - 2),
    }
}
