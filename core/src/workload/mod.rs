//! Native workloads measured by the `scripts` executables and the Criterion
//! benches.
//!
//! Every workload is a fixed, hard-coded shape; sizes are parameters only so
//! tests can run them at smaller scales.

pub mod delegate;
pub mod fib;
pub mod hashmap;

pub use delegate::{Counter, DELEGATE_COUNT, SEQUENCE_LEN, delegate, delegate_n, drain};
pub use fib::{FIB_ARG, FIB_RESULT, fib};
pub use hashmap::{
    IntMap, LookupError, LookupSummary, MAP_SIZE, StrMap, lookup_int, lookup_str, populate_int, populate_str,
};
