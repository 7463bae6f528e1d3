//! Shared performance scaffolding used by the Criterion benches.
//!
//! Centralizing the workloads here keeps the benches and the tests running the
//! same shapes, so a bench never measures a workload the tests do not check.

pub mod scenarios;
