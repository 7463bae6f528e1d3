use std::time::Instant;

use anyhow::Result;
use opbench_core::heap::{self, TrackingAllocator};
use opbench_core::workload::{FIB_ARG, fib};
use opbench_scripts::{init_logging, millis};
use tracing::info;

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn main() -> Result<()> {
    init_logging();

    let started = Instant::now();
    let value = fib(FIB_ARG);
    info!(target: "opbench::workload", n = FIB_ARG, elapsed_ms = millis(started.elapsed()), "fib finished");

    println!("{}", value);
    println!("heap objects: {}", heap::live_objects());
    Ok(())
}
