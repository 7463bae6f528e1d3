use std::time::Instant;

use anyhow::Result;
use opbench_core::heap::TrackingAllocator;
use opbench_core::workload::{SEQUENCE_LEN, delegate, drain};
use opbench_scripts::{init_logging, millis};
use tracing::info;

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn main() -> Result<()> {
    init_logging();

    let started = Instant::now();
    let yielded = drain(delegate(SEQUENCE_LEN));
    info!(target: "opbench::workload", yielded, elapsed_ms = millis(started.elapsed()), "delegation drained");

    println!("{}", yielded);
    Ok(())
}
