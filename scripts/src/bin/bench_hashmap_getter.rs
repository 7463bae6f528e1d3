use std::time::Instant;

use anyhow::{Context, Result};
use opbench_core::heap::{self, TrackingAllocator};
use opbench_core::workload::{MAP_SIZE, lookup_int, populate_int};
use opbench_scripts::{heap_report, init_logging, millis};
use tracing::{error, info};

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn main() -> Result<()> {
    init_logging();

    let started = Instant::now();
    let map = populate_int(MAP_SIZE);
    let checked = lookup_int(&map, 0..MAP_SIZE)
        .inspect_err(|err| error!(target: "opbench::workload", %err, "int map lookup failed"))
        .context("int-keyed lookup")?;
    info!(
        target: "opbench::workload",
        entries = MAP_SIZE,
        elapsed_ms = millis(started.elapsed()),
        "int map populated and checked"
    );

    let stats = heap::release(map);
    println!("checked={}", checked);
    println!("{}", heap_report(&stats));
    Ok(())
}
