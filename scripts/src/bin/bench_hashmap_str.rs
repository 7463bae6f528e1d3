use std::time::Instant;

use anyhow::Result;
use opbench_core::heap::{self, TrackingAllocator};
use opbench_core::workload::{MAP_SIZE, lookup_str, populate_str};
use opbench_scripts::{heap_report, init_logging, millis};
use tracing::info;

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn main() -> Result<()> {
    init_logging();

    let started = Instant::now();
    let map = populate_str(MAP_SIZE);
    let summary = lookup_str(&map, 0..MAP_SIZE);
    info!(
        target: "opbench::workload",
        entries = MAP_SIZE,
        elapsed_ms = millis(started.elapsed()),
        "string map populated and probed"
    );

    let stats = heap::release(map);
    println!("hits={} misses={}", summary.hits, summary.misses);
    println!("{}", heap_report(&stats));
    Ok(())
}
