use anyhow::{Context, Result};
use opbench_core::heap::TrackingAllocator;
use opbench_core::vm::{Vm, programs};
use opbench_scripts::init_logging;
use tracing::debug;

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn main() -> Result<()> {
    init_logging();

    let mut vm = Vm::new();
    let profile = programs::profile_opcodes(&mut vm, programs::TRACE_LOOP_ITERATIONS)
        .context("tracing the count loop")?;
    debug!(
        target: "opbench::vm::trace",
        distinct = profile.histogram().len(),
        elapsed = ?profile.total_elapsed(),
        "profile collected"
    );

    print!("{}", profile);
    println!("Total opcodes executed: {}", profile.histogram().total());
    Ok(())
}
