//! Shared setup for the benchmark executables.

use std::sync::Once;
use std::time::Duration;

use opbench_core::heap::HeapStats;

static LOG_INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset or does not parse.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs the stderr subscriber once per process. Stdout carries only
/// workload output.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter = filter_expr(std::env::var("RUST_LOG").ok().as_deref())
            .and_then(|expr| EnvFilter::try_new(expr).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
        let _ = fmt().with_writer(std::io::stderr).with_env_filter(filter).try_init();
    });
}

fn filter_expr(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|expr| !expr.is_empty())
}

/// Renders allocator counters the way every executable prints them.
pub fn heap_report(stats: &HeapStats) -> String {
    format!("heap: {}", stats)
}

pub fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
