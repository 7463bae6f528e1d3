//! Process-wide heap accounting.
//!
//! [`TrackingAllocator`] wraps the system allocator and keeps atomic counters
//! of live allocations, live bytes and the high-water mark. Executables opt in
//! with `#[global_allocator]`; when it is not installed every counter stays at
//! zero.
//!
//! There is no collector to drive. [`release`] drops a value and snapshots the
//! counters afterwards, which is the closest equivalent of "collect, then
//! report statistics".

use std::alloc::{GlobalAlloc, Layout, System};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

pub struct TrackingAllocator;

struct AllocTracker {
    live_objects: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    reallocations: AtomicUsize,
}

static ALLOC_TRACKER: AllocTracker = AllocTracker {
    live_objects: AtomicUsize::new(0),
    live_bytes: AtomicUsize::new(0),
    peak_bytes: AtomicUsize::new(0),
    allocations: AtomicUsize::new(0),
    deallocations: AtomicUsize::new(0),
    reallocations: AtomicUsize::new(0),
};

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, old_layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, old_layout, new_size) };
        if !new_ptr.is_null() {
            adjust_realloc(old_layout.size(), new_size);
        }
        new_ptr
    }
}

fn record_alloc(size: usize) {
    ALLOC_TRACKER.allocations.fetch_add(1, Ordering::Relaxed);
    ALLOC_TRACKER.live_objects.fetch_add(1, Ordering::Relaxed);
    grow_bytes(size);
}

fn record_dealloc(size: usize) {
    ALLOC_TRACKER.deallocations.fetch_add(1, Ordering::Relaxed);
    ALLOC_TRACKER.live_objects.fetch_sub(1, Ordering::Relaxed);
    ALLOC_TRACKER.live_bytes.fetch_sub(size, Ordering::SeqCst);
}

fn grow_bytes(size: usize) {
    let current = ALLOC_TRACKER
        .live_bytes
        .fetch_add(size, Ordering::SeqCst)
        .saturating_add(size);
    ALLOC_TRACKER.peak_bytes.fetch_max(current, Ordering::SeqCst);
}

// A realloc moves bytes, not objects.
fn adjust_realloc(old: usize, new: usize) {
    ALLOC_TRACKER.reallocations.fetch_add(1, Ordering::Relaxed);
    if new > old {
        grow_bytes(new - old);
    } else if old > new {
        ALLOC_TRACKER.live_bytes.fetch_sub(old - new, Ordering::SeqCst);
    }
}

/// Point-in-time copy of the allocator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub allocations: usize,
    pub deallocations: usize,
    pub reallocations: usize,
}

impl HeapStats {
    pub fn snapshot() -> Self {
        Self {
            live_objects: ALLOC_TRACKER.live_objects.load(Ordering::Relaxed),
            live_bytes: ALLOC_TRACKER.live_bytes.load(Ordering::SeqCst),
            peak_bytes: ALLOC_TRACKER.peak_bytes.load(Ordering::SeqCst),
            allocations: ALLOC_TRACKER.allocations.load(Ordering::Relaxed),
            deallocations: ALLOC_TRACKER.deallocations.load(Ordering::Relaxed),
            reallocations: ALLOC_TRACKER.reallocations.load(Ordering::Relaxed),
        }
    }

    /// True once any allocation went through [`TrackingAllocator`].
    pub fn is_tracking(&self) -> bool {
        self.allocations > 0
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live_objects={} live_bytes={} peak_bytes={} allocations={} deallocations={} reallocations={}",
            self.live_objects,
            self.live_bytes,
            self.peak_bytes,
            self.allocations,
            self.deallocations,
            self.reallocations
        )
    }
}

/// Number of heap blocks currently alive.
pub fn live_objects() -> usize {
    ALLOC_TRACKER.live_objects.load(Ordering::Relaxed)
}

/// Restarts the high-water mark from the current live byte count.
pub fn reset_peak() {
    let current = ALLOC_TRACKER.live_bytes.load(Ordering::SeqCst);
    ALLOC_TRACKER.peak_bytes.store(current, Ordering::SeqCst);
}

/// Drops `value` and returns the counters observed afterwards.
pub fn release<T>(value: T) -> HeapStats {
    let before = live_objects();
    drop(value);
    let stats = HeapStats::snapshot();
    debug!(
        target: "opbench::heap",
        freed_objects = before.saturating_sub(stats.live_objects),
        live_objects = stats.live_objects,
        "released workload data"
    );
    stats
}
