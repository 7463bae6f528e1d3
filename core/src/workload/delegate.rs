//! Lazy sequence delegation: several single-pass counters consumed one after
//! another by an outer sequence, which is then drained.

use std::hint::black_box;
use std::iter::FusedIterator;

/// Values produced by each inner counter in the `bench_delegate` workload.
pub const SEQUENCE_LEN: u64 = 3_000_000;

/// Number of inner counters the outer sequence delegates to.
pub const DELEGATE_COUNT: usize = 3;

/// Yields `0..len` on demand. Single pass; once exhausted it stays exhausted.
#[derive(Debug, Clone)]
pub struct Counter {
    next: u64,
    len: u64,
}

impl Counter {
    pub fn new(len: u64) -> Self {
        Self { next: 0, len }
    }
}

impl Iterator for Counter {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        if self.next < self.len {
            let value = self.next;
            self.next += 1;
            Some(value)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.len - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Counter {}

impl FusedIterator for Counter {}

/// Three counters of `len` values, each drained before the next begins.
pub fn delegate(len: u64) -> impl Iterator<Item = u64> {
    Counter::new(len).chain(Counter::new(len)).chain(Counter::new(len))
}

/// `copies` counters of `len` values each, consumed in sequence.
pub fn delegate_n(copies: usize, len: u64) -> impl Iterator<Item = u64> {
    (0..copies).flat_map(move |_| Counter::new(len))
}

/// Consumes every element without doing any work on it. Returns how many
/// elements were yielded.
pub fn drain<I: Iterator>(iter: I) -> u64 {
    let mut yielded = 0u64;
    for item in iter {
        black_box(item);
        yielded += 1;
    }
    yielded
}
