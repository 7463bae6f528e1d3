//! Populate-then-lookup hashmap workloads, keyed by integers or by their
//! decimal string form.

use std::fmt;
use std::ops::Range;

use rustc_hash::FxHashMap;
use tracing::debug;

/// Entries inserted by the `bench_hashmap_*` executables.
pub const MAP_SIZE: u64 = 1_000_000;

pub type IntMap = FxHashMap<u64, u64>;
pub type StrMap = FxHashMap<String, u64>;

/// Lookup failure in the integer-keyed workload. Both variants are fatal for
/// the benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    Missing { key: u64 },
    Mismatch { key: u64, found: u64 },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Missing { key } => write!(f, "key {} is missing", key),
            LookupError::Mismatch { key, found } => {
                write!(f, "value mismatch for key {}: found {}", key, found)
            }
        }
    }
}

impl std::error::Error for LookupError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupSummary {
    pub hits: u64,
    pub misses: u64,
}

pub fn populate_int(n: u64) -> IntMap {
    let mut map = IntMap::default();
    for i in 0..n {
        map.insert(i, i);
    }
    debug!(target: "opbench::workload", entries = map.len(), "populated int map");
    map
}

/// Looks up every key in `keys` and checks it maps to itself.
///
/// Returns the number of keys checked. Stops at the first missing key or
/// mismatched value.
pub fn lookup_int(map: &IntMap, keys: Range<u64>) -> Result<u64, LookupError> {
    let mut checked = 0u64;
    for key in keys {
        match map.get(&key) {
            Some(&found) if found == key => checked += 1,
            Some(&found) => return Err(LookupError::Mismatch { key, found }),
            None => return Err(LookupError::Missing { key }),
        }
    }
    Ok(checked)
}

pub fn populate_str(n: u64) -> StrMap {
    let mut map = StrMap::default();
    let mut buf = itoa::Buffer::new();
    for i in 0..n {
        map.insert(buf.format(i).to_owned(), i);
    }
    debug!(target: "opbench::workload", entries = map.len(), "populated str map");
    map
}

/// `get`-style lookups keyed by the decimal form of each integer in `keys`.
/// Missing keys are counted, never fatal.
pub fn lookup_str(map: &StrMap, keys: Range<u64>) -> LookupSummary {
    let mut summary = LookupSummary::default();
    let mut buf = itoa::Buffer::new();
    for key in keys {
        match map.get(buf.format(key)) {
            Some(_) => summary.hits += 1,
            None => summary.misses += 1,
        }
    }
    summary
}
