use std::fmt;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::opcode::opname;
use super::trace::{FrameView, TraceAction, TraceEvent, Tracer};

/// Opcode name to execution count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpcodeHistogram {
    counts: FxHashMap<&'static str, u64>,
}

impl OpcodeHistogram {
    pub fn record(&mut self, name: &'static str) {
        *self.counts.entry(name).or_insert(0) += 1;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries by descending count, ties broken by name.
    pub fn sorted(&self) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<_> = self.counts.iter().map(|(name, count)| (*name, *count)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        entries
    }
}

impl fmt::Display for OpcodeHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, count) in self.sorted() {
            writeln!(f, "{:<20} {:>8}", name, count)?;
        }
        Ok(())
    }
}

/// Tracer that tallies every executed instruction by opcode name.
///
/// Re-arms `trace_opcodes` on every event it sees, so the frames it is
/// attached to keep producing opcode events.
#[derive(Debug, Default)]
pub struct OpcodeCounter {
    histogram: OpcodeHistogram,
}

impl OpcodeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn histogram(&self) -> &OpcodeHistogram {
        &self.histogram
    }

    pub fn into_histogram(self) -> OpcodeHistogram {
        self.histogram
    }
}

impl Tracer for OpcodeCounter {
    fn on_event(&mut self, frame: &mut FrameView<'_>, event: TraceEvent<'_>) -> TraceAction {
        frame.set_trace_opcodes(true);
        if let TraceEvent::Opcode = event {
            if let Some(&byte) = frame.code().bytes().get(frame.lasti()) {
                self.histogram.record(opname(byte));
            }
        }
        TraceAction::Continue
    }
}


/// Per-opcode counts plus the wall time charged to each opcode.
#[derive(Debug, Clone, Default)]
pub struct OpcodeProfile {
    histogram: OpcodeHistogram,
    elapsed: FxHashMap<&'static str, Duration>,
}

impl OpcodeProfile {
    pub fn histogram(&self) -> &OpcodeHistogram {
        &self.histogram
    }

    pub fn elapsed(&self, name: &str) -> Duration {
        self.elapsed.get(name).copied().unwrap_or_default()
    }

    pub fn total_elapsed(&self) -> Duration {
        self.elapsed.values().sum()
    }

    fn charge(&mut self, name: &'static str, spent: Duration) {
        *self.elapsed.entry(name).or_default() += spent;
    }
}

impl fmt::Display for OpcodeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, count) in self.histogram.sorted() {
            let spent = format!("{:?}", self.elapsed(name));
            writeln!(f, "{:<20} {:>8} {:>14}", name, count, spent)?;
        }
        Ok(())
    }
}

/// Tracer that counts opcodes like [`OpcodeCounter`] and also charges the
/// time between consecutive opcode events to the earlier opcode. The last
/// opcode of a frame runs until the frame's return or exception event.
#[derive(Debug, Default)]
pub struct OpcodeProfiler {
    profile: OpcodeProfile,
    running: Option<(&'static str, Instant)>,
}

impl OpcodeProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the opcode still running, if any, and returns the profile.
    pub fn into_profile(mut self) -> OpcodeProfile {
        self.settle(Instant::now());
        self.profile
    }

    fn settle(&mut self, now: Instant) {
        if let Some((name, started)) = self.running.take() {
            self.profile.charge(name, now.saturating_duration_since(started));
        }
    }
}

impl Tracer for OpcodeProfiler {
    fn on_event(&mut self, frame: &mut FrameView<'_>, event: TraceEvent<'_>) -> TraceAction {
        frame.set_trace_opcodes(true);
        let now = Instant::now();
        match event {
            TraceEvent::Opcode => {
                self.settle(now);
                if let Some(&byte) = frame.code().bytes().get(frame.lasti()) {
                    let name = opname(byte);
                    self.profile.histogram.record(name);
                    self.running = Some((name, now));
                }
            }
            TraceEvent::Return(_) | TraceEvent::Exception(_) => self.settle(now),
            TraceEvent::Call | TraceEvent::Line(_) => {}
        }
        TraceAction::Continue
    }
}
