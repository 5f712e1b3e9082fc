//! Bounded in-memory diagnostic trace.
//!
//! Independent of `tracing` output, an application can switch on a small ring
//! of timestamped text entries describing frames sent, frames received and
//! state transitions, then read it back with `trace_log()`.  Only the most
//! recent [`TRACE_CAPACITY`] entries are kept.
//!
//! Entry text is built lazily: while tracing is off, `push` never calls the
//! closure, so frame serialization is skipped entirely.

use std::collections::VecDeque;
use std::time::SystemTime;

/// Maximum number of retained entries.
pub const TRACE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub timestamp: SystemTime,
    pub text: String,
}

/// Ring of recent diagnostic entries.  Inactive until [`start`](Self::start).
#[derive(Debug, Default)]
pub struct TraceBuffer {
    entries: Option<VecDeque<TraceEntry>>,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording.  Entries recorded earlier are discarded.
    pub fn start(&mut self) {
        self.entries = Some(VecDeque::with_capacity(TRACE_CAPACITY));
    }

    /// Stops recording and drops the buffer.
    pub fn stop(&mut self) {
        self.entries = None;
    }

    pub fn is_active(&self) -> bool {
        self.entries.is_some()
    }

    /// Records an entry if tracing is active, evicting the oldest when full.
    pub fn push(&mut self, text: impl FnOnce() -> String) {
        if let Some(entries) = self.entries.as_mut() {
            if entries.len() == TRACE_CAPACITY {
                entries.pop_front();
            }
            entries.push_back(TraceEntry {
                timestamp: SystemTime::now(),
                text: text(),
            });
        }
    }

    /// Returns the retained entries, oldest first, or `None` while inactive.
    pub fn entries(&self) -> Option<Vec<TraceEntry>> {
        self.entries.as_ref().map(|e| e.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
