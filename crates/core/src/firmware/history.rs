//! Bounded firmware history.
//!
//! State transitions, commands and errors are appended with the scheduler tick they
//! happened at. The oldest entry is dropped once the ring is full. `PRINT_HISTORY`
//! dumps the ring through the log.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::protocol::{FgState, Opcode};
use crate::rtos::lock;

/// What a history entry records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryKind {
    /// A channel changed state.
    State {
        /// Channel index.
        channel: usize,
        /// Previous state.
        from: FgState,
        /// New state.
        to: FgState,
    },
    /// A host command was executed.
    Command {
        /// Opcode.
        opcode: Opcode,
        /// Argument word.
        arg: u32,
    },
    /// A timing event started ramps.
    Event {
        /// Event tag.
        tag: u32,
        /// Channels started.
        started: usize,
    },
    /// Something failed.
    Error(String),
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State { channel, from, to } => write!(f, "ch{channel} {from} -> {to}"),
            Self::Command { opcode, arg } => write!(f, "cmd {opcode} {arg:#x}"),
            Self::Event { tag, started } => write!(f, "event {tag:#x} started {started}"),
            Self::Error(msg) => write!(f, "error {msg}"),
        }
    }
}

/// One history entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Scheduler tick.
    pub tick: u64,
    /// Recorded item.
    pub kind: HistoryKind,
}

/// Fixed-depth history ring.
#[derive(Debug)]
pub struct History {
    entries: Mutex<VecDeque<HistoryEntry>>,
    depth: usize,
    now: AtomicU64,
}

impl History {
    /// Creates an empty ring of `depth` entries (at least one).
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(depth)),
            depth,
            now: AtomicU64::new(0),
        }
    }

    /// Sets the tick stamped on subsequent entries.
    pub fn set_now(&self, tick: u64) {
        self.now.store(tick, Ordering::Relaxed);
    }

    /// Appends `kind`, evicting the oldest entry when full.
    pub fn record(&self, kind: HistoryKind) {
        let entry = HistoryEntry {
            tick: self.now.load(Ordering::Relaxed),
            kind,
        };
        let mut entries = lock(&self.entries);
        if entries.len() == self.depth {
            let _ = entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copies the entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        lock(&self.entries).iter().cloned().collect()
    }

    /// Discards all entries.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Logs every entry at info level.
    pub fn dump(&self) {
        let entries = self.entries();
        info!(entries = entries.len(), "history");
        for entry in entries {
            info!(tick = entry.tick, "{}", entry.kind);
        }
    }
}
