//! Alarm queue for overflowed primitives.
//!
//! A queue or event counter that overflows posts a handle to itself into the
//! alarm queue. A low-priority poll reports the posted primitives and can reset
//! them. Overflows are never lost silently: a full alarm queue is logged at
//! error level and counted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, warn};

use super::irq::IrqControl;
use super::lock;
use super::queue::Queue;

/// A primitive that can overflow and be reset by the alarm poll.
pub trait AlarmSource: Send + Sync {
    /// Name used in reports.
    fn name(&self) -> &str;
    /// Current fill level.
    fn level(&self) -> usize;
    /// Discards the content.
    fn reset(&self);
}

/// One entry of an alarm report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlarmReport {
    /// Name of the overflowed primitive.
    pub name: String,
    /// Its fill level when polled.
    pub level: usize,
}

/// Queue of overflowed primitives.
pub struct AlarmQueue {
    entries: std::sync::Mutex<Queue<Arc<dyn AlarmSource>>>,
    irq: Arc<IrqControl>,
    lost: AtomicU64,
}

impl fmt::Debug for AlarmQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmQueue")
            .field("pending", &lock(&self.entries).size())
            .field("lost", &self.lost())
            .finish_non_exhaustive()
    }
}

impl AlarmQueue {
    /// Creates an alarm queue holding up to `capacity` entries.
    pub fn new(capacity: usize, irq: Arc<IrqControl>) -> Self {
        Self {
            entries: std::sync::Mutex::new(Queue::new(capacity)),
            irq,
            lost: AtomicU64::new(0),
        }
    }

    /// Posts an overflowed primitive.
    pub fn post(&self, source: Arc<dyn AlarmSource>) -> bool {
        let _cs = self.irq.critical_section();
        let name = source.name().to_owned();
        if lock(&self.entries).push(source) {
            true
        } else {
            let _ = self.lost.fetch_add(1, Ordering::Relaxed);
            error!(queue = %name, "alarm queue full, overflow report lost");
            false
        }
    }

    /// Number of posts rejected because the alarm queue was full.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Number of pending alarms.
    pub fn pending(&self) -> usize {
        let _cs = self.irq.critical_section();
        lock(&self.entries).size()
    }

    /// Reports all pending alarms and optionally resets the primitives.
    pub fn poll(&self, reset: bool) -> Vec<AlarmReport> {
        let drained: Vec<Arc<dyn AlarmSource>> = {
            let _cs = self.irq.critical_section();
            let mut entries = lock(&self.entries);
            std::iter::from_fn(|| entries.pop()).collect()
        };
        drained
            .into_iter()
            .map(|source| {
                let report = AlarmReport {
                    name: source.name().to_owned(),
                    level: source.level(),
                };
                warn!(queue = %report.name, level = report.level, reset, "queue overflow");
                if reset {
                    source.reset();
                }
                report
            })
            .collect()
    }
}
