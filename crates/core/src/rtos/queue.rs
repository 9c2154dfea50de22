//! Bounded queues.
//!
//! This module implements the fixed-capacity item queues of the task plumbing. It provides:
//! 1. **Raw queue:** `Queue<T>`, exclusive access, no interrupt protection.
//! 2. **Shared queue:** `SharedQueue<T>`, callable from tasks and IRQ handlers;
//!    every operation runs inside a critical section.
//! 3. **Overflow policy:** A full shared queue posts itself to the alarm queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use super::alarm::{AlarmQueue, AlarmSource};
use super::irq::IrqControl;
use super::{Waitable, lock};

/// Fixed-capacity fifo without interrupt protection.
///
/// Must not be shared with preemptible or interrupt context; use [`SharedQueue`] there.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Queue<T> {
    /// Creates an empty queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`; returns `false` and drops it when full.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Appends `item`, dropping the oldest entry when full.
    ///
    /// # Returns
    ///
    /// The dropped entry, if any.
    pub fn force_push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let dropped = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        dropped
    }

    /// Removes the oldest entry.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Returns the oldest entry without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Discards all entries.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// Number of queued entries.
    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Maximum number of entries.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no entry is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if a push would fail.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

/// Fixed-capacity fifo shared between tasks and IRQ handlers.
pub struct SharedQueue<T> {
    name: String,
    inner: Mutex<Queue<T>>,
    irq: Arc<IrqControl>,
    alarm: Option<Arc<AlarmQueue>>,
    overflows: AtomicU64,
    me: Weak<Self>,
}

impl<T> fmt::Debug for SharedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQueue")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("overflows", &self.overflows())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> SharedQueue<T> {
    /// Creates a shared queue.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in overflow reports.
    /// * `capacity` - Maximum number of entries.
    /// * `irq` - Interrupt control guarding every operation.
    /// * `alarm` - Alarm queue receiving this queue on overflow.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        irq: Arc<IrqControl>,
        alarm: Option<Arc<AlarmQueue>>,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            name,
            inner: Mutex::new(Queue::new(capacity)),
            irq,
            alarm,
            overflows: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    fn report_overflow(&self) {
        let _ = self.overflows.fetch_add(1, Ordering::Relaxed);
        debug!(queue = %self.name, "queue full");
        if let (Some(alarm), Some(me)) = (&self.alarm, self.me.upgrade()) {
            let _ = alarm.post(me);
        }
    }

    /// Appends `item`; on overflow drops it and posts this queue to the alarm queue.
    pub fn push(&self, item: T) -> bool {
        let pushed = {
            let _cs = self.irq.critical_section();
            lock(&self.inner).push(item)
        };
        if !pushed {
            self.report_overflow();
        }
        pushed
    }

    /// Appends `item`, dropping the oldest entry when full.
    ///
    /// Dropping is an overflow and is reported to the alarm queue.
    pub fn force_push(&self, item: T) -> Option<T> {
        let dropped = {
            let _cs = self.irq.critical_section();
            lock(&self.inner).force_push(item)
        };
        if dropped.is_some() {
            self.report_overflow();
        }
        dropped
    }

    /// Removes the oldest entry.
    pub fn pop(&self) -> Option<T> {
        let _cs = self.irq.critical_section();
        lock(&self.inner).pop()
    }

    /// Discards all entries.
    pub fn reset(&self) {
        let _cs = self.irq.critical_section();
        lock(&self.inner).reset();
    }
}

impl<T> SharedQueue<T> {
    /// Number of queued entries.
    pub fn size(&self) -> usize {
        let _cs = self.irq.critical_section();
        lock(&self.inner).size()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        lock(&self.inner).capacity()
    }

    /// Number of rejected or displaced pushes.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send + 'static> AlarmSource for SharedQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> usize {
        self.size()
    }

    fn reset(&self) {
        Self::reset(self);
    }
}

impl<T: Send + 'static> Waitable for SharedQueue<T> {
    fn is_ready(&self) -> bool {
        self.size() > 0
    }
}
