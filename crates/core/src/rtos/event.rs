//! Counting event primitive.
//!
//! A semaphore without payload. The count is bounded; a push at capacity is
//! rejected and the counter posts itself to the alarm queue.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::alarm::{AlarmQueue, AlarmSource};
use super::irq::IrqControl;
use super::{Waitable, lock};

/// Bounded event counter.
pub struct EventCounter {
    name: String,
    count: Mutex<usize>,
    capacity: usize,
    irq: Arc<IrqControl>,
    alarm: Option<Arc<AlarmQueue>>,
    overflows: AtomicU64,
    me: Weak<Self>,
}

impl fmt::Debug for EventCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCounter")
            .field("name", &self.name)
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl EventCounter {
    /// Creates a counter that holds at most `capacity` events.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        irq: Arc<IrqControl>,
        alarm: Option<Arc<AlarmQueue>>,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            name,
            count: Mutex::new(0),
            capacity,
            irq,
            alarm,
            overflows: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    /// Signals one event; returns `false` at capacity.
    pub fn push(&self) -> bool {
        let accepted = {
            let _cs = self.irq.critical_section();
            let mut count = lock(&self.count);
            if *count < self.capacity {
                *count += 1;
                true
            } else {
                false
            }
        };
        if !accepted {
            let _ = self.overflows.fetch_add(1, Ordering::Relaxed);
            if let (Some(alarm), Some(me)) = (&self.alarm, self.me.upgrade()) {
                let _ = alarm.post(me);
            }
        }
        accepted
    }

    /// Consumes one event; returns `false` if none is pending.
    pub fn pop(&self) -> bool {
        let _cs = self.irq.critical_section();
        let mut count = lock(&self.count);
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Drops all pending events.
    pub fn clear(&self) {
        let _cs = self.irq.critical_section();
        *lock(&self.count) = 0;
    }

    /// Number of pending events.
    pub fn count(&self) -> usize {
        let _cs = self.irq.critical_section();
        *lock(&self.count)
    }

    /// Maximum number of pending events.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of rejected pushes.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl AlarmSource for EventCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> usize {
        self.count()
    }

    fn reset(&self) {
        self.clear();
    }
}

impl Waitable for EventCounter {
    fn is_ready(&self) -> bool {
        self.count() > 0
    }
}
