//! Real-time kernel primitives.
//!
//! This module provides the interrupt fabric and the inter-task plumbing the
//! firmware is built on. It includes:
//! 1. **Interrupts:** MSI dispatch and the reference-counted critical section.
//! 2. **Queues:** Bounded item queues, raw and interrupt-safe.
//! 3. **Events:** Bounded counting events.
//! 4. **Alarms:** Overflow reporting for queues and counters.
//! 5. **Scheduling:** Tasks, notifications and the tick-driven priority scheduler.
//! 6. **Exceptions:** CPU exception policy.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Overflow alarm queue.
pub mod alarm;

/// Counting event primitive.
pub mod event;

/// CPU exception policy.
pub mod exception;

/// Interrupt fabric.
pub mod irq;

/// Bounded queues.
pub mod queue;

/// Priority scheduler.
pub mod scheduler;

/// Task trait and handles.
pub mod task;

pub use alarm::{AlarmQueue, AlarmReport, AlarmSource};
pub use event::EventCounter;
pub use exception::{ExceptionAction, ExceptionHandler, TaskFault};
pub use irq::{CriticalSection, IrqControl, IrqHandler, IrqTable, Msi, MsiSource};
pub use queue::{Queue, SharedQueue};
pub use scheduler::{Scheduler, TickReport};
pub use task::{Priority, Suspend, Task, TaskContext, TaskHandle, WakeReason};

/// A primitive a task can block on.
pub trait Waitable: Send + Sync {
    /// Returns `true` when a waiting task may run.
    fn is_ready(&self) -> bool;
}

/// Locks `mutex`, recovering the data of a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
