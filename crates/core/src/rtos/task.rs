//! Task definitions.
//!
//! A firmware task is a step function: the scheduler calls [`Task::run`] whenever
//! the task is ready and the task returns the [`Suspend`] point it blocks on next.
//! Tasks suspend only at a queue wait, a notification wait or a tick-aligned sleep.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::Exception;

use super::Waitable;

/// Task priority; higher runs first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Runs only when no other task is ready.
    Idle = 0,
    /// Housekeeping: command handling, alarm polls.
    Low = 1,
    /// Regular real-time work.
    Normal = 2,
    /// Latency sensitive work.
    High = 3,
    /// Deadline critical work.
    Realtime = 4,
}

/// Where a task blocks after a step.
#[derive(Clone)]
pub enum Suspend {
    /// Run again at the next tick.
    Yield,
    /// Sleep for the given number of ticks.
    Sleep(u32),
    /// Wait for a notification, optionally bounded by a tick timeout.
    WaitNotify {
        /// Timeout in ticks.
        timeout: Option<u32>,
    },
    /// Wait until `source` is ready (queue not empty, event pending).
    WaitFor {
        /// Primitive waited on.
        source: Arc<dyn Waitable>,
        /// Timeout in ticks.
        timeout: Option<u32>,
    },
    /// Leave the scheduler for good.
    Exit,
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield => write!(f, "Yield"),
            Self::Sleep(t) => write!(f, "Sleep({t})"),
            Self::WaitNotify { timeout } => write!(f, "WaitNotify({timeout:?})"),
            Self::WaitFor { timeout, .. } => write!(f, "WaitFor({timeout:?})"),
            Self::Exit => write!(f, "Exit"),
        }
    }
}

/// Why a task was made ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// First run or run after resume.
    Start,
    /// Tick after a yield or sleep.
    Tick,
    /// Notification received.
    Notified,
    /// The waited-on primitive became ready.
    Ready,
    /// The wait timed out.
    Timeout,
}

/// Per-step context handed to a task.
#[derive(Debug)]
pub struct TaskContext<'a> {
    /// Current scheduler tick.
    pub tick: u64,
    /// Why the task runs now.
    pub wake: WakeReason,
    /// Handle of the running task.
    pub handle: &'a TaskHandle,
}

/// A schedulable firmware task.
pub trait Task: Send {
    /// Short task name for logs.
    fn name(&self) -> &str;

    /// Runs one step of the task.
    ///
    /// # Returns
    ///
    /// The suspension point, or the CPU exception the step raised.
    fn run(&mut self, cx: &mut TaskContext<'_>) -> Result<Suspend, Exception>;
}

#[derive(Debug)]
struct TaskControl {
    name: String,
    notified: AtomicBool,
    suspended: AtomicBool,
    running: AtomicBool,
}

/// Shared control handle of a task.
///
/// Notifications are single-edge: several notifies before the task runs wake
/// it once. Notifying a running task is a no-op.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: usize,
    control: Arc<TaskControl>,
}

impl TaskHandle {
    pub(super) fn new(id: usize, name: &str) -> Self {
        Self {
            id,
            control: Arc::new(TaskControl {
                name: name.to_owned(),
                notified: AtomicBool::new(false),
                suspended: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Scheduler-assigned task id.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// Wakes the task from IRQ or task context.
    pub fn notify(&self) {
        if !self.control.running.load(Ordering::Acquire) {
            self.control.notified.store(true, Ordering::Release);
        }
    }

    /// Keeps the task from being scheduled until [`resume`](Self::resume).
    pub fn suspend(&self) {
        self.control.suspended.store(true, Ordering::Release);
    }

    /// Makes a suspended task schedulable again.
    pub fn resume(&self) {
        self.control.suspended.store(false, Ordering::Release);
    }

    /// Returns `true` while suspended.
    pub fn is_suspended(&self) -> bool {
        self.control.suspended.load(Ordering::Acquire)
    }

    pub(super) fn take_notification(&self) -> bool {
        self.control.notified.swap(false, Ordering::AcqRel)
    }

    pub(super) fn set_running(&self, on: bool) {
        self.control.running.store(on, Ordering::Release);
    }
}
