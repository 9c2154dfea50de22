//! CPU exception handling.
//!
//! A task step that raises an [`Exception`] ends in a [`TaskFault`]. The handler
//! logs the signal and maps it to the configured reaction.

use thiserror::Error;
use tracing::error;

use crate::common::Exception;
use crate::config::ExceptionPolicy;

/// An exception raised by a named task.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("task {task} raised {exception}")]
pub struct TaskFault {
    /// Name of the faulting task.
    pub task: String,
    /// The exception.
    pub exception: Exception,
    /// Scheduler tick of the fault.
    pub tick: u64,
}

/// Action taken after a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionAction {
    /// Stop running.
    Halt,
    /// Restart the application from its reset state.
    Restart,
}

/// Applies the exception policy and keeps the fault record.
#[derive(Debug)]
pub struct ExceptionHandler {
    policy: ExceptionPolicy,
    count: u64,
    last: Option<TaskFault>,
}

impl ExceptionHandler {
    /// Creates a handler for `policy`.
    pub const fn new(policy: ExceptionPolicy) -> Self {
        Self {
            policy,
            count: 0,
            last: None,
        }
    }

    /// Logs `fault` and returns the action to take.
    pub fn handle(&mut self, fault: TaskFault) -> ExceptionAction {
        self.count += 1;
        let action = match self.policy {
            ExceptionPolicy::Halt => ExceptionAction::Halt,
            ExceptionPolicy::Restart => ExceptionAction::Restart,
        };
        error!(
            task = %fault.task,
            exception = %fault.exception,
            tick = fault.tick,
            ?action,
            "cpu exception"
        );
        self.last = Some(fault);
        action
    }

    /// Number of faults handled.
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// The most recent fault.
    pub const fn last(&self) -> Option<&TaskFault> {
        self.last.as_ref()
    }
}
