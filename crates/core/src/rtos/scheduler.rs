//! Tick-driven priority scheduler.
//!
//! The scheduler models a single CPU running a preemptive priority scheduler. Per tick it:
//! 1. **Delivers interrupts:** The IRQ hook runs before every task step, so work made
//!    ready by an interrupt preempts lower-priority tasks at the next step boundary.
//! 2. **Wakes tasks:** Sleepers whose deadline passed, notified tasks and tasks whose
//!    waited-on primitive became ready.
//! 3. **Runs the highest-priority ready task:** Round-robin among equal priorities.
//! 4. **Idles:** Calls the idle hook when nothing is ready.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::Waitable;
use super::exception::TaskFault;
use super::task::{Priority, Suspend, Task, TaskContext, TaskHandle, WakeReason};

/// Upper bound on task steps within one tick.
pub const DEFAULT_STEP_BUDGET: usize = 64;

enum State {
    Ready(WakeReason),
    Sleeping { until: u64 },
    Notify { deadline: Option<u64> },
    Waiting { source: Arc<dyn Waitable>, deadline: Option<u64> },
    Exited,
}

struct Entry {
    task: Box<dyn Task>,
    handle: TaskHandle,
    priority: Priority,
    state: State,
    last_run: u64,
    runs: u64,
}

/// Outcome of one scheduler tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number.
    pub tick: u64,
    /// Task steps executed.
    pub steps: usize,
    /// `true` if the tick ended in the idle hook.
    pub idle: bool,
}

/// Tick-driven priority scheduler.
pub struct Scheduler {
    tasks: Vec<Entry>,
    tick: u64,
    serial: u64,
    step_budget: usize,
    idle_hook: Option<Box<dyn FnMut(u64) + Send>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|e| e.handle.name()).collect();
        f.debug_struct("Scheduler")
            .field("tick", &self.tick)
            .field("tasks", &names)
            .finish_non_exhaustive()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler at tick 0.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            tick: 0,
            serial: 0,
            step_budget: DEFAULT_STEP_BUDGET,
            idle_hook: None,
        }
    }

    /// Adds a task; it becomes ready immediately.
    pub fn spawn(&mut self, task: Box<dyn Task>, priority: Priority) -> TaskHandle {
        let handle = TaskHandle::new(self.tasks.len(), task.name());
        debug!(task = %handle.name(), ?priority, "task created");
        self.tasks.push(Entry {
            task,
            handle: handle.clone(),
            priority,
            state: State::Ready(WakeReason::Start),
            last_run: 0,
            runs: 0,
        });
        handle
    }

    /// Installs the hook run when no task is ready.
    pub fn set_idle_hook(&mut self, hook: Box<dyn FnMut(u64) + Send>) {
        self.idle_hook = Some(hook);
    }

    /// Sets the maximum number of task steps per tick.
    pub fn set_step_budget(&mut self, budget: usize) {
        self.step_budget = budget.max(1);
    }

    /// Current tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Returns the handle of the task called `name`.
    pub fn handle(&self, name: &str) -> Option<TaskHandle> {
        self.tasks
            .iter()
            .find(|e| e.handle.name() == name)
            .map(|e| e.handle.clone())
    }

    /// Number of steps run by the task called `name`.
    pub fn runs(&self, name: &str) -> Option<u64> {
        self.tasks.iter().find(|e| e.handle.name() == name).map(|e| e.runs)
    }

    /// Removes all tasks.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    fn deadline(&self, timeout: Option<u32>) -> Option<u64> {
        timeout.map(|t| self.tick + u64::from(t.max(1)))
    }

    fn refresh(&mut self) {
        let now = self.tick;
        for entry in &mut self.tasks {
            let next = match &entry.state {
                State::Sleeping { until } if *until <= now => Some(WakeReason::Tick),
                State::Notify { deadline } => {
                    if entry.handle.take_notification() {
                        Some(WakeReason::Notified)
                    } else if deadline.is_some_and(|d| d <= now) {
                        Some(WakeReason::Timeout)
                    } else {
                        None
                    }
                }
                State::Waiting { source, deadline } => {
                    if source.is_ready() {
                        Some(WakeReason::Ready)
                    } else if deadline.is_some_and(|d| d <= now) {
                        Some(WakeReason::Timeout)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(reason) = next {
                entry.state = State::Ready(reason);
            }
        }
    }

    fn pick(&self) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.state, State::Ready(_)) && !e.handle.is_suspended())
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.last_run.cmp(&a.last_run))
            })
            .map(|(i, _)| i)
    }

    /// Advances one tick.
    ///
    /// # Arguments
    ///
    /// * `irq` - Interrupt delivery hook, run before every step.
    ///
    /// # Returns
    ///
    /// The tick report, or the fault of the first task that raised an exception.
    /// The faulting task is removed from scheduling.
    pub fn run_tick(&mut self, mut irq: impl FnMut()) -> Result<TickReport, TaskFault> {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };
        loop {
            irq();
            self.refresh();
            let Some(index) = self.pick() else {
                report.idle = true;
                if let Some(hook) = self.idle_hook.as_mut() {
                    hook(self.tick);
                }
                break;
            };
            if report.steps >= self.step_budget {
                break;
            }
            report.steps += 1;
            self.step(index)?;
        }
        Ok(report)
    }

    fn step(&mut self, index: usize) -> Result<(), TaskFault> {
        self.serial += 1;
        let tick = self.tick;
        let serial = self.serial;
        let entry = &mut self.tasks[index];
        let wake = match entry.state {
            State::Ready(reason) => reason,
            _ => WakeReason::Tick,
        };
        entry.last_run = serial;
        entry.runs += 1;
        entry.handle.set_running(true);
        let handle = entry.handle.clone();
        let mut cx = TaskContext {
            tick,
            wake,
            handle: &handle,
        };
        let result = entry.task.run(&mut cx);
        entry.handle.set_running(false);
        let next = match result {
            Ok(next) => next,
            Err(exception) => {
                entry.state = State::Exited;
                return Err(TaskFault {
                    task: handle.name().to_owned(),
                    exception,
                    tick,
                });
            }
        };
        trace!(task = %handle.name(), ?next, "task suspended");
        let state = match next {
            Suspend::Yield => State::Sleeping { until: tick + 1 },
            Suspend::Sleep(n) => State::Sleeping {
                until: tick + u64::from(n.max(1)),
            },
            Suspend::WaitNotify { timeout } => State::Notify {
                deadline: self.deadline(timeout),
            },
            Suspend::WaitFor { source, timeout } => State::Waiting {
                source,
                deadline: self.deadline(timeout),
            },
            Suspend::Exit => State::Exited,
        };
        self.tasks[index].state = state;
        Ok(())
    }
}
