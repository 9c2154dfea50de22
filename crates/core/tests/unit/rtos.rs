//! # RTOS Tests
//!
//! Critical-section nesting, queue overflow reporting, MSI dispatch and task scheduling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scu_core::common::Exception;
use scu_core::config::ExceptionPolicy;
use scu_core::rtos::{
    AlarmQueue, AlarmReport, EventCounter, ExceptionAction, ExceptionHandler, IrqControl, IrqTable, Msi,
    MsiSource, Priority, Scheduler, SharedQueue, Suspend, Task, TaskContext, TaskFault, WakeReason,
};

// ═══════════════════════════════════════════════════════════════════
// Critical sections
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_nested_critical_sections() {
    let irq = IrqControl::new();
    assert_eq!((irq.nesting(), irq.is_enabled()), (0, true));
    irq.enter();
    assert_eq!((irq.nesting(), irq.is_enabled()), (1, false));
    irq.enter();
    assert_eq!((irq.nesting(), irq.is_enabled()), (2, false));
    irq.exit();
    assert_eq!((irq.nesting(), irq.is_enabled()), (1, false));
    irq.exit();
    assert_eq!((irq.nesting(), irq.is_enabled()), (0, true));
}

#[test]
fn test_hundred_balanced_pairs() {
    let irq = IrqControl::new();
    for _ in 0..100 {
        irq.enter();
        irq.exit();
    }
    assert!(irq.is_enabled());
    assert_eq!(irq.nesting(), 0);
}

#[test]
fn test_disabled_state_survives_critical_section() {
    let irq = IrqControl::new();
    irq.set_enabled(false);
    let value = irq.with(|| {
        let _inner = irq.critical_section();
        7
    });
    assert_eq!(value, 7);
    assert!(!irq.is_enabled());
}

#[test]
fn test_unbalanced_exit_is_ignored() {
    let irq = IrqControl::new();
    irq.exit();
    assert_eq!(irq.nesting(), 0);
    assert!(irq.is_enabled());
}

proptest! {
    #[test]
    fn prop_balanced_sequences_restore_enable(depths in prop::collection::vec(1usize..8, 1..40)) {
        let irq = IrqControl::new();
        for depth in depths {
            (0..depth).for_each(|_| irq.enter());
            prop_assert!(!irq.is_enabled());
            (0..depth).for_each(|_| irq.exit());
        }
        prop_assert_eq!(irq.nesting(), 0);
        prop_assert!(irq.is_enabled());
    }
}

#[test]
fn test_critical_sections_across_threads() {
    let irq = Arc::new(IrqControl::new());
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let irq = Arc::clone(&irq);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _cs = irq.critical_section();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(irq.nesting(), 0);
    assert!(irq.is_enabled());
}

// ═══════════════════════════════════════════════════════════════════
// Queues and alarms
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_queue_overflow_posts_alarm() {
    let irq = Arc::new(IrqControl::new());
    let alarms = Arc::new(AlarmQueue::new(4, Arc::clone(&irq)));
    let queue = SharedQueue::new("events", 2, Arc::clone(&irq), Some(Arc::clone(&alarms)));

    assert!(queue.push(1u32));
    assert!(queue.push(2));
    assert!(!queue.push(3));
    assert_eq!(queue.overflows(), 1);
    assert_eq!(alarms.pending(), 1);

    let reports = alarms.poll(true);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, "events");
    assert_eq!(reports[0].level, 2);
    assert_eq!(queue.size(), 0, "poll with reset empties the queue");
    assert!(irq.is_enabled());
}

#[test]
fn test_force_push_displaces_oldest() {
    let irq = Arc::new(IrqControl::new());
    let queue = SharedQueue::new("irqs", 2, irq, None);
    assert_eq!(queue.force_push('a'), None);
    assert_eq!(queue.force_push('b'), None);
    assert_eq!(queue.force_push('c'), Some('a'));
    assert_eq!(queue.pop(), Some('b'));
    assert_eq!(queue.pop(), Some('c'));
    assert_eq!(queue.pop(), None);
    assert_eq!(queue.overflows(), 1);
}

#[test]
fn test_full_alarm_queue_counts_lost_reports() {
    let irq = Arc::new(IrqControl::new());
    let alarms = Arc::new(AlarmQueue::new(1, Arc::clone(&irq)));
    let a = SharedQueue::new("a", 1, Arc::clone(&irq), Some(Arc::clone(&alarms)));
    let b = SharedQueue::new("b", 1, Arc::clone(&irq), Some(Arc::clone(&alarms)));
    for q in [&a, &b] {
        assert!(q.push(0u8));
        assert!(!q.push(1));
    }
    assert_eq!(alarms.pending(), 1);
    assert_eq!(alarms.lost(), 1);
}

#[test]
fn test_event_counter_is_bounded() {
    let irq = Arc::new(IrqControl::new());
    let events = EventCounter::new("ticks", 3, irq, None);
    assert_eq!(events.capacity(), 3);
    assert!((0..3).all(|_| events.push()));
    assert!(!events.push());
    assert_eq!((events.count(), events.overflows()), (3, 1));

    assert!(events.pop());
    assert_eq!(events.count(), 2);
    events.clear();
    assert_eq!(events.count(), 0);
    assert!(!events.pop());
}

#[test]
fn test_event_counter_overflow_posts_alarm() {
    let irq = Arc::new(IrqControl::new());
    let alarms = Arc::new(AlarmQueue::new(4, Arc::clone(&irq)));
    let events = EventCounter::new("wakeups", 2, Arc::clone(&irq), Some(Arc::clone(&alarms)));
    assert!(events.push());
    assert!(events.push());
    assert!(!events.push());
    assert_eq!(alarms.pending(), 1);

    let reports = alarms.poll(true);
    assert_eq!(
        reports,
        vec![AlarmReport {
            name: "wakeups".to_owned(),
            level: 2,
        }]
    );
    assert_eq!(events.count(), 0, "poll with reset clears the counter");
    assert_eq!(alarms.pending(), 0);
    assert!(irq.is_enabled());
}

// ═══════════════════════════════════════════════════════════════════
// MSI dispatch
// ═══════════════════════════════════════════════════════════════════

#[derive(Default)]
struct FakeMsis {
    lines: Mutex<Vec<VecDeque<Msi>>>,
}

impl FakeMsis {
    fn with(msis: &[(u8, Msi)]) -> Self {
        let fake = Self {
            lines: Mutex::new(vec![VecDeque::new(); 8]),
        };
        for &(line, msi) in msis {
            fake.lines.lock().unwrap()[line as usize].push_back(msi);
        }
        fake
    }
}

impl MsiSource for FakeMsis {
    fn pending_lines(&self) -> u32 {
        let lines = self.lines.lock().unwrap();
        lines
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .fold(0, |acc, (i, _)| acc | 1 << i)
    }

    fn pop(&self, line: u8) -> Option<Msi> {
        self.lines.lock().unwrap().get_mut(line as usize)?.pop_front()
    }
}

#[test]
fn test_dispatch_drains_every_line() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut table = IrqTable::new();
    let sink = Arc::clone(&seen);
    assert!(table.register(1, Box::new(move |line: u8, msi: Msi| sink.lock().unwrap().push((line, msi.addr)))));

    let msi = |addr| Msi { msg: 0x10, addr, sel: 1 };
    let source = FakeMsis::with(&[(1, msi(3)), (1, msi(5)), (2, msi(9))]);
    let irq = IrqControl::new();

    assert_eq!(table.dispatch(&irq, &source), 3);
    assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (1, 5)]);
    assert_eq!(table.dispatched(), 2);
    assert_eq!(table.unhandled(), 1);
    assert!(irq.is_enabled());
}

#[test]
fn test_dispatch_waits_while_disabled() {
    let mut table = IrqTable::new();
    let source = FakeMsis::with(&[(0, Msi::default())]);
    let irq = IrqControl::new();
    let _cs = irq.critical_section();
    assert_eq!(table.dispatch(&irq, &source), 0);
    assert_eq!(source.pending_lines(), 1);
}

// ═══════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<(&'static str, WakeReason)>>>,
    next: fn() -> Suspend,
}

impl Task for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&mut self, cx: &mut TaskContext<'_>) -> Result<Suspend, Exception> {
        self.log.lock().unwrap().push((self.name, cx.wake));
        Ok((self.next)())
    }
}

#[test]
fn test_higher_priority_runs_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();
    for (name, priority) in [("low", Priority::Low), ("rt", Priority::Realtime), ("mid", Priority::Normal)] {
        let _ = sched.spawn(
            Box::new(Recorder {
                name,
                log: Arc::clone(&log),
                next: || Suspend::Exit,
            }),
            priority,
        );
    }
    let report = sched.run_tick(|| {}).unwrap();
    assert_eq!(report.steps, 3);
    assert!(report.idle);
    let order: Vec<&str> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
    assert_eq!(order, vec!["rt", "mid", "low"]);
}

#[test]
fn test_notification_wakes_waiting_task() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();
    let handle = sched.spawn(
        Box::new(Recorder {
            name: "waiter",
            log: Arc::clone(&log),
            next: || Suspend::WaitNotify { timeout: None },
        }),
        Priority::High,
    );
    let _ = sched.run_tick(|| {}).unwrap();
    let _ = sched.run_tick(|| {}).unwrap();
    assert_eq!(sched.runs("waiter"), Some(1));

    handle.notify();
    handle.notify();
    let _ = sched.run_tick(|| {}).unwrap();
    assert_eq!(sched.runs("waiter"), Some(2));
    assert_eq!(log.lock().unwrap()[1], ("waiter", WakeReason::Notified));
}

#[test]
fn test_sleep_and_suspend() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sched = Scheduler::new();
    let handle = sched.spawn(
        Box::new(Recorder {
            name: "sleeper",
            log,
            next: || Suspend::Sleep(3),
        }),
        Priority::Low,
    );
    for _ in 0..6 {
        let _ = sched.run_tick(|| {}).unwrap();
    }
    assert_eq!(sched.runs("sleeper"), Some(2));

    handle.suspend();
    for _ in 0..6 {
        let _ = sched.run_tick(|| {}).unwrap();
    }
    assert_eq!(sched.runs("sleeper"), Some(2));
    handle.resume();
    let _ = sched.run_tick(|| {}).unwrap();
    assert_eq!(sched.runs("sleeper"), Some(3));
}

#[test]
fn test_queue_wait_wakes_on_push() {
    let irq = Arc::new(IrqControl::new());
    let queue = SharedQueue::new("work", 4, irq, None);
    let drained = Arc::new(AtomicUsize::new(0));

    struct Drain {
        queue: Arc<SharedQueue<u32>>,
        drained: Arc<AtomicUsize>,
    }
    impl Task for Drain {
        fn name(&self) -> &str {
            "drain"
        }
        fn run(&mut self, _cx: &mut TaskContext<'_>) -> Result<Suspend, Exception> {
            while self.queue.pop().is_some() {
                let _ = self.drained.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Suspend::WaitFor {
                source: self.queue.clone(),
                timeout: None,
            })
        }
    }

    let mut sched = Scheduler::new();
    let _ = sched.spawn(
        Box::new(Drain {
            queue: Arc::clone(&queue),
            drained: Arc::clone(&drained),
        }),
        Priority::Realtime,
    );
    let _ = sched.run_tick(|| {}).unwrap();
    let mut pushed = false;
    let _ = sched
        .run_tick(|| {
            if !pushed {
                pushed = queue.push(1);
                let _ = queue.push(2);
            }
        })
        .unwrap();
    assert_eq!(drained.load(Ordering::Relaxed), 2);
    assert_eq!(sched.runs("drain"), Some(2));
}

#[test]
fn test_faulting_task_is_reported() {
    struct Faulty;
    impl Task for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn run(&mut self, _cx: &mut TaskContext<'_>) -> Result<Suspend, Exception> {
            Err(Exception::BusFault(0x1234))
        }
    }

    let mut sched = Scheduler::new();
    let _ = sched.spawn(Box::new(Faulty), Priority::Normal);
    let fault = sched.run_tick(|| {}).unwrap_err();
    assert_eq!(
        fault,
        TaskFault {
            task: "faulty".into(),
            exception: Exception::BusFault(0x1234),
            tick: 1
        }
    );

    let mut handler = ExceptionHandler::new(ExceptionPolicy::Restart);
    assert_eq!(handler.handle(fault.clone()), ExceptionAction::Restart);
    assert_eq!(handler.count(), 1);
    assert_eq!(handler.last(), Some(&fault));

    // the task left the scheduler
    let report = sched.run_tick(|| {}).unwrap();
    assert_eq!(report.steps, 0);
}
