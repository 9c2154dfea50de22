//! Interrupt fabric.
//!
//! This module implements the message-signaled interrupt path of the soft-core CPU. It provides:
//! 1. **Interrupt enable:** A reference-counted critical section over the CPU's IE bit.
//! 2. **Arrival queue seam:** The `MsiSource` trait over the hardware MSI queue.
//! 3. **Handler table:** One handler per IRQ line; dispatch drains each line until empty.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tracing::{trace, warn};

use crate::common::constants::MAX_IRQ_LINES;

/// A message-signaled interrupt as delivered by the arrival queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Msi {
    /// Message word.
    pub msg: u32,
    /// Address word; identifies the sender within the line.
    pub addr: u32,
    /// Selector of the receiving line.
    pub sel: u32,
}

/// Hardware arrival queue of MSIs, one fifo per line.
pub trait MsiSource {
    /// Returns the bitmap of lines with pending messages.
    fn pending_lines(&self) -> u32;
    /// Pops the oldest message of `line`.
    fn pop(&self, line: u8) -> Option<Msi>;
}

/// Interrupt-enable bit and critical-section nesting counter of the CPU.
///
/// Entering increments the nesting count and on the 0 to 1 transition saves and
/// clears the enable bit. Exiting decrements and restores the saved bit on the
/// 1 to 0 transition only.
#[derive(Debug)]
pub struct IrqControl {
    enabled: AtomicBool,
    saved: AtomicBool,
    nesting: AtomicU32,
    // Serializes the read-modify-write of the counter against the enable bit.
    rmw: Mutex<()>,
}

impl Default for IrqControl {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqControl {
    /// Creates the control with interrupts enabled and no open critical section.
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            saved: AtomicBool::new(true),
            nesting: AtomicU32::new(0),
            rmw: Mutex::new(()),
        }
    }

    fn with_rmw<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.rmw.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f()
    }

    /// Returns the state of the interrupt-enable bit.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Sets the interrupt-enable bit directly, outside of any critical section.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
    }

    /// Returns the current nesting depth.
    #[inline]
    pub fn nesting(&self) -> u32 {
        self.nesting.load(Ordering::Acquire)
    }

    /// Enters a critical section.
    pub fn enter(&self) {
        self.with_rmw(|| {
            if self.nesting.fetch_add(1, Ordering::AcqRel) == 0 {
                self.saved.store(self.enabled.load(Ordering::Acquire), Ordering::Release);
                self.enabled.store(false, Ordering::Release);
            }
        });
    }

    /// Leaves a critical section; unbalanced exits are ignored.
    pub fn exit(&self) {
        self.with_rmw(|| {
            let nest = self.nesting.load(Ordering::Acquire);
            if nest == 0 {
                warn!("critical section exit without enter");
                return;
            }
            self.nesting.store(nest - 1, Ordering::Release);
            if nest == 1 {
                self.enabled.store(self.saved.load(Ordering::Acquire), Ordering::Release);
            }
        });
    }

    /// Opens a scoped critical section that closes when the guard drops.
    #[must_use = "the critical section ends when the guard is dropped"]
    pub fn critical_section(&self) -> CriticalSection<'_> {
        self.enter();
        CriticalSection { irq: self }
    }

    /// Runs `f` inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _cs = self.critical_section();
        f()
    }
}

/// Scoped critical section guard.
pub struct CriticalSection<'a> {
    irq: &'a IrqControl,
}

impl fmt::Debug for CriticalSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalSection")
            .field("nesting", &self.irq.nesting())
            .finish()
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        self.irq.exit();
    }
}

/// Handler attached to one IRQ line.
///
/// Handlers run to completion with interrupts disabled. They may only push to
/// queues and notify tasks.
pub trait IrqHandler: Send {
    /// Handles one message of `line`.
    fn handle(&mut self, line: u8, msi: Msi);
}

impl<F: FnMut(u8, Msi) + Send> IrqHandler for F {
    fn handle(&mut self, line: u8, msi: Msi) {
        self(line, msi);
    }
}

/// Table of registered IRQ handlers.
pub struct IrqTable {
    handlers: Vec<Option<Box<dyn IrqHandler>>>,
    dispatched: AtomicU64,
    unhandled: AtomicU64,
}

impl fmt::Debug for IrqTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<usize> = (0..self.handlers.len())
            .filter(|&l| self.handlers[l].is_some())
            .collect();
        f.debug_struct("IrqTable")
            .field("registered", &lines)
            .field("dispatched", &self.dispatched())
            .finish_non_exhaustive()
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqTable {
    /// Creates an empty table for [`MAX_IRQ_LINES`] lines.
    pub fn new() -> Self {
        Self {
            handlers: (0..MAX_IRQ_LINES).map(|_| None).collect(),
            dispatched: AtomicU64::new(0),
            unhandled: AtomicU64::new(0),
        }
    }

    /// Registers `handler` for `line`, replacing any previous one.
    ///
    /// # Returns
    ///
    /// `false` if `line` is out of range.
    pub fn register(&mut self, line: u8, handler: Box<dyn IrqHandler>) -> bool {
        match self.handlers.get_mut(line as usize) {
            Some(slot) => {
                *slot = Some(handler);
                true
            }
            None => false,
        }
    }

    /// Removes the handler of `line`.
    pub fn unregister(&mut self, line: u8) {
        if let Some(slot) = self.handlers.get_mut(line as usize) {
            *slot = None;
        }
    }

    /// Removes all handlers.
    pub fn clear(&mut self) {
        self.handlers.iter_mut().for_each(|h| *h = None);
    }

    /// Messages passed to a handler so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Messages dropped because their line had no handler.
    pub fn unhandled(&self) -> u64 {
        self.unhandled.load(Ordering::Relaxed)
    }

    /// Delivers pending MSIs to their handlers.
    ///
    /// Does nothing while interrupts are disabled. Otherwise interrupts are
    /// disabled for the duration of the dispatch and every pending line is
    /// drained until its arrival queue is empty.
    ///
    /// # Returns
    ///
    /// The number of messages popped.
    pub fn dispatch(&mut self, irq: &IrqControl, source: &dyn MsiSource) -> usize {
        if !irq.is_enabled() {
            return 0;
        }
        irq.set_enabled(false);
        let mut count = 0;
        loop {
            let pending = source.pending_lines() & ((1 << MAX_IRQ_LINES) - 1);
            if pending == 0 {
                break;
            }
            for line in 0..MAX_IRQ_LINES as u8 {
                if pending & (1 << line) == 0 {
                    continue;
                }
                while let Some(msi) = source.pop(line) {
                    count += 1;
                    match self.handlers[line as usize].as_mut() {
                        Some(handler) => {
                            trace!(line, msg = msi.msg, addr = msi.addr, "msi");
                            handler.handle(line, msi);
                            let _ = self.dispatched.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            warn!(line, msg = msi.msg, addr = msi.addr, "msi on line without handler");
                            let _ = self.unhandled.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
        irq.set_enabled(true);
        count
    }
}
