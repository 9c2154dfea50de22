//! Simulator: owns the SoC and the firmware application side by side.
//!
//! Every tick first advances the devices, then runs one scheduler tick of the
//! application, so interrupts raised by a device are taken in the same tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::access::SharedTransport;
use crate::common::ScuError;
use crate::config::Config;
use crate::firmware::Application;
use crate::rtos::TickReport;
use crate::soc::{Soc, SocTransport};

/// Top-level simulator: simulated hardware plus the firmware running on it.
#[derive(Debug)]
pub struct Simulator {
    /// Simulated hardware.
    pub soc: Soc,
    /// Firmware application.
    pub app: Application,
    tick_period: Option<Duration>,
}

impl Simulator {
    /// Boots the firmware on `soc`.
    pub fn new(soc: Soc, config: &Config) -> Result<Self, ScuError> {
        let transport: SharedTransport = Arc::new(soc.transport());
        let app = Application::new(transport, soc.msi(), config)?;
        let tick_period = match config.general.tick_rate_hz {
            0 => None,
            hz => Some(Duration::from_secs(1) / hz),
        };
        Ok(Self { soc, app, tick_period })
    }

    /// A transport on the simulated bus for host-side code.
    pub fn host_transport(&self) -> SocTransport {
        self.soc.transport()
    }

    /// Delivers a timing event to the receiver queue.
    pub fn inject_event(&self, tag: u32, time: u64) -> bool {
        self.soc.inject_event(tag, time)
    }

    /// Advances the devices and the application by one tick.
    pub fn tick(&mut self) -> Result<TickReport, ScuError> {
        let _ = self.soc.tick();
        self.app.tick()
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: u64) -> Result<(), ScuError> {
        for _ in 0..ticks {
            let _ = self.tick()?;
        }
        Ok(())
    }

    /// Ticks until `done` holds, at most `max_ticks` times.
    ///
    /// # Returns
    ///
    /// `true` if `done` held before the limit.
    pub fn run_until(&mut self, max_ticks: u64, mut done: impl FnMut(&Self) -> bool) -> Result<bool, ScuError> {
        for _ in 0..max_ticks {
            if done(self) {
                return Ok(true);
            }
            let _ = self.tick()?;
        }
        Ok(done(self))
    }

    /// Moves the simulator onto a background thread ticking at the configured rate.
    ///
    /// A tick rate of 0 runs as fast as possible.
    pub fn spawn(self) -> RunningSimulator {
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let (thread_stop, thread_ticks) = (Arc::clone(&stop), Arc::clone(&ticks));
        let thread = thread::spawn(move || {
            let mut sim = self;
            while !thread_stop.load(Ordering::Acquire) {
                if let Err(err) = sim.tick() {
                    error!(%err, "simulator stopped");
                    break;
                }
                let _ = thread_ticks.fetch_add(1, Ordering::Relaxed);
                match sim.tick_period {
                    Some(period) => thread::sleep(period),
                    None => thread::yield_now(),
                }
            }
            debug!(ticks = thread_ticks.load(Ordering::Relaxed), "simulator thread done");
            sim
        });
        RunningSimulator {
            stop,
            ticks,
            thread: Some(thread),
        }
    }
}

/// A simulator ticking on a background thread.
#[derive(Debug)]
pub struct RunningSimulator {
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<Simulator>>,
}

impl RunningSimulator {
    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stops the thread and hands the simulator back.
    ///
    /// # Returns
    ///
    /// `None` if the simulator thread panicked.
    pub fn stop(mut self) -> Option<Simulator> {
        self.stop.store(true, Ordering::Release);
        self.thread.take()?.join().ok()
    }
}

impl Drop for RunningSimulator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
