//! Block subscribers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scu_core::protocol::Descriptor;

/// Receives the blocks of one DAQ channel.
pub trait Subscriber: Send {
    /// Called once per block, in ring order.
    fn on_block(&mut self, descriptor: &Descriptor, payload: &[u16]);
}

impl<F: FnMut(&Descriptor, &[u16]) + Send> Subscriber for F {
    fn on_block(&mut self, descriptor: &Descriptor, payload: &[u16]) {
        self(descriptor, payload);
    }
}

/// Keeps every block it receives.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collector {
    /// Received blocks, oldest first.
    pub blocks: Vec<(Descriptor, Vec<u16>)>,
}

impl Collector {
    /// Creates an empty collector behind a shared handle.
    pub fn shared() -> SharedCollector {
        SharedCollector::default()
    }

    /// Sequence numbers of the received blocks.
    pub fn sequences(&self) -> Vec<u16> {
        self.blocks.iter().map(|(d, _)| d.sequence).collect()
    }
}

impl Subscriber for Collector {
    fn on_block(&mut self, descriptor: &Descriptor, payload: &[u16]) {
        self.blocks.push((*descriptor, payload.to_vec()));
    }
}

/// A [`Collector`] one clone of which is subscribed while another is read.
#[derive(Debug, Default, Clone)]
pub struct SharedCollector(Arc<Mutex<Collector>>);

impl SharedCollector {
    /// Locks the collector.
    pub fn lock(&self) -> MutexGuard<'_, Collector> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Subscriber for SharedCollector {
    fn on_block(&mut self, descriptor: &Descriptor, payload: &[u16]) {
        self.lock().on_block(descriptor, payload);
    }
}
