use std::sync::{Arc, Mutex};

use mockall::mock;
use scu_core::access::{BusOp, OpKind, Transport};
use scu_core::common::TransportError;
use scu_core::ram::{RamAccess, RamError};

mock! {
    pub Link {}
    impl Transport for Link {
        fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError>;
        fn max_cycle_ops(&self) -> usize;
    }
}

/// Every cycle a mock link has executed, in order.
#[derive(Clone, Default)]
pub struct CycleLog {
    cycles: Arc<Mutex<Vec<Vec<BusOp>>>>,
}

impl CycleLog {
    pub fn cycles(&self) -> Vec<Vec<BusOp>> {
        self.cycles.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<BusOp> {
        self.cycles().into_iter().flatten().collect()
    }
}

/// A link with `max` operations per cycle that logs every cycle.
///
/// Reads return the address, so tests can tell which element came from where.
pub fn recording_link(max: usize) -> (MockLink, CycleLog) {
    let log = CycleLog::default();
    let sink = log.clone();
    let mut link = MockLink::new();
    let _ = link.expect_max_cycle_ops().return_const(max);
    let _ = link.expect_cycle().returning(move |ops| {
        for op in ops.iter_mut() {
            if op.kind == OpKind::Read {
                op.value = op.addr & op.width.mask();
            }
        }
        sink.cycles.lock().unwrap().push(ops.to_vec());
        Ok(())
    });
    (link, log)
}

/// Word-addressed RAM held in process memory.
pub struct MemRam {
    words: Mutex<Vec<u64>>,
}

impl MemRam {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            words: Mutex::new(vec![0; capacity]),
        })
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.words.lock().unwrap().clone()
    }
}

impl RamAccess for MemRam {
    fn read64(&self, index: u64, out: &mut [u64]) -> Result<(), RamError> {
        self.check_range(index, out.len())?;
        let words = self.words.lock().unwrap();
        let start = index as usize;
        out.copy_from_slice(&words[start..start + out.len()]);
        Ok(())
    }

    fn write64(&self, index: u64, data: &[u64]) -> Result<(), RamError> {
        self.check_range(index, data.len())?;
        let mut words = self.words.lock().unwrap();
        let start = index as usize;
        words[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn capacity64(&self) -> u64 {
        self.words.lock().unwrap().len() as u64
    }
}
