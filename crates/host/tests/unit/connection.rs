//! # Connection Tests
//!
//! Lazy opening, ownership of the link and per-cycle measurement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use pretty_assertions::assert_eq;
use scu_core::access::{BusOp, OpKind, SharedTransport, Transport};
use scu_core::common::{AccessKind, AddrMode, Format, TransportError, Width};
use scu_host::connection::Opener;
use scu_host::{Connection, HostConfig};
use tempfile::TempDir;

/// Answers every read with its own address.
#[derive(Debug, Default)]
struct Echo {
    cycles: AtomicUsize,
}

impl Transport for Echo {
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        let _ = self.cycles.fetch_add(1, Ordering::Relaxed);
        for op in ops.iter_mut().filter(|op| op.kind == OpKind::Read) {
            op.value = op.addr & op.width.mask();
        }
        Ok(())
    }
}

fn config(dir: &TempDir) -> HostConfig {
    HostConfig {
        device: "tcp/scuxl0001".to_owned(),
        lock_dir: dir.path().to_path_buf(),
        ..HostConfig::default()
    }
}

/// An opener that counts its calls and keeps a weak handle on the last link.
fn counting_opener() -> (Opener, Arc<AtomicUsize>, Arc<Mutex<Weak<Echo>>>) {
    let opens = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(Weak::new()));
    let (o, l) = (Arc::clone(&opens), Arc::clone(&last));
    let opener: Opener = Box::new(move |device, _timeout| {
        assert_eq!(device, "tcp/scuxl0001");
        let _ = o.fetch_add(1, Ordering::Relaxed);
        let link = Arc::new(Echo::default());
        *l.lock().unwrap() = Arc::downgrade(&link);
        let transport: SharedTransport = link;
        Ok(transport)
    });
    (opener, opens, last)
}

#[test]
fn test_opens_on_first_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (opener, opens, _) = counting_opener();
    let conn = Connection::new(&config(&dir), opener).unwrap();
    assert!(!conn.is_connected());
    assert_eq!(opens.load(Ordering::Relaxed), 0);

    let mut out = [0u64; 2];
    conn.read(0x100, &mut out, Format::BE32, AddrMode::Linear).unwrap();
    conn.read(0x200, &mut out, Format::BE32, AddrMode::Linear).unwrap();
    assert!(conn.is_connected());
    assert_eq!(opens.load(Ordering::Relaxed), 1);
}

#[test]
fn test_owned_link_is_closed_and_reopened() {
    let dir = tempfile::tempdir().unwrap();
    let (opener, opens, last) = counting_opener();
    let conn = Connection::new(&config(&dir), opener).unwrap();
    conn.connect().unwrap();
    let first = last.lock().unwrap().clone();
    assert!(first.upgrade().is_some());

    assert!(conn.close());
    assert!(!conn.is_connected());
    assert!(first.upgrade().is_none());
    assert!(!conn.close());

    conn.connect().unwrap();
    assert_eq!(opens.load(Ordering::Relaxed), 2);
}

#[test]
fn test_drop_closes_owned_link() {
    let dir = tempfile::tempdir().unwrap();
    let (opener, _, last) = counting_opener();
    let conn = Connection::new(&config(&dir), opener).unwrap();
    conn.connect().unwrap();
    drop(conn);
    assert!(last.lock().unwrap().upgrade().is_none());
}

#[test]
fn test_attached_link_is_never_closed() {
    let dir = tempfile::tempdir().unwrap();
    let link = Arc::new(Echo::default());
    let transport: SharedTransport = Arc::clone(&link) as SharedTransport;
    let conn = Connection::attach(&config(&dir), transport).unwrap();
    assert!(conn.is_connected());

    assert!(!conn.close());
    assert!(conn.is_connected());
    drop(conn);
    // the caller's link is still usable
    link.cycle(&mut [BusOp::read(0x10, Width::U32)]).unwrap();
    assert_eq!(link.cycles.load(Ordering::Relaxed), 1);
}

#[test]
fn test_opener_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let opener: Opener = Box::new(|_, timeout| Err(TransportError::Timeout(timeout)));
    let conn = Connection::new(&config(&dir), opener).unwrap();
    let mut out = [0u64; 1];
    let err = conn.read(0, &mut out, Format::BE32, AddrMode::Linear).unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
    assert!(!conn.is_connected());
}

#[test]
fn test_cycles_are_measured_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::attach(&config(&dir), Arc::new(Echo::default())).unwrap();
    conn.add_ram_window(0x2000_0000..0x2100_0000);

    let mut out = [0u64; 1];
    conn.read(0x100, &mut out, Format::BE32, AddrMode::Linear).unwrap();
    let lm32 = conn.measurements().take();
    assert_eq!(lm32.count, 1);
    assert_eq!(lm32.max.map(|m| m.kind), Some(AccessKind::Lm32Read));

    conn.write(0x2000_0010, &[1, 2, 3], Format::BE32, AddrMode::Linear).unwrap();
    let ram = conn.measurements().take();
    assert_eq!(ram.count, 1);
    assert_eq!(ram.max.map(|m| (m.kind, m.size)), Some((AccessKind::RamWrite, 3)));
}

#[test]
fn test_cycles_hold_the_named_mutex() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let conn = Connection::attach(&cfg, Arc::new(Echo::default())).unwrap();
    let other = scu_host::named_mutex::NamedMutex::open(&cfg.lock_dir, &cfg.device).unwrap();

    let guard = other.lock().unwrap();
    let worker = {
        let conn = Arc::clone(&conn);
        std::thread::spawn(move || {
            let mut out = [0u64; 1];
            conn.read(0x40, &mut out, Format::BE32, AddrMode::Linear).unwrap();
        })
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(conn.measurements().peek().count, 0);
    drop(guard);
    worker.join().unwrap();
    assert_eq!(conn.measurements().peek().count, 1);
}
