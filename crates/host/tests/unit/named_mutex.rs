//! # Named Mutex Tests
//!
//! Lock file naming and exclusion between threads and between open handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;

use pretty_assertions::assert_eq;
use rstest::rstest;
use scu_host::named_mutex::{NamedMutex, sanitize};

#[rstest]
#[case("dev/wbm0", "dev_wbm0")]
#[case("tcp/scuxl0042.acc:60368", "tcp_scuxl0042_acc_60368")]
#[case("plain-name_1", "plain-name_1")]
#[case("", "")]
fn test_sanitize(#[case] device: &str, #[case] expected: &str) {
    assert_eq!(sanitize(device), expected);
}

#[test]
fn test_open_creates_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let mutex = NamedMutex::open(dir.path(), "dev/wbm0").unwrap();
    assert_eq!(mutex.name(), "dev_wbm0");
    assert_eq!(mutex.path(), dir.path().join("scu-dev_wbm0.lock"));
    assert!(mutex.path().exists());
}

#[test]
fn test_try_lock_fails_while_held() {
    let dir = tempfile::tempdir().unwrap();
    let mutex = NamedMutex::open(dir.path(), "dev/wbm0").unwrap();

    let guard = mutex.lock().unwrap();
    assert!(mutex.try_lock().unwrap().is_none());
    drop(guard);
    assert!(mutex.try_lock().unwrap().is_some());
}

#[test]
fn test_second_handle_is_excluded() {
    // two handles on one file behave like two processes
    let dir = tempfile::tempdir().unwrap();
    let a = NamedMutex::open(dir.path(), "tcp/scu1").unwrap();
    let b = NamedMutex::open(dir.path(), "tcp/scu1").unwrap();
    assert_eq!(a.path(), b.path());

    let guard = a.lock().unwrap();
    assert!(b.try_lock().unwrap().is_none());
    drop(guard);
    assert!(b.try_lock().unwrap().is_some());
}

#[test]
fn test_other_devices_do_not_contend() {
    let dir = tempfile::tempdir().unwrap();
    let a = NamedMutex::open(dir.path(), "dev/wbm0").unwrap();
    let b = NamedMutex::open(dir.path(), "dev/wbm1").unwrap();
    let _guard = a.lock().unwrap();
    assert!(b.try_lock().unwrap().is_some());
}

#[test]
fn test_threads_take_turns() {
    let dir = tempfile::tempdir().unwrap();
    let mutex = Arc::new(NamedMutex::open(dir.path(), "dev/wbm0").unwrap());
    let inside = Arc::new(AtomicBool::new(false));
    let total = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (mutex, inside, total) = (Arc::clone(&mutex), Arc::clone(&inside), Arc::clone(&total));
            thread::spawn(move || {
                for _ in 0..50 {
                    let _guard = mutex.lock().unwrap();
                    assert!(!inside.swap(true, Ordering::SeqCst));
                    thread::yield_now();
                    inside.store(false, Ordering::SeqCst);
                    let _ = total.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(total.load(Ordering::Relaxed), 200);
}
