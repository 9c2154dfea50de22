//! OS-scoped named mutex.
//!
//! Several processes may drive the same device. Each transport cycle must run
//! alone, so every cycle holds an exclusive `flock(2)` on a lock file named after
//! the device. The file lock does not order threads sharing one descriptor, so a
//! process-local mutex is taken first.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Prefix of every lock file name.
const LOCK_PREFIX: &str = "scu-";

/// Turns a device name into a valid file name: every character that is not
/// alphanumeric, `-` or `_` becomes `_`.
///
/// # Examples
///
/// ```
/// use scu_host::named_mutex::sanitize;
///
/// assert_eq!(sanitize("tcp/scuxl0042.acc:60368"), "tcp_scuxl0042_acc_60368");
/// ```
pub fn sanitize(device: &str) -> String {
    device
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// A mutex shared by every process that names the same device.
#[derive(Debug)]
pub struct NamedMutex {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl NamedMutex {
    /// Opens (creating if needed) the lock file for `device` in `dir`.
    pub fn open(dir: &Path, device: &str) -> io::Result<Self> {
        let name = sanitize(device);
        let path = dir.join(format!("{LOCK_PREFIX}{name}.lock"));
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
        Ok(Self {
            name,
            path,
            file: Mutex::new(file),
        })
    }

    /// Sanitized device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until this process and thread own the mutex.
    pub fn lock(&self) -> io::Result<NamedMutexGuard<'_>> {
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        flock(&file, libc::LOCK_EX)?;
        Ok(NamedMutexGuard { file })
    }

    /// Takes the mutex if nobody holds it.
    ///
    /// # Returns
    ///
    /// `None` if another thread or process holds it.
    pub fn try_lock(&self) -> io::Result<Option<NamedMutexGuard<'_>>> {
        let Ok(file) = self.file.try_lock() else {
            return Ok(None);
        };
        match flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(Some(NamedMutexGuard { file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Releases the named mutex when dropped.
#[derive(Debug)]
pub struct NamedMutexGuard<'a> {
    file: MutexGuard<'a, File>,
}

impl Drop for NamedMutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = flock(&self.file, libc::LOCK_UN) {
            tracing::error!(error = %e, "named mutex unlock failed");
        }
    }
}

fn flock(file: &File, op: libc::c_int) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `file`, which outlives the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
    if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}
