//! RAM backing buffer.
//!
//! This module provides a safe wrapper around a raw word buffer for the simulated off-chip
//! RAM. It uses lazy allocation via `mmap` on Unix systems, so a 128 MiB DDR3 model only
//! costs host memory for the pages the firmware actually touches.

use std::io;

/// A lazily allocated buffer of 64-bit words.
///
/// On Unix systems this uses `mmap` to allocate anonymous memory; pages are only
/// allocated by the OS when first written. Reads and writes out of range are ignored
/// (reads yield 0), the way an unterminated bus access reads back on the real SoC.
pub struct DramBuffer {
    ptr: *mut u64,
    words: usize,
    is_mmap: bool,
}

// SAFETY: the buffer owns its allocation exclusively; all access goes through
// `&self`/`&mut self` of the owning device, which the bus serializes.
unsafe impl Send for DramBuffer {}

impl std::fmt::Debug for DramBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DramBuffer").field("words", &self.words).field("mmap", &self.is_mmap).finish()
    }
}

impl DramBuffer {
    /// Creates a zeroed buffer of `words` 64-bit words.
    ///
    /// # Returns
    ///
    /// The buffer, or the OS error if the mapping failed.
    pub fn new(words: usize) -> io::Result<Self> {
        let bytes = words
            .checked_mul(8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "buffer size overflows"))?;

        #[cfg(unix)]
        {
            if bytes == 0 {
                return Ok(Self {
                    ptr: std::ptr::NonNull::dangling().as_ptr(),
                    words: 0,
                    is_mmap: false,
                });
            }
            // SAFETY: anonymous private mapping, no file descriptor involved.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    bytes,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            Ok(Self {
                ptr: ptr.cast::<u64>(),
                words,
                is_mmap: true,
            })
        }

        #[cfg(not(unix))]
        {
            let _ = bytes;
            let mut vec = vec![0u64; words].into_boxed_slice();
            let ptr = vec.as_mut_ptr();
            std::mem::forget(vec);
            Ok(Self {
                ptr,
                words,
                is_mmap: false,
            })
        }
    }

    /// Returns the size of the buffer in 64-bit words.
    pub const fn len(&self) -> usize {
        self.words
    }

    /// Returns `true` for a zero-sized buffer.
    pub const fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Reads word `index`; 0 out of range.
    pub fn read(&self, index: usize) -> u64 {
        if index >= self.words {
            return 0;
        }
        // SAFETY: index checked against the allocation size above.
        unsafe { *self.ptr.add(index) }
    }

    /// Writes word `index`; ignored out of range.
    pub fn write(&mut self, index: usize, val: u64) {
        if index < self.words {
            // SAFETY: index checked against the allocation size above.
            unsafe { *self.ptr.add(index) = val };
        }
    }
}

impl Drop for DramBuffer {
    /// Unmaps or frees the buffer.
    fn drop(&mut self) {
        if self.is_mmap {
            #[cfg(unix)]
            // SAFETY: ptr/len are exactly the mapping created in `new`.
            unsafe {
                let _ = libc::munmap(self.ptr.cast(), self.words * 8);
            }
        } else {
            #[cfg(not(unix))]
            // SAFETY: reconstructs the boxed slice leaked in `new`.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr, self.words)));
            }
        }
    }
}
