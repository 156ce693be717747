//! Byte-range locks over a region of an open file
//!
//! Locks are advisory `fcntl` record locks. On Linux they are open file
//! description locks (`F_OFD_SETLKW`): owned by the handle, so two handles
//! on one file exclude each other even inside one process, and closing one
//! handle leaves the other's locks alone. Other unix targets fall back to
//! classic per-process locks (`F_SETLKW`).
//!
//! Threads sharing one handle are not excluded by either kind and must be
//! serialized by the caller. The lock is released when the guard is dropped.

use std::fs::File;
use std::io;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// Guard holding a lock on `[start, start + len)` of a file
#[derive(Debug)]
pub struct RangeLock<'a> {
    file: &'a File,
    start: u64,
    len: u64,
}

impl<'a> RangeLock<'a> {
    /// Block until the region is locked
    pub fn acquire(file: &'a File, start: u64, len: u64, kind: LockKind) -> io::Result<Self> {
        if len == 0 || start.checked_add(len).map_or(true, |end| end > i64::MAX as u64) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid lock range {}+{}", start, len),
            ));
        }
        sys::lock(file, start, len, kind)?;
        Ok(Self { file, start, len })
    }

    pub fn range(&self) -> (u64, u64) {
        (self.start, self.len)
    }
}

impl Drop for RangeLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = sys::unlock(self.file, self.start, self.len) {
            debug!(start = self.start, len = self.len, error = %e, "Failed to release range lock");
        }
    }
}

#[cfg(unix)]
mod sys {
    use super::LockKind;
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    #[cfg(target_os = "linux")]
    const SET_LOCK_WAIT: libc::c_int = libc::F_OFD_SETLKW;
    #[cfg(not(target_os = "linux"))]
    const SET_LOCK_WAIT: libc::c_int = libc::F_SETLKW;

    fn set_lock(file: &File, start: u64, len: u64, l_type: libc::c_int) -> io::Result<()> {
        // SAFETY: flock is a plain C struct, all-zero is a valid value.
        // OFD locks require l_pid == 0.
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = l_type as _;
        fl.l_whence = libc::SEEK_SET as _;
        fl.l_start = start as libc::off_t;
        fl.l_len = len as libc::off_t;

        loop {
            // SAFETY: valid fd for the lifetime of `file`, `fl` outlives the call
            let rc = unsafe { libc::fcntl(file.as_raw_fd(), SET_LOCK_WAIT, &fl as *const libc::flock) };
            if rc != -1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    pub fn lock(file: &File, start: u64, len: u64, kind: LockKind) -> io::Result<()> {
        let l_type = match kind {
            LockKind::Shared => libc::F_RDLCK,
            LockKind::Exclusive => libc::F_WRLCK,
        };
        set_lock(file, start, len, l_type as libc::c_int)
    }

    pub fn unlock(file: &File, start: u64, len: u64) -> io::Result<()> {
        set_lock(file, start, len, libc::F_UNLCK as libc::c_int)
    }
}

// No record locks: callers still get the in-process serialization.
#[cfg(not(unix))]
mod sys {
    use super::LockKind;
    use std::fs::File;
    use std::io;

    pub fn lock(_file: &File, _start: u64, _len: u64, _kind: LockKind) -> io::Result<()> {
        Ok(())
    }

    pub fn unlock(_file: &File, _start: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }
}
