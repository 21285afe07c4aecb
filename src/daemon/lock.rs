//! Exclusive instance lock. Only one controller may drive the BMC at a time.
//!
//! The lock is an flock(2) on a file that also records the holder's PID. The kernel
//! drops it when the process exits, so a crashed instance never leaves a stale lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another instance already holds {path:?}{}", holder_suffix(.pid))]
    AlreadyRunning { path: PathBuf, pid: Option<u32> },
    #[error("cannot open lock file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

fn holder_suffix(pid: &Option<u32>) -> String {
    pid.map(|p| format!(" (PID {})", p)).unwrap_or_default()
}

#[derive(Debug)]
pub struct InstanceLock {
    // Held open for the process lifetime; closing it releases the lock
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io { path: path.to_path_buf(), source };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        if !try_flock(&file).map_err(io_err)? {
            return Err(LockError::AlreadyRunning { path: path.to_path_buf(), pid: read_holder_pid(path) });
        }

        file.set_len(0).map_err(io_err)?;
        file.write_all(std::process::id().to_string().as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        info!("Acquired instance lock {:?}", path);
        Ok(Self { _file: file, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Non-blocking exclusive flock. Ok(false) when another open file holds it.
fn try_flock(file: &File) -> io::Result<bool> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// PID recorded by the current (or last) holder.
pub fn read_holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether a live instance holds the lock right now.
pub fn is_locked(path: &Path) -> bool {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    // Probing takes the lock for an instant if it is free; it is released when `file` drops
    matches!(try_flock(&file), Ok(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("nas-fanctl.lock");

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_holder_pid(&path), Some(std::process::id()));
        assert!(is_locked(&path));

        match InstanceLock::acquire(&path) {
            Err(LockError::AlreadyRunning { pid, .. }) => assert_eq!(pid, Some(std::process::id())),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }

        drop(lock);
        assert!(!is_locked(&path));
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_missing_lock_file_is_not_locked() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_locked(&dir.path().join("absent.lock")));
    }
}
