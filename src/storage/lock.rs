//! # Store File Locking
//!
//! Every record store holds an exclusive advisory lock on a sibling
//! `.lock` file for its whole lifetime, so two processes can never replay
//! and append the same log. Acquisition retries until the configured
//! `lock_timeout` elapses; there is no blocking wait on the OS lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};

use crate::error::DbError;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquires the lock, retrying until `timeout` elapses.
    pub fn acquire(store_path: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path(store_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open lock file '{}'", path.display()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if try_flock(&file)? {
                return Ok(Self { file, path });
            }
            if Instant::now() >= deadline {
                return Err(DbError::StorageLocked {
                    path: store_path.to_path_buf(),
                }
                .into());
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        funlock(&self.file);
    }
}

#[cfg(unix)]
fn try_flock(file: &File) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(eyre::Report::new(err).wrap_err("flock failed"))
    }
}

#[cfg(unix)]
fn funlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn funlock(_file: &File) {}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut os = store_path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_is_exclusive_within_timeout() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("col_x.db");

        let held = FileLock::acquire(&store, Duration::from_millis(50)).unwrap();
        let contender = FileLock::acquire(&store, Duration::from_millis(50));
        assert!(contender.is_err());
        drop(held);

        FileLock::acquire(&store, Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn typed_locked_error() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("col_x.db");

        let _held = FileLock::acquire(&store, Duration::from_millis(50)).unwrap();
        let err = FileLock::acquire(&store, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::StorageLocked { .. })
        ));
    }
}
