//! Advisory lock preventing two engine supervisors from sharing one state
//! directory concurrently.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use hops_shared::errors::{HopsError, HopsResult};

/// Holds an exclusive `flock` on `<state-dir>/hopsd.lock` for the lifetime
/// of the guard. Released automatically on drop (including process exit).
pub struct EngineLock {
    file: File,
    path: PathBuf,
}

impl EngineLock {
    pub fn acquire(lock_path: &Path) -> HopsResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| HopsError::Environment(format!("failed to open lock file: {e}")))?;

        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            return if err.kind() == std::io::ErrorKind::WouldBlock {
                Err(HopsError::State(format!(
                    "AlreadyRunning: another engine supervisor already holds {}",
                    lock_path.display()
                )))
            } else {
                Err(HopsError::Environment(format!(
                    "failed to acquire engine lock: {err}"
                )))
            };
        }

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EngineLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("hopsd.lock");
        let _first = EngineLock::acquire(&lock_path).unwrap();
        let second = EngineLock::acquire(&lock_path);
        assert!(matches!(second, Err(HopsError::State(_))));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("hopsd.lock");
        {
            let _lock = EngineLock::acquire(&lock_path).unwrap();
        }
        let _second = EngineLock::acquire(&lock_path).unwrap();
    }
}
