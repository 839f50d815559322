//! Advisory per-interface lock.
//!
//! Bring-up and teardown of the same interface must never interleave. Within
//! a process that is enforced with a `tokio` mutex per interface name;
//! across processes with an exclusive `flock` on `<lock dir>/<name>.lock`.
//! Both are held for the lifetime of [`InterfaceLock`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg, OFlag};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Result, WireGuardError};

/// How often a contended `flock` is retried.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Registry = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

static IN_PROCESS: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Exclusive ownership of one interface name.
#[derive(Debug)]
pub struct InterfaceLock {
    interface: String,
    path: PathBuf,
    _file: Flock<File>,
    _guard: OwnedMutexGuard<()>,
}

impl InterfaceLock {
    /// Waits up to `timeout` for exclusive ownership of `interface`.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if another holder keeps the lock past the
    /// deadline and `Lock` if the lock file cannot be created or locked.
    pub async fn acquire(interface: &str, lock_dir: &Path, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let timed_out = || WireGuardError::LockTimeout {
            interface: interface.to_string(),
            timeout,
        };

        let mutex = IN_PROCESS
            .lock()
            .entry(interface.to_string())
            .or_default()
            .clone();
        let guard = tokio::time::timeout_at(deadline, mutex.lock_owned())
            .await
            .map_err(|_| timed_out())?;

        let path = lock_dir.join(format!("{interface}.lock"));
        let lock_err = |message: String| WireGuardError::Lock {
            path: path.clone(),
            message,
        };

        tokio::fs::create_dir_all(lock_dir)
            .await
            .map_err(|e| lock_err(e.to_string()))?;
        let mut file: File = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .custom_flags(OFlag::O_NOFOLLOW.bits())
            .open(&path)
            .await
            .map_err(|e| lock_err(e.to_string()))?
            .into_std()
            .await;

        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(flock) => {
                    debug!(interface, path = %path.display(), "interface lock acquired");
                    return Ok(Self {
                        interface: interface.to_string(),
                        path: path.clone(),
                        _file: flock,
                        _guard: guard,
                    });
                }
                Err((f, errno)) if errno == Errno::EWOULDBLOCK => {
                    if Instant::now() >= deadline {
                        return Err(timed_out());
                    }
                    trace!(interface, "lock file held by another process, retrying");
                    file = f;
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err((_, errno)) => return Err(lock_err(errno.to_string())),
            }
        }
    }

    /// The locked interface name.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InterfaceLock {
    fn drop(&mut self) {
        debug!(interface = %self.interface, "interface lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_file_created_in_lock_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = InterfaceLock::acquire("lk-create", dir.path(), Duration::from_secs(1))
            .await
            .expect("acquire");

        assert_eq!(lock.path(), dir.path().join("lk-create.lock"));
        assert!(lock.path().exists());
        assert_eq!(lock.interface(), "lk-create");
    }

    #[tokio::test]
    async fn missing_lock_dir_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("run").join("veilguard");
        let lock = InterfaceLock::acquire("lk-nested", &nested, Duration::from_secs(1))
            .await
            .expect("acquire");
        assert!(lock.path().starts_with(&nested));
    }

    #[tokio::test]
    async fn symlinked_lock_file_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let victim = dir.path().join("victim");
        std::fs::write(&victim, "keep\n").expect("write victim");
        std::os::unix::fs::symlink(&victim, dir.path().join("lk-link.lock")).expect("symlink");

        let result = InterfaceLock::acquire("lk-link", dir.path(), Duration::from_millis(200)).await;
        assert!(matches!(result, Err(WireGuardError::Lock { .. })));
        assert_eq!(std::fs::read_to_string(&victim).expect("read victim"), "keep\n");
    }

    #[tokio::test]
    async fn second_holder_times_out_while_first_is_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _held = InterfaceLock::acquire("lk-busy", dir.path(), Duration::from_secs(1))
            .await
            .expect("acquire");

        let second = InterfaceLock::acquire("lk-busy", dir.path(), Duration::from_millis(100)).await;
        assert!(matches!(second, Err(WireGuardError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn released_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = InterfaceLock::acquire("lk-drop", dir.path(), Duration::from_secs(1))
            .await
            .expect("acquire");
        drop(first);

        InterfaceLock::acquire("lk-drop", dir.path(), Duration::from_millis(100))
            .await
            .expect("reacquire after drop");
    }

    #[tokio::test]
    async fn different_interfaces_do_not_contend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _a = InterfaceLock::acquire("lk-a", dir.path(), Duration::from_secs(1))
            .await
            .expect("acquire a");
        let _b = InterfaceLock::acquire("lk-b", dir.path(), Duration::from_millis(100))
            .await
            .expect("acquire b");
    }

    #[tokio::test]
    async fn waiter_proceeds_once_holder_releases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let held = InterfaceLock::acquire("lk-wait", dir.path(), Duration::from_secs(1))
            .await
            .expect("acquire");

        let path = dir.path().to_path_buf();
        let waiter = tokio::spawn(async move {
            InterfaceLock::acquire("lk-wait", &path, Duration::from_secs(5))
                .await
                .map(|lock| lock.interface().to_string())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        let acquired = waiter.await.expect("join").expect("acquire after release");
        assert_eq!(acquired, "lk-wait");
    }
}
