use crate::error::{BergamotError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the duration of one model download
///
/// Backed by `flock(2)`, so it serializes downloads across processes as well
/// as across tasks of this one. Released on drop.
#[derive(Debug)]
pub struct ModelLock {
    _lock: Flock<File>,
}

impl ModelLock {
    /// Wait until the lock at `path` is ours
    pub async fn acquire(path: PathBuf) -> Result<Self> {
        tokio::task::spawn_blocking(move || {
            if let Some(lock) = Self::try_acquire(&path)? {
                return Ok(lock);
            }
            tracing::info!("Waiting for another download holding {}", path.display());
            Self::lock(&path, FlockArg::LockExclusive)?
                .ok_or_else(|| BergamotError::FileSystem(format!("Failed to lock {}", path.display())))
        })
        .await
        .map_err(|e| BergamotError::FileSystem(format!("Lock task failed: {e}")))?
    }

    /// Take the lock if nobody holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        Self::lock(path, FlockArg::LockExclusiveNonblock)
    }

    fn lock(path: &Path, arg: FlockArg) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                BergamotError::FileSystem(format!("Failed to open {}: {e}", path.display()))
            })?;

        match Flock::lock(file, arg) {
            Ok(lock) => Ok(Some(Self { _lock: lock })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(BergamotError::FileSystem(format!(
                "Failed to lock {}: {errno}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("locks").join("ende-tiny.lock");

        let held = ModelLock::try_acquire(&path).unwrap();
        assert!(held.is_some());
        assert!(ModelLock::try_acquire(&path).unwrap().is_none());

        drop(held);
        assert!(ModelLock::try_acquire(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_creates_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("locks").join("enit.lock");

        let _lock = ModelLock::acquire(path.clone()).await.unwrap();
        assert!(path.exists());
    }
}
