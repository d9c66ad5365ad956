//! Cross-process run gate
//!
//! At most one rotation runs per history file. The gate is an exclusive
//! advisory lock on `<history>.lock`, released when the [`RunGate`] drops.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Instant, sleep};

use super::error::ServiceError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock file path for a history file.
pub fn lock_path(history: &Path) -> PathBuf {
    let mut name = history.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    history.with_file_name(name)
}

/// Held run gate
#[derive(Debug)]
pub struct RunGate {
    file: File,
    path: PathBuf,
}

impl RunGate {
    /// Take the gate without waiting.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, ServiceError> {
        let lock_err = |source| ServiceError::Lock {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(lock_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(lock_err(e)),
        }
    }

    /// Take the gate, waiting up to `grace` for the current holder.
    pub async fn acquire(path: &Path, grace: Duration) -> Result<Self, ServiceError> {
        let started = Instant::now();
        loop {
            if let Some(gate) = Self::try_acquire(path)? {
                return Ok(gate);
            }
            let waited = started.elapsed();
            if waited >= grace {
                tracing::debug!(
                    path = %path.display(),
                    waited_ms = waited.as_millis() as u64,
                    "Run gate busy"
                );
                return Err(ServiceError::Busy { waited });
            }
            sleep(POLL_INTERVAL.min(grace - waited)).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunGate {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run gate");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/var/lib/rotator/history.log")),
            PathBuf::from("/var/lib/rotator/history.log.lock")
        );
    }

    #[tokio::test]
    async fn test_second_holder_is_busy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.lock");

        let held = RunGate::acquire(&path, Duration::ZERO).await.unwrap();
        let busy = RunGate::acquire(&path, Duration::from_millis(120)).await;
        assert!(matches!(busy, Err(ServiceError::Busy { .. })));

        drop(held);
        assert!(RunGate::try_acquire(&path).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.lock");

        let held = RunGate::acquire(&path, Duration::ZERO).await.unwrap();
        let releaser = tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            drop(held);
        });
        let gate = RunGate::acquire(&path, Duration::from_secs(5)).await;
        assert!(gate.is_ok());
        releaser.await.unwrap();
    }
}
