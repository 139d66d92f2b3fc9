//! The registry lock: an exclusive advisory lock file inside the bare
//! repository, held for the duration of any registry mutation
//! (register/deregister/branch-create).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use crate::error::ArborError;

/// Name of the lock file inside the bare repository.
pub const LOCK_FILE_NAME: &str = "arbor.lock";

/// Held registry lock. Releases on drop, so error returns and panics give
/// the lock back too.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Acquire the registry lock, retrying with linear backoff.
    ///
    /// Fails with [`ArborError::LockTimeout`] once `attempts` tries are
    /// exhausted; a competing arbor process holding the lock is the normal
    /// cause.
    pub fn acquire(bare_dir: &Path, attempts: u32, backoff: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = bare_dir.join(LOCK_FILE_NAME);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        for attempt in 1..=attempts.max(1) {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    log::debug!("registry lock acquired: {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if attempt < attempts => {
                    let wait = backoff * attempt;
                    log::debug!(
                        "registry lock busy (attempt {attempt}/{attempts}, retrying in {}ms): {e}",
                        wait.as_millis()
                    );
                    std::thread::sleep(wait);
                }
                Err(_) => break,
            }
        }

        Err(ArborError::LockTimeout {
            lock_path: path,
            attempts,
        }
        .into())
    }

    /// Path of the lock file, for messages.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            log::debug!("failed to release registry lock {}: {e}", self.path.display());
        }
    }
}
