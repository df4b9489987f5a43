//! Cross-process entry leases.
//!
//! A lease is an exclusive advisory lock on an entry's lock file. At most
//! one lease per entry key exists at a time, across threads and across
//! separate processes sharing one cache directory. Acquisition waits a
//! bounded time; holders release on drop, so a killed process never leaves
//! an entry permanently locked.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use fs2::FileExt;
use tracing::debug;

use crate::error::Result;

/// Poll interval while waiting for a contended lock.
const ACQUIRE_POLL: Duration = Duration::from_millis(100);

/// An exclusive, cross-process lease on one cache entry.
///
/// The advisory lock is held for the lifetime of the value and released on
/// drop (or explicitly via [`Lease::release`]).
#[derive(Debug)]
pub struct Lease {
    file: File,
    path: PathBuf,
}

impl Lease {
    /// Try to acquire the lease without waiting.
    ///
    /// Returns `None` when another holder has the lock.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Acquire the lease, waiting up to `wait` for a contended lock.
    ///
    /// Returns `None` if the lock is still held when the wait expires;
    /// callers translate that into their own contention error.
    pub fn acquire(path: &Path, wait: Duration) -> Result<Option<Self>> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(lease) = Self::try_acquire(path)? {
                return Ok(Some(lease));
            }

            if Instant::now() >= deadline {
                debug!(path = %path.display(), "lease wait expired");
                return Ok(None);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(ACQUIRE_POLL));
        }
    }

    /// The lock file this lease holds.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lease explicitly.
    pub fn release(self) {
        // Unlock happens in Drop.
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!(path = %self.path.display(), error = %e, "failed to unlock lease file");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating lease directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("opening lease file {}", path.display()))?;
    Ok(file)
}
