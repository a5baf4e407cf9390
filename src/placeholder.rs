//! Placeholder guard
//!
//! A placeholder is a zero-length file created at the final destination path
//! of a pending entry. It is held under an exclusive advisory lock for as long
//! as the entry is pending, so the media manager watching the download folder
//! sees the name reserved but cannot import an empty file. The placeholder is
//! removed immediately before the real file is copied into place.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Holds the open, locked handles of every placeholder this process owns
#[derive(Debug, Default)]
pub struct PlaceholderGuard {
    held: Mutex<HashMap<PathBuf, File>>,
}

impl PlaceholderGuard {
    /// Create a guard holding no placeholders
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or re-lock) the placeholder at `path`
    ///
    /// An existing zero-length file is reused; this is how placeholders left
    /// from a previous run are locked again. A non-empty file at `path` is a
    /// real artifact and is left alone. Failing to get the lock because
    /// another process holds it is logged, not an error.
    ///
    /// A held handle whose file was since replaced at `path` (for example by
    /// a delivery renaming over it) is dropped and a fresh placeholder taken.
    pub async fn create(&self, path: &Path) -> Result<()> {
        let mut held = self.held.lock().await;
        let stale = match held.get(path) {
            Some(file) if same_file(file, path) => {
                tracing::debug!(path = %path.display(), "placeholder already held");
                return Ok(());
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            tracing::debug!(path = %path.display(), "dropping stale placeholder handle");
            held.remove(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Ok(meta) = tokio::fs::metadata(path).await
            && meta.len() > 0
        {
            tracing::warn!(
                path = %path.display(),
                size = meta.len(),
                "non-empty file already at destination, not creating placeholder"
            );
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        if try_flock_exclusive(&file)? {
            tracing::debug!(path = %path.display(), "placeholder created and locked");
            held.insert(path.to_path_buf(), file);
        } else {
            tracing::warn!(
                path = %path.display(),
                "placeholder is locked by another process"
            );
        }
        Ok(())
    }

    /// Release and remove the placeholder at `path`
    ///
    /// An absent placeholder is logged and treated as success. A non-empty
    /// file is never removed.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let mut held = self.held.lock().await;
        // Dropping the handle releases the lock
        let was_held = held.remove(path).is_some();

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => {
                return Err(Error::Other(format!(
                    "refusing to delete non-empty file at placeholder path {}",
                    path.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), was_held, "placeholder already absent");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "placeholder removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether some open handle holds an exclusive lock on `path`
    pub fn is_locked(path: &Path) -> Result<bool> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        // Our probe handle is closed on drop, which releases a lock we got
        Ok(!try_flock_exclusive(&file)?)
    }

    /// Whether this guard currently holds `path`
    pub async fn holds(&self, path: &Path) -> bool {
        self.held.lock().await.contains_key(path)
    }

    /// Drop every held lock; the files stay on disk
    pub async fn release_all(&self) -> usize {
        let mut held = self.held.lock().await;
        let count = held.len();
        held.clear();
        if count > 0 {
            tracing::info!(count, "released placeholder locks");
        }
        count
    }
}

/// Whether `file` is still the file found at `path`
fn same_file(file: &File, path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (file.metadata(), std::fs::metadata(path)) {
            (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        path.exists()
    }
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call. fd is a valid file descriptor
        // owned by `file`. LOCK_EX | LOCK_NB is non-blocking exclusive lock.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
