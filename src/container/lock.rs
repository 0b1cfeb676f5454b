//! Per-container-name host lock
//!
//! Two logins for the same user racing through remove-then-create could
//! remove each other's fresh container. An exclusive `flock` keyed by the
//! container name serializes them.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Exclusive lock on one container name, released on drop
#[derive(Debug)]
pub struct NameLock {
    _file: File,
    path: PathBuf,
}

impl NameLock {
    /// Block (on a worker thread) until the lock for `name` is held. `dir` is
    /// created owner-only if missing.
    pub async fn acquire(dir: &Path, name: &str) -> io::Result<Self> {
        let dir = dir.to_path_buf();
        let path = dir.join(format!("boxsh-{}.lock", name));
        debug!(path = %path.display(), "Acquiring container lock");

        tokio::task::spawn_blocking(move || Self::acquire_blocking(&dir, path))
            .await
            .map_err(io::Error::other)?
    }

    fn acquire_blocking(dir: &Path, path: PathBuf) -> io::Result<Self> {
        DirBuilder::new().recursive(true).mode(0o700).create(dir)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .custom_flags(libc::O_NOFOLLOW)
            .open(&path)?;

        loop {
            // SAFETY: the descriptor stays open for the lifetime of `file`
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
