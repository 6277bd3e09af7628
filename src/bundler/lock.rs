//! Advisory lock that keeps two runs off the same output directory.
//!
//! The lock file lives in the system temp directory under a name derived from
//! the absolute output path, so neither the output reset nor the post
//! processor (which sees the output's parent directory) ever encounters it.
//! On Unix it is an exclusive, non-blocking `flock`; other platforms only
//! create the file.
//!
//! The file is unlinked on release. A process that opened it just before the
//! unlink may win the `flock` on the orphaned inode, so after locking the
//! holder checks that the path still names the file it locked and reopens
//! otherwise.

use crate::bail;
use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    fs::{self, File, OpenOptions},
    hash::{DefaultHasher, Hash, Hasher},
    path::{Component, Path, PathBuf},
};

const LOCK_ATTEMPTS: usize = 3;

/// Held for the duration of one bundling run.
#[derive(Debug)]
pub struct OutputLock {
    path: PathBuf,
    _file: File,
}

impl OutputLock {
    /// Takes the lock for `output`, failing with [`Error::OutputLocked`] if
    /// another process holds it.
    pub fn acquire(output: &Path) -> Result<Self> {
        let path = lock_path_for(output)?;

        for _ in 0..LOCK_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .fs_context("opening lock file", &path)?;

            #[cfg(unix)]
            {
                use nix::fcntl::{FlockArg, flock};
                use std::os::unix::io::AsRawFd;

                match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                    Ok(()) => {}
                    Err(e) if e == nix::errno::Errno::EWOULDBLOCK => {
                        return Err(Error::OutputLocked {
                            path: output.to_path_buf(),
                        });
                    }
                    Err(e) => bail!("flock error on {}: {}", path.display(), e),
                }
            }

            if is_current(&file, &path)? {
                log::debug!("Locked {} with {}", output.display(), path.display());
                return Ok(Self { path, _file: file });
            }
            log::debug!("{} was released while locking, retrying", path.display());
        }

        Err(Error::OutputLocked {
            path: output.to_path_buf(),
        })
    }

    /// Location of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        // Unlinked while still locked; the flock goes with the file handle.
        let _ = fs::remove_file(&self.path);
    }
}

/// Lock file for `output` inside the system temp directory.
///
/// The name hashes the absolute, lexically normalized output path, so
/// spellings such as `out/App.app/` and `./out/App.app` share one lock.
pub fn lock_path_for(output: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(output).fs_context("resolving output path", output)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    Ok(std::env::temp_dir().join(format!("kodegen_bundletool-{:016x}.lock", hasher.finish())))
}

/// True when `path` still names the file behind `file`.
#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata().fs_context("inspecting lock file", path)?;
    match fs::metadata(path) {
        Ok(named) => Ok(named.dev() == held.dev() && named.ino() == held.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).fs_context("inspecting lock file", path),
    }
}

#[cfg(not(unix))]
fn is_current(_file: &File, path: &Path) -> Result<bool> {
    Ok(path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_ignores_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/App.app");
        let respelled = dir.path().join("out/./Other/../App.app/");

        assert_eq!(
            lock_path_for(&output).unwrap(),
            lock_path_for(&respelled).unwrap()
        );
        assert_ne!(
            lock_path_for(&output).unwrap(),
            lock_path_for(&dir.path().join("out/Other.app")).unwrap()
        );
    }

    #[test]
    fn test_lock_file_stays_out_of_output_parent() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("App.app");

        let lock = OutputLock::acquire(&output).unwrap();

        assert!(lock.path().starts_with(std::env::temp_dir()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_lock_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("App.app");

        let lock = OutputLock::acquire(&output).unwrap();
        let lock_path = lock.path().to_path_buf();
        assert!(lock_path.exists());
        drop(lock);

        assert!(!lock_path.exists());
        let again = OutputLock::acquire(&output).unwrap();
        assert_eq!(again.path(), lock_path);
    }

    #[cfg(unix)]
    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("App.app");

        let _held = OutputLock::acquire(&output).unwrap();
        let err = OutputLock::acquire(&output).unwrap_err();

        assert!(matches!(err, Error::OutputLocked { path } if path == output));
    }

    #[cfg(unix)]
    #[test]
    fn test_handle_on_released_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.lock");
        let opened = File::create(&path).unwrap();
        assert!(is_current(&opened, &path).unwrap());

        // The holder unlinked it and someone else created a fresh one.
        fs::remove_file(&path).unwrap();
        assert!(!is_current(&opened, &path).unwrap());
        File::create(&path).unwrap();
        assert!(!is_current(&opened, &path).unwrap());
    }
}
