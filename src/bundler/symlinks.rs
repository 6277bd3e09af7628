//! Deferred creation of symbolic links extracted from archives.
//!
//! Archive entries arrive in stored order, so a link can show up before the
//! directory it lives in exists (for example a framework's
//! `Versions/Current/Headers` when `Versions/Current` is itself a pending
//! link). Links are therefore collected per archive and created afterwards
//! from a work queue, retrying those whose parent is still missing.
//!
//! Each new link is given mode 0755 without following it. Platforms that
//! cannot change a link's own mode (Linux) keep whatever they assigned.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    utils::fs::{ensure_contained, normalize_relative},
};
use std::{
    collections::VecDeque,
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};

/// A symbolic link waiting to be created inside the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredSymlink {
    /// Link target exactly as stored in the archive
    pub target: String,
    /// Bundle-relative location of the link
    pub dest: PathBuf,
}

impl DeferredSymlink {
    /// Creates a pending link at `dest` pointing to `target`.
    pub fn new(target: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            dest: dest.into(),
        }
    }
}

/// Counts from one [`resolve`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveReport {
    /// Links created
    pub created: usize,
    /// Links already present with the same target
    pub unchanged: usize,
}

enum Attempt {
    Created,
    Unchanged,
    ParentMissing,
}

/// Creates every pending link under `root`.
///
/// Items are taken from the back of the queue; a link whose parent directory
/// is waiting on another pending link goes back to the front. A full pass
/// over the queue without progress fails with [`Error::UnresolvedSymlinks`].
pub fn resolve(root: &Path, pending: Vec<DeferredSymlink>) -> Result<ResolveReport> {
    drain(pending, |link, rest| try_link(root, link, rest))
}

/// Runs the work queue, handing each link and the links still waiting to `attempt`.
fn drain<F>(pending: Vec<DeferredSymlink>, mut attempt: F) -> Result<ResolveReport>
where
    F: FnMut(&DeferredSymlink, &VecDeque<DeferredSymlink>) -> Result<Attempt>,
{
    let mut queue: VecDeque<DeferredSymlink> = pending.into();
    let mut report = ResolveReport::default();
    let mut stalled = 0usize;

    while let Some(link) = queue.pop_back() {
        match attempt(&link, &queue)? {
            Attempt::Created => {
                report.created += 1;
                stalled = 0;
            }
            Attempt::Unchanged => {
                report.unchanged += 1;
                stalled = 0;
            }
            Attempt::ParentMissing => {
                log::debug!(
                    "deferring link {} -> {}: parent not there yet",
                    link.dest.display(),
                    link.target
                );
                queue.push_front(link);
                stalled += 1;
                if stalled >= queue.len() {
                    return Err(Error::UnresolvedSymlinks {
                        links: queue.into_iter().map(|l| l.dest).collect(),
                    });
                }
            }
        }
    }

    Ok(report)
}

fn try_link(root: &Path, link: &DeferredSymlink, pending: &VecDeque<DeferredSymlink>) -> Result<Attempt> {
    let dest = normalize_relative(&link.dest)?;
    ensure_contained(root, &dest)?;
    let full = root.join(&dest);

    match fs::symlink_metadata(&full) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let existing = fs::read_link(&full).fs_context("reading existing link", &full)?;
            return if existing.as_os_str() == OsStr::new(&link.target) {
                log::debug!("link {} already points to {}", dest.display(), link.target);
                Ok(Attempt::Unchanged)
            } else {
                Err(Error::BundleConflict { dest })
            };
        }
        Ok(_) => return Err(Error::BundleConflict { dest }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).fs_context("inspecting bundle path", &full),
    }

    match make_symlink(&link.target, &full) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if waits_on_pending_link(&dest, pending) {
                return Ok(Attempt::ParentMissing);
            }
            // Nothing pending can supply the parent, so it is a plain directory.
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).fs_context("creating link directory", parent)?;
            }
            make_symlink(&link.target, &full).fs_context("creating symbolic link", &full)?;
        }
        Err(e) => return Err(e).fs_context("creating symbolic link", &full),
    }
    set_link_mode(&full)?;

    log::debug!("linked {} -> {}", dest.display(), link.target);
    Ok(Attempt::Created)
}

/// True when some pending link sits on the path between the root and `dest`.
fn waits_on_pending_link(dest: &Path, pending: &VecDeque<DeferredSymlink>) -> bool {
    pending
        .iter()
        .any(|other| other.dest != dest && dest.starts_with(&other.dest))
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Sets the link's own mode to 0755; `ENOTSUP` counts as done.
#[cfg(unix)]
fn set_link_mode(link: &Path) -> Result<()> {
    use nix::{
        errno::Errno,
        fcntl::AT_FDCWD,
        sys::stat::{FchmodatFlags, Mode, fchmodat},
    };

    let mode = Mode::S_IRWXU | Mode::S_IRGRP | Mode::S_IXGRP | Mode::S_IROTH | Mode::S_IXOTH;
    match fchmodat(AT_FDCWD, link, mode, FchmodatFlags::NoFollowSymlink) {
        Ok(()) => Ok(()),
        Err(e) if e == Errno::ENOTSUP || e == Errno::EOPNOTSUPP => Ok(()),
        Err(e) => Err(io::Error::from(e)).fs_context("setting link permissions", link),
    }
}

#[cfg(not(unix))]
fn set_link_mode(_link: &Path) -> Result<()> {
    Ok(())
}
