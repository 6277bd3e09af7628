//! File system utilities for bundling.
//!
//! Path normalization for bundle destinations, containment checks against
//! links already in the bundle, byte-level comparison of existing bundle
//! files, and output directory resets.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    ffi::OsStr,
    fs::File,
    io::{self, BufReader, Read},
    path::{Component, Path, PathBuf},
};
use tokio::fs;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Creates all of the directories of the specified path, erasing it first if specified.
///
/// Erasing removes whatever currently lives at `path`: a directory tree, a
/// regular file, or a symbolic link (the link itself, never its referent).
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        match fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)
                .await
                .fs_context("removing existing output", path)?,
            Ok(_) => fs::remove_file(path)
                .await
                .fs_context("removing existing output", path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).fs_context("inspecting existing output", path),
        }
    }

    fs::create_dir_all(path)
        .await
        .fs_context("creating output directory", path)
}

/// Lexically normalizes a bundle-relative path.
///
/// Removes `.` segments and redundant separators and folds `..` into the
/// preceding segment. Absolute paths and paths that climb above the bundle
/// root are rejected with [`Error::InvalidDestination`]. The bundle root
/// itself normalizes to an empty path.
pub fn normalize_relative(path: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(invalid_destination(path));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid_destination(path));
            }
        }
    }
    Ok(parts.into_iter().collect())
}

/// Joins `rel` under `prefix` and normalizes the result.
pub fn join_normalized(prefix: &Path, rel: impl AsRef<Path>) -> Result<PathBuf> {
    let rel = rel.as_ref();
    if rel.has_root() {
        return Err(invalid_destination(rel));
    }
    normalize_relative(&prefix.join(rel))
}

/// Fails with [`Error::InvalidDestination`] when a link already present on
/// the way from `root` to the parent of `rel` resolves outside `root`.
///
/// `rel` must be normalized. Checking stops at the first missing component
/// or dangling link, since nothing can be created through either.
pub fn ensure_contained(root: &Path, rel: &Path) -> Result<()> {
    let Some(parent) = rel.parent() else {
        return Ok(());
    };
    let real_root = match std::fs::canonicalize(root) {
        Ok(real) => real,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).fs_context("resolving bundle root", root),
    };

    let mut current = root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        let meta = match std::fs::symlink_metadata(&current) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).fs_context("inspecting bundle path", &current),
        };
        if !meta.file_type().is_symlink() {
            continue;
        }
        match std::fs::canonicalize(&current) {
            Ok(real) if real.starts_with(&real_root) => {}
            Ok(real) => {
                log::debug!(
                    "{} leaves the bundle through {}",
                    rel.display(),
                    real.display()
                );
                return Err(invalid_destination(rel));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).fs_context("resolving bundle link", &current),
        }
    }
    Ok(())
}

fn invalid_destination(path: &Path) -> Error {
    Error::InvalidDestination {
        dest: path.to_string_lossy().into_owned(),
    }
}

/// Returns true when the file at `path` holds exactly `data`.
pub fn content_matches(path: &Path, data: &[u8]) -> io::Result<bool> {
    let file = File::open(path)?;
    if file.metadata()?.len() != data.len() as u64 {
        return Ok(false);
    }
    let mut reader = BufReader::new(file);
    let mut buf = vec![0u8; COMPARE_CHUNK];
    let mut offset = 0;
    loop {
        let n = read_full(&mut reader, &mut buf)?;
        if n == 0 {
            return Ok(offset == data.len());
        }
        if data.get(offset..offset + n) != Some(&buf[..n]) {
            return Ok(false);
        }
        offset += n;
    }
}

/// Returns true when both files hold identical bytes.
///
/// Lengths are checked first; equal lengths are always followed by a full
/// streaming comparison.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let file_a = File::open(a)?;
    let file_b = File::open(b)?;
    if file_a.metadata()?.len() != file_b.metadata()?.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(file_a);
    let mut reader_b = BufReader::new(file_b);
    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];
    loop {
        let n_a = read_full(&mut reader_a, &mut buf_a)?;
        let n_b = read_full(&mut reader_b, &mut buf_b)?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Fills `buf` as far as the reader allows; returns the byte count (0 at EOF).
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
