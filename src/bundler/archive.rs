//! Merging ZIP archive contents into the bundle.
//!
//! Entries are classified from the Unix mode stored in the upper half of
//! their external attributes. Regular files go straight to the
//! [`BundleWriter`]; symbolic links are collected and handed to
//! [`symlinks::resolve`] once the whole archive has been read, because a
//! link may precede the entries it lives beside.

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    symlinks::{self, DeferredSymlink},
    utils::fs::join_normalized,
    writer::BundleWriter,
};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;
const S_IFDIR: u32 = 0o040000;
const ANY_EXECUTE: u32 = 0o111;
const MAX_PREALLOC: usize = 1 << 20;

/// How an archive entry is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory marker (name ends with `/`); produces nothing.
    Directory,
    /// Symbolic link; the payload is the link target.
    Symlink,
    /// Regular file.
    File {
        /// Any of the owner, group or other execute bits is set
        executable: bool,
    },
}

impl EntryKind {
    /// Classifies an entry from its stored name and Unix mode.
    pub fn classify(name: &str, unix_mode: u32) -> Self {
        if name.ends_with('/') {
            EntryKind::Directory
        } else if unix_mode & S_IFMT == S_IFLNK {
            EntryKind::Symlink
        } else {
            // DOS directory attributes come back as S_IFDIR with execute bits.
            EntryKind::File {
                executable: unix_mode & S_IFMT != S_IFDIR && unix_mode & ANY_EXECUTE != 0,
            }
        }
    }
}

/// Extracts every entry of the archive at `archive_path` beneath the
/// bundle-relative `dest_prefix`.
///
/// Conflicts raised by the writer or resolver propagate unchanged; entries
/// already written stay in place.
pub fn extract(writer: &mut BundleWriter, archive_path: &Path, dest_prefix: &Path) -> Result<()> {
    log::info!(
        "Merging archive {} into {}",
        archive_path.display(),
        display_prefix(dest_prefix)
    );

    let file = File::open(archive_path).fs_context("opening archive", archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(Error::from)
        .with_context(|| format!("reading archive {}", archive_path.display()))?;

    let mut links = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(Error::from)
            .with_context(|| format!("reading entry {index} of {}", archive_path.display()))?;
        let name = entry.name().to_owned();

        // `None` marks a link entry.
        let executable = match EntryKind::classify(&name, entry.unix_mode().unwrap_or(0)) {
            EntryKind::Directory => continue,
            EntryKind::Symlink => None,
            EntryKind::File { executable } => Some(executable),
        };

        let dest = join_normalized(dest_prefix, &name)?;
        let mut data = Vec::with_capacity(prealloc_len(entry.size()));
        entry
            .read_to_end(&mut data)
            .fs_context("reading archive entry", archive_path.join(&name))?;

        match executable {
            Some(executable) => {
                writer.write(&dest, &data, executable)?;
            }
            None => {
                let target = String::from_utf8(data)
                    .map_err(Error::from)
                    .with_context(|| format!("link entry {name} in {}", archive_path.display()))?;
                links.push(DeferredSymlink::new(target, dest));
            }
        }
    }

    if !links.is_empty() {
        log::debug!(
            "creating {} deferred link(s) from {}",
            links.len(),
            archive_path.display()
        );
    }
    let report = symlinks::resolve(writer.root(), links)?;
    let stats = writer.stats_mut();
    stats.symlinks_created += report.created;
    stats.symlinks_unchanged += report.unchanged;

    Ok(())
}

/// Buffer size to reserve for an entry; the header's claim is not trusted past 1 MiB.
fn prealloc_len(claimed: u64) -> usize {
    usize::try_from(claimed).map_or(MAX_PREALLOC, |len| len.min(MAX_PREALLOC))
}

fn display_prefix(prefix: &Path) -> String {
    if prefix.as_os_str().is_empty() {
        "bundle root".to_string()
    } else {
        prefix.display().to_string()
    }
}
