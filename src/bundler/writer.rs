//! Conflict-checked file placement inside the bundle.
//!
//! Every regular file that enters the bundle goes through [`BundleWriter`].
//! A destination may receive any number of contributions as long as they are
//! byte-identical; the first distinct one raises [`Error::BundleConflict`].

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::fs::{content_matches, ensure_contained, files_identical, normalize_relative},
};
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Mode applied to files flagged executable.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Mode applied to every other regular file.
pub const REGULAR_MODE: u32 = 0o644;

/// What a single write did to the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new file was placed.
    Written,
    /// An identical file was already present; nothing changed.
    Unchanged,
}

/// Counters accumulated over one bundling run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Regular files placed in the bundle
    pub files_written: usize,
    /// Regular file contributions identical to what was already present
    pub files_unchanged: usize,
    /// Symbolic links created
    pub symlinks_created: usize,
    /// Symbolic link contributions matching an existing link
    pub symlinks_unchanged: usize,
}

impl MergeStats {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.files_written += 1,
            WriteOutcome::Unchanged => self.files_unchanged += 1,
        }
    }
}

/// Writes regular files under a bundle root, refusing conflicting content.
#[derive(Debug)]
pub struct BundleWriter {
    root: PathBuf,
    stats: MergeStats,
}

impl BundleWriter {
    /// Creates a writer for the bundle rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stats: MergeStats::default(),
        }
    }

    /// The bundle root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Counters for everything written so far.
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut MergeStats {
        &mut self.stats
    }

    /// Places `data` at the bundle-relative `dest`.
    pub fn write(&mut self, dest: &Path, data: &[u8], executable: bool) -> Result<WriteOutcome> {
        let dest = normalize_relative(dest)?;
        ensure_contained(&self.root, &dest)?;
        let full = self.root.join(&dest);

        let outcome = match self.check_existing(&dest, &full, |existing| {
            content_matches(existing, data)
        })? {
            Some(outcome) => outcome,
            None => self.persist(&dest, &full, executable, |file| file.write_all(data))?,
        };
        self.stats.record(outcome);
        Ok(outcome)
    }

    /// Copies the file at `src` to the bundle-relative `dest`.
    pub fn copy(&mut self, dest: &Path, src: &Path, executable: bool) -> Result<WriteOutcome> {
        let dest = normalize_relative(dest)?;
        ensure_contained(&self.root, &dest)?;
        let full = self.root.join(&dest);

        let outcome = match self.check_existing(&dest, &full, |existing| {
            files_identical(existing, src)
        })? {
            Some(outcome) => outcome,
            None => {
                let mut source = File::open(src).fs_context("opening merge source", src)?;
                self.persist(&dest, &full, executable, |file| {
                    io::copy(&mut source, file).map(|_| ())
                })?
            }
        };
        self.stats.record(outcome);
        Ok(outcome)
    }

    /// Returns `Some(Unchanged)` when an identical file is present, `None`
    /// when the destination is free.
    fn check_existing(
        &self,
        dest: &Path,
        full: &Path,
        same_content: impl FnOnce(&Path) -> io::Result<bool>,
    ) -> Result<Option<WriteOutcome>> {
        match fs::symlink_metadata(full) {
            Ok(meta) if meta.is_file() => {
                if same_content(full).fs_context("comparing with existing bundle file", full)? {
                    log::debug!("{} already present with identical content", dest.display());
                    Ok(Some(WriteOutcome::Unchanged))
                } else {
                    Err(Error::BundleConflict {
                        dest: dest.to_path_buf(),
                    })
                }
            }
            Ok(_) => Err(Error::BundleConflict {
                dest: dest.to_path_buf(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).fs_context("inspecting bundle path", full),
        }
    }

    /// Fills a temporary sibling of `full`, sets its mode, then renames it into place.
    fn persist(
        &self,
        dest: &Path,
        full: &Path,
        executable: bool,
        fill: impl FnOnce(&mut File) -> io::Result<()>,
    ) -> Result<WriteOutcome> {
        let parent = full
            .parent()
            .with_context(|| format!("bundle path {} has no parent", full.display()))?;
        fs::create_dir_all(parent).fs_context("creating bundle directory", parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".bundletool-")
            .tempfile_in(parent)
            .fs_context("creating temporary file in", parent)?;
        fill(staged.as_file_mut()).fs_context("writing bundle file", full)?;
        set_mode(staged.path(), executable)?;
        staged
            .persist(full)
            .map_err(|e| e.error)
            .fs_context("moving file into bundle", full)?;

        log::debug!(
            "wrote {} ({})",
            dest.display(),
            if executable { "executable" } else { "regular" }
        );
        Ok(WriteOutcome::Written)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { EXECUTABLE_MODE } else { REGULAR_MODE };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .fs_context("setting file permissions", path)
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_write_creates_parents_and_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BundleWriter::new(dir.path());

        let outcome = writer
            .write(Path::new("Contents/MacOS/app"), b"\x7fELF", true)
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        let full = dir.path().join("Contents/MacOS/app");
        assert_eq!(fs::read(&full).unwrap(), b"\x7fELF");
        #[cfg(unix)]
        assert_eq!(mode_of(&full), 0o755);
    }

    #[test]
    fn test_identical_rewrite_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BundleWriter::new(dir.path());

        writer.write(Path::new("Info.plist"), b"<plist/>", false).unwrap();
        let again = writer.write(Path::new("Info.plist"), b"<plist/>", false).unwrap();

        assert_eq!(again, WriteOutcome::Unchanged);
        assert_eq!(writer.stats().files_written, 1);
        assert_eq!(writer.stats().files_unchanged, 1);
    }

    #[test]
    fn test_different_content_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BundleWriter::new(dir.path());

        writer.write(Path::new("a/b.txt"), b"one", false).unwrap();
        let err = writer.write(Path::new("a/./b.txt"), b"two", false).unwrap_err();

        match err {
            Error::BundleConflict { dest } => assert_eq!(dest, PathBuf::from("a/b.txt")),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(fs::read(dir.path().join("a/b.txt")).unwrap(), b"one");
    }

    #[test]
    fn test_copy_compares_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle");
        let same = dir.path().join("same");
        let other = dir.path().join("other");
        fs::write(&same, b"payload-1").unwrap();
        fs::write(&other, b"payload-2").unwrap();

        let mut writer = BundleWriter::new(&bundle);
        writer.write(Path::new("res"), b"payload-1", false).unwrap();

        assert_eq!(
            writer.copy(Path::new("res"), &same, false).unwrap(),
            WriteOutcome::Unchanged
        );
        assert!(matches!(
            writer.copy(Path::new("res"), &other, false),
            Err(Error::BundleConflict { .. })
        ));
    }

    #[test]
    fn test_copy_sets_regular_mode() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tool");
        fs::write(&src, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&src, fs::Permissions::from_mode(0o700)).unwrap();
        }

        let mut writer = BundleWriter::new(dir.path().join("bundle"));
        writer.copy(Path::new("bin/tool"), &src, false).unwrap();

        #[cfg(unix)]
        assert_eq!(mode_of(&dir.path().join("bundle/bin/tool")), 0o644);
    }

    #[test]
    fn test_directory_at_destination_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Resources")).unwrap();

        let mut writer = BundleWriter::new(dir.path());
        assert!(matches!(
            writer.write(Path::new("Resources"), b"x", false),
            Err(Error::BundleConflict { .. })
        ));
    }

    #[test]
    fn test_escaping_destination_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BundleWriter::new(dir.path().join("bundle"));
        assert!(matches!(
            writer.write(Path::new("../outside"), b"x", false),
            Err(Error::InvalidDestination { .. })
        ));
        assert!(!dir.path().join("outside").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_through_outside_link_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("ext")).unwrap();
        let src = dir.path().join("payload");
        fs::write(&src, b"x").unwrap();

        let mut writer = BundleWriter::new(dir.path());
        assert!(matches!(
            writer.write(Path::new("ext/sub/written"), b"x", false),
            Err(Error::InvalidDestination { .. })
        ));
        assert!(matches!(
            writer.copy(Path::new("ext/copied"), &src, false),
            Err(Error::InvalidDestination { .. })
        ));
        assert_eq!(fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BundleWriter::new(dir.path());
        writer.write(Path::new("x/y"), b"data", false).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("x"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("y")]);
    }
}
