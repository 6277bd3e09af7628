//! Merging plain files and directory trees into the bundle.

use crate::bundler::{
    error::{ErrorExt, Result},
    utils::fs::{join_normalized, normalize_relative},
    writer::BundleWriter,
};
use std::{fs, io, path::Path};
use walkdir::WalkDir;

/// Adds the file or directory at `src` to the bundle.
///
/// A single file lands exactly at `dest`, which includes its file name. A
/// directory is walked recursively and every regular file beneath it lands at
/// `dest` joined with its path relative to `src`. Sources that do not exist,
/// or are neither a file nor a directory, are skipped.
pub fn add_files(writer: &mut BundleWriter, src: &Path, dest: &Path, executable: bool) -> Result<()> {
    let meta = match fs::metadata(src) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Skipping {}: source does not exist", src.display());
            return Ok(());
        }
        Err(e) => return Err(e).fs_context("inspecting merge source", src),
    };

    if meta.is_dir() {
        log::info!("Merging directory {} into {}", src.display(), dest.display());
        for entry in WalkDir::new(src).sort_by_file_name() {
            let entry = entry?;
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }
            let rel = entry.path().strip_prefix(src)?;
            let file_dest = join_normalized(dest, rel)?;
            writer.copy(&file_dest, entry.path(), executable)?;
        }
    } else if meta.is_file() {
        log::debug!("Merging file {} into {}", src.display(), dest.display());
        writer.copy(&normalize_relative(dest)?, src, executable)?;
    } else {
        log::debug!("Skipping {}: not a regular file or directory", src.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::Error;
    use std::path::PathBuf;

    #[test]
    fn test_tree_keeps_relative_structure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("res");
        fs::create_dir_all(src.join("a")).unwrap();
        fs::write(src.join("a/b.txt"), b"b").unwrap();
        fs::write(src.join("c.txt"), b"c").unwrap();

        let bundle = dir.path().join("bundle");
        let mut writer = BundleWriter::new(&bundle);
        add_files(&mut writer, &src, Path::new("Resources"), false).unwrap();

        assert_eq!(fs::read(bundle.join("Resources/a/b.txt")).unwrap(), b"b");
        assert_eq!(fs::read(bundle.join("Resources/c.txt")).unwrap(), b"c");
        assert_eq!(writer.stats().files_written, 2);
    }

    #[test]
    fn test_single_file_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("binary");
        fs::write(&src, b"bin").unwrap();

        let bundle = dir.path().join("bundle");
        let mut writer = BundleWriter::new(&bundle);
        add_files(&mut writer, &src, Path::new("Contents/MacOS/App"), true).unwrap();

        assert_eq!(fs::read(bundle.join("Contents/MacOS/App")).unwrap(), b"bin");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(bundle.join("Contents/MacOS/App"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_missing_source_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle");
        let mut writer = BundleWriter::new(&bundle);

        add_files(&mut writer, &dir.path().join("nope"), Path::new("x"), false).unwrap();

        assert_eq!(writer.stats().files_written, 0);
        assert!(!bundle.join("x").exists());
    }

    #[test]
    fn test_tree_conflict_names_destination() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("shared.txt"), b"1").unwrap();
        fs::write(second.join("shared.txt"), b"2").unwrap();

        let mut writer = BundleWriter::new(dir.path().join("bundle"));
        add_files(&mut writer, &first, Path::new("R"), false).unwrap();
        let err = add_files(&mut writer, &second, Path::new("R"), false).unwrap_err();

        assert!(matches!(err, Error::BundleConflict { dest } if dest == PathBuf::from("R/shared.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_tree_follows_file_links_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("real.txt"), b"real").unwrap();
        std::os::unix::fs::symlink(outside.join("real.txt"), src.join("linked.txt")).unwrap();
        std::os::unix::fs::symlink(&outside, src.join("linked_dir")).unwrap();

        let bundle = dir.path().join("bundle");
        let mut writer = BundleWriter::new(&bundle);
        add_files(&mut writer, &src, Path::new(""), false).unwrap();

        let copied = bundle.join("linked.txt");
        assert_eq!(fs::read(&copied).unwrap(), b"real");
        assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert!(!bundle.join("linked_dir").exists());
    }
}
