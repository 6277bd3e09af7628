//! Bundle assembly engine.
//!
//! Builds a bundle directory (an application or framework tree) from plain
//! files, directory trees and ZIP archives, refusing any two contributions
//! that disagree about the content of a path. Once everything is merged the
//! bundle is handed to an optional post processor and optional signing
//! commands.
//!
//! # Configuration
//!
//! A run is described by a [`MergePlan`], usually read from a JSON control
//! file:
//!
//! ```json
//! {
//!   "output": "bazel-out/App.app",
//!   "bundle_merge_zips": [{"src": "Frameworks.zip", "dest": "Contents/Frameworks"}],
//!   "bundle_merge_files": [{"src": "bin/app", "dest": "Contents/MacOS/App", "executable": true}],
//!   "post_processor": "tools/post.sh",
//!   "code_signing_commands": ["codesign --force --sign - \"$WORK_DIR\""]
//! }
//! ```
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`BundleWriter`] | Conflict-checked, atomic placement of regular files |
//! | [`archive`] | ZIP entry classification and extraction |
//! | [`symlinks`] | Deferred creation of links whose parents may not exist yet |
//! | [`merge`] | Copying single files and directory trees |
//! | [`Bundler`] | Orchestration of a whole run |
//!
//! # Integration
//!
//! ```no_run
//! use kodegen_bundletool::bundler::{Bundler, MergePlan};
//! use std::path::Path;
//!
//! # async fn example() -> kodegen_bundletool::bundler::Result<()> {
//! let plan = MergePlan::from_file(Path::new("bundle.json"))?;
//! let summary = Bundler::new(plan).run().await?;
//! println!("bundled {}", summary.output.display());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod archive;
mod builder;
mod command;
mod error;
mod lock;
pub mod merge;
mod plan;
pub mod symlinks;
pub mod utils;
mod writer;

// Public re-exports
pub use archive::EntryKind;
pub use builder::{BUNDLE_PATH_VAR, BundleStage, BundleSummary, Bundler, WORK_DIR_VAR};
pub use command::{CommandRunner, ExternalCommand, ProcessRunner, SHELL, exit_code};
pub use error::{Context, Error, ErrorExt, Result};
pub use lock::{OutputLock, lock_path_for};
pub use plan::{FileMerge, MergePlan, SigningCommands, ZipMerge};
pub use symlinks::{DeferredSymlink, ResolveReport};
pub use writer::{BundleWriter, EXECUTABLE_MODE, MergeStats, REGULAR_MODE, WriteOutcome};
