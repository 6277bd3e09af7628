//! Bundle orchestration and coordination.
//!
//! This module provides the [`Bundler`] orchestrator that turns a
//! [`MergePlan`] into a bundle directory on disk.
//!
//! # Overview
//!
//! A run moves linearly through the [`BundleStage`]s and stops at the first
//! error:
//! 1. Validate the plan, lock the output, then delete and recreate it
//! 2. Extract every archive merge, then copy every file merge, in plan order
//! 3. Run the post processor, if one is configured
//! 4. Run the signing commands, if any are configured
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundletool::bundler::{Bundler, MergePlan};
//!
//! # async fn example() -> kodegen_bundletool::bundler::Result<()> {
//! let plan = MergePlan::new("out/App.app")
//!     .merge_zip("Frameworks.zip", "Contents/Frameworks")
//!     .merge_file("target/release/app", "Contents/MacOS/App", true)
//!     .with_signing_commands(["codesign --force --sign - \"$WORK_DIR\""]);
//!
//! let summary = Bundler::new(plan).run().await?;
//! println!("{} files written", summary.files_written);
//! # Ok(())
//! # }
//! ```

use crate::bundler::{
    archive,
    command::{CommandRunner, ExternalCommand, ProcessRunner},
    error::{Error, Result},
    lock::OutputLock,
    merge,
    plan::MergePlan,
    utils,
    writer::{BundleWriter, MergeStats},
};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Environment variable carrying the bundle path to the post processor.
pub const BUNDLE_PATH_VAR: &str = "TREE_ARTIFACT_OUTPUT";

/// Environment variable carrying the bundle path to the signing commands.
pub const WORK_DIR_VAR: &str = "WORK_DIR";

/// Progress of a bundling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStage {
    /// Plan loaded, nothing touched yet
    Init,
    /// Output directory is empty
    Cleared,
    /// Sources are being merged
    Merging,
    /// Post processor finished (or none configured)
    PostProcessed,
    /// Signing finished (or none configured)
    Signed,
    /// Bundle complete
    Done,
}

impl fmt::Display for BundleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BundleStage::Init => "init",
            BundleStage::Cleared => "cleared",
            BundleStage::Merging => "merging",
            BundleStage::PostProcessed => "post-processed",
            BundleStage::Signed => "signed",
            BundleStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    /// The bundle directory
    pub output: PathBuf,
    /// Regular files placed in the bundle
    pub files_written: usize,
    /// File contributions identical to content already present
    pub files_unchanged: usize,
    /// Symbolic links created
    pub symlinks_created: usize,
    /// Link contributions matching an existing link
    pub symlinks_unchanged: usize,
    /// Whether a post processor ran
    pub post_processed: bool,
    /// Whether signing commands ran
    pub signed: bool,
}

impl BundleSummary {
    fn new(output: PathBuf, stats: MergeStats) -> Self {
        Self {
            output,
            files_written: stats.files_written,
            files_unchanged: stats.files_unchanged,
            symlinks_created: stats.symlinks_created,
            symlinks_unchanged: stats.symlinks_unchanged,
            post_processed: false,
            signed: false,
        }
    }
}

/// Main bundle orchestrator.
///
/// Generic over the [`CommandRunner`] used for the post processor and the
/// signing commands; [`Bundler::new`] uses real child processes.
#[derive(Debug)]
pub struct Bundler<R = ProcessRunner> {
    plan: MergePlan,
    runner: R,
}

impl Bundler<ProcessRunner> {
    /// Creates a bundler that runs external steps as child processes.
    pub fn new(plan: MergePlan) -> Self {
        Self::with_runner(plan, ProcessRunner)
    }
}

impl<R: CommandRunner> Bundler<R> {
    /// Creates a bundler with a custom command runner.
    pub fn with_runner(plan: MergePlan, runner: R) -> Self {
        Self { plan, runner }
    }

    /// Executes the plan.
    ///
    /// The output directory is exclusively owned by this run: it is locked,
    /// deleted and recreated before anything is merged. A failure at any
    /// stage leaves whatever was already written in place.
    pub async fn run(&self) -> Result<BundleSummary> {
        let output = self.plan.validate()?.to_path_buf();
        log_stage(BundleStage::Init, &output);

        let _lock = OutputLock::acquire(&output)?;
        utils::fs::create_dir_all(&output, true).await?;
        log_stage(BundleStage::Cleared, &output);

        log_stage(BundleStage::Merging, &output);
        let stats = self.merge_sources(output.clone()).await?;
        let mut summary = BundleSummary::new(output, stats);

        summary.post_processed = self.post_process(&summary.output).await?;
        log_stage(BundleStage::PostProcessed, &summary.output);

        summary.signed = self.sign(&summary.output).await?;
        log_stage(BundleStage::Signed, &summary.output);

        log_stage(BundleStage::Done, &summary.output);
        Ok(summary)
    }

    /// Archives first, then files, each in plan order.
    async fn merge_sources(&self, output: PathBuf) -> Result<MergeStats> {
        let zip_merges = self.plan.zip_merges.clone();
        let file_merges = self.plan.file_merges.clone();

        tokio::task::spawn_blocking(move || -> Result<MergeStats> {
            let mut writer = BundleWriter::new(output);
            for zip in &zip_merges {
                archive::extract(&mut writer, &zip.src, &zip.dest)?;
            }
            for file in &file_merges {
                merge::add_files(&mut writer, &file.src, &file.dest, file.executable)?;
            }
            Ok(writer.stats())
        })
        .await?
    }

    async fn post_process(&self, output: &Path) -> Result<bool> {
        let Some(program) = self.plan.post_processor_path() else {
            return Ok(false);
        };

        let command = ExternalCommand::new(program)
            .arg(parent_dir(output))
            .env(BUNDLE_PATH_VAR, output);

        log::info!("Running post processor {}", program.display());
        let exit_code = self.runner.run(&command).await?;
        if exit_code != 0 {
            return Err(Error::PostProcess { exit_code });
        }
        Ok(true)
    }

    async fn sign(&self, output: &Path) -> Result<bool> {
        let Some(script) = self.plan.signing_script() else {
            return Ok(false);
        };

        let command = ExternalCommand::shell(script).env(WORK_DIR_VAR, output);

        log::info!("Signing {}", output.display());
        let exit_code = self.runner.run(&command).await?;
        if exit_code != 0 {
            return Err(Error::CodeSign { exit_code });
        }
        Ok(true)
    }
}

/// Directory containing the bundle; `.` for a bare relative name.
fn parent_dir(output: &Path) -> &Path {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn log_stage(stage: BundleStage, output: &Path) {
    log::info!("[{}] {}", stage, output.display());
}
