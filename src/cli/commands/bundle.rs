//! Bundle command implementation.
//!
//! Loads the control file, runs the bundler and reports what it produced.

use crate::bundler::{BundleSummary, Bundler, MergePlan};
use crate::cli::{Args, RuntimeConfig};
use crate::error::Result;

/// Execute bundle command
pub(super) async fn execute_bundle(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let output = config.output();

    let _ = output.verbose(&format!(
        "Reading control file {}",
        args.control_file.display()
    ));
    let plan = MergePlan::from_file(&args.control_file)?;

    if let Some(path) = plan.output_path() {
        let _ = output.section(&format!("Bundling {}", path.display()));
    }
    let _ = output.verbose(&format!(
        "{} archive(s), {} file merge(s)",
        plan.zip_merges.len(),
        plan.file_merges.len()
    ));

    let summary = Bundler::new(plan).run().await?;
    print_summary(config, &summary);

    Ok(0)
}

fn print_summary(config: &RuntimeConfig, summary: &BundleSummary) {
    let output = config.output();

    let _ = output.success(&format!("Bundle ready at {}", summary.output.display()));
    let _ = output.indent(&format!(
        "{} file(s) written, {} identical duplicate(s)",
        summary.files_written, summary.files_unchanged
    ));
    if summary.symlinks_created > 0 || summary.symlinks_unchanged > 0 {
        let _ = output.indent(&format!(
            "{} symbolic link(s) created, {} identical duplicate(s)",
            summary.symlinks_created, summary.symlinks_unchanged
        ));
    }
    if summary.post_processed {
        let _ = output.info("Post processor finished");
    }
    if summary.signed {
        let _ = output.info("Signing commands finished");
    }
}
