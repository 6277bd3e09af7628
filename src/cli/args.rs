//! Command line argument parsing and validation.
//!
//! The tool takes exactly one control file and builds the bundle it
//! describes.

use clap::Parser;
use std::path::PathBuf;

/// Assemble a bundle directory from files and archives
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundletool",
    version,
    about = "Assemble a bundle directory from files and archives",
    long_about = "Build a bundle directory described by a JSON control file.

The control file names the output directory, the files and ZIP archives to
merge into it, an optional post processor and optional code signing commands.

Usage:
  kodegen_bundletool bundle.json
  kodegen_bundletool --verbose bazel-out/App.app.control.json"
)]
pub struct Args {
    /// JSON control file describing the bundle
    #[arg(index = 1, value_name = "CONTROL_FILE")]
    pub control_file: PathBuf,

    /// Print every step
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.control_file.as_os_str().is_empty() {
            return Err("Control file path is required".to_string());
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_file_and_flags() {
        let args = Args::try_parse_from(["kodegen_bundletool", "-v", "plan.json"]).unwrap();
        assert_eq!(args.control_file, PathBuf::from("plan.json"));
        assert!(args.verbose);
        assert!(!args.quiet);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let parsed = Args::try_parse_from(["kodegen_bundletool", "-v", "-q", "plan.json"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_control_file_required() {
        assert!(Args::try_parse_from(["kodegen_bundletool"]).is_err());
    }
}
