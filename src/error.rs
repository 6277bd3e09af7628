//! Error types for the bundletool application layer.
//!
//! Wraps the bundler's errors with CLI-level failures and attaches
//! actionable recovery suggestions for the terminal.

use crate::bundler::Error as BundlerError;
use thiserror::Error;

/// Result type alias for bundletool operations
pub type Result<T> = std::result::Result<T, BundletoolError>;

/// Main error type for the bundletool binary
#[derive(Error, Debug)]
pub enum BundletoolError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bundler errors
    #[error("Bundler error: {0}")]
    Bundler(#[from] BundlerError),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl BundletoolError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        let BundletoolError::Bundler(error) = self else {
            return match self {
                BundletoolError::Cli(_) => vec!["Run with --help to see usage".to_string()],
                _ => vec!["Check the error message above for specific details".to_string()],
            };
        };

        match error.root() {
            BundlerError::Config(_) => vec![
                "Set a non-empty \"output\" key in the control file".to_string(),
            ],
            BundlerError::BundleConflict { dest } => vec![
                format!("Two merge sources provide different content for {}", dest.display()),
                "Remove one of the sources or give them distinct destinations".to_string(),
            ],
            BundlerError::InvalidDestination { .. } => vec![
                "Use relative \"dest\" values that stay inside the bundle".to_string(),
            ],
            BundlerError::UnresolvedSymlinks { .. } => vec![
                "Check the archive for links nested below other links".to_string(),
            ],
            BundlerError::PostProcess { exit_code } => vec![
                format!("The post processor exited with {exit_code}; check its output above"),
                "Run it by hand with TREE_ARTIFACT_OUTPUT set to the bundle path".to_string(),
            ],
            BundlerError::CodeSign { exit_code } => vec![
                format!("Signing exited with {exit_code}; check its output above"),
                "Verify the signing identity is available".to_string(),
            ],
            BundlerError::OutputLocked { path } => vec![
                format!("Wait for the other run writing {} to finish", path.display()),
            ],
            BundlerError::JsonError(_) => vec![
                "Check the control file is valid JSON".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            BundletoolError::Bundler(error) => !matches!(
                error.root(),
                BundlerError::Config(_)
                    | BundlerError::BundleConflict { .. }
                    | BundlerError::InvalidDestination { .. }
                    | BundlerError::JsonError(_)
            ),
            BundletoolError::Cli(_) | BundletoolError::Json(_) => false,
            BundletoolError::Io(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_conflict_suggestions_name_path() {
        let err = BundletoolError::from(BundlerError::BundleConflict {
            dest: PathBuf::from("Contents/Info.plist"),
        });
        let suggestions = err.recovery_suggestions();
        assert!(suggestions[0].contains("Contents/Info.plist"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_locked_output_is_recoverable() {
        let err = BundletoolError::from(BundlerError::OutputLocked {
            path: PathBuf::from("out/App.app"),
        });
        assert!(err.is_recoverable());
    }
}
