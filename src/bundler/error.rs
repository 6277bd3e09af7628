//! Error types for bundle assembly.
//!
//! Provides contextual error chaining, filesystem errors that carry the
//! offending path, and the failure kinds a bundling run can end with:
//! configuration problems, conflicting contributions, and failing external
//! post-processing or signing steps.
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages
//!
//! # Example
//!
//! ```no_run
//! # use std::path::{Path, PathBuf};
//! # type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
//! #
//! # trait ErrorExt<T> {
//! #     fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
//! # }
//! # impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
//! #     fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
//! #         self.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
//! #     }
//! # }
//! #
//! fn read_control(path: &Path) -> Result<String> {
//!     let contents = std::fs::read_to_string(path)
//!         .fs_context("reading control file", path)?;
//!     Ok(contents)
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the bundler.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// A required control field is missing or empty.
    #[error("invalid bundle configuration: {0}")]
    Config(String),

    /// Two contributions target the same bundle path with different content
    /// or link targets.
    #[error("cannot place two files at the same location {dest:?} in the bundle")]
    BundleConflict {
        /// Bundle-relative destination
        dest: PathBuf,
    },

    /// A destination is absolute or normalizes to a path outside the bundle.
    #[error("destination {dest:?} escapes the bundle root")]
    InvalidDestination {
        /// The destination as written in the plan or archive
        dest: String,
    },

    /// Deferred symlinks whose parent directory never appeared.
    #[error("could not create symbolic links, parent directories never appeared: {links:?}")]
    UnresolvedSymlinks {
        /// Bundle-relative destinations still pending
        links: Vec<PathBuf>,
    },

    /// The post processor exited unsuccessfully.
    #[error("post processor failed with exit code {exit_code}")]
    PostProcess {
        /// Exit code reported by the process
        exit_code: i32,
    },

    /// The code signing commands exited unsuccessfully.
    #[error("code signing failed with exit code {exit_code}")]
    CodeSign {
        /// Exit code reported by the shell
        exit_code: i32,
    },

    /// Another run holds the lock for this output path.
    #[error("output {path} is locked by another bundling run")]
    OutputLocked {
        /// The output directory that is in use
        path: PathBuf,
    },

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "reading control file")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// Child process could not be started.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking a source directory.
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// ZIP archive read error.
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    /// JSON control file error.
    #[error("{0}")]
    JsonError(#[from] serde_json::error::Error),

    /// Symbolic link payload is not valid UTF-8.
    #[error("symbolic link target is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A blocking task was cancelled or panicked.
    #[error("{0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying file".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

impl Error {
    /// Unwraps [`Error::Context`] layers down to the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context(_, inner) => inner.root(),
            other => other,
        }
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
///
/// ```ignore
/// bail!("operation failed");
/// bail!("invalid value: {}", value);
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError($msg.into()))
    };
    ($err:expr $(,)?) => {
        return Err($crate::bundler::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_destination() {
        let err = Error::BundleConflict {
            dest: PathBuf::from("Contents/Info.plist"),
        };
        assert_eq!(
            err.to_string(),
            "cannot place two files at the same location \"Contents/Info.plist\" in the bundle"
        );
    }

    #[test]
    fn test_root_skips_context_layers() {
        let result: Result<()> = Err(Error::PostProcess { exit_code: 3 });
        let err = result
            .context("post processing bundle")
            .context("running bundle")
            .unwrap_err();
        assert!(matches!(err.root(), Error::PostProcess { exit_code: 3 }));
    }

    #[test]
    fn test_option_context_is_generic_error() {
        let none: Option<u8> = None;
        let err = none.context("nothing here").unwrap_err();
        assert_eq!(err.to_string(), "nothing here");
    }
}
