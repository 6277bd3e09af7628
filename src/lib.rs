//! # Kodegen Bundletool
//!
//! Assembles application and framework bundles from plain files, directory
//! trees and ZIP archives.
//!
//! Every contribution is checked against what is already in the bundle: a
//! path may be provided any number of times with identical bytes, but never
//! with different ones. Archive entries keep their executable bit and their
//! symbolic links. Once the tree is complete an optional post processor and
//! optional signing commands run against it.
//!
//! ## Usage
//!
//! ```bash
//! kodegen_bundletool bundle.json             # Build the bundle described by bundle.json
//! kodegen_bundletool --verbose bundle.json   # Same, printing every step
//! RUST_LOG=debug kodegen_bundletool bundle.json
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod bundler;
pub mod cli;
pub mod error;

// Re-export main types for public API
pub use bundler::{BundleSummary, Bundler, MergePlan};
pub use cli::Args;
pub use error::{BundletoolError, CliError, Result};
