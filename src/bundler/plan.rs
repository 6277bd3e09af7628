//! The declarative merge plan read from a control file.
//!
//! ```json
//! {
//!   "output": "bazel-out/App.app",
//!   "bundle_merge_files": [
//!     {"src": "bin/app", "dest": "App", "executable": true},
//!     {"src": "resources", "dest": "Resources"}
//!   ],
//!   "bundle_merge_zips": [{"src": "Frameworks.zip", "dest": "Frameworks"}],
//!   "post_processor": "tools/post.sh",
//!   "code_signing_commands": "codesign --sign - \"$WORK_DIR\""
//! }
//! ```

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::fs::normalize_relative,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file or directory to copy into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMerge {
    /// File or directory on disk
    pub src: PathBuf,
    /// Bundle-relative destination; includes the file name for single files
    pub dest: PathBuf,
    /// Whether copied files get mode 0755 instead of 0644
    #[serde(default)]
    pub executable: bool,
}

/// A ZIP archive whose entries are expanded into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipMerge {
    /// Archive on disk
    pub src: PathBuf,
    /// Bundle-relative directory the archive's tree is placed under
    pub dest: PathBuf,
}

/// Shell command lines that sign the finished bundle.
///
/// Accepted either as one newline-separated string or as a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SigningCommands {
    /// Newline-separated command lines
    Script(String),
    /// One command line per element
    Lines(Vec<String>),
}

impl SigningCommands {
    /// The commands joined into a single shell script.
    pub fn script(&self) -> String {
        match self {
            SigningCommands::Script(script) => script.clone(),
            SigningCommands::Lines(lines) => lines.join("\n"),
        }
    }

    /// True when there is nothing to run.
    pub fn is_empty(&self) -> bool {
        match self {
            SigningCommands::Script(script) => script.trim().is_empty(),
            SigningCommands::Lines(lines) => lines.iter().all(|l| l.trim().is_empty()),
        }
    }
}

/// Everything one bundling run needs to know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    /// Bundle directory; cleared and recreated on every run
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Files and directory trees, applied in order after the archives
    #[serde(default, rename = "bundle_merge_files")]
    pub file_merges: Vec<FileMerge>,

    /// Archives, applied in order before the files
    #[serde(default, rename = "bundle_merge_zips")]
    pub zip_merges: Vec<ZipMerge>,

    /// Executable run on the finished bundle before signing
    #[serde(default)]
    pub post_processor: Option<PathBuf>,

    /// Shell commands run last to sign the bundle
    #[serde(default, rename = "code_signing_commands")]
    pub signing_commands: Option<SigningCommands>,
}

impl MergePlan {
    /// Creates an empty plan that writes to `output`.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// Reads a plan from a JSON control file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).fs_context("reading control file", path)?;
        Self::from_json(&contents).with_context(|| format!("parsing control file {}", path.display()))
    }

    /// Parses a plan from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Appends a file or directory merge.
    pub fn merge_file(mut self, src: impl Into<PathBuf>, dest: impl Into<PathBuf>, executable: bool) -> Self {
        self.file_merges.push(FileMerge {
            src: src.into(),
            dest: dest.into(),
            executable,
        });
        self
    }

    /// Appends an archive merge.
    pub fn merge_zip(mut self, src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        self.zip_merges.push(ZipMerge {
            src: src.into(),
            dest: dest.into(),
        });
        self
    }

    /// Sets the post processor.
    pub fn with_post_processor(mut self, path: impl Into<PathBuf>) -> Self {
        self.post_processor = Some(path.into());
        self
    }

    /// Sets the signing command lines.
    pub fn with_signing_commands<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signing_commands = Some(SigningCommands::Lines(
            lines.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// The output path, if one is set and non-empty.
    pub fn output_path(&self) -> Option<&Path> {
        self.output
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// The configured post processor, ignoring an empty path.
    pub fn post_processor_path(&self) -> Option<&Path> {
        self.post_processor
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// The signing script, ignoring empty command lists.
    pub fn signing_script(&self) -> Option<String> {
        self.signing_commands
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(SigningCommands::script)
    }

    /// Checks the plan before anything on disk is touched.
    ///
    /// Returns the output path.
    pub fn validate(&self) -> Result<&Path> {
        let output = self
            .output_path()
            .ok_or_else(|| Error::Config("no output path specified".to_string()))?;

        for merge in &self.file_merges {
            normalize_relative(&merge.dest)?;
        }
        for merge in &self.zip_merges {
            normalize_relative(&merge.dest)?;
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_document() {
        let plan = MergePlan::from_json(
            r#"{
                "output": "out/App.app",
                "bundle_merge_files": [
                    {"src": "bin/app", "dest": "App", "executable": true},
                    {"src": "res", "dest": "Resources"}
                ],
                "bundle_merge_zips": [{"src": "fw.zip", "dest": "Frameworks"}],
                "post_processor": "post.sh",
                "code_signing_commands": "echo one\necho two",
                "unrelated_key": 42
            }"#,
        )
        .unwrap();

        assert_eq!(plan.output_path(), Some(Path::new("out/App.app")));
        assert_eq!(plan.file_merges.len(), 2);
        assert!(plan.file_merges[0].executable);
        assert!(!plan.file_merges[1].executable);
        assert_eq!(plan.zip_merges[0].dest, PathBuf::from("Frameworks"));
        assert_eq!(plan.post_processor_path(), Some(Path::new("post.sh")));
        assert_eq!(plan.signing_script().as_deref(), Some("echo one\necho two"));
    }

    #[test]
    fn test_signing_lines_are_joined() {
        let plan = MergePlan::from_json(
            r#"{"output": "o", "code_signing_commands": ["a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(plan.signing_script().as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_empty_optional_steps_are_skipped() {
        let plan = MergePlan::from_json(
            r#"{"output": "o", "post_processor": "", "code_signing_commands": ""}"#,
        )
        .unwrap();
        assert!(plan.post_processor_path().is_none());
        assert!(plan.signing_script().is_none());
    }

    #[test]
    fn test_missing_output_is_config_error() {
        let plan = MergePlan::from_json(r#"{"bundle_merge_files": []}"#).unwrap();
        assert!(matches!(plan.validate(), Err(Error::Config(_))));

        let empty = MergePlan::new("");
        assert!(matches!(empty.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_escaping_dest_rejected() {
        let plan = MergePlan::new("out").merge_file("a", "../a", false);
        assert!(matches!(
            plan.validate(),
            Err(Error::InvalidDestination { .. })
        ));

        let plan = MergePlan::new("out").merge_zip("z.zip", "/abs");
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_builder_round_trip_through_json() {
        let plan = MergePlan::new("out/B.bundle")
            .merge_zip("z.zip", "Contents")
            .merge_file("f", "Contents/f", true)
            .with_post_processor("post")
            .with_signing_commands(["codesign -s - \"$WORK_DIR\""]);

        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("bundle_merge_zips"));
        assert_eq!(MergePlan::from_json(&json).unwrap(), plan);
    }
}
