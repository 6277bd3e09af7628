//! External command execution for post-processing and signing.
//!
//! The orchestrator never spawns processes itself. It describes what to run
//! with an [`ExternalCommand`] and hands it to a [`CommandRunner`], which
//! reports the exit code. [`ProcessRunner`] is the real implementation.

use crate::bundler::error::{Error, Result};
use std::{
    ffi::{OsStr, OsString},
    fmt,
    future::Future,
    process::ExitStatus,
};

/// Shell used for signing command lines.
pub const SHELL: &str = "/bin/sh";

/// Description of a process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl ExternalCommand {
    /// A command running `program` with no arguments.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// A command running `script` through [`SHELL`].
    pub fn shell(script: impl AsRef<OsStr>) -> Self {
        Self::new(SHELL).arg("-c").arg(script)
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Adds an environment binding on top of the inherited environment.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments, in order.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Extra environment bindings.
    pub fn envs(&self) -> &[(OsString, OsString)] {
        &self.envs
    }

    /// Looks up an environment binding by name.
    pub fn env_value(&self, key: &str) -> Option<&OsStr> {
        self.envs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs external commands and reports their exit codes.
pub trait CommandRunner {
    /// Runs `command` to completion and returns its exit code.
    ///
    /// Failing to start the process is an error; a non-zero exit is not.
    fn run(&self, command: &ExternalCommand) -> impl Future<Output = Result<i32>> + Send;
}

/// Runs commands as child processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<i32> {
        let mut child = tokio::process::Command::new(&command.program);
        child.args(&command.args);
        child.envs(command.envs.iter().map(|(k, v)| (k, v)));

        log::debug!("Running {}", command);
        let status = child.status().await.map_err(|error| Error::CommandFailed {
            command: command.to_string(),
            error,
        })?;

        let code = exit_code(status);
        log::debug!("{} exited with {}", command, code);
        Ok(code)
    }
}

/// Exit code of a finished process; signal deaths map to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
