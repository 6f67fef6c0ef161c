//! Shared port traits and boundary DTOs for xcreport's hexagonal architecture.
//!
//! The core never spawns processes. It talks to a [`ResultTool`], which issues
//! logical requests ("get JSON at id X", "get coverage for path Y"), and the
//! adapter behind it fulfills them however it wishes.

use std::path::Path;

use thiserror::Error;

/// Captured output of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Captured standard output, decoded as UTF-8.
    pub stdout: String,
    /// Process exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns `true` when the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised by the external toolchain boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The command could not be started.
    #[error("failed to run `{command}`: {message}")]
    Spawn { command: String, message: String },

    /// The command exited with a non-zero status.
    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The command produced more output than the configured ceiling.
    #[error("`{command}` produced more than {limit} bytes of output")]
    OutputTooLarge { command: String, limit: usize },

    /// The command output was not valid UTF-8.
    #[error("`{command}` produced output that is not valid UTF-8")]
    InvalidUtf8 { command: String },

    /// Any other I/O failure at the boundary (e.g. scratch directory setup).
    #[error("I/O error: {0}")]
    Io(String),
}

/// Port for running one external command to completion.
pub trait CommandRunner {
    /// Run `program` with `args` and capture its standard output.
    ///
    /// Implementations return [`ToolError::NonZeroExit`] for a failing exit
    /// status, so a returned [`CommandOutput`] always reports success.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        (**self).run(program, args)
    }
}

/// Port for the logical queries the report pipeline issues against a bundle.
pub trait ResultTool {
    /// Free-text toolchain version, e.g. `"Xcode 16.2\nBuild version 16C5032a"`.
    fn version(&self) -> Result<String, ToolError>;

    /// Plist-formatted dump of the bundle's `Info.plist` (contains `rootId`).
    fn root_info(&self, bundle: &Path) -> Result<String, ToolError>;

    /// Legacy JSON object addressed by `id`.
    fn object_json(&self, bundle: &Path, id: &str) -> Result<String, ToolError>;

    /// Modern flat test summary JSON.
    fn test_summary_json(&self, bundle: &Path) -> Result<String, ToolError>;

    /// Whole-bundle coverage report for `path` (a bundle or exported archive).
    fn coverage_report(&self, path: &Path) -> Result<String, ToolError>;

    /// Newline-delimited target summary lines for `path`.
    fn coverage_targets(&self, path: &Path) -> Result<String, ToolError>;

    /// Probe whether the coverage tool can filter its report to one target.
    fn supports_target_filter(&self) -> Result<bool, ToolError>;

    /// Coverage report restricted to `target`.
    fn target_coverage(&self, path: &Path, target: &str) -> Result<String, ToolError>;

    /// Export the coverage archive `id` from `bundle` into `dest`.
    fn export_coverage_archive(&self, bundle: &Path, id: &str, dest: &Path)
    -> Result<(), ToolError>;
}

impl<T: ResultTool + ?Sized> ResultTool for &T {
    fn version(&self) -> Result<String, ToolError> {
        (**self).version()
    }

    fn root_info(&self, bundle: &Path) -> Result<String, ToolError> {
        (**self).root_info(bundle)
    }

    fn object_json(&self, bundle: &Path, id: &str) -> Result<String, ToolError> {
        (**self).object_json(bundle, id)
    }

    fn test_summary_json(&self, bundle: &Path) -> Result<String, ToolError> {
        (**self).test_summary_json(bundle)
    }

    fn coverage_report(&self, path: &Path) -> Result<String, ToolError> {
        (**self).coverage_report(path)
    }

    fn coverage_targets(&self, path: &Path) -> Result<String, ToolError> {
        (**self).coverage_targets(path)
    }

    fn supports_target_filter(&self) -> Result<bool, ToolError> {
        (**self).supports_target_filter()
    }

    fn target_coverage(&self, path: &Path, target: &str) -> Result<String, ToolError> {
        (**self).target_coverage(path, target)
    }

    fn export_coverage_archive(
        &self,
        bundle: &Path,
        id: &str,
        dest: &Path,
    ) -> Result<(), ToolError> {
        (**self).export_coverage_archive(bundle, id, dest)
    }
}
