//! Process-backed toolchain adapter.
//!
//! [`ProcessRunner`] spawns commands with a bounded stdout buffer, and
//! [`XcrunTool`] maps the logical [`ResultTool`] requests onto `xcrun` and
//! `plutil` command lines. Which command lines are used for the legacy object
//! graph is decided once, from the detected toolchain, when the tool is built.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use xcreport_ports::{CommandOutput, CommandRunner, ResultTool, ToolError};
use xcreport_types::SchemaVersion;

/// Default ceiling for captured stdout (50 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 50 * 1024 * 1024;

/// Captured stderr is cut after this many bytes.
const MAX_STDERR_BYTES: u64 = 64 * 1024;

// ============================================================================
// Process Runner
// ============================================================================

/// Runs commands as child processes, capturing at most `max_output_bytes`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl ProcessRunner {
    /// Create a runner with an explicit stdout ceiling.
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// The configured stdout ceiling in bytes.
    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }
}

fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ToolError> {
        let command = display_command(program, args);
        tracing::debug!(command = %command, "running external command");

        let spawn_error = |e: io::Error| ToolError::Spawn {
            command: command.clone(),
            message: e.to_string(),
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // Drain stderr concurrently so a chatty tool cannot block on a full pipe.
        let stderr_reader = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                let mut limited = stderr.take(MAX_STDERR_BYTES);
                let mut buf = Vec::new();
                let _ = limited.read_to_end(&mut buf);
                let _ = io::copy(&mut limited.into_inner(), &mut io::sink());
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let stdout_buf = match child.stdout.take() {
            Some(stdout) => match read_capped(stdout, self.max_output_bytes) {
                Ok(buf) => buf,
                Err(e) => {
                    terminate(&mut child);
                    return Err(ToolError::Io(e.to_string()));
                }
            },
            None => Vec::new(),
        };

        if stdout_buf.len() > self.max_output_bytes {
            terminate(&mut child);
            return Err(ToolError::OutputTooLarge {
                command,
                limit: self.max_output_bytes,
            });
        }

        let status = child.wait().map_err(|e| ToolError::Io(e.to_string()))?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);

        if !status.success() {
            return Err(ToolError::NonZeroExit {
                command,
                exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8(stdout_buf).map_err(|_| ToolError::InvalidUtf8 {
            command: command.clone(),
        })?;

        Ok(CommandOutput { stdout, exit_code })
    }
}

/// Read at most `limit + 1` bytes so an oversized stream is detectable.
fn read_capped<R: Read>(reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Kill an abandoned child and reap it.
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

// ============================================================================
// Xcrun Tool
// ============================================================================

/// [`ResultTool`] implemented with `xcrun xcresulttool`, `xcrun xccov` and `plutil`.
///
/// Xcode 16 moved the id-addressed object graph behind `get object --legacy`
/// and `export object --legacy`; the toolchain passed to [`XcrunTool::new`]
/// selects which form is used for the whole run.
#[derive(Debug, Clone)]
pub struct XcrunTool<R> {
    runner: R,
    toolchain: SchemaVersion,
}

impl<R: CommandRunner> XcrunTool<R> {
    /// Create a tool for a toolchain that produces `toolchain` results.
    pub fn new(runner: R, toolchain: SchemaVersion) -> Self {
        Self { runner, toolchain }
    }

    /// The toolchain this tool issues commands for.
    pub fn toolchain(&self) -> SchemaVersion {
        self.toolchain
    }

    fn xcrun(&self, args: &[&str]) -> Result<String, ToolError> {
        Ok(self.runner.run("xcrun", args)?.stdout)
    }

    fn legacy_object_args<'a>(&self, verb: &'a str) -> Vec<&'a str> {
        match self.toolchain {
            SchemaVersion::Legacy => vec!["xcresulttool", verb],
            SchemaVersion::Modern => vec!["xcresulttool", verb, "object", "--legacy"],
        }
    }
}

/// Version probe that does not need a toolchain decision yet.
pub fn query_version<R: CommandRunner>(runner: &R) -> Result<String, ToolError> {
    Ok(runner.run("xcrun", &["xcodebuild", "-version"])?.stdout)
}

impl<R: CommandRunner> ResultTool for XcrunTool<R> {
    fn version(&self) -> Result<String, ToolError> {
        query_version(&self.runner)
    }

    fn root_info(&self, bundle: &Path) -> Result<String, ToolError> {
        let info = bundle.join("Info.plist");
        let info = info.to_string_lossy();
        Ok(self.runner.run("plutil", &["-p", &*info])?.stdout)
    }

    fn object_json(&self, bundle: &Path, id: &str) -> Result<String, ToolError> {
        let bundle = bundle.to_string_lossy();
        let mut args = self.legacy_object_args("get");
        args.extend(["--format", "json", "--path", &*bundle, "--id", id]);
        self.xcrun(&args)
    }

    fn test_summary_json(&self, bundle: &Path) -> Result<String, ToolError> {
        let bundle = bundle.to_string_lossy();
        self.xcrun(&[
            "xcresulttool",
            "get",
            "test-results",
            "summary",
            "--path",
            &*bundle,
        ])
    }

    fn coverage_report(&self, path: &Path) -> Result<String, ToolError> {
        let path = path.to_string_lossy();
        self.xcrun(&["xccov", "view", "--report", &*path])
    }

    fn coverage_targets(&self, path: &Path) -> Result<String, ToolError> {
        let path = path.to_string_lossy();
        self.xcrun(&["xccov", "view", "--report", "--only-targets", &*path])
    }

    fn supports_target_filter(&self) -> Result<bool, ToolError> {
        let help = self.xcrun(&["xccov", "view", "--help"])?;
        Ok(help.contains("--files-for-target"))
    }

    fn target_coverage(&self, path: &Path, target: &str) -> Result<String, ToolError> {
        let path = path.to_string_lossy();
        self.xcrun(&[
            "xccov",
            "view",
            "--report",
            "--files-for-target",
            target,
            &*path,
        ])
    }

    fn export_coverage_archive(
        &self,
        bundle: &Path,
        id: &str,
        dest: &Path,
    ) -> Result<(), ToolError> {
        let bundle = bundle.to_string_lossy();
        let dest = dest.to_string_lossy();
        let mut args = self.legacy_object_args("export");
        args.extend([
            "--type",
            "directory",
            "--path",
            &*bundle,
            "--id",
            id,
            "--output-path",
            &*dest,
        ]);
        self.xcrun(&args).map(|_| ())
    }
}
