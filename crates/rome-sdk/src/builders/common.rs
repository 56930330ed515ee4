//! Process execution shared by the build driver and the binary merger.
//!
//! External tools are reached through the [`ProcessExecutor`] trait so tests
//! can substitute a scripted executor. [`SystemExecutor`] is the real one.
//!
//! ## Error Messages
//!
//! Failures to start a tool and nonzero exits both become
//! [`RomeError::Build`] with the captured output attached, so the user sees
//! exactly what `xcodebuild` printed.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::types::RomeError;

/// A single external command: program, arguments, and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Arguments as lossy UTF-8 strings, mostly for assertions and logs.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in self.args_lossy() {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// A successful run with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout and stderr joined, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

/// Runs external tools.
pub trait ProcessExecutor {
    /// Runs `invocation` to completion and returns its captured output.
    ///
    /// Only a failure to start the process is an `Err`; a nonzero exit is
    /// reported through [`ProcessOutput::status`].
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RomeError>;
}

/// Executes processes on the host with [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl ProcessExecutor for SystemExecutor {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RomeError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|e| {
            RomeError::Build(format!(
                "Failed to start {}.\n\n\
                 Error: {}\n\n\
                 Ensure the tool is installed and available on PATH.",
                invocation.program, e
            ))
        })?;

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `invocation` and turns a nonzero exit into [`RomeError::Build`].
///
/// # Arguments
/// * `executor` - Executor to run the command with
/// * `invocation` - The command to execute
/// * `description` - Human-readable description of what the command does
pub fn run_checked(
    executor: &dyn ProcessExecutor,
    invocation: &Invocation,
    description: &str,
) -> Result<ProcessOutput, RomeError> {
    debug!(command = %invocation, dir = ?invocation.current_dir, "running {}", description);
    let output = executor.run(invocation)?;

    if !output.is_success() {
        let status = output
            .status
            .map(|c| c.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());
        return Err(RomeError::Build(format!(
            "{} failed.\n\n\
             Command: {}\n\
             Exit status: {}\n\n\
             Stdout:\n{}\n\n\
             Stderr:\n{}",
            description, invocation, status, output.stdout, output.stderr
        )));
    }
    Ok(output)
}

/// Directory `xcodebuild` should run from for `project`.
pub fn project_dir(project: &Path) -> PathBuf {
    match project.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
