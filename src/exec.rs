//! Subprocess execution.
//!
//! External tools (`rocotorun`, `rocotostat`, `wget`, `hsi`, `htar`, `unzip`)
//! are always started through a [`CommandRunner`] so callers can swap in a
//! fake. A non-zero exit status is reported in [`CommandOutput`], not as an
//! error; only a failure to start the process is an `Err`.

use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Captured result of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Build a successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Build a failed output with the given exit code.
    pub fn failed(code: i32) -> Self {
        Self {
            status: Some(code),
            ..Default::default()
        }
    }
}

/// Runs external programs.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> std::io::Result<CommandOutput>;
}

/// Runs programs on the host with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> std::io::Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(command = %command_line(program, args), cwd = ?cwd, "running");
        let output = cmd.output()?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(status = ?result.status, "finished {}", program);
        Ok(result)
    }
}

/// A printable command line for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a list of string slices to owned arguments.
pub fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
