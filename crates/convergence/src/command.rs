//! Command collaborator interface
//!
//! The core never spawns processes itself. Guards and steps describe
//! commands as [`CommandLine`]s and hand them to a [`CommandRunner`]
//! supplied by the embedding application.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A program and its arguments
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment, never shown in the display form
    #[serde(skip)]
    pub env: Vec<(String, String)>,
    /// Indexes into `args` shown redacted
    #[serde(skip)]
    pub secret_args: Vec<usize>,
    /// Upper bound on run time; `None` leaves it to the runner
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Changes system state; runners may elevate these. Guard queries never are.
    #[serde(default)]
    pub privileged: bool,
}

const REDACTED: &str = "********";

impl CommandLine {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
            secret_args: Vec::new(),
            timeout: None,
            privileged: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// An argument that is passed as is but redacted when displayed
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    /// Run through `sh -c`, for commands that need a pipeline.
    ///
    /// Values belong in arguments after the script (the first one is `$0`)
    /// rather than pasted into it.
    pub fn shell(script: &str) -> Self {
        Self::new("/bin/sh").arg("-c").arg(script)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (index, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&index) {
                write!(f, " {REDACTED}")?;
            } else if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("CommandLine")
            .field("command", &self.to_string())
            .field("env", &env)
            .field("timeout", &self.timeout)
            .field("privileged", &self.privileged)
            .finish()
    }
}

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Code(i32),
    /// Terminated by a signal
    Signal,
    /// Killed after exceeding the runner's timeout
    TimedOut,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit status {code}"),
            Self::Signal => write!(f, "signal"),
            Self::TimedOut => write!(f, "timeout"),
        }
    }
}

/// Output from a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            status: ExitStatus::Code(0),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            status: ExitStatus::Code(code),
        }
    }

    pub fn success(&self) -> bool {
        self.status == ExitStatus::Code(0)
    }

    /// Whether the exit code is one of `accepted`
    pub fn exited_with(&self, accepted: &[i32]) -> bool {
        matches!(self.status, ExitStatus::Code(code) if accepted.contains(&code))
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Convert into a command error for `command`
    pub fn into_error(self, command: &CommandLine) -> Error {
        Error::Command {
            command: command.to_string(),
            status: self.status.to_string(),
            stdout: self.stdout_str(),
            stderr: self.stderr_str(),
        }
    }
}

/// Executes commands on behalf of guards and steps
///
/// Implementations decide how commands are spawned (privilege wrapping,
/// timeouts, environment). `run` returns `Err` only when the command could
/// not be run at all; a nonzero exit is reported in the output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput>;

    /// Run and fail unless the exit code is one of `accepted`
    fn run_checked(&self, command: &CommandLine, accepted: &[i32]) -> Result<CommandOutput> {
        let output = self.run(command)?;
        if output.exited_with(accepted) {
            Ok(output)
        } else {
            Err(output.into_error(command))
        }
    }

    /// Run and capture stdout, failing on nonzero exit
    fn run_capture(&self, command: &CommandLine) -> Result<String> {
        Ok(self.run_checked(command, &[0])?.stdout_str())
    }
}
