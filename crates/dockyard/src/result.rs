//! Immutable outcome records for commands and jobs.

use std::borrow::Cow;

use bytes::Bytes;

use crate::error::WorkflowError;

/// Exit code of a command whose real status was never determined.
pub const UNKNOWN_EXIT_CODE: i64 = -1;

/// Outcome of one command attempted inside a job container.
///
/// Exactly one of two things holds: `error` is set and `exit_code` is
/// [`UNKNOWN_EXIT_CODE`], or `error` is unset and `exit_code` is the status
/// the process exited with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Container the command ran in.
    pub container_id: String,
    /// Command tokens as given in the job.
    pub command: Vec<String>,
    /// Captured standard output, byte-for-byte.
    pub stdout: Bytes,
    /// Captured standard error, byte-for-byte.
    pub stderr: Bytes,
    /// Process exit code, or [`UNKNOWN_EXIT_CODE`].
    pub exit_code: i64,
    /// Why no real exit code could be obtained.
    pub error: Option<WorkflowError>,
}

impl CommandResult {
    /// Result for a command that ran to completion.
    pub fn completed(
        container_id: impl Into<String>,
        command: Vec<String>,
        stdout: Bytes,
        stderr: Bytes,
        exit_code: i64,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            command,
            stdout,
            stderr,
            exit_code,
            error: None,
        }
    }

    /// Result for a command that never produced an exit code.
    ///
    /// Output captured before the failure is kept.
    pub fn failed(
        container_id: impl Into<String>,
        command: Vec<String>,
        stdout: Bytes,
        stderr: Bytes,
        error: WorkflowError,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            command,
            stdout,
            stderr,
            exit_code: UNKNOWN_EXIT_CODE,
            error: Some(error),
        }
    }

    /// Whether the command ran and exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    /// Standard output decoded as UTF-8, replacing invalid sequences.
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Standard error decoded as UTF-8, replacing invalid sequences.
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// The command tokens joined with spaces, for display.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Outcome of a whole job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobResult {
    /// One entry per command actually attempted, in order.
    pub commands: Vec<CommandResult>,
    /// Lifecycle failure that ended the job, if any.
    pub error: Option<WorkflowError>,
}

impl JobResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the outcome of the next command.
    pub fn add_command_result(&mut self, result: CommandResult) {
        self.commands.push(result);
    }

    /// Whether the job had no lifecycle failure and every attempted command succeeded.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.commands.iter().all(CommandResult::succeeded)
    }

    /// The first command that did not succeed.
    pub fn first_failure(&self) -> Option<&CommandResult> {
        self.commands.iter().find(|c| !c.succeeded())
    }

    /// Exit codes of the attempted commands, in order.
    pub fn exit_codes(&self) -> Vec<i64> {
        self.commands.iter().map(|c| c.exit_code).collect()
    }
}
