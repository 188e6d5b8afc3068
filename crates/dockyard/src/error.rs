//! Error types for the job execution engine.
//!
//! Two failure classes never mix: a command that runs to completion with a
//! non-zero status is reported through its exit code, while anything that
//! kept the engine from running the command at all is one of the errors below.

use std::fmt;

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Result type for calls into a container runtime.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Runtime errors
// ─────────────────────────────────────────────────────────────────────────────

/// The runtime call that produced a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOperation {
    CreateContainer,
    AttachContainer,
    StartContainer,
    CreateExec,
    AttachExec,
    InspectExec,
    StartExec,
    ReadOutput,
    StopContainer,
    RemoveContainer,
}

impl RuntimeOperation {
    /// Human-readable name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateContainer => "create container",
            Self::AttachContainer => "attach container",
            Self::StartContainer => "start container",
            Self::CreateExec => "create exec",
            Self::AttachExec => "attach exec",
            Self::InspectExec => "inspect exec",
            Self::StartExec => "start exec",
            Self::ReadOutput => "read output",
            Self::StopContainer => "stop container",
            Self::RemoveContainer => "remove container",
        }
    }
}

impl fmt::Display for RuntimeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// The referenced image, container, or exec session does not exist.
    NotFound,
    /// The object is in a state that does not allow the operation.
    Conflict,
    /// The caller's cancellation token fired before or during the call.
    Cancelled,
    /// The runtime could not be reached.
    Unavailable,
    /// Anything else reported by the runtime.
    Other,
}

/// A failure originating from a call to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Runtime error during {operation}: {message}")]
pub struct RuntimeError {
    /// Which call failed.
    pub operation: RuntimeOperation,
    /// Classification of the failure.
    pub kind: RuntimeErrorKind,
    /// Message reported by the runtime.
    pub message: String,
}

impl RuntimeError {
    /// Create a runtime error.
    pub fn new(
        operation: RuntimeOperation,
        kind: RuntimeErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Create an error of kind [`RuntimeErrorKind::Other`].
    pub fn other(operation: RuntimeOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RuntimeErrorKind::Other, message)
    }

    /// Create an error of kind [`RuntimeErrorKind::NotFound`].
    pub fn not_found(operation: RuntimeOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RuntimeErrorKind::NotFound, message)
    }

    /// Create the error reported when the cancellation token has fired.
    pub fn cancelled(operation: RuntimeOperation) -> Self {
        Self::new(
            operation,
            RuntimeErrorKind::Cancelled,
            "operation cancelled",
        )
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind == RuntimeErrorKind::Cancelled
    }

    /// Whether the runtime reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        self.kind == RuntimeErrorKind::NotFound
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors recorded on job and command results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The container runtime could not perform a requested operation.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The command could not produce a real exit code for a reason other
    /// than a failed runtime call.
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// A job or workflow definition is malformed.
    #[error("Invalid job: {0}")]
    Validation(String),

    /// A lifecycle transition was requested from the wrong state.
    #[error("Cannot {operation}: container {container_id} is {state}")]
    InvalidState {
        container_id: String,
        state: String,
        operation: RuntimeOperation,
    },

    /// A configuration or workflow file could not be read or parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WorkflowError {
    /// The wrapped runtime error, if this is one.
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this error is a runtime failure.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }

    /// Whether this error stems from cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.as_runtime().is_some_and(RuntimeError::is_cancelled)
    }
}
