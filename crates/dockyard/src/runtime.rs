//! Container runtime abstraction.
//!
//! The engine talks to its container runtime only through [`ContainerRuntime`].
//! Transport, authentication, and API versioning belong to the implementation
//! (see the `dockyard-docker` crate); [`MockRuntime`](crate::MockRuntime)
//! provides an in-memory implementation for tests.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::RuntimeResult;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to create a job container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference, e.g. `alpine:3.20`.
    pub image: String,
    /// Environment as `KEY=VALUE` assignments.
    pub env: Vec<String>,
    /// Entry process kept alive for the life of the job.
    pub cmd: Vec<String>,
    /// Allocate a TTY for the entry process.
    pub tty: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub working_dir: String,
    pub network_disabled: bool,
    pub labels: BTreeMap<String, String>,
}

/// Everything needed to create an exec session inside a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// Command tokens, passed without shell interpretation.
    pub cmd: Vec<String>,
    /// Environment as `KEY=VALUE` assignments.
    pub env: Vec<String>,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    /// Commands never get a TTY so stdout and stderr stay separable.
    pub tty: bool,
}

impl ExecSpec {
    /// Exec spec for a command with both output channels attached.
    pub fn attached(cmd: Vec<String>, env: Vec<String>) -> Self {
        Self {
            cmd,
            env,
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time status of an exec session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecStatus {
    /// Whether the session's process is running right now.
    pub running: bool,
    /// Exit code, once the process has terminated.
    pub exit_code: Option<i64>,
}

impl ExecStatus {
    /// Whether the process has begun running or already finished.
    pub fn has_started(&self) -> bool {
        self.running || self.exit_code.is_some()
    }
}

/// One frame of exec output, tagged with the channel it was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Output of an attached exec session. Ends when the process closes its output.
pub type OutputStream = Pin<Box<dyn Stream<Item = RuntimeResult<OutputChunk>> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Runtime Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Administrative interface of a container runtime service.
///
/// Every method maps to a single runtime call. Failures are reported as
/// [`RuntimeError`](crate::RuntimeError)s tagged with the failing operation.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container and return its identifier.
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Attach to the container's stdout/stderr before it starts.
    async fn attach_container(&self, container_id: &str) -> RuntimeResult<()>;

    /// Transition a created container to running.
    async fn start_container(&self, container_id: &str) -> RuntimeResult<()>;

    /// Create an exec session and return its identifier.
    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> RuntimeResult<String>;

    /// Attach to an exec session's output.
    async fn attach_exec(&self, exec_id: &str) -> RuntimeResult<OutputStream>;

    /// Snapshot an exec session's status.
    async fn inspect_exec(&self, exec_id: &str) -> RuntimeResult<ExecStatus>;

    /// Start an exec session's process.
    async fn start_exec(&self, exec_id: &str) -> RuntimeResult<()>;

    /// Request a graceful stop. `None` uses the runtime's default grace period.
    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Option<Duration>,
    ) -> RuntimeResult<()>;

    /// Remove a container, optionally with its anonymous volumes.
    async fn remove_container(&self, container_id: &str, remove_volumes: bool)
    -> RuntimeResult<()>;

    /// Name of the runtime, for logging.
    fn name(&self) -> &str;
}

/// A runtime that can be shared across a whole workflow.
pub type SharedRuntime = Arc<dyn ContainerRuntime>;
