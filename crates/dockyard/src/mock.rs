//! In-memory container runtime for testing.
//!
//! [`MockRuntime`] keeps containers and exec sessions in memory, answers each
//! command with a scripted [`MockExec`], and records every call so tests can
//! assert on lifecycle ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;

use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeOperation, RuntimeResult};
use crate::runtime::{
    ContainerRuntime, ContainerSpec, ExecSpec, ExecStatus, OutputChunk, OutputStream,
};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted Exec Behaviour
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted behaviour of one command.
#[derive(Debug, Clone)]
pub struct MockExec {
    frames: Vec<OutputChunk>,
    exit_code: i64,
    read_error: Option<String>,
    failure: Option<RuntimeError>,
    not_ready_polls: u32,
    stalled: bool,
}

impl Default for MockExec {
    fn default() -> Self {
        Self::exit(0)
    }
}

impl MockExec {
    /// A command that prints nothing and exits with `code`.
    pub fn exit(code: i64) -> Self {
        Self {
            frames: Vec::new(),
            exit_code: code,
            read_error: None,
            failure: None,
            not_ready_polls: 0,
            stalled: false,
        }
    }

    /// Append a stdout frame.
    pub fn with_stdout(mut self, data: impl Into<Bytes>) -> Self {
        self.frames.push(OutputChunk::Stdout(data.into()));
        self
    }

    /// Append a stderr frame.
    pub fn with_stderr(mut self, data: impl Into<Bytes>) -> Self {
        self.frames.push(OutputChunk::Stderr(data.into()));
        self
    }

    /// Fail the output stream after the scripted frames.
    pub fn with_read_error(mut self, message: impl Into<String>) -> Self {
        self.read_error = Some(message.into());
        self
    }

    /// Fail the runtime call named by `error.operation` for this command.
    ///
    /// Applies to `CreateExec`, `AttachExec`, `InspectExec`, and `StartExec`.
    pub fn with_failure(mut self, error: RuntimeError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Report "not running" for the first `polls` inspections after start.
    pub fn with_not_ready_polls(mut self, polls: u32) -> Self {
        self.not_ready_polls = polls;
        self
    }

    /// A command that never starts running and never produces output.
    pub fn stalled() -> Self {
        Self {
            stalled: true,
            ..Self::exit(0)
        }
    }

    fn fails_at(&self, operation: RuntimeOperation) -> Option<RuntimeError> {
        self.failure
            .as_ref()
            .filter(|e| e.operation == operation)
            .cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Call Log
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded call into the mock runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CreateContainer {
        image: String,
    },
    AttachContainer {
        container_id: String,
    },
    StartContainer {
        container_id: String,
    },
    CreateExec {
        container_id: String,
        cmd: Vec<String>,
    },
    AttachExec {
        exec_id: String,
    },
    InspectExec {
        exec_id: String,
    },
    StartExec {
        exec_id: String,
    },
    StopContainer {
        container_id: String,
        timeout: Option<Duration>,
    },
    RemoveContainer {
        container_id: String,
        remove_volumes: bool,
    },
}

impl RuntimeCall {
    /// The operation this call performed.
    pub fn operation(&self) -> RuntimeOperation {
        match self {
            Self::CreateContainer { .. } => RuntimeOperation::CreateContainer,
            Self::AttachContainer { .. } => RuntimeOperation::AttachContainer,
            Self::StartContainer { .. } => RuntimeOperation::StartContainer,
            Self::CreateExec { .. } => RuntimeOperation::CreateExec,
            Self::AttachExec { .. } => RuntimeOperation::AttachExec,
            Self::InspectExec { .. } => RuntimeOperation::InspectExec,
            Self::StartExec { .. } => RuntimeOperation::StartExec,
            Self::StopContainer { .. } => RuntimeOperation::StopContainer,
            Self::RemoveContainer { .. } => RuntimeOperation::RemoveContainer,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Runtime
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockContainerState {
    Created,
    Running,
    Stopped,
}

#[derive(Debug)]
struct MockSession {
    script: MockExec,
    started: bool,
    finished: bool,
    polls_after_start: u32,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    containers: HashMap<String, MockContainerState>,
    container_specs: Vec<ContainerSpec>,
    exec_specs: Vec<ExecSpec>,
    removed: Vec<String>,
    sessions: HashMap<String, MockSession>,
    scripts: HashMap<Vec<String>, MockExec>,
    failures: HashMap<RuntimeOperation, RuntimeError>,
    calls: Vec<RuntimeCall>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn injected(&self, operation: RuntimeOperation) -> RuntimeResult<()> {
        match self.failures.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn container(
        &mut self,
        operation: RuntimeOperation,
        container_id: &str,
    ) -> RuntimeResult<&mut MockContainerState> {
        self.containers.get_mut(container_id).ok_or_else(|| {
            RuntimeError::not_found(operation, format!("No such container: {}", container_id))
        })
    }

    fn session(
        &mut self,
        operation: RuntimeOperation,
        exec_id: &str,
    ) -> RuntimeResult<&mut MockSession> {
        let session = self.sessions.get_mut(exec_id).ok_or_else(|| {
            RuntimeError::not_found(operation, format!("No such exec instance: {}", exec_id))
        })?;
        match session.script.fails_at(operation) {
            Some(err) => Err(err),
            None => Ok(session),
        }
    }
}

/// In-memory [`ContainerRuntime`] with scripted commands.
///
/// Commands without a script exit 0 with no output.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    /// Create an empty mock runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of a command, matched on its exact tokens.
    pub fn on_command<S: AsRef<str>>(&self, cmd: &[S], exec: MockExec) -> &Self {
        let key = cmd.iter().map(|s| s.as_ref().to_string()).collect();
        self.state.lock().scripts.insert(key, exec);
        self
    }

    /// Make every call of `operation` fail with `error`.
    pub fn fail_on(&self, operation: RuntimeOperation, error: RuntimeError) -> &Self {
        self.state.lock().failures.insert(operation, error);
        self
    }

    /// Stop injecting failures for `operation`.
    pub fn clear_failure(&self, operation: RuntimeOperation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made for `operation`.
    pub fn call_count(&self, operation: RuntimeOperation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Specs of all containers created so far.
    pub fn container_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().container_specs.clone()
    }

    /// Specs of all exec sessions created so far.
    pub fn exec_specs(&self) -> Vec<ExecSpec> {
        self.state.lock().exec_specs.clone()
    }

    /// IDs of removed containers, in removal order.
    pub fn removed_containers(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    /// Number of containers created and not yet removed.
    pub fn live_containers(&self) -> usize {
        self.state.lock().containers.len()
    }

    fn record(&self, call: RuntimeCall) -> parking_lot::MutexGuard<'_, MockState> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let mut state = self.record(RuntimeCall::CreateContainer {
            image: spec.image.clone(),
        });
        state.injected(RuntimeOperation::CreateContainer)?;

        let id = state.next_id("container");
        state
            .containers
            .insert(id.clone(), MockContainerState::Created);
        state.container_specs.push(spec.clone());
        Ok(id)
    }

    async fn attach_container(&self, container_id: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::AttachContainer {
            container_id: container_id.to_string(),
        });
        state.injected(RuntimeOperation::AttachContainer)?;
        state.container(RuntimeOperation::AttachContainer, container_id)?;
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::StartContainer {
            container_id: container_id.to_string(),
        });
        state.injected(RuntimeOperation::StartContainer)?;
        let container = state.container(RuntimeOperation::StartContainer, container_id)?;
        *container = MockContainerState::Running;
        Ok(())
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> RuntimeResult<String> {
        let mut state = self.record(RuntimeCall::CreateExec {
            container_id: container_id.to_string(),
            cmd: spec.cmd.clone(),
        });
        state.injected(RuntimeOperation::CreateExec)?;

        let script = state.scripts.get(&spec.cmd).cloned().unwrap_or_default();
        if let Some(err) = script.fails_at(RuntimeOperation::CreateExec) {
            return Err(err);
        }
        let container = *state.container(RuntimeOperation::CreateExec, container_id)?;
        if container != MockContainerState::Running {
            return Err(RuntimeError::new(
                RuntimeOperation::CreateExec,
                RuntimeErrorKind::Conflict,
                format!("Container {} is not running", container_id),
            ));
        }

        let id = state.next_id("exec");
        state.sessions.insert(
            id.clone(),
            MockSession {
                script,
                started: false,
                finished: false,
                polls_after_start: 0,
            },
        );
        state.exec_specs.push(spec.clone());
        Ok(id)
    }

    async fn attach_exec(&self, exec_id: &str) -> RuntimeResult<OutputStream> {
        let mut state = self.record(RuntimeCall::AttachExec {
            exec_id: exec_id.to_string(),
        });
        state.injected(RuntimeOperation::AttachExec)?;
        let script = state
            .session(RuntimeOperation::AttachExec, exec_id)?
            .script
            .clone();

        if script.stalled {
            return Ok(Box::pin(
                futures::stream::pending::<RuntimeResult<OutputChunk>>(),
            ));
        }

        let frames = futures::stream::iter(script.frames.into_iter().map(Ok));
        if let Some(message) = script.read_error {
            let failure = futures::stream::once(async move {
                Err(RuntimeError::other(RuntimeOperation::ReadOutput, message))
            });
            return Ok(Box::pin(frames.chain(failure)));
        }

        // Mark the session finished once the consumer drains the stream.
        let shared = self.state.clone();
        let exec_id = exec_id.to_string();
        let finish = futures::stream::once(async move {
            if let Some(session) = shared.lock().sessions.get_mut(&exec_id) {
                session.finished = true;
            }
        })
        .filter_map(|()| futures::future::ready(None::<RuntimeResult<OutputChunk>>));

        Ok(Box::pin(frames.chain(finish)))
    }

    async fn inspect_exec(&self, exec_id: &str) -> RuntimeResult<ExecStatus> {
        let mut state = self.record(RuntimeCall::InspectExec {
            exec_id: exec_id.to_string(),
        });
        state.injected(RuntimeOperation::InspectExec)?;
        let session = state.session(RuntimeOperation::InspectExec, exec_id)?;

        if !session.started || session.script.stalled {
            return Ok(ExecStatus::default());
        }
        if session.finished {
            return Ok(ExecStatus {
                running: false,
                exit_code: Some(session.script.exit_code),
            });
        }
        session.polls_after_start += 1;
        Ok(ExecStatus {
            running: session.polls_after_start > session.script.not_ready_polls,
            exit_code: None,
        })
    }

    async fn start_exec(&self, exec_id: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::StartExec {
            exec_id: exec_id.to_string(),
        });
        state.injected(RuntimeOperation::StartExec)?;
        let session = state.session(RuntimeOperation::StartExec, exec_id)?;
        if session.started {
            return Err(RuntimeError::new(
                RuntimeOperation::StartExec,
                RuntimeErrorKind::Conflict,
                format!("Exec {} already started", exec_id),
            ));
        }
        session.started = true;
        Ok(())
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Option<Duration>,
    ) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::StopContainer {
            container_id: container_id.to_string(),
            timeout,
        });
        state.injected(RuntimeOperation::StopContainer)?;
        let container = state.container(RuntimeOperation::StopContainer, container_id)?;
        *container = MockContainerState::Stopped;
        Ok(())
    }

    async fn remove_container(
        &self,
        container_id: &str,
        remove_volumes: bool,
    ) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::RemoveContainer {
            container_id: container_id.to_string(),
            remove_volumes,
        });
        state.injected(RuntimeOperation::RemoveContainer)?;
        let container = *state.container(RuntimeOperation::RemoveContainer, container_id)?;
        if container == MockContainerState::Running {
            return Err(RuntimeError::new(
                RuntimeOperation::RemoveContainer,
                RuntimeErrorKind::Conflict,
                format!("Cannot remove running container {}", container_id),
            ));
        }
        state.containers.remove(container_id);
        state.removed.push(container_id.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
