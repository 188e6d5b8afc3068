//! Container lifecycle management for a single job.
//!
//! A [`ContainerHandle`] walks `Created → Running → Stopped → Removed` and
//! never goes back. Removal is also accepted straight from `Created` or
//! `Running` so a job that failed part-way can still release its container.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::error::{Result, RuntimeOperation, WorkflowError};
use crate::runtime::ContainerSpec;

/// Label carrying the name of the job that owns a container.
pub const JOB_LABEL: &str = "dockyard.job";

/// Lifecycle state of a job container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the spec for a job container.
///
/// The entry process gets a TTY and attached output so it stays alive
/// between commands; networking and volumes follow `config`.
pub fn container_spec(
    job_name: &str,
    image: &str,
    env: Vec<String>,
    config: &EngineConfig,
) -> ContainerSpec {
    let mut labels = BTreeMap::new();
    labels.insert(JOB_LABEL.to_string(), job_name.to_string());

    ContainerSpec {
        image: image.to_string(),
        env,
        cmd: config.entry_command.clone(),
        tty: true,
        attach_stdout: true,
        attach_stderr: true,
        working_dir: config.working_dir.clone(),
        network_disabled: config.network_disabled,
        labels,
    }
}

/// A container exclusively owned by one job run.
#[derive(Debug)]
pub struct ContainerHandle {
    id: String,
    state: ContainerState,
}

impl ContainerHandle {
    /// Create a container at the runtime.
    ///
    /// On success the runtime holds a resource that must later be passed to
    /// [`remove`](Self::remove).
    pub async fn create(ctx: &RunContext, spec: &ContainerSpec) -> Result<Self> {
        let id = ctx
            .call(
                RuntimeOperation::CreateContainer,
                ctx.runtime().create_container(spec),
            )
            .await?;

        info!(container_id = %id, image = %spec.image, "Created container");

        Ok(Self {
            id,
            state: ContainerState::Created,
        })
    }

    /// Container identifier assigned by the runtime.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Attach to the container's output streams. Only valid before start.
    pub async fn attach(&self, ctx: &RunContext) -> Result<()> {
        self.expect_state(&[ContainerState::Created], RuntimeOperation::AttachContainer)?;
        ctx.call(
            RuntimeOperation::AttachContainer,
            ctx.runtime().attach_container(&self.id),
        )
        .await?;
        debug!(container_id = %self.id, "Attached to container");
        Ok(())
    }

    /// Start the container. Must happen exactly once, before any command.
    pub async fn start(&mut self, ctx: &RunContext) -> Result<()> {
        self.expect_state(&[ContainerState::Created], RuntimeOperation::StartContainer)?;
        ctx.call(
            RuntimeOperation::StartContainer,
            ctx.runtime().start_container(&self.id),
        )
        .await?;
        self.state = ContainerState::Running;
        info!(container_id = %self.id, "Started container");
        Ok(())
    }

    /// Request a graceful stop. `None` keeps the runtime's grace period.
    pub async fn stop(
        &mut self,
        ctx: &RunContext,
        timeout: Option<std::time::Duration>,
    ) -> Result<()> {
        self.expect_state(&[ContainerState::Running], RuntimeOperation::StopContainer)?;
        ctx.call(
            RuntimeOperation::StopContainer,
            ctx.runtime().stop_container(&self.id, timeout),
        )
        .await?;
        self.state = ContainerState::Stopped;
        info!(container_id = %self.id, "Stopped container");
        Ok(())
    }

    /// Remove the container. A runtime that no longer knows the container
    /// counts as a successful removal.
    pub async fn remove(&mut self, ctx: &RunContext, remove_volumes: bool) -> Result<()> {
        self.expect_state(
            &[
                ContainerState::Created,
                ContainerState::Running,
                ContainerState::Stopped,
            ],
            RuntimeOperation::RemoveContainer,
        )?;
        match ctx
            .call(
                RuntimeOperation::RemoveContainer,
                ctx.runtime().remove_container(&self.id, remove_volumes),
            )
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(container_id = %self.id, "Container already removed");
            }
            Err(e) => return Err(e.into()),
        }
        self.state = ContainerState::Removed;
        info!(container_id = %self.id, "Removed container");
        Ok(())
    }

    fn expect_state(&self, allowed: &[ContainerState], operation: RuntimeOperation) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidState {
                container_id: self.id.clone(),
                state: self.state.to_string(),
                operation,
            })
        }
    }
}
