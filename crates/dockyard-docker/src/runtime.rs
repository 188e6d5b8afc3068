//! [`ContainerRuntime`] implementation backed by the Docker Engine API.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, LogOutput, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use dockyard::{
    ContainerRuntime, ContainerSpec, ExecSpec, ExecStatus, OutputChunk, OutputStream,
    RuntimeError, RuntimeOperation, RuntimeResult,
};
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{DockerError, DockerResult, is_not_modified, runtime_error};
use crate::status::RuntimeStatus;

/// Container runtime talking to a Docker daemon.
///
/// Docker has no separate "attach" step for exec sessions: attaching starts
/// the process. [`attach_exec`](ContainerRuntime::attach_exec) therefore
/// starts the session with its output attached, and the following
/// [`start_exec`](ContainerRuntime::start_exec) call only confirms it.
///
/// An attached session whose stream is dropped before it is confirmed is
/// forgotten again; its process keeps running until the container stops.
pub struct DockerRuntime {
    docker: Docker,
    attached: AttachedExecs,
}

/// Exec sessions started by `attach_exec` and not yet confirmed by `start_exec`.
type AttachedExecs = Arc<Mutex<HashSet<String>>>;

/// Keeps an exec id in the attached set for as long as its output stream lives.
struct AttachedExec {
    attached: AttachedExecs,
    exec_id: String,
}

impl AttachedExec {
    fn track(attached: &AttachedExecs, exec_id: &str) -> Self {
        attached.lock().insert(exec_id.to_string());
        Self {
            attached: attached.clone(),
            exec_id: exec_id.to_string(),
        }
    }
}

impl Drop for AttachedExec {
    fn drop(&mut self) {
        self.attached.lock().remove(&self.exec_id);
    }
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the default socket).
    ///
    /// This does not contact the daemon; see [`connect_checked`](Self::connect_checked).
    pub fn connect() -> DockerResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::Connection(e.to_string()))?;
        Ok(Self::from_client(docker))
    }

    /// Connect and make sure the daemon answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be configured or the daemon is down.
    pub async fn connect_checked() -> DockerResult<Self> {
        let runtime = Self::connect()?;
        match runtime.check_availability().await {
            RuntimeStatus::Available {
                version,
                api_version,
            } => {
                debug!(version = %version, api_version = %api_version, "Connected to Docker");
                Ok(runtime)
            }
            RuntimeStatus::Unreachable { message, hint } => {
                Err(DockerError::Unavailable { message, hint })
            }
        }
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self {
            docker,
            attached: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &Docker {
        &self.docker
    }

    /// Check whether the daemon is reachable.
    pub async fn check_availability(&self) -> RuntimeStatus {
        RuntimeStatus::detect(&self.docker).await
    }
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime")
            .field("attached", &self.attached.lock().len())
            .finish()
    }
}

/// Docker container config for a job container.
pub(crate) fn container_config(spec: &ContainerSpec) -> Config<String> {
    let labels: HashMap<String, String> = spec
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env.clone()),
        cmd: Some(spec.cmd.clone()),
        tty: Some(spec.tty),
        attach_stdout: Some(spec.attach_stdout),
        attach_stderr: Some(spec.attach_stderr),
        working_dir: Some(spec.working_dir.clone()),
        network_disabled: Some(spec.network_disabled),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Docker exec options for a command.
pub(crate) fn exec_options(spec: &ExecSpec) -> CreateExecOptions<String> {
    CreateExecOptions {
        cmd: Some(spec.cmd.clone()),
        env: Some(spec.env.clone()),
        attach_stdout: Some(spec.attach_stdout),
        attach_stderr: Some(spec.attach_stderr),
        tty: Some(spec.tty),
        ..Default::default()
    }
}

/// Turn Docker exec output into an [`OutputStream`] that owns `guard`.
fn tracked_output<S>(output: S, guard: AttachedExec) -> OutputStream
where
    S: futures::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send + 'static,
{
    let stream = output.filter_map(move |frame| {
        let _attached = &guard;
        futures::future::ready(match frame {
            Ok(frame) => output_chunk(frame).map(Ok),
            Err(e) => Some(Err(runtime_error(RuntimeOperation::ReadOutput, e))),
        })
    });
    Box::pin(stream)
}

/// Map a Docker output frame to a channel-tagged chunk. Stdin echoes are dropped.
pub(crate) fn output_chunk(frame: LogOutput) -> Option<OutputChunk> {
    match frame {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            Some(OutputChunk::Stdout(message))
        }
        LogOutput::StdErr { message } => Some(OutputChunk::Stderr(message)),
        LogOutput::StdIn { .. } => None,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, container_config(spec))
            .await
            .map_err(|e| runtime_error(RuntimeOperation::CreateContainer, e))?;

        for warning in &response.warnings {
            warn!(container_id = %response.id, warning = %warning, "Docker warning on create");
        }
        Ok(response.id)
    }

    async fn attach_container(&self, container_id: &str) -> RuntimeResult<()> {
        let options = AttachContainerOptions::<String> {
            stream: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            ..Default::default()
        };
        let attached = self
            .docker
            .attach_container(container_id, Some(options))
            .await
            .map_err(|e| runtime_error(RuntimeOperation::AttachContainer, e))?;

        // Console output of the entry process goes to the log.
        let container_id = container_id.to_string();
        let mut output = attached.output;
        tokio::spawn(async move {
            while let Some(frame) = output.next().await {
                match frame {
                    Ok(frame) => {
                        trace!(container_id = %container_id, output = %frame, "Container console")
                    }
                    Err(e) => {
                        trace!(container_id = %container_id, error = %e, "Console stream closed");
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container::<String>(container_id, None)
            .await
            .map_err(|e| runtime_error(RuntimeOperation::StartContainer, e))
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> RuntimeResult<String> {
        let response = self
            .docker
            .create_exec(container_id, exec_options(spec))
            .await
            .map_err(|e| runtime_error(RuntimeOperation::CreateExec, e))?;
        Ok(response.id)
    }

    async fn attach_exec(&self, exec_id: &str) -> RuntimeResult<OutputStream> {
        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        let started = self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| runtime_error(RuntimeOperation::AttachExec, e))?;

        match started {
            StartExecResults::Attached { output, .. } => Ok(tracked_output(
                output,
                AttachedExec::track(&self.attached, exec_id),
            )),
            StartExecResults::Detached => Err(RuntimeError::other(
                RuntimeOperation::AttachExec,
                format!("exec {} started detached", exec_id),
            )),
        }
    }

    async fn inspect_exec(&self, exec_id: &str) -> RuntimeResult<ExecStatus> {
        let inspect = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(|e| runtime_error(RuntimeOperation::InspectExec, e))?;

        let running = inspect.running.unwrap_or(false);
        Ok(ExecStatus {
            running,
            exit_code: if running { None } else { inspect.exit_code },
        })
    }

    async fn start_exec(&self, exec_id: &str) -> RuntimeResult<()> {
        if self.attached.lock().remove(exec_id) {
            return Ok(());
        }
        let options = StartExecOptions {
            detach: true,
            ..Default::default()
        };
        self.docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| runtime_error(RuntimeOperation::StartExec, e))?;
        Ok(())
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Option<Duration>,
    ) -> RuntimeResult<()> {
        let options = timeout.map(|t| StopContainerOptions {
            t: i64::try_from(t.as_secs()).unwrap_or(i64::MAX),
        });
        match self.docker.stop_container(container_id, options).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                debug!(container_id = %container_id, "Container already stopped");
                Ok(())
            }
            Err(e) => Err(runtime_error(RuntimeOperation::StopContainer, e)),
        }
    }

    async fn remove_container(
        &self,
        container_id: &str,
        remove_volumes: bool,
    ) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            v: remove_volumes,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| runtime_error(RuntimeOperation::RemoveContainer, e))
    }

    fn name(&self) -> &str {
        "docker"
    }
}
