//! Command executor.
//!
//! Runs one command inside an already-running container through an exec
//! session and captures its output byte-for-byte. The executor never fails:
//! anything that keeps a command from producing an exit code ends up in the
//! returned [`CommandResult`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::error::{Result, RuntimeOperation, WorkflowError};
use crate::result::{CommandResult, UNKNOWN_EXIT_CODE};
use crate::runtime::{ExecSpec, ExecStatus, OutputChunk, OutputStream};

/// Output collected from an exec session, split by channel.
#[derive(Debug, Default)]
struct CapturedOutput {
    stdout: BytesMut,
    stderr: BytesMut,
}

impl CapturedOutput {
    fn push(&mut self, chunk: OutputChunk) {
        match chunk {
            OutputChunk::Stdout(data) => self.stdout.extend_from_slice(&data),
            OutputChunk::Stderr(data) => self.stderr.extend_from_slice(&data),
        }
    }

    fn freeze(self) -> (Bytes, Bytes) {
        (self.stdout.freeze(), self.stderr.freeze())
    }
}

/// Runs single commands inside a running container.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    poll_interval: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl CommandExecutor {
    /// Create an executor that polls exec status every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Create an executor from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.poll_interval())
    }

    /// Interval between exec status checks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run `command` in `container_id` with `env` (`KEY=VALUE` assignments).
    ///
    /// Either the result carries the exit code and no error, or it carries
    /// an error and an exit code of -1. Output captured before a failure is
    /// kept in both cases.
    pub async fn run_command(
        &self,
        ctx: &RunContext,
        container_id: &str,
        command: &[String],
        env: &[String],
    ) -> CommandResult {
        let mut output = CapturedOutput::default();
        let outcome = self
            .execute(ctx, container_id, command, env, &mut output)
            .await;
        let (stdout, stderr) = output.freeze();

        match outcome {
            Ok(exit_code) => {
                info!(
                    container_id = %container_id,
                    command = %command.join(" "),
                    exit_code,
                    "Command finished"
                );
                CommandResult::completed(container_id, command.to_vec(), stdout, stderr, exit_code)
            }
            Err(e) => {
                warn!(
                    container_id = %container_id,
                    command = %command.join(" "),
                    error = %e,
                    "Command could not be executed"
                );
                CommandResult::failed(container_id, command.to_vec(), stdout, stderr, e)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        container_id: &str,
        command: &[String],
        env: &[String],
        output: &mut CapturedOutput,
    ) -> Result<i64> {
        let runtime = ctx.runtime();
        let spec = ExecSpec::attached(command.to_vec(), env.to_vec());

        let exec_id = ctx
            .call(
                RuntimeOperation::CreateExec,
                runtime.create_exec(container_id, &spec),
            )
            .await?;
        debug!(container_id = %container_id, exec_id = %exec_id, "Created exec session");

        // Attach before start so no output is lost.
        let mut stream = ctx
            .call(RuntimeOperation::AttachExec, runtime.attach_exec(&exec_id))
            .await?;

        let initial = ctx
            .call(RuntimeOperation::InspectExec, runtime.inspect_exec(&exec_id))
            .await?;
        trace!(exec_id = %exec_id, running = initial.running, "Exec session before start");

        ctx.call(RuntimeOperation::StartExec, runtime.start_exec(&exec_id))
            .await?;
        debug!(exec_id = %exec_id, "Started exec session");

        self.wait_until_started(ctx, &exec_id).await?;
        drain_output(ctx, &mut stream, output).await?;
        self.wait_for_exit_code(ctx, &exec_id).await
    }

    /// Poll until the exec session reports running or already finished.
    async fn wait_until_started(&self, ctx: &RunContext, exec_id: &str) -> Result<()> {
        loop {
            let status = ctx
                .call(
                    RuntimeOperation::InspectExec,
                    ctx.runtime().inspect_exec(exec_id),
                )
                .await?;
            if status.has_started() {
                return Ok(());
            }
            trace!(exec_id = %exec_id, "Exec session not running yet");
            ctx.pause(RuntimeOperation::InspectExec, self.poll_interval)
                .await?;
        }
    }

    /// Fetch the exit code once the output stream has closed.
    ///
    /// The runtime may still report the process as running for a moment
    /// after its output closes.
    async fn wait_for_exit_code(&self, ctx: &RunContext, exec_id: &str) -> Result<i64> {
        loop {
            let status = ctx
                .call(
                    RuntimeOperation::InspectExec,
                    ctx.runtime().inspect_exec(exec_id),
                )
                .await?;
            match status {
                ExecStatus {
                    running: false,
                    exit_code: Some(UNKNOWN_EXIT_CODE),
                } => {
                    return Err(WorkflowError::CommandExecution(format!(
                        "exec session {} reported exit code {}",
                        exec_id, UNKNOWN_EXIT_CODE
                    )));
                }
                ExecStatus {
                    running: false,
                    exit_code: Some(code),
                } => return Ok(code),
                ExecStatus { running: true, .. } => {
                    trace!(exec_id = %exec_id, "Waiting for exit code");
                    ctx.pause(RuntimeOperation::InspectExec, self.poll_interval)
                        .await?;
                }
                ExecStatus {
                    running: false,
                    exit_code: None,
                } => {
                    return Err(WorkflowError::CommandExecution(format!(
                        "exec session {} ended without an exit code",
                        exec_id
                    )));
                }
            }
        }
    }
}

/// Read frames until the stream ends, splitting them into stdout and stderr.
async fn drain_output(
    ctx: &RunContext,
    stream: &mut OutputStream,
    output: &mut CapturedOutput,
) -> Result<()> {
    loop {
        let next = ctx
            .call(RuntimeOperation::ReadOutput, async { Ok(stream.next().await) })
            .await?;
        match next {
            Some(Ok(chunk)) => output.push(chunk),
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}
