//! Jobs and the job runner.
//!
//! A [`Job`] is one container's worth of sequential commands. The
//! [`JobRunner`] owns that container for the whole run:
//!
//! ```text
//! validate → create → attach → start → command* → stop → remove
//! ```
//!
//! Any lifecycle failure ends the command loop; cleanup still runs for
//! whatever the container reached. The outcome is stored on the job exactly
//! once, when the run ends.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::container::{ContainerHandle, ContainerState, container_spec};
use crate::context::RunContext;
use crate::error::{Result, WorkflowError};
use crate::executor::CommandExecutor;
use crate::result::JobResult;

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// A named list of commands to run in one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Job name, used for logging and container labels.
    pub name: String,
    /// Image the container is created from.
    pub image: String,
    /// Commands in execution order; each is a list of argument tokens.
    pub commands: Vec<Vec<String>>,
    /// Environment for the container and every command.
    pub environment: BTreeMap<String, String>,
    /// Skip the remaining commands once one exits non-zero.
    pub stop_on_error: bool,
    result: Option<JobResult>,
}

impl Job {
    /// Create a job with no commands.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            commands: Vec::new(),
            environment: BTreeMap::new(),
            stop_on_error: false,
            result: None,
        }
    }

    /// Append a command.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands
            .push(command.into_iter().map(Into::into).collect());
        self
    }

    /// Append a `/bin/sh -c <script>` command.
    pub fn with_shell(self, script: impl Into<String>) -> Self {
        self.with_command(["/bin/sh".to_string(), "-c".to_string(), script.into()])
    }

    /// Set an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the stop-on-error policy.
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// The outcome of the last run, if the job has run.
    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    /// Take the outcome out, allowing the job to run again.
    pub fn take_result(&mut self) -> Option<JobResult> {
        self.result.take()
    }

    /// Whether the job has run.
    pub fn has_run(&self) -> bool {
        self.result.is_some()
    }

    /// Check the job can be run.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation("Job name cannot be empty".into()));
        }
        if self.image.trim().is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Job '{}' has no image",
                self.name
            )));
        }
        for (index, command) in self.commands.iter().enumerate() {
            if command.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "Job '{}' command {} is empty",
                    self.name, index
                )));
            }
        }
        for key in self.environment.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(WorkflowError::Validation(format!(
                    "Job '{}' has invalid environment variable name '{}'",
                    self.name, key
                )));
            }
        }
        Ok(())
    }

    /// Environment as `KEY=VALUE` assignments, sorted by key.
    pub fn env_assignments(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runner
// ─────────────────────────────────────────────────────────────────────────────

/// Runs jobs one at a time against the runtime in a [`RunContext`].
#[derive(Debug, Clone)]
pub struct JobRunner {
    config: EngineConfig,
    executor: CommandExecutor,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl JobRunner {
    /// Create a runner with the given engine configuration.
    ///
    /// The configuration is validated when a job runs; an invalid one fails
    /// every job with a `Config` error before any runtime call.
    pub fn new(config: EngineConfig) -> Self {
        let executor = CommandExecutor::from_config(&config);
        Self { config, executor }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `job` and store its outcome in the job.
    ///
    /// A job that already holds a result is left untouched; call
    /// [`Job::take_result`] first to run it again.
    pub async fn run(&self, job: &mut Job, ctx: &RunContext) {
        if job.has_run() {
            warn!(job = %job.name, "Job already has a result, not running it again");
            return;
        }
        let result = self.run_job(job, ctx).await;
        job.result = Some(result);
    }

    async fn run_job(&self, job: &Job, ctx: &RunContext) -> JobResult {
        let mut result = JobResult::new();

        if let Err(e) = self.config.validate() {
            warn!(job = %job.name, error = %e, "Rejected engine configuration");
            result.error = Some(e);
            return result;
        }

        if let Err(e) = job.validate() {
            warn!(job = %job.name, error = %e, "Rejected invalid job");
            result.error = Some(e);
            return result;
        }

        info!(
            job = %job.name,
            image = %job.image,
            commands = job.commands.len(),
            runtime = ctx.runtime().name(),
            "Starting job"
        );

        let env = job.env_assignments();
        let spec = container_spec(&job.name, &job.image, env.clone(), &self.config);
        let mut container = match ContainerHandle::create(ctx, &spec).await {
            Ok(container) => container,
            Err(e) => {
                warn!(job = %job.name, error = %e, "Failed to create container");
                result.error = Some(e);
                return result;
            }
        };

        match prepare(&mut container, ctx).await {
            Ok(()) => self.run_commands(job, &container, &env, ctx, &mut result).await,
            Err(e) => {
                warn!(job = %job.name, error = %e, "Failed to start container");
                result.error = Some(e);
            }
        }

        self.cleanup(job, &mut container, ctx, &mut result).await;

        info!(
            job = %job.name,
            attempted = result.commands.len(),
            succeeded = result.succeeded(),
            "Finished job"
        );
        result
    }

    async fn run_commands(
        &self,
        job: &Job,
        container: &ContainerHandle,
        env: &[String],
        ctx: &RunContext,
        result: &mut JobResult,
    ) {
        for (index, command) in job.commands.iter().enumerate() {
            if ctx.is_cancelled() {
                info!(
                    job = %job.name,
                    skipped = job.commands.len() - index,
                    "Cancelled, skipping remaining commands"
                );
                break;
            }

            debug!(job = %job.name, index, command = %command.join(" "), "Running command");
            let outcome = self
                .executor
                .run_command(ctx, container.id(), command, env)
                .await;
            let exit_code = outcome.exit_code;
            result.add_command_result(outcome);

            // Executor failures carry exit code -1 and stop the job too.
            if job.stop_on_error && exit_code != 0 {
                info!(
                    job = %job.name,
                    index,
                    exit_code,
                    skipped = job.commands.len() - index - 1,
                    "Command failed, stopping job"
                );
                break;
            }
        }
    }

    /// Stop a running container and remove any created one.
    ///
    /// The first failure becomes the job's error unless it already has one.
    async fn cleanup(
        &self,
        job: &Job,
        container: &mut ContainerHandle,
        ctx: &RunContext,
        result: &mut JobResult,
    ) {
        if container.state() == ContainerState::Running {
            if let Err(e) = container.stop(ctx, self.config.stop_timeout()).await {
                record_cleanup_failure(job, result, e);
            }
        }
        if let Err(e) = container.remove(ctx, self.config.remove_volumes).await {
            record_cleanup_failure(job, result, e);
        }
    }
}

async fn prepare(container: &mut ContainerHandle, ctx: &RunContext) -> Result<()> {
    container.attach(ctx).await?;
    container.start(ctx).await
}

fn record_cleanup_failure(job: &Job, result: &mut JobResult, error: WorkflowError) {
    warn!(job = %job.name, error = %error, "Container cleanup failed");
    if result.error.is_none() {
        result.error = Some(error);
    }
}
