//! Workflow runner.
//!
//! A [`Workflow`] is an ordered list of jobs sharing one runtime connection.
//! Jobs run one after another in insertion order, and a failed job never
//! stops the jobs after it.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::job::{Job, JobRunner};
use crate::runtime::SharedRuntime;

/// An ordered list of jobs plus the runtime they run on.
pub struct Workflow {
    name: String,
    jobs: Vec<Job>,
    runtime: SharedRuntime,
    config: EngineConfig,
}

impl Workflow {
    /// Create an empty workflow on `runtime` with default configuration.
    pub fn new(name: impl Into<String>, runtime: SharedRuntime) -> Self {
        Self {
            name: name.into(),
            jobs: Vec::new(),
            runtime,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine configuration.
    ///
    /// An invalid configuration fails every job with a `Config` error when
    /// the workflow executes.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a job. Jobs run in the order they are added.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Append a job. Jobs run in the order they are added.
    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The jobs, in execution order. Results are available after [`execute`](Self::execute).
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Consume the workflow, returning its jobs.
    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Whether every job has run and succeeded.
    pub fn succeeded(&self) -> bool {
        self.jobs
            .iter()
            .all(|job| job.result().is_some_and(|r| r.succeeded()))
    }

    /// Run every job in order.
    ///
    /// Outcomes are read from each job afterwards. Cancelling `cancellation`
    /// makes the remaining runtime calls fail fast; every job still gets a
    /// result.
    pub async fn execute(&mut self, cancellation: &CancellationToken) {
        let ctx = RunContext::new(self.runtime.clone(), cancellation.clone());
        let runner = JobRunner::new(self.config.clone());

        info!(
            workflow = %self.name,
            jobs = self.jobs.len(),
            runtime = self.runtime.name(),
            "Executing workflow"
        );

        for job in &mut self.jobs {
            runner.run(job, &ctx).await;
        }

        let failed = self
            .jobs
            .iter()
            .filter(|job| !job.result().is_some_and(|r| r.succeeded()))
            .count();
        info!(workflow = %self.name, failed, "Workflow finished");
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("jobs", &self.jobs)
            .field("runtime", &self.runtime.name())
            .field("config", &self.config)
            .finish()
    }
}
