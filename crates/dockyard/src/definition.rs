//! Declarative workflow definition parser.
//!
//! Parses TOML workflow files into [`WorkflowDefinition`]s, validates them,
//! and turns them into runnable [`Workflow`]s.
//!
//! # Example TOML
//!
//! ```toml
//! [workflow]
//! name = "ci"
//!
//! [workflow.engine]
//! poll_interval_ms = 250
//!
//! [[workflow.jobs]]
//! name = "test"
//! image = "alpine:3.20"
//! stop_on_error = true
//! commands = [["/bin/sh", "-c", "echo hi"], ["/bin/sh", "-c", "exit 3"]]
//! environment = { GREETING = "hello" }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::job::Job;
use crate::runtime::SharedRuntime;
use crate::workflow::Workflow;

/// Top-level wrapper matching the TOML structure `[workflow]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowFile {
    pub workflow: WorkflowDefinition,
}

/// A complete declarative workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    /// Workflow name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Engine settings. Missing fields take their defaults.
    #[serde(default)]
    pub engine: Option<EngineConfig>,

    /// Jobs in execution order.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// A single job within a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobDefinition {
    /// Unique job name within this workflow.
    pub name: String,

    /// Image the job container is created from.
    pub image: String,

    /// Commands in execution order, each a list of argument tokens.
    #[serde(default)]
    pub commands: Vec<Vec<String>>,

    /// Environment for the container and every command.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Skip the remaining commands once one exits non-zero.
    #[serde(default)]
    pub stop_on_error: bool,
}

impl From<JobDefinition> for Job {
    fn from(def: JobDefinition) -> Self {
        let mut job = Job::new(def.name, def.image).with_stop_on_error(def.stop_on_error);
        job.commands = def.commands;
        job.environment = def.environment;
        job
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

impl WorkflowFile {
    /// Parse a workflow definition from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| WorkflowError::Config(format!("TOML parse error: {}", e)))
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| WorkflowError::Config(format!("TOML serialize error: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

impl WorkflowDefinition {
    /// Validate the workflow definition.
    ///
    /// Checks:
    /// - Non-empty name and at least one job
    /// - Job names are non-empty and unique
    /// - Every job names an image
    /// - No command is empty
    /// - Environment variable names are non-empty and contain no `=`
    /// - Engine settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "Workflow name cannot be empty".into(),
            ));
        }

        if self.jobs.is_empty() {
            return Err(WorkflowError::Validation(
                "Workflow must have at least one job".into(),
            ));
        }

        let mut seen_names = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(WorkflowError::Validation("Job name cannot be empty".into()));
            }
            if !seen_names.insert(job.name.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "Duplicate job name: {}",
                    job.name
                )));
            }
        }

        // Per-job checks are shared with jobs built in code
        for job in &self.jobs {
            Job::from(job.clone()).validate()?;
        }

        if let Some(ref engine) = self.engine {
            engine.validate()?;
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────────────

impl WorkflowDefinition {
    /// Validate and build a runnable workflow on `runtime`.
    pub fn into_workflow(self, runtime: SharedRuntime) -> Result<Workflow> {
        self.validate()?;

        let mut workflow = Workflow::new(self.name, runtime)
            .with_config(self.engine.unwrap_or_default());
        for def in self.jobs {
            debug!(job = %def.name, image = %def.image, "Adding job from definition");
            workflow.add_job(def.into());
        }
        Ok(workflow)
    }
}
