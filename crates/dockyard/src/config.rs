//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};

/// Configuration shared by every job a workflow runs.
///
/// Every field has a default, so an empty TOML table is a valid config.
///
/// ```toml
/// poll_interval_ms = 500
/// entry_command = ["/bin/sh"]
/// working_dir = "/"
/// network_disabled = true
/// remove_volumes = true
/// stop_timeout_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between exec readiness checks, in milliseconds.
    pub poll_interval_ms: u64,

    /// Entry process kept alive in each job container.
    pub entry_command: Vec<String>,

    /// Working directory inside job containers.
    pub working_dir: String,

    /// Create containers without networking.
    pub network_disabled: bool,

    /// Remove anonymous volumes together with the container.
    pub remove_volumes: bool,

    /// Grace period for stopping a container. Unset uses the runtime default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            entry_command: vec!["/bin/sh".to_string()],
            working_dir: "/".to_string(),
            network_disabled: true,
            remove_volumes: true,
            stop_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| WorkflowError::Config(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(WorkflowError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.entry_command.is_empty() {
            return Err(WorkflowError::Config(
                "entry_command cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// Readiness poll interval, never shorter than one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Stop grace period, if overridden.
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_secs.map(Duration::from_secs)
    }

    /// Set the readiness poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    /// Set the entry process of job containers.
    pub fn with_entry_command(mut self, command: Vec<String>) -> Self {
        self.entry_command = command;
        self
    }

    /// Set the working directory of job containers.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Enable or disable container networking.
    pub fn with_network_disabled(mut self, disabled: bool) -> Self {
        self.network_disabled = disabled;
        self
    }

    /// Choose whether anonymous volumes are removed with the container.
    pub fn with_remove_volumes(mut self, remove: bool) -> Self {
        self.remove_volumes = remove;
        self
    }

    /// Override the stop grace period, rounded up to whole seconds.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.stop_timeout_secs = Some(secs);
        self
    }
}
