//! Docker daemon availability checking.

use std::fmt;

use bollard::Docker;

const START_HINT: &str = "The Docker daemon must be running and reachable.\n\
     \n\
       Linux:  sudo systemctl start docker\n\
       macOS:  open -a Docker\n\
     \n\
     Set DOCKER_HOST to use a daemon on another socket or host.";

/// Status of the Docker daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeStatus {
    /// The daemon answered.
    Available {
        version: String,
        api_version: String,
    },

    /// The daemon could not be reached.
    Unreachable { message: String, hint: String },
}

impl RuntimeStatus {
    /// Check if the daemon is available.
    pub fn is_available(&self) -> bool {
        matches!(self, RuntimeStatus::Available { .. })
    }

    /// Get the hint for making the daemon reachable.
    pub fn hint(&self) -> Option<&str> {
        match self {
            RuntimeStatus::Unreachable { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// Ask `docker` whether the daemon is up.
    pub async fn detect(docker: &Docker) -> Self {
        if let Err(e) = docker.ping().await {
            return Self::unreachable(e.to_string());
        }
        match docker.version().await {
            Ok(version) => RuntimeStatus::Available {
                version: version.version.unwrap_or_else(|| "unknown".to_string()),
                api_version: version.api_version.unwrap_or_else(|| "unknown".to_string()),
            },
            Err(e) => Self::unreachable(e.to_string()),
        }
    }

    pub(crate) fn unreachable(message: impl Into<String>) -> Self {
        RuntimeStatus::Unreachable {
            message: message.into(),
            hint: START_HINT.to_string(),
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Available {
                version,
                api_version,
            } => {
                write!(f, "Docker {version} available (API {api_version})")
            }
            RuntimeStatus::Unreachable { message, hint } => {
                write!(f, "Docker unreachable: {message}\n\n{hint}")
            }
        }
    }
}
