//! Error types for the Docker runtime.
//!
//! Connecting to the daemon fails with a [`DockerError`]. Once connected,
//! every failed API call is reported to the engine as a
//! [`RuntimeError`] classified by [`runtime_error`].

use bollard::errors::Error as BollardError;
use dockyard::{RuntimeError, RuntimeErrorKind, RuntimeOperation};
use thiserror::Error;

/// Errors that can occur while connecting to Docker.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The client could not be configured from the local environment.
    #[error("Failed to connect to Docker: {0}")]
    Connection(String),

    /// The daemon did not answer.
    #[error("Docker unavailable: {message}\n\n{hint}")]
    Unavailable { message: String, hint: String },
}

/// Result type for Docker connection operations.
pub type DockerResult<T> = std::result::Result<T, DockerError>;

/// Classify a bollard error as a runtime error for `operation`.
pub fn runtime_error(operation: RuntimeOperation, err: BollardError) -> RuntimeError {
    let kind = error_kind(&err);
    let message = match err {
        BollardError::DockerResponseServerError { message, .. } => message,
        other => other.to_string(),
    };
    RuntimeError::new(operation, kind, message)
}

fn error_kind(err: &BollardError) -> RuntimeErrorKind {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => match status_code {
            404 => RuntimeErrorKind::NotFound,
            409 => RuntimeErrorKind::Conflict,
            _ => RuntimeErrorKind::Other,
        },
        BollardError::RequestTimeoutError
        | BollardError::IOError { .. }
        | BollardError::HyperResponseError { .. } => RuntimeErrorKind::Unavailable,
        _ => RuntimeErrorKind::Other,
    }
}

/// Whether the daemon answered "304 Not Modified", e.g. stopping a stopped container.
pub(crate) fn is_not_modified(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}
