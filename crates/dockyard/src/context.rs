//! Per-run execution context.
//!
//! A [`RunContext`] pairs the shared runtime with the caller's cancellation
//! token and is passed by reference through every step of a job. All runtime
//! calls go through [`RunContext::call`], so a fired token turns the next call
//! into a [`RuntimeErrorKind::Cancelled`](crate::RuntimeErrorKind) failure.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{RuntimeError, RuntimeOperation, RuntimeResult};
use crate::runtime::{ContainerRuntime, SharedRuntime};

/// Runtime handle plus cancellation token for one job run.
#[derive(Clone)]
pub struct RunContext {
    runtime: SharedRuntime,
    cancellation: CancellationToken,
}

impl RunContext {
    /// Create a context for a run.
    pub fn new(runtime: SharedRuntime, cancellation: CancellationToken) -> Self {
        Self {
            runtime,
            cancellation,
        }
    }

    /// The runtime this context calls into.
    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// The caller's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Check if the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run one runtime call, failing with a cancellation error if the token
    /// has fired or fires while the call is in flight.
    pub async fn call<T, F>(&self, operation: RuntimeOperation, call: F) -> RuntimeResult<T>
    where
        F: Future<Output = RuntimeResult<T>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(RuntimeError::cancelled(operation));
        }
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(RuntimeError::cancelled(operation)),
            result = call => result,
        }
    }

    /// Sleep for `period`, returning early with a cancellation error if the
    /// token fires. `operation` names the wait in the error.
    pub async fn pause(&self, operation: RuntimeOperation, period: Duration) -> RuntimeResult<()> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(RuntimeError::cancelled(operation)),
            _ = tokio::time::sleep(period) => Ok(()),
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("runtime", &self.runtime.name())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
