//! Docker Engine runtime for the dockyard job execution engine.
//!
//! [`DockerRuntime`] implements [`dockyard::ContainerRuntime`] on top of the
//! `bollard` client. Connection settings come from the local environment
//! (`DOCKER_HOST` or the default socket).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dockyard::{Job, Workflow};
//! use dockyard_docker::DockerRuntime;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Fails with a hint if the daemon is not running
//!     let runtime = DockerRuntime::connect_checked().await?;
//!
//!     let mut workflow = Workflow::new("ci", Arc::new(runtime)).with_job(
//!         Job::new("test", "alpine:3.20")
//!             .with_shell("echo hello")
//!             .with_stop_on_error(true),
//!     );
//!     workflow.execute(&CancellationToken::new()).await;
//!
//!     for job in workflow.jobs() {
//!         println!("{}: {:?}", job.name, job.result());
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod runtime;
mod status;

pub use error::{DockerError, DockerResult, runtime_error};
pub use runtime::DockerRuntime;
pub use status::RuntimeStatus;
