//! Sequential job execution engine for ephemeral containers.
//!
//! A [`Workflow`] holds an ordered list of [`Job`]s. Each job gets a fresh
//! container, runs its commands one at a time through exec sessions, and
//! tears the container down again. Outcomes are recorded on each job as a
//! [`JobResult`] with one [`CommandResult`] per attempted command.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Workflow                                               │
//! │  - Ordered jobs, one shared runtime                     │
//! │  ┌───────────────────────────────────────────────────┐  │
//! │  │  JobRunner                                        │  │
//! │  │  - ContainerHandle: create/attach/start/stop/rm   │  │
//! │  │  - CommandExecutor: exec, poll, demux, exit code  │  │
//! │  └───────────────────────────────────────────────────┘  │
//! └────────────────────────────┬────────────────────────────┘
//!                              │ ContainerRuntime
//!                  ┌───────────┴───────────┐
//!            dockyard-docker            MockRuntime
//! ```
//!
//! The engine never installs a `tracing` subscriber; embedding applications
//! choose their own.

pub mod config;
pub mod container;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod job;
pub mod mock;
pub mod result;
pub mod runtime;
pub mod workflow;

pub use config::EngineConfig;
pub use container::{ContainerHandle, ContainerState, JOB_LABEL, container_spec};
pub use context::RunContext;
pub use definition::{JobDefinition, WorkflowDefinition, WorkflowFile};
pub use error::{
    Result, RuntimeError, RuntimeErrorKind, RuntimeOperation, RuntimeResult, WorkflowError,
};
pub use executor::CommandExecutor;
pub use job::{Job, JobRunner};
pub use mock::{MockExec, MockRuntime, RuntimeCall};
pub use result::{CommandResult, JobResult, UNKNOWN_EXIT_CODE};
pub use runtime::{
    ContainerRuntime, ContainerSpec, ExecSpec, ExecStatus, OutputChunk, OutputStream,
    SharedRuntime,
};
pub use workflow::Workflow;
