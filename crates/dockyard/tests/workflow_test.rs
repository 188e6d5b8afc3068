//! Integration tests for the job runner and workflow runner.

use std::sync::Arc;
use std::time::Duration;

use dockyard::{
    EngineConfig, Job, JobRunner, MockExec, MockRuntime, RunContext, RuntimeCall, RuntimeError,
    RuntimeErrorKind, RuntimeOperation, UNKNOWN_EXIT_CODE, Workflow, WorkflowError, WorkflowFile,
};
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".into(), "-c".into(), script.into()]
}

/// Runtime scripted with the three commands used by the stop-on-error scenarios.
fn scripted_runtime() -> Arc<MockRuntime> {
    let runtime = Arc::new(MockRuntime::new());
    runtime
        .on_command(&sh("exit 0"), MockExec::exit(0))
        .on_command(&sh("exit 3"), MockExec::exit(3))
        .on_command(&sh("echo hi"), MockExec::exit(0).with_stdout("hi\n"));
    runtime
}

fn three_step_job(stop_on_error: bool) -> Job {
    Job::new("steps", "alpine:3.20")
        .with_shell("exit 0")
        .with_shell("exit 3")
        .with_shell("echo hi")
        .with_stop_on_error(stop_on_error)
}

async fn run(runtime: Arc<MockRuntime>, job: &mut Job) {
    let ctx = RunContext::new(runtime, CancellationToken::new());
    JobRunner::default().run(job, &ctx).await;
}

#[tokio::test]
async fn test_stop_on_error_stops_after_failure() {
    let runtime = scripted_runtime();
    let mut job = three_step_job(true);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.commands.len(), 2);
    assert_eq!(result.commands[1].exit_code, 3);
    assert_eq!(result.commands[1].command, sh("exit 3"));
    assert!(result.error.is_none());
    assert_eq!(runtime.call_count(RuntimeOperation::CreateExec), 2);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_without_stop_on_error_runs_every_command() {
    let runtime = scripted_runtime();
    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.commands.len(), 3);
    assert_eq!(result.exit_codes(), vec![0, 3, 0]);
    assert!(result.commands[2].stdout_lossy().contains("hi"));
    assert!(result.error.is_none());
    assert!(!result.succeeded());
    assert_eq!(result.first_failure().map(|c| c.exit_code), Some(3));
}

#[tokio::test]
async fn test_commands_share_one_container() {
    let runtime = scripted_runtime();
    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    let container_id = &result.commands[0].container_id;
    assert!(result.commands.iter().all(|c| &c.container_id == container_id));
    assert_eq!(runtime.call_count(RuntimeOperation::CreateContainer), 1);
}

#[tokio::test]
async fn test_create_failure_records_runtime_error() {
    let runtime = scripted_runtime();
    runtime.fail_on(
        RuntimeOperation::CreateContainer,
        RuntimeError::not_found(RuntimeOperation::CreateContainer, "No such image: nope:latest"),
    );

    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    assert!(result.commands.is_empty());
    let err = result.error.as_ref().unwrap();
    assert!(err.is_runtime());
    assert_eq!(err.as_runtime().map(|e| e.kind), Some(RuntimeErrorKind::NotFound));
    assert_eq!(runtime.call_count(RuntimeOperation::RemoveContainer), 0);
}

#[tokio::test]
async fn test_full_lifecycle_order() {
    let runtime = Arc::new(MockRuntime::new());
    let mut job = Job::new("one", "alpine").with_shell("true");
    run(runtime.clone(), &mut job).await;

    let ops: Vec<RuntimeOperation> = runtime.calls().iter().map(RuntimeCall::operation).collect();
    assert_eq!(
        ops,
        vec![
            RuntimeOperation::CreateContainer,
            RuntimeOperation::AttachContainer,
            RuntimeOperation::StartContainer,
            RuntimeOperation::CreateExec,
            RuntimeOperation::AttachExec,
            RuntimeOperation::InspectExec,
            RuntimeOperation::StartExec,
            RuntimeOperation::InspectExec,
            RuntimeOperation::InspectExec,
            RuntimeOperation::StopContainer,
            RuntimeOperation::RemoveContainer,
        ]
    );
    assert!(job.result().unwrap().succeeded());
}

#[tokio::test]
async fn test_start_failure_still_removes_container() {
    let runtime = scripted_runtime();
    runtime.fail_on(
        RuntimeOperation::StartContainer,
        RuntimeError::other(RuntimeOperation::StartContainer, "cannot start"),
    );

    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    assert!(result.commands.is_empty());
    assert_eq!(
        result.error.as_ref().and_then(|e| e.as_runtime()).map(|e| e.operation),
        Some(RuntimeOperation::StartContainer)
    );
    // Never reached Running, so no stop, but removal is still attempted
    assert_eq!(runtime.call_count(RuntimeOperation::StopContainer), 0);
    assert_eq!(runtime.call_count(RuntimeOperation::RemoveContainer), 1);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_attach_failure_still_removes_container() {
    let runtime = scripted_runtime();
    runtime.fail_on(
        RuntimeOperation::AttachContainer,
        RuntimeError::other(RuntimeOperation::AttachContainer, "hijack failed"),
    );

    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    assert!(job.result().unwrap().error.is_some());
    assert_eq!(runtime.call_count(RuntimeOperation::StartContainer), 0);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_stop_failure_keeps_command_results_and_removes() {
    let runtime = scripted_runtime();
    runtime.fail_on(
        RuntimeOperation::StopContainer,
        RuntimeError::other(RuntimeOperation::StopContainer, "stop timed out"),
    );

    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.commands.len(), 3);
    assert_eq!(
        result.error.as_ref().and_then(|e| e.as_runtime()).map(|e| e.operation),
        Some(RuntimeOperation::StopContainer)
    );
    assert_eq!(runtime.call_count(RuntimeOperation::RemoveContainer), 1);
}

#[tokio::test]
async fn test_remove_failure_is_terminal_error() {
    let runtime = scripted_runtime();
    runtime.fail_on(
        RuntimeOperation::RemoveContainer,
        RuntimeError::new(
            RuntimeOperation::RemoveContainer,
            RuntimeErrorKind::Conflict,
            "removal already in progress",
        ),
    );

    let mut job = three_step_job(false);
    run(runtime.clone(), &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.commands.len(), 3);
    assert_eq!(
        result.error.as_ref().and_then(|e| e.as_runtime()).map(|e| e.kind),
        Some(RuntimeErrorKind::Conflict)
    );
}

#[tokio::test]
async fn test_remove_not_found_is_success() {
    let runtime = scripted_runtime();
    runtime.fail_on(
        RuntimeOperation::RemoveContainer,
        RuntimeError::not_found(RuntimeOperation::RemoveContainer, "No such container"),
    );

    let mut job = three_step_job(false);
    run(runtime, &mut job).await;
    assert!(job.result().unwrap().error.is_none());
}

#[tokio::test]
async fn test_first_lifecycle_failure_wins() {
    let runtime = scripted_runtime();
    runtime
        .fail_on(
            RuntimeOperation::StopContainer,
            RuntimeError::other(RuntimeOperation::StopContainer, "stop failed"),
        )
        .fail_on(
            RuntimeOperation::RemoveContainer,
            RuntimeError::other(RuntimeOperation::RemoveContainer, "remove failed"),
        );

    let mut job = three_step_job(false);
    run(runtime, &mut job).await;

    let err = job.result().unwrap().error.clone().unwrap();
    assert_eq!(err.as_runtime().map(|e| e.operation), Some(RuntimeOperation::StopContainer));
}

#[tokio::test]
async fn test_executor_failure_continues_without_stop_on_error() {
    let runtime = scripted_runtime();
    runtime.on_command(
        &sh("exit 3"),
        MockExec::exit(3).with_failure(RuntimeError::other(
            RuntimeOperation::CreateExec,
            "container is paused",
        )),
    );

    let mut job = three_step_job(false);
    run(runtime, &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.commands.len(), 3);
    assert_eq!(result.exit_codes(), vec![0, UNKNOWN_EXIT_CODE, 0]);
    assert!(result.commands[1].error.is_some());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_executor_failure_triggers_stop_on_error() {
    let runtime = scripted_runtime();
    runtime.on_command(
        &sh("exit 0"),
        MockExec::exit(0).with_failure(RuntimeError::other(
            RuntimeOperation::StartExec,
            "exec failed",
        )),
    );

    let mut job = three_step_job(true);
    run(runtime, &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.commands.len(), 1);
    assert_eq!(result.commands[0].exit_code, UNKNOWN_EXIT_CODE);
}

#[tokio::test]
async fn test_error_and_exit_code_are_exclusive() {
    let runtime = scripted_runtime();
    runtime.on_command(&sh("echo hi"), MockExec::exit(0).with_read_error("stream reset"));

    let mut job = three_step_job(false);
    run(runtime, &mut job).await;

    for command in &job.result().unwrap().commands {
        assert_eq!(command.error.is_some(), command.exit_code == UNKNOWN_EXIT_CODE);
    }
}

#[tokio::test]
async fn test_sentinel_exit_code_from_runtime_is_an_error() {
    let runtime = scripted_runtime();
    runtime.on_command(&sh("exit -1"), MockExec::exit(-1));

    let mut job = Job::new("sentinel", "alpine")
        .with_shell("exit -1")
        .with_shell("echo hi");
    run(runtime, &mut job).await;

    let result = job.result().unwrap();
    assert_eq!(result.exit_codes(), vec![UNKNOWN_EXIT_CODE, 0]);
    assert!(matches!(
        result.commands[0].error,
        Some(WorkflowError::CommandExecution(_))
    ));
    for command in &result.commands {
        assert_eq!(command.error.is_some(), command.exit_code == UNKNOWN_EXIT_CODE);
    }
}

#[tokio::test]
async fn test_env_reaches_container_and_commands() {
    let runtime = Arc::new(MockRuntime::new());
    let mut job = Job::new("env", "alpine")
        .with_shell("echo $GREETING")
        .with_env("GREETING", "hello");
    run(runtime.clone(), &mut job).await;

    assert_eq!(runtime.container_specs()[0].env, vec!["GREETING=hello"]);
    assert_eq!(runtime.exec_specs()[0].env, vec!["GREETING=hello"]);
}

#[tokio::test]
async fn test_config_reaches_container() {
    let runtime = Arc::new(MockRuntime::new());
    let config = EngineConfig::new()
        .with_working_dir("/src")
        .with_network_disabled(false)
        .with_remove_volumes(false)
        .with_stop_timeout(Duration::from_secs(7));
    let ctx = RunContext::new(runtime.clone(), CancellationToken::new());
    let mut job = Job::new("cfg", "alpine").with_shell("true");
    JobRunner::new(config).run(&mut job, &ctx).await;

    let spec = &runtime.container_specs()[0];
    assert_eq!(spec.working_dir, "/src");
    assert!(!spec.network_disabled);
    assert!(spec.tty);

    let calls = runtime.calls();
    assert!(calls.contains(&RuntimeCall::StopContainer {
        container_id: "container-1".into(),
        timeout: Some(Duration::from_secs(7)),
    }));
    assert!(calls.contains(&RuntimeCall::RemoveContainer {
        container_id: "container-1".into(),
        remove_volumes: false,
    }));
}

#[tokio::test]
async fn test_invalid_job_never_creates_container() {
    let runtime = Arc::new(MockRuntime::new());
    let mut job = Job::new("bad", "").with_shell("true");
    run(runtime.clone(), &mut job).await;

    assert!(matches!(
        job.result().unwrap().error,
        Some(WorkflowError::Validation(_))
    ));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_config_never_creates_container() {
    let runtime = Arc::new(MockRuntime::new());
    let config = EngineConfig {
        poll_interval_ms: 0,
        ..EngineConfig::default()
    };
    let ctx = RunContext::new(runtime.clone(), CancellationToken::new());
    let mut job = Job::new("busy", "alpine").with_shell("true");
    JobRunner::new(config).run(&mut job, &ctx).await;

    assert!(matches!(
        job.result().unwrap().error,
        Some(WorkflowError::Config(_))
    ));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_workflow_with_invalid_config_fails_every_job() {
    let runtime = Arc::new(MockRuntime::new());
    let mut workflow = Workflow::new("ci", runtime.clone())
        .with_config(EngineConfig::new().with_entry_command(Vec::new()))
        .with_job(Job::new("first", "alpine").with_shell("true"))
        .with_job(Job::new("second", "alpine").with_shell("true"));

    workflow.execute(&CancellationToken::new()).await;

    for job in workflow.jobs() {
        let result = job.result().unwrap();
        assert!(matches!(result.error, Some(WorkflowError::Config(_))));
        assert!(result.commands.is_empty());
    }
    assert!(!workflow.succeeded());
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_result_set_once() {
    let runtime = scripted_runtime();
    let mut job = three_step_job(false);
    assert!(job.result().is_none());

    run(runtime.clone(), &mut job).await;
    let first = job.result().cloned();

    // A second run leaves the recorded result alone
    run(runtime.clone(), &mut job).await;
    assert_eq!(job.result().cloned(), first);
    assert_eq!(runtime.call_count(RuntimeOperation::CreateContainer), 1);

    // Taking the result allows a fresh run
    job.take_result();
    run(runtime.clone(), &mut job).await;
    assert_eq!(runtime.call_count(RuntimeOperation::CreateContainer), 2);
}

#[tokio::test]
async fn test_cancelled_job_skips_commands() {
    let runtime = scripted_runtime();
    let token = CancellationToken::new();
    token.cancel();
    let ctx = RunContext::new(runtime.clone(), token);

    let mut job = three_step_job(false);
    JobRunner::default().run(&mut job, &ctx).await;

    let result = job.result().unwrap();
    assert!(result.commands.is_empty());
    assert!(result.error.as_ref().is_some_and(WorkflowError::is_cancelled));
    assert!(runtime.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_command() {
    let runtime = scripted_runtime();
    runtime.on_command(&sh("exit 3"), MockExec::stalled());
    let token = CancellationToken::new();
    let ctx = RunContext::new(runtime.clone(), token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        token.cancel();
    });

    let mut job = three_step_job(false);
    JobRunner::default().run(&mut job, &ctx).await;
    canceller.await.unwrap();

    let result = job.result().unwrap();
    // The stalled command is recorded, the rest are skipped
    assert_eq!(result.commands.len(), 2);
    assert!(result.commands[1].error.as_ref().is_some_and(WorkflowError::is_cancelled));
    // Cleanup fails fast once cancelled
    assert!(result.error.as_ref().is_some_and(WorkflowError::is_cancelled));
    assert_eq!(runtime.call_count(RuntimeOperation::StopContainer), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_workflow_runs_jobs_in_order() {
    let runtime = Arc::new(MockRuntime::new());
    let mut workflow = Workflow::new("ci", runtime.clone())
        .with_job(Job::new("first", "image-a").with_shell("true"))
        .with_job(Job::new("second", "image-b").with_shell("true"))
        .with_job(Job::new("third", "image-c").with_shell("true"));

    workflow.execute(&CancellationToken::new()).await;

    let images: Vec<String> = runtime
        .container_specs()
        .into_iter()
        .map(|spec| spec.image)
        .collect();
    assert_eq!(images, vec!["image-a", "image-b", "image-c"]);
    assert!(workflow.succeeded());

    // Each job got its own container
    let containers: Vec<&str> = workflow
        .jobs()
        .iter()
        .map(|job| job.result().unwrap().commands[0].container_id.as_str())
        .collect();
    assert_eq!(containers, vec!["container-1", "container-3", "container-5"]);
    assert_eq!(runtime.removed_containers().len(), 3);
}

#[tokio::test]
async fn test_workflow_continues_after_failed_job() {
    let runtime = Arc::new(MockRuntime::new());
    let mut workflow = Workflow::new("ci", runtime.clone())
        .with_job(Job::new("broken", "").with_shell("true"))
        .with_job(Job::new("fine", "alpine").with_shell("true"));

    workflow.execute(&CancellationToken::new()).await;

    let jobs = workflow.jobs();
    assert!(jobs[0].result().unwrap().error.is_some());
    assert!(jobs[1].result().unwrap().succeeded());
    assert!(!workflow.succeeded());
}

#[tokio::test]
async fn test_workflow_continues_after_lifecycle_failure() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.fail_on(
        RuntimeOperation::StopContainer,
        RuntimeError::other(RuntimeOperation::StopContainer, "daemon busy"),
    );
    let mut workflow = Workflow::new("ci", runtime.clone())
        .with_job(Job::new("a", "alpine").with_shell("true"))
        .with_job(Job::new("b", "alpine").with_shell("true"));

    workflow.execute(&CancellationToken::new()).await;

    assert!(workflow.jobs().iter().all(|job| job.has_run()));
    assert_eq!(runtime.call_count(RuntimeOperation::CreateContainer), 2);
}

#[tokio::test]
async fn test_cancelled_workflow_still_records_every_job() {
    let runtime = Arc::new(MockRuntime::new());
    let mut workflow = Workflow::new("ci", runtime.clone())
        .with_job(Job::new("a", "alpine").with_shell("true"))
        .with_job(Job::new("b", "alpine").with_shell("true"));

    let token = CancellationToken::new();
    token.cancel();
    workflow.execute(&token).await;

    for job in workflow.jobs() {
        let result = job.result().unwrap();
        assert!(result.error.as_ref().is_some_and(WorkflowError::is_cancelled));
    }
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_workflow_from_toml() {
    let toml = r#"
[workflow]
name = "ci"

[workflow.engine]
poll_interval_ms = 10

[[workflow.jobs]]
name = "test"
image = "alpine:3.20"
stop_on_error = true
commands = [["/bin/sh", "-c", "exit 0"], ["/bin/sh", "-c", "exit 3"], ["/bin/sh", "-c", "echo hi"]]
"#;
    let runtime = scripted_runtime();
    let mut workflow = WorkflowFile::from_toml(toml)
        .unwrap()
        .workflow
        .into_workflow(runtime)
        .unwrap();

    workflow.execute(&CancellationToken::new()).await;

    let result = workflow.jobs()[0].result().unwrap();
    assert_eq!(result.exit_codes(), vec![0, 3]);
}
