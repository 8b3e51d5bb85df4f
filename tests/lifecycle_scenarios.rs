// tests/lifecycle_scenarios.rs

mod common;
use crate::common::{Harness, PromoteGate, test_pool_options, with_timeout};

use std::error::Error;
use std::time::Duration;

use serde_json::json;
use taskpool::engine::StopOutcome;
use taskpool::errors::TaskPoolError;
use taskpool::exec::ProcessExit;
use taskpool::types::TaskStatus;
use taskpool_test_utils::builders::{NewTaskBuilder, admin, regular_user};
use taskpool_test_utils::fake_process::FakeLauncher;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn stop_before_start_settles_stopped_and_never_runs() -> TestResult {
    let gate = PromoteGate::new();
    let h = Harness::build(test_pool_options(1), FakeLauncher::new(), Some(gate.hook()));

    let task = h.admit().await;
    assert_eq!(task.status, TaskStatus::Waiting);
    assert_eq!(h.stored_status(&task), TaskStatus::Waiting);
    assert_eq!(
        h.event_descriptions(&task),
        vec![format!("Task ID {} queued for running", task.id)]
    );

    // Worker has dequeued the task and is paused before promotion.
    with_timeout(gate.wait_arrived(task.id)).await;

    let report = h.manager().stop(task.project_id, task.id).await?;
    assert_eq!(report.outcome, StopOutcome::StoppedBeforeStart);
    assert!(report.event_error.is_none());
    assert!(h.manager().query_active(task.id).is_none());

    gate.release(1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.stored_status(&task), TaskStatus::Stopped);
    assert!(h.launcher.started().is_empty(), "process must never start");
    assert_eq!(
        h.store.status_history(task.id),
        vec![TaskStatus::Waiting, TaskStatus::Stopped]
    );
    assert_eq!(
        h.event_descriptions(&task),
        vec![
            format!("Task ID {} queued for running", task.id),
            format!("Task ID {} finished - STOPPED", task.id),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn stop_running_task_goes_through_stopping() -> TestResult {
    let h = Harness::start(1);

    let task = h.admit().await;
    with_timeout(h.wait_active_status(task.id, TaskStatus::Running)).await;

    let snapshot = h.manager().query_active(task.id).ok_or("task not active")?;
    assert!(snapshot.has_process);
    assert_eq!(h.stored_status(&task), TaskStatus::Running);

    let report = h.manager().stop(task.project_id, task.id).await?;
    assert_eq!(report.outcome, StopOutcome::KillRequested);
    assert_eq!(h.launcher.kills(), vec![task.id]);

    // Kill is only a request: the entry stays active until the exit arrives.
    let snapshot = h.manager().query_active(task.id).ok_or("task not active")?;
    assert_eq!(snapshot.status, TaskStatus::Stopping);
    assert_eq!(h.stored_status(&task), TaskStatus::Stopping);

    assert!(h.launcher.complete(task.id, ProcessExit::failure(None, "killed")));
    with_timeout(h.wait_retired(task.id)).await;

    assert_eq!(h.stored_status(&task), TaskStatus::Stopped);
    assert_eq!(
        h.store.status_history(task.id),
        vec![
            TaskStatus::Waiting,
            TaskStatus::Running,
            TaskStatus::Stopping,
            TaskStatus::Stopped,
        ]
    );

    Ok(())
}

#[tokio::test]
async fn failed_exit_finishes_error_and_remove_succeeds_once() -> TestResult {
    let h = Harness::start(1);

    let task = h.admit().await;
    with_timeout(h.launcher.wait_started(task.id)).await;

    assert!(h.launcher.complete(task.id, ProcessExit::failure(Some(2), "exit status 2")));
    with_timeout(h.wait_retired(task.id)).await;

    assert!(h.manager().query_active(task.id).is_none());
    let stored = h.manager().get_task(task.project_id, task.id)?;
    assert_eq!(stored.status, TaskStatus::Error);
    assert!(stored.start.is_some());
    assert!(stored.end.is_some());
    assert_eq!(
        h.store.status_history(task.id),
        vec![TaskStatus::Waiting, TaskStatus::Running, TaskStatus::Error]
    );

    h.manager().remove(task.project_id, task.id, &admin())?;
    assert!(matches!(
        h.manager().get_task(task.project_id, task.id),
        Err(TaskPoolError::NotFound(id)) if id == task.id
    ));

    match h.manager().remove(task.project_id, task.id, &admin()) {
        Err(e @ TaskPoolError::NotFound(_)) => assert_eq!(e.status_code(), 404),
        other => panic!("expected NotFound on second remove, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn successful_run_records_queued_and_finished_events() -> TestResult {
    let launcher = FakeLauncher::new().auto_exit(ProcessExit::success());
    let h = Harness::build(test_pool_options(2), launcher, None);

    let task = h.admit().await;
    with_timeout(h.pool.wait_idle()).await;

    assert_eq!(h.stored_status(&task), TaskStatus::Success);
    assert_eq!(
        h.event_descriptions(&task),
        vec![
            format!("Task ID {} queued for running", task.id),
            format!("Task ID {} finished - SUCCESS", task.id),
        ]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_event_precedes_completion_under_fast_workers() -> TestResult {
    let launcher = FakeLauncher::new().auto_exit(ProcessExit::success());
    let h = Harness::build(test_pool_options(4), launcher, None);

    let mut tasks = Vec::new();
    for _ in 0..20 {
        tasks.push(h.admit().await);
    }
    with_timeout(h.pool.wait_idle()).await;

    for task in &tasks {
        assert_eq!(
            h.event_descriptions(task),
            vec![
                format!("Task ID {} queued for running", task.id),
                format!("Task ID {} finished - SUCCESS", task.id),
            ]
        );
    }

    Ok(())
}

#[tokio::test]
async fn remove_while_active_is_a_conflict() -> TestResult {
    let h = Harness::start(1);

    let task = h.admit().await;
    with_timeout(h.launcher.wait_started(task.id)).await;

    match h.manager().remove(task.project_id, task.id, &admin()) {
        Err(e @ TaskPoolError::Conflict(_)) => assert_eq!(e.status_code(), 400),
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(h.stored_status(&task), TaskStatus::Running);

    h.launcher.complete(task.id, ProcessExit::success());
    with_timeout(h.wait_retired(task.id)).await;
    h.manager().remove(task.project_id, task.id, &admin())?;

    Ok(())
}

#[tokio::test]
async fn remove_requires_admin() -> TestResult {
    let launcher = FakeLauncher::new().auto_exit(ProcessExit::success());
    let h = Harness::build(test_pool_options(1), launcher, None);

    let task = h.admit().await;
    with_timeout(h.pool.wait_idle()).await;

    match h.manager().remove(task.project_id, task.id, &regular_user()) {
        Err(e @ TaskPoolError::Unauthorized(_)) => assert_eq!(e.status_code(), 401),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert_eq!(h.stored_status(&task), TaskStatus::Success);

    Ok(())
}

#[tokio::test]
async fn repeated_stops_never_add_events() -> TestResult {
    let h = Harness::start(1);

    let task = h.admit().await;
    with_timeout(h.wait_active_status(task.id, TaskStatus::Running)).await;

    let first = h.manager().stop(task.project_id, task.id).await?;
    let second = h.manager().stop(task.project_id, task.id).await?;
    let third = h.manager().stop(task.project_id, task.id).await?;
    assert_eq!(first.outcome, StopOutcome::KillRequested);
    assert_eq!(second.outcome, StopOutcome::AlreadyStopping);
    assert_eq!(third.outcome, StopOutcome::AlreadyStopping);
    assert_eq!(h.launcher.kills().len(), 1);

    h.launcher.complete(task.id, ProcessExit::failure(None, "killed"));
    with_timeout(h.wait_retired(task.id)).await;

    let after = h.manager().stop(task.project_id, task.id).await?;
    assert_eq!(after.outcome, StopOutcome::AlreadyFinished);

    assert_eq!(h.event_descriptions(&task).len(), 2);
    assert_eq!(h.stored_status(&task), TaskStatus::Stopped);

    Ok(())
}

#[tokio::test]
async fn kill_failure_is_reported_and_task_stays_stopping() -> TestResult {
    let h = Harness::start(1);
    h.launcher.fail_kill(true);

    let task = h.admit().await;
    with_timeout(h.wait_active_status(task.id, TaskStatus::Running)).await;

    match h.manager().stop(task.project_id, task.id).await {
        Err(e @ TaskPoolError::ProcessControl { .. }) => assert_eq!(e.status_code(), 500),
        other => panic!("expected ProcessControl, got {other:?}"),
    }

    let snapshot = h.manager().query_active(task.id).ok_or("task not active")?;
    assert_eq!(snapshot.status, TaskStatus::Stopping);

    // The process eventually exits on its own.
    h.launcher.complete(task.id, ProcessExit::success());
    with_timeout(h.wait_retired(task.id)).await;
    assert_eq!(h.stored_status(&task), TaskStatus::Stopped);

    Ok(())
}

#[tokio::test]
async fn start_failure_finishes_as_error() -> TestResult {
    let h = Harness::start(1);
    // Fresh store: the first admitted task gets id 1.
    h.launcher.fail_start_of(1);

    let task = h.admit().await;
    assert_eq!(task.id, 1);
    with_timeout(h.wait_retired(task.id)).await;

    assert_eq!(h.stored_status(&task), TaskStatus::Error);
    assert_eq!(
        h.store.status_history(task.id),
        vec![TaskStatus::Waiting, TaskStatus::Running, TaskStatus::Error]
    );
    assert_eq!(
        h.event_descriptions(&task).last().map(String::as_str),
        Some(format!("Task ID {} finished - ERROR", task.id).as_str())
    );

    Ok(())
}

#[tokio::test]
async fn stop_is_scoped_to_the_project() -> TestResult {
    let h = Harness::start(1);

    let task = h.admit().await;
    with_timeout(h.launcher.wait_started(task.id)).await;

    assert!(matches!(
        h.manager().stop(task.project_id + 1, task.id).await,
        Err(TaskPoolError::NotFound(_))
    ));
    assert!(matches!(
        h.manager().stop(task.project_id, 999).await,
        Err(TaskPoolError::NotFound(999))
    ));
    assert!(h.launcher.kills().is_empty());

    h.launcher.complete(task.id, ProcessExit::success());
    Ok(())
}

#[tokio::test]
async fn admit_rejects_malformed_records() -> TestResult {
    let h = Harness::start(1);

    let bad_project = h.manager().admit(NewTaskBuilder::new().project(0).build()).await;
    match bad_project {
        Err(e @ TaskPoolError::Validation(_)) => assert_eq!(e.status_code(), 400),
        other => panic!("expected Validation, got {other:?}"),
    }

    let bad_params = h
        .manager()
        .admit(NewTaskBuilder::new().params(json!(["not", "an", "object"])).build())
        .await;
    assert!(matches!(bad_params, Err(TaskPoolError::Validation(_))));

    assert_eq!(h.store.inner().task_count(), 0);
    assert_eq!(h.manager().active_count(), 0);
    Ok(())
}

#[tokio::test]
async fn read_throughs_proxy_to_the_store() -> TestResult {
    let launcher = FakeLauncher::new().auto_exit(ProcessExit::success());
    let h = Harness::build(test_pool_options(2), launcher, None);
    let m = h.manager();

    let a = m.admit(NewTaskBuilder::new().template(7).build()).await?.task;
    let b = m.admit(NewTaskBuilder::new().build()).await?.task;
    let c = m.admit(NewTaskBuilder::new().template(7).build()).await?.task;
    let other = m.admit(NewTaskBuilder::new().project(2).build()).await?.task;
    with_timeout(h.pool.wait_idle()).await;

    let ids: Vec<_> = m.all_tasks(1)?.into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![c.id, b.id, a.id], "newest first");

    assert_eq!(m.project_tasks(1, 2)?.len(), 2);
    assert_eq!(m.last_tasks(1)?.len(), 3);

    let template_ids: Vec<_> = m.template_tasks(1, 7, 0)?.into_iter().map(|t| t.id).collect();
    assert_eq!(template_ids, vec![c.id, a.id]);

    assert_eq!(m.all_tasks(2)?.len(), 1);
    assert!(m.task_outputs(1, a.id)?.is_empty());
    assert!(matches!(m.task_outputs(1, other.id), Err(TaskPoolError::NotFound(_))));
    assert!(matches!(m.task_events(1, other.id), Err(TaskPoolError::NotFound(_))));

    Ok(())
}
