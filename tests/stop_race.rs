// tests/stop_race.rs
//
// Stop racing the supervisor's promote-to-running step.

mod common;
use crate::common::{Harness, PromoteGate, test_pool_options, with_timeout};

use std::error::Error;
use std::time::Duration;

use taskpool::engine::StopOutcome;
use taskpool::types::TaskStatus;
use taskpool_test_utils::fake_process::FakeLauncher;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_and_promote_resolve_to_one_consistent_outcome() -> TestResult {
    for round in 0..50u64 {
        let gate = PromoteGate::new();
        let launcher = FakeLauncher::new().exit_on_kill(true);
        let h = Harness::build(test_pool_options(1), launcher, Some(gate.hook()));

        let task = h.admit().await;
        with_timeout(gate.wait_arrived(task.id)).await;

        let manager = std::sync::Arc::clone(h.pool.manager());
        let (project_id, task_id) = (task.project_id, task.id);
        let stop = tokio::spawn(async move {
            // Stagger a little so both orders get exercised.
            tokio::time::sleep(Duration::from_micros(round * 20)).await;
            manager.stop(project_id, task_id).await
        });
        gate.release(1);

        let report = stop.await??;
        with_timeout(h.wait_retired(task.id)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let history = h.store.status_history(task.id);
        match report.outcome {
            StopOutcome::StoppedBeforeStart => {
                assert!(!h.launcher.was_started(task.id), "round {round}: process started");
                assert_eq!(history, vec![TaskStatus::Waiting, TaskStatus::Stopped]);
            }
            StopOutcome::KillRequested => {
                assert!(h.launcher.was_started(task.id));
                assert_eq!(h.launcher.kills(), vec![task.id]);
                assert_eq!(
                    history,
                    vec![
                        TaskStatus::Waiting,
                        TaskStatus::Running,
                        TaskStatus::Stopping,
                        TaskStatus::Stopped,
                    ]
                );
            }
            other => panic!("round {round}: unexpected outcome {other:?}"),
        }

        assert_eq!(h.stored_status(&task), TaskStatus::Stopped);
        assert_eq!(h.event_descriptions(&task).len(), 2);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_during_injected_promote_delay_always_wins() -> TestResult {
    let gate = PromoteGate::new();
    let h = Harness::build(test_pool_options(4), FakeLauncher::new(), Some(gate.hook()));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        tasks.push(h.admit().await);
    }

    for task in &tasks[..4] {
        with_timeout(gate.wait_arrived(task.id)).await;
    }
    for task in &tasks {
        let report = h.manager().stop(task.project_id, task.id).await?;
        assert_eq!(report.outcome, StopOutcome::StoppedBeforeStart);
    }
    gate.release(tasks.len());

    with_timeout(h.pool.wait_idle()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.launcher.started().is_empty());
    for task in &tasks {
        assert_eq!(h.stored_status(task), TaskStatus::Stopped);
    }

    Ok(())
}
