// tests/concurrency_fuzz.rs
//
// Concurrent admit/stop/remove/exit fuzzing against the lifecycle API.

mod common;
use crate::common::{Harness, test_pool_options};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use taskpool::exec::ProcessExit;
use taskpool::store::TaskStore;
use taskpool::types::{TaskId, TaskStatus};
use taskpool_test_utils::builders::{NewTaskBuilder, admin};
use taskpool_test_utils::fake_process::FakeLauncher;

#[derive(Debug, Clone)]
enum Op {
    Admit,
    Stop(usize),
    Remove(usize),
    Exit { index: usize, success: bool },
    Yield,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Admit),
        2 => (0..16usize).prop_map(Op::Stop),
        1 => (0..16usize).prop_map(Op::Remove),
        2 => (0..16usize, any::<bool>()).prop_map(|(index, success)| Op::Exit { index, success }),
        1 => Just(Op::Yield),
    ]
}

/// Consecutive durable writes must follow the status state machine.
fn assert_valid_path(task_id: TaskId, history: &[TaskStatus]) {
    assert_eq!(
        history.first(),
        Some(&TaskStatus::Waiting),
        "task {task_id} history {history:?}"
    );
    for pair in history.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "task {task_id}: illegal {} -> {} in {history:?}",
            pair[0],
            pair[1]
        );
    }
    assert!(
        history.last().is_some_and(|s| s.is_terminal()),
        "task {task_id} never settled: {history:?}"
    );
}

async fn run_ops(h: Arc<Harness>, ops: Vec<Op>, admitted: Arc<std::sync::Mutex<Vec<TaskId>>>) {
    for op in ops {
        let pick = |i: usize| {
            let ids = admitted.lock().unwrap();
            (!ids.is_empty()).then(|| ids[i % ids.len()])
        };
        match op {
            Op::Admit => {
                if let Ok(admission) = h.manager().admit(NewTaskBuilder::new().build()).await {
                    admitted.lock().unwrap().push(admission.task.id);
                }
            }
            Op::Stop(i) => {
                if let Some(id) = pick(i) {
                    let _ = h.manager().stop(1, id).await;
                }
            }
            Op::Remove(i) => {
                if let Some(id) = pick(i) {
                    let _ = h.manager().remove(1, id, &admin());
                }
            }
            Op::Exit { index, success } => {
                if let Some(id) = pick(index) {
                    let exit = if success {
                        ProcessExit::success()
                    } else {
                        ProcessExit::failure(Some(1), "boom")
                    };
                    h.launcher.complete(id, exit);
                }
            }
            Op::Yield => tokio::time::sleep(Duration::from_micros(200)).await,
        }

        let ids = h.manager().active_ids();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate active entries: {ids:?}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn concurrent_callers_keep_lifecycle_consistent(
        streams in proptest::collection::vec(
            proptest::collection::vec(op_strategy(), 1..24),
            2..5,
        ),
        workers in 1..4usize,
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let launcher = FakeLauncher::new().exit_on_kill(true);
            let h = Arc::new(Harness::build(test_pool_options(workers), launcher, None));
            // A few intermediate writes fail; they must be replayed in order.
            h.store.fail_writes_of(TaskStatus::Running, 2);
            h.store.fail_writes_of(TaskStatus::Stopping, 2);
            let admitted = Arc::new(std::sync::Mutex::new(Vec::new()));

            let callers: Vec<_> = streams
                .into_iter()
                .map(|ops| tokio::spawn(run_ops(Arc::clone(&h), ops, Arc::clone(&admitted))))
                .collect();
            for caller in callers {
                caller.await.unwrap();
            }

            // Drain: every remaining active task is stopped or killed.
            tokio::time::timeout(Duration::from_secs(5), async {
                while h.manager().active_count() > 0 {
                    h.pool.stop_all().await;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                h.pool.wait_idle().await;
            })
            .await
            .expect("pool never went idle");
            assert_eq!(h.manager().reconcile(), 0, "parked writes left behind");

            let ids = admitted.lock().unwrap().clone();
            for id in ids {
                let history = h.store.status_history(id);
                assert_valid_path(id, &history);

                let events = h.store.task_events(id).unwrap().len();
                if h.store.get_task(1, id).is_ok() {
                    assert_eq!(events, 2, "task {id}: one queued and one completion event");
                } else {
                    assert_eq!(events, 0, "removed task {id} kept its events");
                }
            }
        });
    }
}
