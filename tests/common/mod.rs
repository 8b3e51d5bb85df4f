#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use taskpool::engine::{LifecycleManager, PoolOptions, PromoteHook, TaskPool};
use taskpool::store::TaskStore;
use taskpool::types::{Task, TaskId, TaskStatus};
use taskpool_test_utils::builders::NewTaskBuilder;
use taskpool_test_utils::fake_process::FakeLauncher;
use taskpool_test_utils::flaky_store::FlakyStore;

pub use taskpool_test_utils::{init_tracing, test_pool_options, with_timeout};

/// Holds workers between pickup and promotion until the test releases them.
#[derive(Clone)]
pub struct PromoteGate {
    permits: Arc<Semaphore>,
    arrived: Arc<Mutex<Vec<TaskId>>>,
}

impl PromoteGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            arrived: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn hook(&self) -> PromoteHook {
        let gate = self.clone();
        Arc::new(move |task_id| {
            let gate = gate.clone();
            Box::pin(async move {
                gate.arrived.lock().unwrap().push(task_id);
                if let Ok(permit) = gate.permits.acquire().await {
                    permit.forget();
                }
            })
        })
    }

    /// Let `n` more workers through.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub async fn wait_arrived(&self, task_id: TaskId) {
        while !self.arrived.lock().unwrap().contains(&task_id) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

/// A pool over a `FlakyStore` and a `FakeLauncher`.
pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub launcher: FakeLauncher,
    pub pool: TaskPool,
}

impl Harness {
    pub fn start(workers: usize) -> Self {
        Self::build(test_pool_options(workers), FakeLauncher::new(), None)
    }

    pub fn build(
        options: PoolOptions,
        launcher: FakeLauncher,
        promote_hook: Option<PromoteHook>,
    ) -> Self {
        init_tracing();

        let store = Arc::new(FlakyStore::new());
        let dyn_store: Arc<dyn TaskStore> = store.clone();

        let mut builder =
            TaskPool::builder(dyn_store, Arc::new(launcher.clone())).options(options);
        if let Some(hook) = promote_hook {
            builder = builder.promote_hook(hook);
        }

        Self {
            store,
            launcher,
            pool: builder.start(),
        }
    }

    pub fn manager(&self) -> &LifecycleManager {
        self.pool.manager()
    }

    /// Admit a default task in project 1.
    pub async fn admit(&self) -> Task {
        self.manager()
            .admit(NewTaskBuilder::new().build())
            .await
            .expect("admit failed")
            .task
    }

    pub fn stored_status(&self, task: &Task) -> TaskStatus {
        self.store
            .get_task(task.project_id, task.id)
            .expect("task missing from store")
            .status
    }

    /// Poll until the task is no longer active.
    pub async fn wait_retired(&self, task_id: TaskId) {
        while self.manager().query_active(task_id).is_some() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Poll until the active entry reports `status`.
    pub async fn wait_active_status(&self, task_id: TaskId, status: TaskStatus) {
        loop {
            match self.manager().query_active(task_id) {
                Some(snapshot) if snapshot.status == status => return,
                _ => tokio::time::sleep(Duration::from_millis(2)).await,
            }
        }
    }

    pub fn event_descriptions(&self, task: &Task) -> Vec<String> {
        self.manager()
            .task_events(task.project_id, task.id)
            .expect("events unavailable")
            .into_iter()
            .map(|e| e.description)
            .collect()
    }
}
