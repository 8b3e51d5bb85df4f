// src/engine/pool.rs

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::core::PoolCore;
use crate::engine::lifecycle::{LifecycleManager, StopReport};
use crate::engine::queue::AdmissionQueue;
use crate::engine::supervisor::{PromoteHook, Supervisor};
use crate::engine::PoolOptions;
use crate::errors::Result;
use crate::exec::ProcessLauncher;
use crate::store::TaskStore;
use crate::types::TaskId;

/// A running task pool: lifecycle API plus its supervisor workers.
///
/// Must be started from inside a Tokio runtime.
pub struct TaskPool {
    manager: Arc<LifecycleManager>,
    supervisor: Supervisor,
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("manager", &self.manager)
            .field("workers", &self.supervisor.worker_count())
            .finish()
    }
}

/// Builder for [`TaskPool`].
pub struct TaskPoolBuilder {
    store: Arc<dyn TaskStore>,
    launcher: Arc<dyn ProcessLauncher>,
    options: PoolOptions,
    promote_hook: Option<PromoteHook>,
}

impl TaskPoolBuilder {
    pub fn options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    /// Run `hook` between a worker picking a task up and promoting it.
    pub fn promote_hook(mut self, hook: PromoteHook) -> Self {
        self.promote_hook = Some(hook);
        self
    }

    pub fn start(self) -> TaskPool {
        let core = Arc::new(PoolCore::new(self.store, self.options));
        let (queue, receiver) =
            AdmissionQueue::new(self.options.queue_capacity, self.options.when_full);

        let supervisor = Supervisor::spawn(
            Arc::clone(&core),
            receiver,
            self.launcher,
            self.promote_hook,
        );
        let manager = Arc::new(LifecycleManager::new(core, queue));

        info!(
            workers = self.options.workers,
            queue_capacity = self.options.queue_capacity,
            when_full = ?self.options.when_full,
            "task pool started"
        );

        TaskPool {
            manager,
            supervisor,
        }
    }
}

impl TaskPool {
    pub fn builder(
        store: Arc<dyn TaskStore>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> TaskPoolBuilder {
        TaskPoolBuilder {
            store,
            launcher,
            options: PoolOptions::default(),
            promote_hook: None,
        }
    }

    pub fn start(
        options: PoolOptions,
        store: Arc<dyn TaskStore>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self::builder(store, launcher).options(options).start()
    }

    /// The lifecycle API. Cheap to clone and share with request handlers.
    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    /// Resolve once no task is queued, running or stopping.
    pub async fn wait_idle(&self) {
        self.manager.wait_idle().await;
    }

    /// Send a stop request to every active task.
    pub async fn stop_all(&self) -> Vec<(TaskId, Result<StopReport>)> {
        let mut reports = Vec::new();

        for task_id in self.manager.active_ids() {
            let Some(active) = self.manager.query_active(task_id) else {
                continue;
            };
            let result = self.manager.stop(active.task.project_id, task_id).await;
            if let Err(e) = &result {
                warn!(task_id, error = %e, "stop request failed");
            }
            reports.push((task_id, result));
        }

        reports
    }

    /// Close admissions and wait for the workers to drain the queue.
    ///
    /// Tasks still queued at this point run to completion; call
    /// [`stop_all`](Self::stop_all) first to cancel them instead.
    pub async fn shutdown(self) {
        info!("task pool shutting down");
        self.manager.close();
        self.supervisor.join().await;
    }
}
