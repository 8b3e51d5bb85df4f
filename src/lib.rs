// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fixtures;
pub mod logging;
pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::TaskPool;
use crate::exec::ShellLauncher;
use crate::store::{MemoryStore, TaskStore};
use crate::types::TaskId;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - an in-memory store and the shell launcher
/// - the task pool, seeded with every configured task
/// - Ctrl-C handling (stops every active task)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
    let launcher = Arc::new(ShellLauncher::new(Arc::clone(&store)));
    let pool = TaskPool::start(cfg.pool.into(), Arc::clone(&store), launcher);

    let mut admitted: Vec<(String, TaskId)> = Vec::with_capacity(cfg.task.len());
    for (name, task) in cfg.task.iter() {
        let admission = pool.manager().admit(task.to_new_task()).await?;
        if let Some(e) = admission.event_error {
            warn!(task = %name, error = %e, "task admitted without its queued event");
        }
        admitted.push((name.clone(), admission.task.id));
    }

    tokio::select! {
        _ = pool.wait_idle() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupt received; stopping active tasks");
            pool.stop_all().await;
            pool.wait_idle().await;
        }
    }

    let manager = Arc::clone(pool.manager());
    pool.shutdown().await;

    println!("tasks ({}):", admitted.len());
    for (name, task_id) in admitted {
        let project_id = cfg.task[&name].project;
        match manager.get_task(project_id, task_id) {
            Ok(task) => println!("  - {name} (#{task_id}): {}", task.status),
            Err(e) => println!("  - {name} (#{task_id}): unknown ({e})"),
        }
    }

    Ok(())
}

/// Print the parsed pool settings and tasks without running anything.
fn print_dry_run(cfg: &ConfigFile) {
    println!("taskpool dry-run");
    println!("  pool.workers = {}", cfg.pool.workers);
    println!("  pool.queue_capacity = {}", cfg.pool.queue_capacity);
    println!("  pool.when_full = {:?}", cfg.pool.when_full);
    println!(
        "  pool.status_write_retries = {}",
        cfg.pool.status_write_retries
    );
    println!("  pool.retry_backoff_ms = {}", cfg.pool.retry_backoff_ms);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      project: {}", task.project);
        if let Some(template) = task.template {
            println!("      template: {template}");
        }
        if let Some(user) = task.user {
            println!("      user: {user}");
        }
        println!("      cmd: {}", task.cmd);
    }
}
