//! fOS Tasks
//!
//! Dependency-aware task graph scheduling.
//!
//! Graphs of [`Task`]s are built on an origin thread and handed wholesale to a
//! [`TaskGraphRunner`]. Workers pick ready tasks in (category, priority,
//! insertion) order; a task never runs before its dependencies finished.
//! Scheduling a new graph cancels tasks of the previous one that have not
//! started.
//!
//! # Example
//! ```rust,ignore
//! use fos_tasks::{create_runner, SchedulerConfig, TaskGraph, TaskCategory};
//!
//! let runner = create_runner(&SchedulerConfig::default())?;
//! let token = runner.generate_namespace_token();
//! let mut graph = TaskGraph::new();
//! graph.insert_node(task, TaskCategory::Foreground, 0, 0);
//! runner.schedule_tasks(token, graph)?;
//! runner.wait_for_tasks_to_finish_running(token);
//! ```

mod config;
mod error;
mod graph;
mod origin;
mod pool;
mod runner;
mod task;
mod work_queue;

use std::sync::Arc;

pub use config::SchedulerConfig;
pub use error::TaskError;
pub use graph::{Edge, Node, TaskCategory, TaskGraph};
pub use origin::OriginTaskRunner;
pub use pool::WorkerPool;
pub use runner::{SynchronousTaskGraphRunner, TaskGraphRunner};
pub use task::{ClosureTask, Task, TaskKey, TaskState, TaskStatus};
pub use work_queue::{NamespaceToken, PrioritizedTask, TaskGraphWorkQueue};

/// Pick a runner for `config`: a [`WorkerPool`], or the
/// [`SynchronousTaskGraphRunner`] when `worker_count` is zero.
pub fn create_runner(config: &SchedulerConfig) -> Result<Arc<dyn TaskGraphRunner>, TaskError> {
    if config.worker_count == 0 {
        tracing::debug!("no worker threads configured, running tasks synchronously");
        return Ok(Arc::new(SynchronousTaskGraphRunner::new()));
    }
    Ok(Arc::new(WorkerPool::new(config)?))
}
