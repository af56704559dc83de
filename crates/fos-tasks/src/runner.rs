//! Task Graph Runners
//!
//! The [`TaskGraphRunner`] trait is the seam between the origin thread that
//! builds graphs and whatever executes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::TaskError;
use crate::graph::TaskGraph;
use crate::task::Task;
use crate::work_queue::{NamespaceToken, TaskGraphWorkQueue};

/// Executes task graphs.
///
/// All methods are called from the origin thread. Graphs passed to
/// [`schedule_tasks`](Self::schedule_tasks) replace the previous graph of the
/// same namespace wholesale.
pub trait TaskGraphRunner: Send + Sync {
    fn generate_namespace_token(&self) -> NamespaceToken;

    fn schedule_tasks(&self, token: NamespaceToken, graph: TaskGraph) -> Result<(), TaskError>;

    /// Block until no task of the namespace is ready or running.
    fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken);

    /// Finished and canceled tasks since the last call.
    fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<Arc<dyn Task>>;

    /// Stop accepting graphs. Already ready tasks are drained first.
    fn shutdown(&self);
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs tasks inline on the thread that waits for them.
///
/// Used when no worker threads are available.
#[derive(Default)]
pub struct SynchronousTaskGraphRunner {
    work_queue: Mutex<TaskGraphWorkQueue>,
    shut_down: AtomicBool,
}

impl SynchronousTaskGraphRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the highest priority ready task. Returns false when none is ready.
    pub fn run_task(&self) -> bool {
        let next = lock(&self.work_queue).get_next_task_to_run();
        let Some(next) = next else {
            return false;
        };
        tracing::trace!(task = next.task.name(), priority = next.priority, "running task inline");
        next.task.run_on_worker_thread();
        lock(&self.work_queue).complete_task(next.token, &next.task);
        true
    }

    /// Run until no namespace has ready tasks.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_task() {
            ran += 1;
        }
        ran
    }
}

impl TaskGraphRunner for SynchronousTaskGraphRunner {
    fn generate_namespace_token(&self) -> NamespaceToken {
        lock(&self.work_queue).generate_namespace_token()
    }

    fn schedule_tasks(&self, token: NamespaceToken, graph: TaskGraph) -> Result<(), TaskError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TaskError::ShutDown);
        }
        let mut work_queue = lock(&self.work_queue);
        if !work_queue.is_issued(token) {
            return Err(TaskError::UnknownNamespace);
        }
        work_queue.schedule_tasks(token, graph);
        Ok(())
    }

    fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken) {
        while !lock(&self.work_queue).has_finished_running_tasks_in_namespace(token) {
            if !self.run_task() {
                break;
            }
        }
    }

    fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<Arc<dyn Task>> {
        lock(&self.work_queue).collect_completed_tasks(token)
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.run_until_idle();
    }
}

impl std::fmt::Debug for SynchronousTaskGraphRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let work_queue = lock(&self.work_queue);
        f.debug_struct("SynchronousTaskGraphRunner")
            .field("ready", &work_queue.num_ready_to_run_tasks())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}
