//! Worker Pool
//!
//! Fixed set of named threads pulling ready tasks out of a shared
//! [`TaskGraphWorkQueue`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::SchedulerConfig;
use crate::error::TaskError;
use crate::graph::TaskGraph;
use crate::runner::{TaskGraphRunner, lock};
use crate::task::Task;
use crate::work_queue::{NamespaceToken, TaskGraphWorkQueue};

struct PoolState {
    work_queue: TaskGraphWorkQueue,
    shutdown: bool,
}

/// State shared by the origin thread and every worker
struct Shared {
    state: Mutex<PoolState>,
    /// Signalled when tasks become ready or on shutdown
    has_ready_to_run_tasks: Condvar,
    /// Signalled whenever a task completes
    has_finished_running_tasks: Condvar,
    /// Tasks executed since startup
    tasks_run: AtomicUsize,
}

impl Shared {
    fn run_worker(&self, id: usize) {
        let mut state = lock(&self.state);
        loop {
            let Some(next) = state.work_queue.get_next_task_to_run() else {
                if state.shutdown {
                    break;
                }
                state = self
                    .has_ready_to_run_tasks
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                continue;
            };

            // Another worker may pick up the next ready task meanwhile.
            if state.work_queue.has_ready_to_run_tasks() {
                self.has_ready_to_run_tasks.notify_one();
            }
            drop(state);

            tracing::trace!(worker = id, task = next.task.name(), priority = next.priority, "running task");
            next.task.run_on_worker_thread();
            self.tasks_run.fetch_add(1, Ordering::Relaxed);

            state = lock(&self.state);
            state.work_queue.complete_task(next.token, &next.task);
            if state.work_queue.has_ready_to_run_tasks() {
                self.has_ready_to_run_tasks.notify_all();
            }
            self.has_finished_running_tasks.notify_all();
        }
        tracing::debug!(worker = id, "worker exiting");
    }
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

/// Thread pool executing task graphs
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<Worker>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `config.worker_count` threads (at least one).
    pub fn new(config: &SchedulerConfig) -> Result<Self, TaskError> {
        let worker_count = config.worker_count.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                work_queue: TaskGraphWorkQueue::new(),
                shutdown: false,
            }),
            has_ready_to_run_tasks: Condvar::new(),
            has_finished_running_tasks: Condvar::new(),
            tasks_run: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, id))
                .spawn(move || worker_shared.run_worker(id));

            match spawned {
                Ok(thread) => workers.push(Worker { id, thread: Some(thread) }),
                Err(err) => {
                    // Tear down the workers that did start.
                    lock(&shared.state).shutdown = true;
                    shared.has_ready_to_run_tasks.notify_all();
                    for worker in &mut workers {
                        if let Some(thread) = worker.thread.take() {
                            let _ = thread.join();
                        }
                    }
                    return Err(TaskError::WorkerSpawn(err));
                }
            }
        }

        tracing::debug!(workers = worker_count, "worker pool started");
        Ok(Self { shared, workers: Mutex::new(workers), worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Total tasks run by all workers
    pub fn tasks_run(&self) -> usize {
        self.shared.tasks_run.load(Ordering::Relaxed)
    }

    /// Ready plus running tasks across all namespaces
    pub fn pending_tasks(&self) -> usize {
        let state = lock(&self.shared.state);
        state.work_queue.num_ready_to_run_tasks() + state.work_queue.num_running_tasks()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0
    }
}

impl TaskGraphRunner for WorkerPool {
    fn generate_namespace_token(&self) -> NamespaceToken {
        lock(&self.shared.state).work_queue.generate_namespace_token()
    }

    fn schedule_tasks(&self, token: NamespaceToken, graph: TaskGraph) -> Result<(), TaskError> {
        let mut state = lock(&self.shared.state);
        if state.shutdown {
            return Err(TaskError::ShutDown);
        }
        if !state.work_queue.is_issued(token) {
            return Err(TaskError::UnknownNamespace);
        }
        state.work_queue.schedule_tasks(token, graph);
        if state.work_queue.has_ready_to_run_tasks() {
            self.shared.has_ready_to_run_tasks.notify_all();
        }
        // Canceled tasks may have made the namespace finished.
        self.shared.has_finished_running_tasks.notify_all();
        Ok(())
    }

    fn wait_for_tasks_to_finish_running(&self, token: NamespaceToken) {
        let mut state = lock(&self.shared.state);
        while !state.work_queue.has_finished_running_tasks_in_namespace(token) {
            state = self
                .shared
                .has_finished_running_tasks
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn collect_completed_tasks(&self, token: NamespaceToken) -> Vec<Arc<dyn Task>> {
        lock(&self.shared.state).work_queue.collect_completed_tasks(token)
    }

    fn shutdown(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.has_ready_to_run_tasks.notify_all();

        let mut workers = lock(&self.workers);
        for worker in workers.iter_mut() {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
        tracing::debug!(tasks_run = self.tasks_run(), "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &*lock(&self.workers))
            .field("worker_count", &self.worker_count)
            .field("tasks_run", &self.tasks_run())
            .finish()
    }
}
