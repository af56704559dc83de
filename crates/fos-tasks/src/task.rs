//! Tasks
//!
//! A unit of work that can be placed in a [`TaskGraph`](crate::TaskGraph)
//! and executed by a [`TaskGraphRunner`](crate::TaskGraphRunner).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Work executed on a worker thread.
///
/// Tasks are shared through `Arc` between the origin thread (which builds
/// graphs) and the workers (which run them). Identity is the allocation, see
/// [`TaskKey`].
pub trait Task: Send + Sync + 'static {
    /// Perform the work. Called at most once, on a worker thread.
    fn run_on_worker_thread(&self);

    /// Execution state shared with the runner.
    fn state(&self) -> &TaskState;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        "task"
    }
}

/// Identity of a task: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey(usize);

impl TaskKey {
    /// Key for a shared task
    pub fn of<T: Task + ?Sized>(task: &Arc<T>) -> Self {
        Self(Arc::as_ptr(task) as *const () as usize)
    }
}

/// Lifecycle of a task as seen by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    /// Created, never handed to a runner
    New = 0,
    /// Part of a scheduled graph
    Scheduled = 1,
    /// Picked up by a worker
    Running = 2,
    /// Ran to completion
    Finished = 3,
    /// Dropped from a graph before it started
    Canceled = 4,
}

impl TaskStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Scheduled,
            2 => Self::Running,
            3 => Self::Finished,
            4 => Self::Canceled,
            _ => Self::New,
        }
    }
}

/// Atomic task status.
pub struct TaskState {
    status: AtomicU8,
}

impl TaskState {
    pub const fn new() -> Self {
        Self { status: AtomicU8::new(TaskStatus::New as u8) }
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_new(&self) -> bool {
        self.status() == TaskStatus::New
    }

    pub fn is_scheduled(&self) -> bool {
        self.status() == TaskStatus::Scheduled
    }

    pub fn is_running(&self) -> bool {
        self.status() == TaskStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.status() == TaskStatus::Finished
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == TaskStatus::Canceled
    }

    /// Finished or canceled; the task will never run (again).
    pub fn is_done(&self) -> bool {
        matches!(self.status(), TaskStatus::Finished | TaskStatus::Canceled)
    }

    pub(crate) fn did_schedule(&self) {
        // Only new (or previously canceled and rescheduled) tasks move to scheduled.
        let _ = self.status.compare_exchange(
            TaskStatus::New as u8,
            TaskStatus::Scheduled as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn did_start(&self) {
        self.status.store(TaskStatus::Running as u8, Ordering::Release);
    }

    pub(crate) fn did_finish(&self) {
        self.status.store(TaskStatus::Finished as u8, Ordering::Release);
    }

    pub(crate) fn did_cancel(&self) {
        self.status.store(TaskStatus::Canceled as u8, Ordering::Release);
    }

    /// Return a canceled task to `New` so it can be put in a later graph.
    pub fn reset(&self) {
        let _ = self.status.compare_exchange(
            TaskStatus::Canceled as u8,
            TaskStatus::New as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskState").field(&self.status()).finish()
    }
}

/// Task backed by a closure.
pub struct ClosureTask {
    name: &'static str,
    state: TaskState,
    work: Box<dyn Fn() + Send + Sync>,
}

impl ClosureTask {
    pub fn new<F>(name: &'static str, work: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self { name, state: TaskState::new(), work: Box::new(work) })
    }
}

impl Task for ClosureTask {
    fn run_on_worker_thread(&self) {
        (self.work)();
    }

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ClosureTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureTask")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
