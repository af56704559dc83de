//! Scheduler errors

/// Task scheduling error
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("task runner has been shut down")]
    ShutDown,

    #[error("namespace token was not issued by this runner")]
    UnknownNamespace,
}
