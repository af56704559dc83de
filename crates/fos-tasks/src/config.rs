//! Scheduler Configuration

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads. Zero selects the synchronous fallback that
    /// runs tasks on the calling thread.
    pub worker_count: usize,

    /// Prefix for worker thread names, suffixed with the worker index
    pub thread_name_prefix: String,
}

impl SchedulerConfig {
    /// Configuration for the single-threaded fallback
    pub fn synchronous() -> Self {
        Self { worker_count: 0, ..Self::default() }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self {
            worker_count,
            thread_name_prefix: "fos-raster-worker".to_string(),
        }
    }
}
