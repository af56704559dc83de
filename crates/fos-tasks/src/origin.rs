//! Origin Task Runner
//!
//! Sequenced queue of closures drained by the origin thread. Workers post
//! completion callbacks here so that origin-only state is touched on one
//! thread.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::runner::lock;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle to the origin thread's queue
#[derive(Clone, Default)]
pub struct OriginTaskRunner {
    queue: Arc<Mutex<VecDeque<Callback>>>,
}

impl OriginTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `callback`; safe from any thread.
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.queue).push_back(Box::new(callback));
    }

    /// Run queued callbacks in posting order until the queue is empty.
    /// Callbacks posted while draining also run. Returns how many ran.
    pub fn run_pending_tasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = lock(&self.queue).pop_front();
            let Some(callback) = next else {
                break;
            };
            callback();
            ran += 1;
        }
        ran
    }

    pub fn has_pending_tasks(&self) -> bool {
        !lock(&self.queue).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for OriginTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginTaskRunner")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_in_order() {
        let runner = OriginTaskRunner::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            runner.post(move || log.lock().unwrap().push(i));
        }
        assert_eq!(runner.len(), 3);
        assert_eq!(runner.run_pending_tasks(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(runner.is_empty());
    }

    #[test]
    fn test_post_from_other_thread() {
        let runner = OriginTaskRunner::new();
        let remote = runner.clone();
        std::thread::spawn(move || remote.post(|| {})).join().unwrap();
        assert!(runner.has_pending_tasks());
        assert_eq!(runner.run_pending_tasks(), 1);
    }

    #[test]
    fn test_reentrant_post() {
        let runner = OriginTaskRunner::new();
        let inner = runner.clone();
        runner.post(move || inner.post(|| {}));
        assert_eq!(runner.run_pending_tasks(), 2);
    }
}
