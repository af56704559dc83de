//! Scheduling tests for fos-tasks
//!
//! Graph replacement, dependency ordering and runner behaviour across threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fos_tasks::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn recording_task(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Task> {
    let log = Arc::clone(log);
    ClosureTask::new(name, move || log.lock().unwrap().push(name))
}

// ============================================================================
// DEPENDENCIES
// ============================================================================

#[test]
fn test_diamond_dependencies_on_pool() {
    init_tracing();
    let pool = WorkerPool::new(&SchedulerConfig::default().with_worker_count(4)).unwrap();
    let token = pool.generate_namespace_token();
    let log = Arc::new(Mutex::new(Vec::new()));

    let root = recording_task("root", &log);
    let left = recording_task("left", &log);
    let right = recording_task("right", &log);
    let sink = recording_task("sink", &log);

    let mut graph = TaskGraph::new();
    graph.insert_node(Arc::clone(&sink), TaskCategory::Foreground, 0, 2);
    graph.insert_node(Arc::clone(&left), TaskCategory::Foreground, 1, 1);
    graph.insert_node(Arc::clone(&right), TaskCategory::Foreground, 1, 1);
    graph.insert_node(Arc::clone(&root), TaskCategory::Foreground, 2, 0);
    graph.add_edge(TaskKey::of(&root), TaskKey::of(&left));
    graph.add_edge(TaskKey::of(&root), TaskKey::of(&right));
    graph.add_edge(TaskKey::of(&left), TaskKey::of(&sink));
    graph.add_edge(TaskKey::of(&right), TaskKey::of(&sink));

    pool.schedule_tasks(token, graph).unwrap();
    pool.wait_for_tasks_to_finish_running(token);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "root");
    assert_eq!(log[3], "sink");
}

#[test]
fn test_many_independent_tasks_all_run_once() {
    let pool = WorkerPool::new(&SchedulerConfig::default().with_worker_count(3)).unwrap();
    let token = pool.generate_namespace_token();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut graph = TaskGraph::new();
    for i in 0..200 {
        let runs = Arc::clone(&runs);
        let task: Arc<dyn Task> = ClosureTask::new("count", move || {
            runs.fetch_add(1, Ordering::SeqCst);
        });
        graph.insert_node(task, TaskCategory::Background, i % 7, 0);
    }
    pool.schedule_tasks(token, graph).unwrap();
    pool.wait_for_tasks_to_finish_running(token);

    assert_eq!(runs.load(Ordering::SeqCst), 200);
    let completed = pool.collect_completed_tasks(token);
    assert_eq!(completed.len(), 200);
    assert!(completed.iter().all(|task| task.state().is_finished()));
}

// ============================================================================
// GRAPH REPLACEMENT
// ============================================================================

#[test]
fn test_superseded_graph_is_canceled() {
    let runner = SynchronousTaskGraphRunner::new();
    let token = runner.generate_namespace_token();
    let log = Arc::new(Mutex::new(Vec::new()));

    let stale = recording_task("stale", &log);
    let fresh = recording_task("fresh", &log);

    let mut graph = TaskGraph::new();
    graph.insert_node(Arc::clone(&stale), TaskCategory::Foreground, 0, 0);
    runner.schedule_tasks(token, graph).unwrap();

    let mut graph = TaskGraph::new();
    graph.insert_node(Arc::clone(&fresh), TaskCategory::Foreground, 0, 0);
    runner.schedule_tasks(token, graph).unwrap();
    runner.wait_for_tasks_to_finish_running(token);

    assert_eq!(*log.lock().unwrap(), vec!["fresh"]);
    assert!(stale.state().is_canceled());

    let completed = runner.collect_completed_tasks(token);
    assert_eq!(completed.len(), 2);
}

#[test]
fn test_empty_graph_cancels_everything() {
    let runner = SynchronousTaskGraphRunner::new();
    let token = runner.generate_namespace_token();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut graph = TaskGraph::new();
    let tasks: Vec<_> = ["a", "b", "c"].iter().map(|name| recording_task(*name, &log)).collect();
    for task in &tasks {
        graph.insert_node(Arc::clone(task), TaskCategory::Background, 0, 0);
    }
    runner.schedule_tasks(token, graph).unwrap();
    runner.schedule_tasks(token, TaskGraph::new()).unwrap();
    runner.wait_for_tasks_to_finish_running(token);

    assert!(log.lock().unwrap().is_empty());
    assert!(tasks.iter().all(|task| task.state().is_canceled()));
    assert_eq!(runner.collect_completed_tasks(token).len(), 3);
}

// ============================================================================
// RUNNER SELECTION
// ============================================================================

#[test]
fn test_create_runner_synchronous_fallback() {
    let runner = create_runner(&SchedulerConfig::synchronous()).unwrap();
    let token = runner.generate_namespace_token();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut graph = TaskGraph::new();
    graph.insert_node(recording_task("inline", &log), TaskCategory::Foreground, 0, 0);
    runner.schedule_tasks(token, graph).unwrap();
    runner.wait_for_tasks_to_finish_running(token);

    assert_eq!(*log.lock().unwrap(), vec!["inline"]);
}

#[test]
fn test_create_runner_threaded() {
    let runner = create_runner(&SchedulerConfig::default().with_worker_count(2)).unwrap();
    let token = runner.generate_namespace_token();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut graph = TaskGraph::new();
    graph.insert_node(recording_task("threaded", &log), TaskCategory::Foreground, 0, 0);
    runner.schedule_tasks(token, graph).unwrap();
    runner.wait_for_tasks_to_finish_running(token);
    runner.shutdown();

    assert_eq!(*log.lock().unwrap(), vec!["threaded"]);
}

// ============================================================================
// ORIGIN RUNNER
// ============================================================================

#[test]
fn test_worker_posts_back_to_origin() {
    let pool = WorkerPool::new(&SchedulerConfig::default().with_worker_count(2)).unwrap();
    let token = pool.generate_namespace_token();
    let origin = OriginTaskRunner::new();
    let notified = Arc::new(AtomicUsize::new(0));

    let remote = origin.clone();
    let counter = Arc::clone(&notified);
    let task: Arc<dyn Task> = ClosureTask::new("notify", move || {
        let counter = Arc::clone(&counter);
        remote.post(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });

    let mut graph = TaskGraph::new();
    graph.insert_node(task, TaskCategory::Foreground, 0, 0);
    pool.schedule_tasks(token, graph).unwrap();
    pool.wait_for_tasks_to_finish_running(token);

    // Nothing runs until the origin drains its queue.
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(origin.run_pending_tasks(), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}
