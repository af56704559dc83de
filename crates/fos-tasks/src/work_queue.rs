//! Task Graph Work Queue
//!
//! Single-threaded bookkeeping shared by every runner: per-namespace graphs,
//! ready-to-run heaps, running and completed lists. Thread-safe runners wrap
//! it in a mutex.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;

use crate::graph::{TaskCategory, TaskGraph};
use crate::task::{Task, TaskKey};

/// Identifies one client's stream of graphs within a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceToken(u64);

impl NamespaceToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A ready task ordered by (category, priority, insertion).
pub struct PrioritizedTask {
    pub task: Arc<dyn Task>,
    pub token: NamespaceToken,
    pub category: TaskCategory,
    pub priority: u32,
    sequence: u64,
}

impl PrioritizedTask {
    fn sort_key(&self) -> (TaskCategory, u32, u64) {
        (self.category, self.priority, self.sequence)
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::of(&self.task)
    }
}

impl PartialEq for PrioritizedTask {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, smallest key must come out first
        other.sort_key().cmp(&self.sort_key())
    }
}

#[derive(Default)]
struct TaskNamespace {
    graph: TaskGraph,
    ready_to_run: BinaryHeap<PrioritizedTask>,
    running: Vec<Arc<dyn Task>>,
    completed: Vec<Arc<dyn Task>>,
}

impl TaskNamespace {
    fn is_running(&self, key: TaskKey) -> bool {
        self.running.iter().any(|task| TaskKey::of(task) == key)
    }

    fn has_finished_running_tasks(&self) -> bool {
        self.ready_to_run.is_empty() && self.running.is_empty()
    }
}

/// Namespaced graph bookkeeping.
#[derive(Default)]
pub struct TaskGraphWorkQueue {
    namespaces: BTreeMap<NamespaceToken, TaskNamespace>,
    next_token: u64,
    next_sequence: u64,
}

impl TaskGraphWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_namespace_token(&mut self) -> NamespaceToken {
        self.next_token += 1;
        NamespaceToken(self.next_token)
    }

    /// Whether `token` came from [`generate_namespace_token`](Self::generate_namespace_token).
    pub fn is_issued(&self, token: NamespaceToken) -> bool {
        token.0 >= 1 && token.0 <= self.next_token
    }

    /// Replace the namespace's graph with `graph`.
    ///
    /// Tasks of the previous graph that are absent from `graph` and have not
    /// started are canceled and reported through
    /// [`collect_completed_tasks`](Self::collect_completed_tasks). Running
    /// tasks are left alone.
    pub fn schedule_tasks(&mut self, token: NamespaceToken, mut graph: TaskGraph) {
        if !graph.validate() {
            debug_assert!(false, "scheduled task graph is not a valid DAG");
            tracing::warn!(namespace = token.id(), "dropping invalid task graph");
            graph.reset();
        }

        let index: HashMap<TaskKey, usize> =
            graph.nodes.iter().enumerate().map(|(i, node)| (node.key(), i)).collect();

        // Edges from tasks that already finished are satisfied.
        for edge in &graph.edges {
            let finished = index
                .get(&edge.task)
                .map(|&i| graph.nodes[i].task.state().is_finished())
                .unwrap_or(false);
            if finished {
                if let Some(&dependent) = index.get(&edge.dependent) {
                    let node = &mut graph.nodes[dependent];
                    node.dependencies = node.dependencies.saturating_sub(1);
                }
            }
        }

        let namespace = self.namespaces.entry(token).or_default();
        namespace.ready_to_run.clear();

        for node in &graph.nodes {
            let key = node.key();
            let state = node.task.state();

            if state.is_canceled() {
                // Canceled by an earlier graph but wanted again.
                namespace.completed.retain(|task| TaskKey::of(task) != key);
                state.reset();
            }
            state.did_schedule();

            if node.dependencies > 0 || state.is_finished() || namespace.is_running(key) {
                continue;
            }
            self.next_sequence += 1;
            namespace.ready_to_run.push(PrioritizedTask {
                task: Arc::clone(&node.task),
                token,
                category: node.category,
                priority: node.priority,
                sequence: self.next_sequence,
            });
        }

        let old_graph = std::mem::replace(&mut namespace.graph, graph);
        let mut canceled = 0usize;
        for node in old_graph.nodes {
            let key = node.key();
            if index.contains_key(&key) {
                continue;
            }
            let state = node.task.state();
            if state.is_done() || namespace.is_running(key) {
                continue;
            }
            state.did_cancel();
            namespace.completed.push(node.task);
            canceled += 1;
        }

        tracing::debug!(
            namespace = token.id(),
            nodes = namespace.graph.nodes.len(),
            edges = namespace.graph.edges.len(),
            ready = namespace.ready_to_run.len(),
            canceled,
            "scheduled task graph"
        );
    }

    pub fn has_ready_to_run_tasks(&self) -> bool {
        self.namespaces.values().any(|ns| !ns.ready_to_run.is_empty())
    }

    /// Pop the best ready task across all namespaces and mark it running.
    pub fn get_next_task_to_run(&mut self) -> Option<PrioritizedTask> {
        let token = self
            .namespaces
            .iter()
            .filter_map(|(token, ns)| ns.ready_to_run.peek().map(|task| (*token, task.sort_key())))
            .min_by_key(|(_, key)| *key)
            .map(|(token, _)| token)?;

        let namespace = self.namespaces.get_mut(&token)?;
        let prioritized = namespace.ready_to_run.pop()?;
        prioritized.task.state().did_start();
        namespace.running.push(Arc::clone(&prioritized.task));
        Some(prioritized)
    }

    /// Record completion of a task returned by
    /// [`get_next_task_to_run`](Self::get_next_task_to_run) and release its
    /// dependents.
    pub fn complete_task(&mut self, token: NamespaceToken, task: &Arc<dyn Task>) {
        let key = TaskKey::of(task);
        task.state().did_finish();

        let Some(namespace) = self.namespaces.get_mut(&token) else {
            return;
        };

        let dependents: Vec<TaskKey> = namespace.graph.dependents_of(key).collect();
        for dependent in dependents {
            let Some(i) = namespace.graph.find_node(dependent) else {
                continue;
            };
            let node = &mut namespace.graph.nodes[i];
            debug_assert!(node.dependencies > 0, "dependency count underflow");
            node.dependencies = node.dependencies.saturating_sub(1);
            if node.dependencies != 0 {
                continue;
            }
            let state = node.task.state();
            if state.is_done() || state.is_running() {
                continue;
            }
            let ready = PrioritizedTask {
                task: Arc::clone(&node.task),
                token,
                category: node.category,
                priority: node.priority,
                sequence: {
                    self.next_sequence += 1;
                    self.next_sequence
                },
            };
            namespace.ready_to_run.push(ready);
        }

        namespace.running.retain(|running| TaskKey::of(running) != key);
        namespace.completed.push(Arc::clone(task));
    }

    /// Take every finished or canceled task of the namespace.
    pub fn collect_completed_tasks(&mut self, token: NamespaceToken) -> Vec<Arc<dyn Task>> {
        let Some(namespace) = self.namespaces.get_mut(&token) else {
            return Vec::new();
        };
        let completed = std::mem::take(&mut namespace.completed);

        if namespace.graph.is_empty() && namespace.has_finished_running_tasks() {
            self.namespaces.remove(&token);
        }
        completed
    }

    pub fn has_finished_running_tasks_in_namespace(&self, token: NamespaceToken) -> bool {
        self.namespaces
            .get(&token)
            .map(TaskNamespace::has_finished_running_tasks)
            .unwrap_or(true)
    }

    pub fn has_any_running_tasks(&self) -> bool {
        self.namespaces.values().any(|ns| !ns.running.is_empty())
    }

    pub fn num_ready_to_run_tasks(&self) -> usize {
        self.namespaces.values().map(|ns| ns.ready_to_run.len()).sum()
    }

    pub fn num_running_tasks(&self) -> usize {
        self.namespaces.values().map(|ns| ns.running.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ClosureTask;

    fn task(name: &'static str) -> Arc<dyn Task> {
        ClosureTask::new(name, || {})
    }

    fn run_one(queue: &mut TaskGraphWorkQueue) -> Option<Arc<dyn Task>> {
        let next = queue.get_next_task_to_run()?;
        next.task.run_on_worker_thread();
        queue.complete_task(next.token, &next.task);
        Some(next.task)
    }

    #[test]
    fn test_priority_order() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let low = task("low");
        let high = task("high");

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&low), TaskCategory::Foreground, 5, 0);
        graph.insert_node(Arc::clone(&high), TaskCategory::Foreground, 1, 0);
        queue.schedule_tasks(token, graph);

        let first = run_one(&mut queue).unwrap();
        assert_eq!(TaskKey::of(&first), TaskKey::of(&high));
        let second = run_one(&mut queue).unwrap();
        assert_eq!(TaskKey::of(&second), TaskKey::of(&low));
        assert!(run_one(&mut queue).is_none());
    }

    #[test]
    fn test_foreground_before_background() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let background = task("background");
        let foreground = task("foreground");

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&background), TaskCategory::Background, 0, 0);
        graph.insert_node(Arc::clone(&foreground), TaskCategory::Foreground, 9, 0);
        queue.schedule_tasks(token, graph);

        let first = run_one(&mut queue).unwrap();
        assert_eq!(TaskKey::of(&first), TaskKey::of(&foreground));
    }

    #[test]
    fn test_dependencies_gate_execution() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let decode = task("decode");
        let raster = task("raster");

        let mut graph = TaskGraph::new();
        // The dependent has the better priority but must still wait.
        graph.insert_node(Arc::clone(&raster), TaskCategory::Foreground, 0, 1);
        graph.insert_node(Arc::clone(&decode), TaskCategory::Foreground, 10, 0);
        graph.add_edge(TaskKey::of(&decode), TaskKey::of(&raster));
        queue.schedule_tasks(token, graph);

        assert_eq!(queue.num_ready_to_run_tasks(), 1);
        let first = run_one(&mut queue).unwrap();
        assert_eq!(TaskKey::of(&first), TaskKey::of(&decode));
        assert!(raster.state().is_scheduled());
        let second = run_one(&mut queue).unwrap();
        assert_eq!(TaskKey::of(&second), TaskKey::of(&raster));
        assert!(queue.has_finished_running_tasks_in_namespace(token));
    }

    #[test]
    fn test_finished_dependency_is_satisfied_on_schedule() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let decode = task("decode");
        let raster = task("raster");

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&decode), TaskCategory::Foreground, 0, 0);
        queue.schedule_tasks(token, graph);
        run_one(&mut queue).unwrap();
        queue.collect_completed_tasks(token);

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&decode), TaskCategory::Foreground, 0, 0);
        graph.insert_node(Arc::clone(&raster), TaskCategory::Foreground, 1, 1);
        graph.add_edge(TaskKey::of(&decode), TaskKey::of(&raster));
        queue.schedule_tasks(token, graph);

        let next = run_one(&mut queue).unwrap();
        assert_eq!(TaskKey::of(&next), TaskKey::of(&raster));
        assert!(run_one(&mut queue).is_none());
    }

    #[test]
    fn test_replacing_graph_cancels_unstarted_tasks() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let running = task("running");
        let dropped = task("dropped");
        let kept = task("kept");

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&running), TaskCategory::Foreground, 0, 0);
        graph.insert_node(Arc::clone(&dropped), TaskCategory::Foreground, 1, 0);
        graph.insert_node(Arc::clone(&kept), TaskCategory::Foreground, 2, 0);
        queue.schedule_tasks(token, graph);

        let in_flight = queue.get_next_task_to_run().unwrap();
        assert_eq!(in_flight.key(), TaskKey::of(&running));

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&kept), TaskCategory::Foreground, 0, 0);
        queue.schedule_tasks(token, graph);

        assert!(dropped.state().is_canceled());
        assert!(running.state().is_running());
        assert!(kept.state().is_scheduled());

        queue.complete_task(in_flight.token, &in_flight.task);
        let completed = queue.collect_completed_tasks(token);
        let keys: Vec<_> = completed.iter().map(TaskKey::of).collect();
        assert!(keys.contains(&TaskKey::of(&dropped)));
        assert!(keys.contains(&TaskKey::of(&running)));
        assert!(!keys.contains(&TaskKey::of(&kept)));
    }

    #[test]
    fn test_rescheduling_canceled_task() {
        let mut queue = TaskGraphWorkQueue::new();
        let token = queue.generate_namespace_token();
        let a = task("a");

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&a), TaskCategory::Foreground, 0, 0);
        queue.schedule_tasks(token, graph);
        queue.schedule_tasks(token, TaskGraph::new());
        assert!(a.state().is_canceled());

        let mut graph = TaskGraph::new();
        graph.insert_node(Arc::clone(&a), TaskCategory::Foreground, 0, 0);
        queue.schedule_tasks(token, graph);

        assert!(a.state().is_scheduled());
        assert!(queue.collect_completed_tasks(token).is_empty());
        assert!(run_one(&mut queue).is_some());
    }

    #[test]
    fn test_namespaces_are_independent() {
        let mut queue = TaskGraphWorkQueue::new();
        let first = queue.generate_namespace_token();
        let second = queue.generate_namespace_token();
        assert_ne!(first, second);

        let mut graph = TaskGraph::new();
        graph.insert_node(task("a"), TaskCategory::Foreground, 0, 0);
        queue.schedule_tasks(first, graph);

        assert!(queue.has_finished_running_tasks_in_namespace(second));
        assert!(!queue.has_finished_running_tasks_in_namespace(first));
    }
}
