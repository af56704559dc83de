//! Task Graph
//!
//! Nodes carry a task with its category, priority and number of unmet
//! dependencies. Edges say "`dependent` may only run after `task`". Graphs are
//! built on the origin thread and handed to a runner wholesale.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::task::{Task, TaskKey};

/// Broad class of work. Lower categories are preferred by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskCategory {
    /// Work gating the next frame
    Foreground = 0,
    /// Prepaint and other speculative work
    #[default]
    Background = 1,
}

/// A task in a graph.
#[derive(Clone)]
pub struct Node {
    pub task: Arc<dyn Task>,
    pub category: TaskCategory,
    /// Lower runs first
    pub priority: u32,
    /// Number of incoming edges still unsatisfied
    pub dependencies: u32,
}

impl Node {
    pub fn new(task: Arc<dyn Task>, category: TaskCategory, priority: u32, dependencies: u32) -> Self {
        Self { task, category, priority, dependencies }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::of(&self.task)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("task", &self.task.name())
            .field("key", &self.key())
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Dependency edge: `dependent` waits for `task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub task: TaskKey,
    pub dependent: TaskKey,
}

impl Edge {
    pub fn new(task: TaskKey, dependent: TaskKey) -> Self {
        Self { task, dependent }
    }
}

/// Directed acyclic graph of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    /// Index of the node for `key`, if present.
    pub fn find_node(&self, key: TaskKey) -> Option<usize> {
        self.nodes.iter().position(|node| node.key() == key)
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.find_node(key).is_some()
    }

    /// Insert a node for `task`.
    ///
    /// Inserting the same task twice is a programming error: it asserts in
    /// debug builds and is ignored otherwise. Returns whether a node was added.
    pub fn insert_node(
        &mut self,
        task: Arc<dyn Task>,
        category: TaskCategory,
        priority: u32,
        dependencies: u32,
    ) -> bool {
        let key = TaskKey::of(&task);
        if self.contains(key) {
            debug_assert!(false, "task {:?} ({}) inserted twice", key, task.name());
            tracing::warn!(task = task.name(), "ignoring duplicate task graph node");
            return false;
        }
        self.nodes.push(Node::new(task, category, priority, dependencies));
        true
    }

    /// Add an edge unless an identical one already exists.
    pub fn add_edge(&mut self, task: TaskKey, dependent: TaskKey) -> bool {
        let edge = Edge::new(task, dependent);
        if self.edges.contains(&edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Nodes that depend on `key`, in edge order.
    pub fn dependents_of(&self, key: TaskKey) -> impl Iterator<Item = TaskKey> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.task == key)
            .map(|edge| edge.dependent)
    }

    /// Kahn's algorithm over the edge list.
    pub fn is_acyclic(&self) -> bool {
        let mut in_degree: HashMap<TaskKey, usize> =
            self.nodes.iter().map(|node| (node.key(), 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.dependent).or_insert(0) += 1;
            in_degree.entry(edge.task).or_insert(0);
        }

        let mut ready: Vec<TaskKey> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut visited = 0;
        while let Some(key) = ready.pop() {
            visited += 1;
            for dependent in self.dependents_of(key) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }
        visited == in_degree.len()
    }

    /// Structural sanity check used before a graph is scheduled.
    ///
    /// Every edge endpoint must be a node, node identities are unique and
    /// the graph has no cycles.
    pub fn validate(&self) -> bool {
        let mut keys = HashSet::with_capacity(self.nodes.len());
        if !self.nodes.iter().all(|node| keys.insert(node.key())) {
            return false;
        }
        if !self.edges.iter().all(|edge| keys.contains(&edge.task) && keys.contains(&edge.dependent)) {
            return false;
        }
        self.is_acyclic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ClosureTask;

    fn task(name: &'static str) -> Arc<dyn Task> {
        ClosureTask::new(name, || {})
    }

    #[test]
    fn test_insert_and_find() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let b = task("b");

        assert!(graph.insert_node(Arc::clone(&a), TaskCategory::Foreground, 1, 0));
        assert!(graph.insert_node(Arc::clone(&b), TaskCategory::Background, 2, 1));
        assert!(graph.add_edge(TaskKey::of(&a), TaskKey::of(&b)));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.find_node(TaskKey::of(&b)), Some(1));
        assert_eq!(graph.dependents_of(TaskKey::of(&a)).collect::<Vec<_>>(), vec![TaskKey::of(&b)]);
        assert!(graph.validate());
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let b = task("b");
        graph.insert_node(Arc::clone(&a), TaskCategory::Foreground, 1, 0);
        graph.insert_node(Arc::clone(&b), TaskCategory::Foreground, 1, 1);

        assert!(graph.add_edge(TaskKey::of(&a), TaskKey::of(&b)));
        assert!(!graph.add_edge(TaskKey::of(&a), TaskKey::of(&b)));
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let b = task("b");
        graph.insert_node(Arc::clone(&a), TaskCategory::Foreground, 1, 1);
        graph.insert_node(Arc::clone(&b), TaskCategory::Foreground, 1, 1);
        graph.add_edge(TaskKey::of(&a), TaskKey::of(&b));
        graph.add_edge(TaskKey::of(&b), TaskKey::of(&a));

        assert!(!graph.is_acyclic());
        assert!(!graph.validate());
    }

    #[test]
    fn test_dangling_edge_invalid() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let b = task("b");
        graph.insert_node(Arc::clone(&a), TaskCategory::Foreground, 1, 0);
        graph.add_edge(TaskKey::of(&a), TaskKey::of(&b));

        assert!(!graph.validate());
    }

    #[test]
    fn test_reset() {
        let mut graph = TaskGraph::new();
        graph.insert_node(task("a"), TaskCategory::Foreground, 1, 0);
        graph.reset();
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
    }
}
