//! core::graph
//!
//! Model inheritance graph.
//!
//! # Architecture
//!
//! The inheritance graph is an arena of Models keyed by id where:
//! - Nodes are Models
//! - Edges point from a Model to each Model it inherits from
//! - A Model may have any number of parents
//!
//! Traversals are explicit worklists, never per-call recursion, so
//! precedence is auditable and stack depth is bounded.
//!
//! # Invariants
//!
//! - The graph is expected to be acyclic but this is not enforced on
//!   creation. [`InheritanceGraph::find_cycle`] diagnoses a cycle, and every
//!   traversal here keeps a visited set so a cycle terminates instead of
//!   recursing forever.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Parent sets of every Model loaded so far.
#[derive(Debug, Default, Clone)]
pub struct InheritanceGraph {
    parents: HashMap<String, BTreeSet<String>>,
}

impl InheritanceGraph {
    /// Create an empty inheritance graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ancestry of `start` breadth-first through `lookup`.
    ///
    /// `lookup` returns a Model's parent ids, or `None` if the Model does
    /// not exist. Missing Models are recorded without parents.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::{BTreeSet, HashMap};
    /// use schemagraph::core::graph::InheritanceGraph;
    ///
    /// let mut db: HashMap<&str, BTreeSet<String>> = HashMap::new();
    /// db.insert("car", ["vehicle".to_string()].into());
    /// db.insert("vehicle", BTreeSet::new());
    ///
    /// let graph = InheritanceGraph::load("car", |id| {
    ///     Ok::<_, ()>(db.get(id).cloned())
    /// })
    /// .unwrap();
    /// assert!(graph.is_subtype("car", "vehicle"));
    /// ```
    pub fn load<E>(
        start: &str,
        mut lookup: impl FnMut(&str) -> Result<Option<BTreeSet<String>>, E>,
    ) -> Result<Self, E> {
        let mut graph = Self::new();
        let mut queue = VecDeque::from([start.to_string()]);

        while let Some(current) = queue.pop_front() {
            if graph.parents.contains_key(&current) {
                continue;
            }
            let parents = lookup(&current)?.unwrap_or_default();
            queue.extend(parents.iter().cloned());
            graph.parents.insert(current, parents);
        }

        Ok(graph)
    }

    /// Record a Model and its parents.
    pub fn add_model(&mut self, id: impl Into<String>, parents: BTreeSet<String>) {
        self.parents.insert(id.into(), parents);
    }

    /// Direct parents of a Model.
    pub fn parents(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.parents.get(id)
    }

    /// Whether a Model is present in the graph.
    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    /// Breadth-first frontiers starting at `start`.
    ///
    /// Level 0 is `[start]`; each following level holds the parents of the
    /// previous level that were not seen before. Expansion stops when a
    /// frontier yields no new ancestors. The order of Models within a level
    /// is unspecified.
    ///
    /// # Example
    ///
    /// ```
    /// use schemagraph::core::graph::InheritanceGraph;
    ///
    /// let mut graph = InheritanceGraph::new();
    /// graph.add_model("c", ["b".to_string()].into());
    /// graph.add_model("b", ["a".to_string()].into());
    /// graph.add_model("a", Default::default());
    ///
    /// let levels = graph.levels("c");
    /// assert_eq!(levels, vec![vec!["c"], vec!["b"], vec!["a"]]);
    /// ```
    pub fn levels(&self, start: &str) -> Vec<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
        let mut levels = vec![vec![start.to_string()]];

        loop {
            let mut next = Vec::new();
            if let Some(frontier) = levels.last() {
                for id in frontier {
                    for parent in self.parents.get(id).into_iter().flatten() {
                        if seen.insert(parent.clone()) {
                            next.push(parent.clone());
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            levels.push(next);
        }

        levels
    }

    /// All transitive ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        self.levels(id).into_iter().skip(1).flatten().collect()
    }

    /// Whether `model` equals `target` or transitively inherits from it.
    pub fn is_subtype(&self, model: &str, target: &str) -> bool {
        if model == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![model];

        while let Some(current) = stack.pop() {
            // Shared ancestors and cycles are both walked once.
            if !visited.insert(current) {
                continue;
            }
            for parent in self.parents.get(current).into_iter().flatten() {
                if parent == target {
                    return true;
                }
                stack.push(parent);
            }
        }

        false
    }

    /// Check if the graph contains cycles.
    ///
    /// Returns `Some(model)` if a cycle is reachable from that Model.
    pub fn find_cycle(&self) -> Option<String> {
        let mut done: HashSet<&str> = HashSet::new();

        let mut roots: Vec<&String> = self.parents.keys().collect();
        roots.sort();

        for root in roots {
            if done.contains(root.as_str()) {
                continue;
            }
            // Iterative DFS; the bool marks a post-order exit.
            let mut on_path: HashSet<&str> = HashSet::new();
            let mut stack: Vec<(&str, bool)> = vec![(root.as_str(), false)];

            while let Some((node, exiting)) = stack.pop() {
                if exiting {
                    on_path.remove(node);
                    done.insert(node);
                    continue;
                }
                if on_path.contains(node) {
                    return Some(node.to_string());
                }
                if done.contains(node) {
                    continue;
                }
                on_path.insert(node);
                stack.push((node, true));
                for parent in self.parents.get(node).into_iter().flatten() {
                    if on_path.contains(parent.as_str()) {
                        return Some(parent.clone());
                    }
                    if !done.contains(parent.as_str()) {
                        stack.push((parent.as_str(), false));
                    }
                }
            }
        }
        None
    }
}
