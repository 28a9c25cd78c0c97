//! Structural checks on the task hierarchy and the dependency graph.
//!
//! Dependency edges point from a task to its prerequisite. Before an edge
//! `task -> candidate` is committed, [`validate_dependency_edge`] walks the
//! graph reachable from `candidate`; if `task` can be reached the new edge
//! would close a cycle.
//!
//! The walk keeps two sets: `visited` (every node entered so far) and
//! `on_stack` (nodes on the active DFS path). `task` itself starts on the
//! stack, standing in for the proposed edge, so reaching it is reported the
//! same way as any back edge. A node leaves the stack when its exploration
//! finishes; it stays visited.

use crate::error::{Result, TaskError};
use crate::storage::TaskStore;
use crate::types::{Task, TaskNode};
use std::collections::{HashMap, HashSet};

/// Source of dependency edges for the traversal.
pub trait DependencyLookup {
    /// Dependencies of `id`, or `None` if no such task is visible.
    fn dependencies_of(&mut self, id: &str) -> Result<Option<Vec<String>>>;
}

impl DependencyLookup for HashMap<String, Vec<String>> {
    fn dependencies_of(&mut self, id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.get(id).cloned())
    }
}

/// Owner-scoped view over a store that fetches each task at most once.
pub struct StoreSnapshot<'a, S: TaskStore + ?Sized> {
    store: &'a S,
    owner_id: &'a str,
    cache: HashMap<String, Option<Vec<String>>>,
}

impl<'a, S: TaskStore + ?Sized> StoreSnapshot<'a, S> {
    pub fn new(store: &'a S, owner_id: &'a str) -> Self {
        Self {
            store,
            owner_id,
            cache: HashMap::new(),
        }
    }

    /// Seed the cache with an already loaded task.
    pub fn preload(&mut self, task: &Task) {
        self.cache
            .insert(task.id.clone(), Some(task.dependencies.clone()));
    }

    /// Number of distinct tasks fetched or preloaded.
    pub fn loaded(&self) -> usize {
        self.cache.len()
    }
}

impl<S: TaskStore + ?Sized> DependencyLookup for StoreSnapshot<'_, S> {
    fn dependencies_of(&mut self, id: &str) -> Result<Option<Vec<String>>> {
        if let Some(hit) = self.cache.get(id) {
            return Ok(hit.clone());
        }
        let deps = self
            .store
            .get(id)?
            .filter(|t| t.owner_id == self.owner_id)
            .map(|t| t.dependencies);
        self.cache.insert(id.to_string(), deps.clone());
        Ok(deps)
    }
}

/// A subtask cannot be created under a task that is itself a subtask.
pub fn validate_subtask_creation(parent: &Task) -> Result<()> {
    if !parent.is_top_level() {
        return Err(TaskError::ParentAlreadyNested(parent.id.clone()));
    }
    Ok(())
}

/// Check that `task -> candidate` may be added.
pub fn validate_dependency_edge(
    task: &Task,
    candidate: &Task,
    lookup: &mut impl DependencyLookup,
) -> Result<()> {
    if candidate.id == task.id {
        return Err(TaskError::SelfDependency(task.id.clone()));
    }
    if task.depends_on(&candidate.id) {
        return Err(TaskError::DuplicateDependency {
            task: task.id.clone(),
            dependency: candidate.id.clone(),
        });
    }
    if would_create_cycle(&task.id, &candidate.id, lookup)? {
        log::debug!("Edge {} -> {} would close a cycle", task.id, candidate.id);
        return Err(TaskError::CycleDetected {
            task: task.id.clone(),
            dependency: candidate.id.clone(),
        });
    }
    Ok(())
}

/// True if adding `task_id -> candidate_id` would leave a cycle in the graph.
///
/// A self edge counts as a cycle. Unknown ids are treated as tasks without
/// dependencies.
pub fn would_create_cycle(
    task_id: &str,
    candidate_id: &str,
    lookup: &mut impl DependencyLookup,
) -> Result<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut on_stack: HashSet<String> = HashSet::new();
    visited.insert(task_id.to_string());
    on_stack.insert(task_id.to_string());

    if on_stack.contains(candidate_id) {
        return Ok(true);
    }

    // Each frame is a node on the active path plus its unexplored edges.
    let mut path: Vec<(String, std::vec::IntoIter<String>)> = Vec::new();
    enter(candidate_id, &mut visited, &mut on_stack, &mut path, lookup)?;

    while let Some((node, edges)) = path.last_mut() {
        match edges.next() {
            Some(next) => {
                if on_stack.contains(&next) {
                    log::debug!("Back edge {} -> {}", node, next);
                    return Ok(true);
                }
                if !visited.contains(&next) {
                    enter(&next, &mut visited, &mut on_stack, &mut path, lookup)?;
                }
            }
            None => {
                if let Some((done, _)) = path.pop() {
                    on_stack.remove(&done);
                }
            }
        }
    }

    Ok(false)
}

fn enter(
    id: &str,
    visited: &mut HashSet<String>,
    on_stack: &mut HashSet<String>,
    path: &mut Vec<(String, std::vec::IntoIter<String>)>,
    lookup: &mut impl DependencyLookup,
) -> Result<()> {
    visited.insert(id.to_string());
    on_stack.insert(id.to_string());
    let edges = lookup.dependencies_of(id)?.unwrap_or_default();
    path.push((id.to_string(), edges.into_iter()));
    Ok(())
}

/// Remove `dependency_id` from the task's dependency set.
///
/// Always structurally legal. Returns false if the edge was not there.
pub fn remove_dependency_edge(task: &mut Task, dependency_id: &str) -> bool {
    let before = task.dependencies.len();
    task.dependencies.retain(|d| d != dependency_id);
    task.dependencies.len() != before
}

/// Group a flat task list into top-level tasks with their direct subtasks.
///
/// Input order is preserved at both levels. Subtasks whose parent is not in
/// the list are dropped.
pub fn build_forest(tasks: Vec<Task>) -> Vec<TaskNode> {
    let mut children: HashMap<String, Vec<Task>> = HashMap::new();
    let mut roots = Vec::new();

    for task in tasks {
        match task.parent_id.clone() {
            Some(parent_id) => children.entry(parent_id).or_default().push(task),
            None => roots.push(task),
        }
    }

    roots
        .into_iter()
        .map(|task| {
            let subtasks = children.remove(&task.id).unwrap_or_default();
            TaskNode { task, subtasks }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{Priority, Status};
    use chrono::Utc;

    fn make_task(id: &str, deps: &[&str]) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            owner_id: "alice".to_string(),
            title: format!("Task {}", id),
            description: None,
            due_date: None,
            priority: Priority::Medium,
            status: Status::ToDo,
            parent_id: None,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(id, deps)| (id.to_string(), deps.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_no_cycle_in_chain() {
        // a -> b -> c; adding d -> a is fine
        let mut g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[]), ("d", &[])]);
        assert!(!would_create_cycle("d", "a", &mut g).unwrap());
    }

    #[test]
    fn test_direct_cycle() {
        let mut g = graph(&[("a", &["b"]), ("b", &[])]);
        assert!(would_create_cycle("b", "a", &mut g).unwrap());
    }

    #[test]
    fn test_transitive_cycle() {
        let mut g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(would_create_cycle("c", "a", &mut g).unwrap());
    }

    #[test]
    fn test_self_edge_is_cycle() {
        let mut g = graph(&[("a", &[])]);
        assert!(would_create_cycle("a", "a", &mut g).unwrap());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // x reaches d through both b and c; d is revisited via a second path
        let mut g = graph(&[
            ("a", &[]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
            ("x", &["b", "c"]),
        ]);
        assert!(!would_create_cycle("a", "x", &mut g).unwrap());
    }

    #[test]
    fn test_cycle_found_after_revisited_branch() {
        // candidate e: e -> {f, g}; f -> h; g -> h; h -> t
        let mut g = graph(&[
            ("e", &["f", "g"]),
            ("f", &["h"]),
            ("g", &["h"]),
            ("h", &["t"]),
            ("t", &[]),
        ]);
        assert!(would_create_cycle("t", "e", &mut g).unwrap());
        assert!(!would_create_cycle("x", "e", &mut g).unwrap());
    }

    #[test]
    fn test_unknown_nodes_are_leaves() {
        let mut g = graph(&[("a", &["ghost"])]);
        assert!(!would_create_cycle("b", "a", &mut g).unwrap());
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let n = 50_000;
        let mut g: HashMap<String, Vec<String>> = (0..n)
            .map(|i| (format!("n{}", i), vec![format!("n{}", i + 1)]))
            .collect();
        g.insert(format!("n{}", n), vec![]);
        assert!(would_create_cycle(&format!("n{}", n), "n0", &mut g).unwrap());
    }

    #[test]
    fn test_validate_edge_errors() {
        let a = make_task("a", &["b"]);
        let b = make_task("b", &[]);
        let mut g = graph(&[("a", &["b"]), ("b", &[])]);

        assert!(matches!(
            validate_dependency_edge(&a, &a, &mut g),
            Err(TaskError::SelfDependency(_))
        ));
        assert!(matches!(
            validate_dependency_edge(&a, &b, &mut g),
            Err(TaskError::DuplicateDependency { .. })
        ));
        assert!(matches!(
            validate_dependency_edge(&b, &a, &mut g),
            Err(TaskError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_validate_subtask_creation() {
        let parent = make_task("p", &[]);
        assert!(validate_subtask_creation(&parent).is_ok());

        let mut nested = make_task("s", &[]);
        nested.parent_id = Some("p".to_string());
        assert!(matches!(
            validate_subtask_creation(&nested),
            Err(TaskError::ParentAlreadyNested(_))
        ));
    }

    #[test]
    fn test_remove_dependency_edge() {
        let mut a = make_task("a", &["b", "c"]);
        assert!(remove_dependency_edge(&mut a, "b"));
        assert_eq!(a.dependencies, vec!["c"]);
        assert!(!remove_dependency_edge(&mut a, "b"));
    }

    #[test]
    fn test_snapshot_fetches_each_task_once() {
        let store = MemoryStore::new();
        store.create(&make_task("a", &["b", "c"])).unwrap();
        store.create(&make_task("b", &["d"])).unwrap();
        store.create(&make_task("c", &["d"])).unwrap();
        store.create(&make_task("d", &[])).unwrap();

        let mut snapshot = StoreSnapshot::new(&store, "alice");
        assert!(!would_create_cycle("z", "a", &mut snapshot).unwrap());
        assert_eq!(snapshot.loaded(), 4);
    }

    #[test]
    fn test_snapshot_hides_other_owners() {
        let store = MemoryStore::new();
        let mut foreign = make_task("a", &["b"]);
        foreign.owner_id = "bob".to_string();
        store.create(&foreign).unwrap();

        let mut snapshot = StoreSnapshot::new(&store, "alice");
        assert_eq!(snapshot.dependencies_of("a").unwrap(), None);
    }

    #[test]
    fn test_build_forest() {
        let p = make_task("p", &[]);
        let mut s1 = make_task("s1", &[]);
        s1.parent_id = Some("p".to_string());
        let q = make_task("q", &[]);
        let mut s2 = make_task("s2", &[]);
        s2.parent_id = Some("p".to_string());

        let forest = build_forest(vec![p, s1, q, s2]);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].task.id, "p");
        let subtask_ids: Vec<&str> = forest[0].subtasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(subtask_ids, vec!["s1", "s2"]);
        assert!(forest[1].subtasks.is_empty());
    }
}
