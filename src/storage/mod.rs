//! Task Store abstraction and its implementations.
//!
//! The engine never talks to a database directly: everything goes through
//! [`TaskStore`], which is passed in explicitly. Two implementations ship
//! with the crate:
//! - [`SqliteStore`]: durable, SQLite-backed
//! - [`MemoryStore`]: in-memory, for tests and embedding

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::types::{Status, Task};
use eyre::Result;

/// Which tasks to match on the parent axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    /// Only tasks without a parent.
    TopLevel,
    /// Only direct subtasks of the given task.
    ChildOf(String),
}

/// Owner-scoped query over tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    pub owner_id: String,
    pub parent: ParentFilter,
    pub status: Option<Status>,
}

impl TaskFilter {
    /// Match every task of `owner_id`.
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            parent: ParentFilter::Any,
            status: None,
        }
    }

    pub fn top_level(mut self) -> Self {
        self.parent = ParentFilter::TopLevel;
        self
    }

    pub fn child_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent = ParentFilter::ChildOf(parent_id.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Check a task against this filter.
    pub fn matches(&self, task: &Task) -> bool {
        if task.owner_id != self.owner_id {
            return false;
        }
        let parent_ok = match &self.parent {
            ParentFilter::Any => true,
            ParentFilter::TopLevel => task.parent_id.is_none(),
            ParentFilter::ChildOf(id) => task.parent_id.as_deref() == Some(id.as_str()),
        };
        parent_ok && self.status.is_none_or(|s| s == task.status)
    }
}

/// A set of writes that must land together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Full replacement records for existing tasks.
    pub updates: Vec<Task>,
    /// Ids of tasks to remove.
    pub deletes: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(mut self, task: Task) -> Self {
        self.updates.push(task);
        self
    }

    pub fn delete(mut self, id: impl Into<String>) -> Self {
        self.deletes.push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Durable task storage keyed by task id.
///
/// Implementations maintain `created_at`/`updated_at` and return the record
/// as stored. Every method may fail; failures are transient from the
/// engine's point of view and are surfaced to the caller unmodified.
pub trait TaskStore: Send + Sync {
    /// Point lookup by id, regardless of owner.
    fn get(&self, id: &str) -> Result<Option<Task>>;

    /// All tasks matching `filter`, in creation order.
    fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Tasks of `owner_id` whose dependency set contains `task_id`.
    fn find_by_dependency(&self, owner_id: &str, task_id: &str) -> Result<Vec<Task>>;

    /// Insert a new record. Fails if the id is taken.
    fn create(&self, task: &Task) -> Result<Task>;

    /// Replace an existing record. Fails if it does not exist.
    fn update(&self, task: &Task) -> Result<Task>;

    /// Remove a record. Returns false if it did not exist.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every record matching `filter`, returning how many went.
    fn delete_many(&self, filter: &TaskFilter) -> Result<usize>;

    /// Apply `changes` atomically, returning the updated records.
    fn commit(&self, changes: &ChangeSet) -> Result<Vec<Task>>;
}
