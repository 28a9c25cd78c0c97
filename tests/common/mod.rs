//! Shared test infrastructure for taskgraph integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use taskgraph::{MemoryStore, NewTask, SqliteStore, Status, Task, TaskPatch, TaskService, TaskStore};
use tempfile::TempDir;

/// Default owner for tests that don't care about scoping.
pub const OWNER: &str = "alice";

/// Test environment around a service; the temp dir lives as long as the env.
pub struct TestEnv<S: TaskStore> {
    pub temp_dir: Option<TempDir>,
    pub service: TaskService<S>,
}

impl TestEnv<MemoryStore> {
    /// Create a new test environment over an in-memory store.
    pub fn new() -> Self {
        Self {
            temp_dir: None,
            service: TaskService::new(MemoryStore::new()),
        }
    }

    /// Simulate a store outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.service.store().set_unavailable(unavailable);
    }
}

impl TestEnv<SqliteStore> {
    /// Create a new test environment over a SQLite file in a temp dir.
    pub fn sqlite() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteStore::open(&temp_dir.path().join("tasks.db")).expect("Failed to open store");
        Self {
            temp_dir: Some(temp_dir),
            service: TaskService::new(store),
        }
    }
}

impl<S: TaskStore> TestEnv<S> {
    /// Create a top-level task for the default owner.
    pub fn create_task(&self, title: &str) -> Task {
        self.create_task_for(OWNER, title)
    }

    /// Create a top-level task for a specific owner.
    pub fn create_task_for(&self, owner: &str, title: &str) -> Task {
        self.service
            .create_task(owner, NewTask::new(title))
            .expect("Failed to create task")
    }

    /// Create a subtask under `parent`.
    pub fn create_subtask(&self, parent: &Task, title: &str) -> Task {
        self.service
            .create_subtask(OWNER, &parent.id, NewTask::new(title))
            .expect("Failed to create subtask")
    }

    /// Make `task` depend on `dependency`.
    pub fn depend(&self, task: &Task, dependency: &Task) -> Task {
        self.service
            .add_dependency(OWNER, &task.id, &dependency.id)
            .expect("Failed to add dependency")
    }

    /// Set a task's status directly.
    pub fn set_status(&self, task: &Task, status: Status) -> Task {
        self.service
            .update_task(OWNER, &task.id, TaskPatch::status(status))
            .expect("Failed to update status")
    }

    /// Mark a task completed.
    pub fn complete(&self, task: &Task) -> Task {
        self.set_status(task, Status::Completed)
    }

    /// Reload a task.
    pub fn get(&self, task: &Task) -> Task {
        self.service.get_task(OWNER, &task.id).expect("Failed to get task")
    }

    /// Current status of a task.
    pub fn status_of(&self, task: &Task) -> Status {
        self.get(task).status
    }

    /// Current dependency ids of a task.
    pub fn deps_of(&self, task: &Task) -> Vec<String> {
        self.get(task).dependencies
    }

    /// Assert that the task no longer exists for the default owner.
    pub fn assert_gone(&self, task: &Task) {
        assert!(
            self.service.get_task(OWNER, &task.id).is_err(),
            "Expected task {} to be deleted",
            task.id
        );
    }

    /// Ids of all tasks of the default owner, in creation order.
    pub fn ids(&self) -> Vec<String> {
        self.service
            .list_tasks(OWNER)
            .expect("Failed to list tasks")
            .into_iter()
            .map(|t| t.id)
            .collect()
    }
}
