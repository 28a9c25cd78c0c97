//! Task Service: the operations an outer layer calls.
//!
//! Every operation takes the caller's owner id. Tasks of other owners are
//! indistinguishable from missing ones. Mutations hold the owner's lock
//! while they reload state, run the graph and status checks, and commit;
//! all checks run before the first write, and multi-record writes go
//! through [`TaskStore::commit`] so they land together or not at all.

use crate::error::{Result, TaskError};
use crate::graph::{self, StoreSnapshot};
use crate::id::generate_id;
use crate::lock::OwnerLocks;
use crate::status::{self, CompletionContext};
use crate::storage::{ChangeSet, TaskFilter, TaskStore};
use crate::types::{DeleteSummary, NewTask, Status, Task, TaskNode, TaskPatch, validate_title};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Orchestrates the graph and status engines against a task store.
pub struct TaskService<S: TaskStore> {
    store: S,
    locks: OwnerLocks,
}

impl<S: TaskStore> TaskService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: OwnerLocks::default(),
        }
    }

    /// Use a custom timeout for acquiring an owner's lock.
    pub fn with_lock_timeout(store: S, timeout: Duration) -> Self {
        Self {
            store,
            locks: OwnerLocks::new(timeout),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a task; with `parent_id` set it becomes a subtask.
    pub fn create_task(&self, owner_id: &str, new: NewTask) -> Result<Task> {
        validate_title(&new.title)?;
        let _guard = self.locks.acquire(owner_id)?;

        if let Some(parent_id) = &new.parent_id {
            let parent = self
                .load_owned(owner_id, parent_id)?
                .ok_or_else(|| TaskError::ParentNotFound(parent_id.clone()))?;
            graph::validate_subtask_creation(&parent)?;
        }

        let now = Utc::now();
        let task = Task {
            id: generate_id(owner_id, &new.title, now),
            owner_id: owner_id.to_string(),
            title: new.title,
            description: new.description,
            due_date: new.due_date,
            priority: new.priority.unwrap_or_default(),
            status: Status::ToDo,
            parent_id: new.parent_id,
            dependencies: vec![],
            created_at: now,
            updated_at: now,
        };
        task.validate()?;

        let task = self.store.create(&task)?;
        log::info!(
            "Created task {} for {}{}",
            task.id,
            owner_id,
            task.parent_id
                .as_deref()
                .map(|p| format!(" under {}", p))
                .unwrap_or_default()
        );
        Ok(task)
    }

    /// Create a subtask under a top-level task.
    pub fn create_subtask(&self, owner_id: &str, parent_id: &str, new: NewTask) -> Result<Task> {
        self.create_task(
            owner_id,
            NewTask {
                parent_id: Some(parent_id.to_string()),
                ..new
            },
        )
    }

    pub fn get_task(&self, owner_id: &str, id: &str) -> Result<Task> {
        self.require(owner_id, id)
    }

    /// All of the owner's tasks, in creation order.
    pub fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>> {
        Ok(self.store.find(&TaskFilter::owner(owner_id))?)
    }

    /// Apply a partial update. Completing a task checks its prerequisites
    /// and unblocks dependents that were waiting only on it.
    pub fn update_task(&self, owner_id: &str, id: &str, patch: TaskPatch) -> Result<Task> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        let _guard = self.locks.acquire(owner_id)?;
        let current = self.require(owner_id, id)?;

        let mut updated = current.clone();
        if let Some(title) = patch.title {
            updated.title = title;
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(due_date) = patch.due_date {
            updated.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            updated.priority = priority;
        }

        let mut changes = ChangeSet::new();
        if let Some(target) = patch.status {
            if target == Status::Completed {
                self.check_completion(owner_id, &current)?;
                changes.updates.extend(self.completion_cascade(owner_id, &current.id)?);
            }
            if target != current.status {
                log::info!("Task {} status {} -> {}", id, current.status, target);
            }
            updated.status = target;
        }
        updated.validate()?;

        let unblocked = changes.updates.len();
        changes.updates.insert(0, updated);
        let committed = self.store.commit(&changes)?;
        if unblocked > 0 {
            log::info!("Completing {} unblocked {} task(s)", id, unblocked);
        }
        committed
            .into_iter()
            .next()
            .ok_or_else(|| TaskError::StoreUnavailable(eyre::eyre!("store returned no record for {}", id)))
    }

    /// Delete a task, its subtasks, and every dependency edge pointing at them.
    ///
    /// Pruned dependents keep their status, even if no dependencies remain.
    pub fn delete_task(&self, owner_id: &str, id: &str) -> Result<DeleteSummary> {
        let _guard = self.locks.acquire(owner_id)?;
        let task = self.require(owner_id, id)?;

        let mut deleted = vec![task.id.clone()];
        deleted.extend(
            self.store
                .find(&TaskFilter::owner(owner_id).child_of(&task.id))?
                .into_iter()
                .map(|t| t.id),
        );
        let doomed: HashSet<&str> = deleted.iter().map(String::as_str).collect();

        let mut pruned: Vec<Task> = Vec::new();
        for gone in &deleted {
            for dependent in self.store.find_by_dependency(owner_id, gone)? {
                if doomed.contains(dependent.id.as_str()) || pruned.iter().any(|t| t.id == dependent.id) {
                    continue;
                }
                let mut dependent = dependent;
                dependent.dependencies.retain(|d| !doomed.contains(d.as_str()));
                pruned.push(dependent);
            }
        }

        let summary = DeleteSummary {
            deleted: deleted.clone(),
            pruned: pruned.iter().map(|t| t.id.clone()).collect(),
        };
        let changes = ChangeSet {
            updates: pruned,
            deletes: deleted,
        };
        self.store.commit(&changes)?;

        log::info!(
            "Deleted {} task(s) rooted at {}, pruned {} dependent(s)",
            summary.deleted.len(),
            id,
            summary.pruned.len()
        );
        Ok(summary)
    }

    /// Make `id` depend on `depends_on`.
    pub fn add_dependency(&self, owner_id: &str, id: &str, depends_on: &str) -> Result<Task> {
        let _guard = self.locks.acquire(owner_id)?;
        let task = self.require(owner_id, id)?;
        let dependency = self.require(owner_id, depends_on)?;

        let mut snapshot = StoreSnapshot::new(&self.store, owner_id);
        snapshot.preload(&task);
        snapshot.preload(&dependency);
        if let Err(e) = graph::validate_dependency_edge(&task, &dependency, &mut snapshot) {
            log::warn!("Rejected dependency {} -> {}: {}", id, depends_on, e);
            return Err(e);
        }
        log::debug!("Cycle check for {} -> {} loaded {} task(s)", id, depends_on, snapshot.loaded());

        let mut updated = task;
        updated.dependencies.push(dependency.id.clone());
        updated.status = status::status_after_dependency_added(updated.status, &dependency);
        updated.validate()?;

        let updated = self.store.update(&updated)?;
        log::info!("Task {} now depends on {} (status {})", id, depends_on, updated.status);
        Ok(updated)
    }

    /// Drop the edge `id -> depends_on`. Missing edges are a no-op.
    pub fn remove_dependency(&self, owner_id: &str, id: &str, depends_on: &str) -> Result<Task> {
        let _guard = self.locks.acquire(owner_id)?;
        let mut task = self.require(owner_id, id)?;

        if !graph::remove_dependency_edge(&mut task, depends_on) {
            log::debug!("Task {} has no dependency on {}", id, depends_on);
            return Ok(task);
        }
        task.status = status::status_after_dependency_removed(&task);

        let updated = self.store.update(&task)?;
        log::info!("Task {} no longer depends on {} (status {})", id, depends_on, updated.status);
        Ok(updated)
    }

    /// Tasks that `id` depends on.
    pub fn get_dependencies(&self, owner_id: &str, id: &str) -> Result<Vec<Task>> {
        let task = self.require(owner_id, id)?;
        self.load_all_owned(owner_id, &task.dependencies)
    }

    /// Tasks that list `id` among their dependencies.
    pub fn get_dependents(&self, owner_id: &str, id: &str) -> Result<Vec<Task>> {
        let task = self.require(owner_id, id)?;
        Ok(self.store.find_by_dependency(owner_id, &task.id)?)
    }

    /// The owner's tasks as a forest of top-level tasks with their subtasks.
    pub fn get_task_tree(&self, owner_id: &str) -> Result<Vec<TaskNode>> {
        Ok(graph::build_forest(self.list_tasks(owner_id)?))
    }

    /// Would `task_id -> candidate_id` close a cycle?
    ///
    /// Advisory only: takes no lock, and [`Self::add_dependency`] repeats
    /// the check under the lock before committing. Unknown ids yield false.
    pub fn validate_dependencies(&self, owner_id: &str, task_id: &str, candidate_id: &str) -> Result<bool> {
        if self.load_owned(owner_id, task_id)?.is_none() || self.load_owned(owner_id, candidate_id)?.is_none() {
            return Ok(false);
        }
        let mut snapshot = StoreSnapshot::new(&self.store, owner_id);
        graph::would_create_cycle(task_id, candidate_id, &mut snapshot)
    }

    fn load_owned(&self, owner_id: &str, id: &str) -> Result<Option<Task>> {
        Ok(self.store.get(id)?.filter(|t| t.owner_id == owner_id))
    }

    fn require(&self, owner_id: &str, id: &str) -> Result<Task> {
        self.load_owned(owner_id, id)?
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// Load the visible tasks among `ids`, skipping missing ones.
    fn load_all_owned(&self, owner_id: &str, ids: &[String]) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.load_owned(owner_id, id)? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    fn check_completion(&self, owner_id: &str, task: &Task) -> Result<()> {
        let parent = match &task.parent_id {
            Some(parent_id) => self.load_owned(owner_id, parent_id)?,
            None => None,
        };
        let subtasks = self.store.find(&TaskFilter::owner(owner_id).child_of(&task.id))?;
        let dependencies = self.load_all_owned(owner_id, &task.dependencies)?;

        let ctx = CompletionContext {
            parent: parent.as_ref(),
            subtasks: &subtasks,
            dependencies: &dependencies,
        };
        status::check_transition(task, Status::Completed, &ctx)
    }

    /// Dependents of `completed_id` that move from Blocked to ToDo.
    fn completion_cascade(&self, owner_id: &str, completed_id: &str) -> Result<Vec<Task>> {
        let dependents = self.store.find_by_dependency(owner_id, completed_id)?;

        let mut statuses: HashMap<String, Status> = HashMap::new();
        for dependent in dependents.iter().filter(|d| d.status == Status::Blocked) {
            for dep in &dependent.dependencies {
                if dep == completed_id || statuses.contains_key(dep) {
                    continue;
                }
                if let Some(t) = self.load_owned(owner_id, dep)? {
                    statuses.insert(t.id, t.status);
                }
            }
        }

        Ok(status::unblocked_dependents(completed_id, &dependents, &statuses))
    }
}
