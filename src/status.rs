//! Status state machine and its cascades.
//!
//! Manual transitions are free between all four states except that entering
//! `Completed` requires the parent, every subtask and every dependency to be
//! `Completed` already. Dependency edits and completions then adjust the
//! status of the affected tasks:
//!
//! - adding an incomplete dependency forces `Blocked`
//! - removing the last dependency of a `Blocked` task reverts it to `ToDo`
//! - completing a task moves each `Blocked` dependent whose dependencies are
//!   now all `Completed` back to `ToDo` (one hop only)

use crate::error::{Prerequisite, Result, TaskError};
use crate::types::{Status, Task};
use std::collections::HashMap;

/// Everything needed to decide whether a task may become `Completed`.
#[derive(Debug, Default)]
pub struct CompletionContext<'a> {
    pub parent: Option<&'a Task>,
    pub subtasks: &'a [Task],
    pub dependencies: &'a [Task],
}

/// Check a manual transition of `task` to `target`.
///
/// Only `Completed` is gated. Prerequisites are checked in the order parent,
/// subtasks, dependencies; the first failing one is reported.
pub fn check_transition(task: &Task, target: Status, ctx: &CompletionContext<'_>) -> Result<()> {
    if target != Status::Completed {
        return Ok(());
    }

    if let Some(parent) = ctx.parent
        && !parent.status.is_completed()
    {
        log::warn!("Refusing to complete {}: parent {} incomplete", task.id, parent.id);
        return Err(TaskError::PrerequisiteNotMet(Prerequisite::Parent));
    }

    if let Some(open) = ctx.subtasks.iter().find(|t| !t.status.is_completed()) {
        log::warn!("Refusing to complete {}: subtask {} incomplete", task.id, open.id);
        return Err(TaskError::PrerequisiteNotMet(Prerequisite::Subtasks));
    }

    if let Some(open) = ctx.dependencies.iter().find(|t| !t.status.is_completed()) {
        log::warn!("Refusing to complete {}: dependency {} incomplete", task.id, open.id);
        return Err(TaskError::PrerequisiteNotMet(Prerequisite::Dependencies));
    }

    Ok(())
}

/// Status of a task right after `dependency` was added to it.
pub fn status_after_dependency_added(current: Status, dependency: &Task) -> Status {
    if dependency.status.is_completed() {
        current
    } else {
        Status::Blocked
    }
}

/// Status of a task right after one of its dependencies was removed.
///
/// Only an empty dependency set unblocks; a remaining set of all-completed
/// dependencies does not.
pub fn status_after_dependency_removed(task: &Task) -> Status {
    if task.dependencies.is_empty() && task.status == Status::Blocked {
        Status::ToDo
    } else {
        task.status
    }
}

/// Dependents to move from `Blocked` to `ToDo` after `completed_id` completed.
///
/// `statuses` must hold the current status of every dependency of every
/// blocked dependent; ids missing from it are treated as satisfied.
/// `completed_id` is always treated as `Completed`. Returns the changed
/// records, in input order.
pub fn unblocked_dependents(
    completed_id: &str,
    dependents: &[Task],
    statuses: &HashMap<String, Status>,
) -> Vec<Task> {
    dependents
        .iter()
        .filter(|d| d.status == Status::Blocked)
        .filter(|d| {
            d.dependencies.iter().all(|dep| {
                dep == completed_id || statuses.get(dep).is_none_or(|s| s.is_completed())
            })
        })
        .map(|d| {
            log::debug!("Unblocking {} after {} completed", d.id, completed_id);
            Task {
                status: Status::ToDo,
                ..d.clone()
            }
        })
        .collect()
}
