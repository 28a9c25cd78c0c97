//! Core data types for the task graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// A unit of work, optionally nested one level under a parent task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier: "tk-" + 10 hex chars
    pub id: String,

    /// Owning user; every operation is scoped to one owner
    pub owner_id: String,

    /// Short description of the work
    pub title: String,

    /// Optional longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    pub priority: Priority,

    pub status: Status,

    /// Parent task; absent for top-level tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Ids of the tasks this task depends on (duplicate-free)
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Maintained by the store
    pub created_at: DateTime<Utc>,

    /// Maintained by the store
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// True if this task has no parent.
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True if `id` is one of this task's dependencies.
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d == id)
    }

    /// Validate the task's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;

        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::SelfParent);
        }

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if dep == &self.id {
                return Err(ValidationError::SelfDependency);
            }
            if !seen.insert(dep.as_str()) {
                return Err(ValidationError::DuplicateDependency(dep.clone()));
            }
        }

        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidTimestamp);
        }

        Ok(())
    }
}

/// Check a title on its own, before a task record exists.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong);
    }
    if title.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    ToDo,
    InProgress,
    Completed,
    Blocked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::ToDo => "to_do",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Blocked => "blocked",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Status::Completed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "to_do" | "todo" => Ok(Status::ToDo),
            "in_progress" => Ok(Status::InProgress),
            "completed" | "done" => Ok(Status::Completed),
            "blocked" => Ok(Status::Blocked),
            other => Err(format!(
                "unknown status '{}': expected to_do, in_progress, completed or blocked",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}': expected low, medium or high", other)),
        }
    }
}

/// Input for creating a task or subtask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Create as a subtask of this task
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Partial update of a task. `None` leaves a field unchanged; for the
/// clearable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<Status>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }
}

/// A top-level task together with its direct subtasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks: Vec<Task>,
}

/// Outcome of a cascading delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteSummary {
    /// The task and its subtasks
    pub deleted: Vec<String>,
    /// Tasks whose dependency sets referenced a deleted task
    pub pruned: Vec<String>,
}

/// Validation errors for task records.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTitle,
    TitleTooLong,
    InvalidCharacters,
    SelfParent,
    SelfDependency,
    DuplicateDependency(String),
    InvalidTimestamp,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyTitle => write!(f, "title is required"),
            ValidationError::TitleTooLong => write!(f, "title exceeds {} characters", MAX_TITLE_LEN),
            ValidationError::InvalidCharacters => write!(f, "title contains control characters"),
            ValidationError::SelfParent => write!(f, "task cannot be its own parent"),
            ValidationError::SelfDependency => write!(f, "task cannot depend on itself"),
            ValidationError::DuplicateDependency(id) => write!(f, "dependency listed twice: {}", id),
            ValidationError::InvalidTimestamp => write!(f, "updated_at cannot be before created_at"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(title: &str) -> Task {
        let now = Utc::now();
        Task {
            id: "tk-test000001".to_string(),
            owner_id: "alice".to_string(),
            title: title.to_string(),
            description: None,
            due_date: None,
            priority: Priority::default(),
            status: Status::default(),
            parent_id: None,
            dependencies: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_task_validation_valid() {
        let task = make_task("Valid title");
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_task_validation_empty_title() {
        assert_eq!(make_task("").validate(), Err(ValidationError::EmptyTitle));
        assert_eq!(make_task("   ").validate(), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_task_validation_title_too_long() {
        let task = make_task(&"x".repeat(MAX_TITLE_LEN + 1));
        assert_eq!(task.validate(), Err(ValidationError::TitleTooLong));
    }

    #[test]
    fn test_task_validation_control_chars() {
        let task = make_task("Title\x00with null");
        assert_eq!(task.validate(), Err(ValidationError::InvalidCharacters));
    }

    #[test]
    fn test_task_validation_self_dependency() {
        let mut task = make_task("Task");
        task.dependencies = vec![task.id.clone()];
        assert_eq!(task.validate(), Err(ValidationError::SelfDependency));
    }

    #[test]
    fn test_task_validation_duplicate_dependency() {
        let mut task = make_task("Task");
        task.dependencies = vec!["tk-a".to_string(), "tk-b".to_string(), "tk-a".to_string()];
        assert_eq!(
            task.validate(),
            Err(ValidationError::DuplicateDependency("tk-a".to_string()))
        );
    }

    #[test]
    fn test_task_validation_self_parent() {
        let mut task = make_task("Task");
        assert!(task.is_top_level());
        task.parent_id = Some(task.id.clone());
        assert!(!task.is_top_level());
        assert_eq!(task.validate(), Err(ValidationError::SelfParent));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Status::default(), Status::ToDo);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("to_do".parse::<Status>(), Ok(Status::ToDo));
        assert_eq!("To Do".parse::<Status>(), Ok(Status::ToDo));
        assert_eq!("in-progress".parse::<Status>(), Ok(Status::InProgress));
        assert_eq!("Completed".parse::<Status>(), Ok(Status::Completed));
        assert!("finished".parse::<Status>().is_err());
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_task_node_flattens_task() {
        let node = TaskNode {
            task: make_task("Parent"),
            subtasks: vec![],
        };
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["title"], "Parent");
        assert!(value["subtasks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        assert!(!TaskPatch::status(Status::Completed).is_empty());
    }
}
