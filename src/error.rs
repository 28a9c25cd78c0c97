//! Error types for task graph operations.

use crate::types::ValidationError;
use std::fmt;

/// Result alias used throughout the engine and service.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Which completion prerequisite was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    /// The task's parent is not Completed.
    Parent,
    /// At least one subtask is not Completed.
    Subtasks,
    /// At least one dependency is not Completed.
    Dependencies,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prerequisite::Parent => write!(f, "parent task must be completed first"),
            Prerequisite::Subtasks => write!(f, "all subtasks must be completed first"),
            Prerequisite::Dependencies => write!(f, "all dependencies must be completed first"),
        }
    }
}

/// Coarse classification of a [`TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Structural,
    Prerequisite,
    Unavailable,
}

/// Errors returned by task graph operations.
///
/// Everything except `Unavailable` kinds is detected before any write and
/// leaves the store untouched.
#[derive(Debug)]
pub enum TaskError {
    /// Task missing or owned by someone else.
    NotFound(String),
    /// Parent task missing or owned by someone else.
    ParentNotFound(String),
    /// Required field missing or malformed.
    Validation(ValidationError),
    /// The requested parent is itself a subtask.
    ParentAlreadyNested(String),
    /// A task cannot depend on itself.
    SelfDependency(String),
    /// The dependency edge already exists.
    DuplicateDependency { task: String, dependency: String },
    /// Adding the edge would close a cycle.
    CycleDetected { task: String, dependency: String },
    /// Completion refused.
    PrerequisiteNotMet(Prerequisite),
    /// The owner's graph lock could not be acquired in time.
    LockTimeout(String),
    /// The task store failed.
    StoreUnavailable(eyre::Report),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::NotFound(_) | TaskError::ParentNotFound(_) => ErrorKind::NotFound,
            TaskError::Validation(_) => ErrorKind::Validation,
            TaskError::ParentAlreadyNested(_)
            | TaskError::SelfDependency(_)
            | TaskError::DuplicateDependency { .. }
            | TaskError::CycleDetected { .. } => ErrorKind::Structural,
            TaskError::PrerequisiteNotMet(_) => ErrorKind::Prerequisite,
            TaskError::LockTimeout(_) | TaskError::StoreUnavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// True if the same call may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::NotFound(id) => write!(f, "task not found: {}", id),
            TaskError::ParentNotFound(id) => write!(f, "parent task not found: {}", id),
            TaskError::Validation(e) => write!(f, "validation error: {}", e),
            TaskError::ParentAlreadyNested(id) => {
                write!(f, "subtasks cannot have subtasks: {} is already a subtask", id)
            }
            TaskError::SelfDependency(id) => write!(f, "task cannot depend on itself: {}", id),
            TaskError::DuplicateDependency { task, dependency } => {
                write!(f, "dependency already exists: {} -> {}", task, dependency)
            }
            TaskError::CycleDetected { task, dependency } => {
                write!(f, "circular dependency detected: {} -> {}", task, dependency)
            }
            TaskError::PrerequisiteNotMet(p) => write!(f, "prerequisite not met: {}", p),
            TaskError::LockTimeout(owner) => {
                write!(f, "timed out waiting for the task graph lock of owner {}", owner)
            }
            TaskError::StoreUnavailable(e) => write!(f, "task store unavailable: {:#}", e),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Validation(e) => Some(e),
            TaskError::StoreUnavailable(e) => Some(e.root_cause()),
            _ => None,
        }
    }
}

impl From<ValidationError> for TaskError {
    fn from(e: ValidationError) -> Self {
        TaskError::Validation(e)
    }
}

impl From<eyre::Report> for TaskError {
    fn from(e: eyre::Report) -> Self {
        TaskError::StoreUnavailable(e)
    }
}
