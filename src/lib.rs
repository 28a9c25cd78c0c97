//! Taskgraph: tasks with one level of subtasks and a dependency graph.
//!
//! Tasks may depend on other tasks of the same owner. A task cannot be
//! completed before its parent, its subtasks and its dependencies; adding an
//! incomplete dependency blocks it, and completing a prerequisite unblocks
//! the tasks that were waiting only on it. Every new dependency edge is
//! checked for cycles before it is committed.
//!
//! # Example
//!
//! ```
//! use taskgraph::{MemoryStore, NewTask, Status, TaskPatch, TaskService};
//!
//! let service = TaskService::new(MemoryStore::new());
//!
//! let design = service.create_task("alice", NewTask::new("Design schema")).unwrap();
//! let build = service.create_task("alice", NewTask::new("Build API")).unwrap();
//!
//! // Build waits on design
//! let build = service.add_dependency("alice", &build.id, &design.id).unwrap();
//! assert_eq!(build.status, Status::Blocked);
//!
//! // Closing the loop is rejected
//! assert!(service.add_dependency("alice", &design.id, &build.id).is_err());
//!
//! // Completing design unblocks build
//! service
//!     .update_task("alice", &design.id, TaskPatch::status(Status::Completed))
//!     .unwrap();
//! assert_eq!(service.get_task("alice", &build.id).unwrap().status, Status::ToDo);
//! ```

mod id;
mod lock;
mod types;

pub mod config;
pub mod error;
pub mod graph;
pub mod service;
pub mod status;
pub mod storage;

// Re-export public API
pub use config::Config;
pub use error::{ErrorKind, Prerequisite, Result, TaskError};
pub use lock::{DEFAULT_LOCK_TIMEOUT, OwnerLocks};
pub use service::TaskService;
pub use storage::{ChangeSet, MemoryStore, ParentFilter, SqliteStore, TaskFilter, TaskStore};
pub use types::{DeleteSummary, NewTask, Priority, Status, Task, TaskNode, TaskPatch, ValidationError};
