//! CLI argument parsing for taskgraph.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskgraph::{Priority, Status};

#[derive(Parser)]
#[command(
    name = "tg",
    about = "Tasks, subtasks and dependencies with automatic unblocking",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/taskgraph/logs/taskgraph.log"
)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the task database (overrides config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Owner to act as (overrides config)
    #[arg(short = 'o', long, global = true)]
    pub owner: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new task
    Create {
        /// Task title
        title: String,

        /// Create as a subtask of this task
        #[arg(long)]
        parent: Option<String>,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Create a subtask under a top-level task
    Subtask {
        /// Parent task ID
        parent_id: String,

        /// Subtask title
        title: String,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Get a task by ID
    Get {
        /// Task ID
        id: String,
    },

    /// List all tasks
    List,

    /// Update a task
    Update {
        /// Task ID
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New status (to_do, in_progress, completed, blocked)
        #[arg(short, long)]
        status: Option<Status>,

        /// New priority (low, medium, high)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// New description
        #[arg(short = 'D', long, conflicts_with = "clear_description")]
        description: Option<String>,

        /// Remove the description
        #[arg(long)]
        clear_description: bool,

        /// New due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_due_date, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task with its subtasks
    Delete {
        /// Task ID
        id: String,
    },

    /// Make a task depend on another
    Depend {
        /// Task that waits
        id: String,

        /// Task that must be completed first
        depends_on: String,
    },

    /// Remove a dependency
    Undepend {
        /// Task that waits
        id: String,

        /// Dependency to remove
        depends_on: String,
    },

    /// Show the tasks a task depends on
    Deps {
        /// Task ID
        id: String,
    },

    /// Show the tasks that depend on a task
    Dependents {
        /// Task ID
        id: String,
    },

    /// Show tasks with their subtasks
    Tree,

    /// Check whether adding a dependency would create a cycle
    Check {
        /// Task that would wait
        id: String,

        /// Candidate dependency
        depends_on: String,
    },
}

/// Optional fields shared by the create commands.
#[derive(clap::Args)]
pub struct TaskFields {
    /// Priority (low, medium, high)
    #[arg(short, long)]
    pub priority: Option<Priority>,

    /// Description
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// Due date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_due_date)]
    pub due: Option<DateTime<Utc>>,
}

/// Accept a bare date (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_due_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", s))
}
