//! tg - tasks, subtasks and dependencies from the command line.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::Path;
use taskgraph::{Config, NewTask, SqliteStore, Status, Task, TaskNode, TaskPatch, TaskService};

mod cli;

use cli::{Cli, Command, TaskFields};

fn setup_logging(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskgraph.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn format_status(status: &Status) -> ColoredString {
    match status {
        Status::ToDo => "to_do".green(),
        Status::InProgress => "in_progress".yellow(),
        Status::Blocked => "blocked".red(),
        Status::Completed => "completed".blue(),
    }
}

fn print_task(task: &Task, indent: &str) {
    let due = task
        .due_date
        .map(|d| format!(" due {}", d.format("%Y-%m-%d")))
        .unwrap_or_default();
    let deps = if task.dependencies.is_empty() {
        String::new()
    } else {
        format!(" <- [{}]", task.dependencies.join(", "))
    };
    println!(
        "{}{} {} {} {}{}{}",
        indent,
        format_status(&task.status),
        task.id.cyan(),
        task.priority,
        task.title,
        due.dimmed(),
        deps.dimmed()
    );
    if let Some(description) = &task.description {
        println!("{}    {}", indent, description.dimmed());
    }
}

fn print_tasks(tasks: &[Task], empty: &str) {
    if tasks.is_empty() {
        println!("{}", empty.dimmed());
    }
    for task in tasks {
        print_task(task, "");
    }
}

fn print_tree(forest: &[TaskNode]) {
    if forest.is_empty() {
        println!("{}", "No tasks found".dimmed());
    }
    for node in forest {
        print_task(&node.task, "");
        for subtask in &node.subtasks {
            print_task(subtask, "  └ ");
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn new_task(title: String, parent: Option<String>, fields: TaskFields) -> NewTask {
    NewTask {
        title,
        description: fields.description,
        due_date: fields.due,
        priority: fields.priority,
        parent_id: parent,
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    setup_logging(&config.log_dir).context("Failed to setup logging")?;
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    let db_path = cli.db.clone().unwrap_or_else(|| config.database.clone());
    let owner = cli
        .owner
        .clone()
        .or_else(|| config.owner.clone())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "local".to_string());

    let store = SqliteStore::open(&db_path).context("Failed to open task database")?;
    let service = TaskService::with_lock_timeout(store, config.lock_timeout());
    let json = cli.json;

    match cli.command {
        Command::Create { title, parent, fields } => {
            let task = service
                .create_task(&owner, new_task(title, parent, fields))
                .context("Failed to create task")?;
            if json {
                print_json(&task)?;
            } else {
                println!("{} Created: {} {}", "✓".green(), task.id.cyan(), task.title);
            }
        }

        Command::Subtask {
            parent_id,
            title,
            fields,
        } => {
            let task = service
                .create_subtask(&owner, &parent_id, new_task(title, None, fields))
                .context("Failed to create subtask")?;
            if json {
                print_json(&task)?;
            } else {
                println!(
                    "{} Created subtask: {} {} under {}",
                    "✓".green(),
                    task.id.cyan(),
                    task.title,
                    parent_id.cyan()
                );
            }
        }

        Command::Get { id } => {
            let task = service.get_task(&owner, &id).context("Failed to get task")?;
            if json {
                print_json(&task)?;
            } else {
                print_task(&task, "");
            }
        }

        Command::List => {
            let tasks = service.list_tasks(&owner).context("Failed to list tasks")?;
            if json {
                print_json(&tasks)?;
            } else {
                print_tasks(&tasks, "No tasks found");
            }
        }

        Command::Update {
            id,
            title,
            status,
            priority,
            description,
            clear_description,
            due,
            clear_due,
        } => {
            let patch = TaskPatch {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                due_date: if clear_due { Some(None) } else { due.map(Some) },
                priority,
                status,
            };
            if patch.is_empty() {
                eyre::bail!("Nothing to update");
            }
            let task = service
                .update_task(&owner, &id, patch)
                .context("Failed to update task")?;
            if json {
                print_json(&task)?;
            } else {
                println!("{} Updated: {} {}", "✓".green(), task.id.cyan(), format_status(&task.status));
            }
        }

        Command::Delete { id } => {
            let summary = service.delete_task(&owner, &id).context("Failed to delete task")?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "{} Deleted {} task(s); removed references from {} task(s)",
                    "✓".green(),
                    summary.deleted.len(),
                    summary.pruned.len()
                );
            }
        }

        Command::Depend { id, depends_on } => {
            let task = service
                .add_dependency(&owner, &id, &depends_on)
                .context("Failed to add dependency")?;
            if json {
                print_json(&task)?;
            } else {
                println!(
                    "{} {} now depends on {} ({})",
                    "✓".green(),
                    id.cyan(),
                    depends_on.cyan(),
                    format_status(&task.status)
                );
            }
        }

        Command::Undepend { id, depends_on } => {
            let task = service
                .remove_dependency(&owner, &id, &depends_on)
                .context("Failed to remove dependency")?;
            if json {
                print_json(&task)?;
            } else {
                println!(
                    "{} {} no longer depends on {} ({})",
                    "✓".green(),
                    id.cyan(),
                    depends_on.cyan(),
                    format_status(&task.status)
                );
            }
        }

        Command::Deps { id } => {
            let tasks = service
                .get_dependencies(&owner, &id)
                .context("Failed to get dependencies")?;
            if json {
                print_json(&tasks)?;
            } else {
                print_tasks(&tasks, "No dependencies");
            }
        }

        Command::Dependents { id } => {
            let tasks = service
                .get_dependents(&owner, &id)
                .context("Failed to get dependents")?;
            if json {
                print_json(&tasks)?;
            } else {
                print_tasks(&tasks, "No dependents");
            }
        }

        Command::Tree => {
            let forest = service.get_task_tree(&owner).context("Failed to build task tree")?;
            if json {
                print_json(&forest)?;
            } else {
                print_tree(&forest);
            }
        }

        Command::Check { id, depends_on } => {
            let has_cycle = service
                .validate_dependencies(&owner, &id, &depends_on)
                .context("Failed to check dependency")?;
            if json {
                print_json(&serde_json::json!({ "has_cycle": has_cycle }))?;
            } else if has_cycle {
                println!("{} {} -> {} would create a cycle", "✗".red(), id.cyan(), depends_on.cyan());
            } else {
                println!("{} {} -> {} is safe", "✓".green(), id.cyan(), depends_on.cyan());
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
