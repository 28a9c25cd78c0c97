//! SQLite-backed task store.

use super::{ChangeSet, ParentFilter, TaskFilter, TaskStore};
use crate::types::{Priority, Status, Task};
use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Context, Result, bail, eyre};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const TASK_COLUMNS: &str =
    "id, owner_id, title, description, due_date, priority, status, parent_id, created_at, updated_at";

/// Durable task store in a single SQLite file.
pub struct SqliteStore {
    path: Option<PathBuf>,
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context("Failed to create database directory")?;
        }
        let db = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self {
            path: Some(path.to_path_buf()),
            db: Mutex::new(db),
        };
        store.init_schema()?;
        log::debug!("Opened task database at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self {
            path: None,
            db: Mutex::new(db),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Location of the database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| eyre!("database connection lock poisoned"))
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
                PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    due_date TEXT,
                    priority TEXT NOT NULL CHECK (priority IN ('low', 'medium', 'high')),
                    status TEXT NOT NULL CHECK (status IN ('to_do', 'in_progress', 'completed', 'blocked')),
                    parent_id TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);

                CREATE TABLE IF NOT EXISTS task_dependencies (
                    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    depends_on TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (task_id, depends_on)
                );
                CREATE INDEX IF NOT EXISTS idx_task_dependencies_target ON task_dependencies(depends_on);
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Number of stored tasks across all owners.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Insert or replace a task row and its dependency rows.
fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO tasks (id, owner_id, title, description, due_date, priority, status, parent_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            due_date = excluded.due_date,
            priority = excluded.priority,
            status = excluded.status,
            updated_at = excluded.updated_at
        "#,
        params![
            task.id,
            task.owner_id,
            task.title,
            task.description,
            task.due_date.map(format_timestamp),
            task.priority.as_str(),
            task.status.as_str(),
            task.parent_id,
            format_timestamp(task.created_at),
            format_timestamp(task.updated_at),
        ],
    )?;

    conn.execute("DELETE FROM task_dependencies WHERE task_id = ?", params![task.id])?;
    for (position, dep) in task.dependencies.iter().enumerate() {
        conn.execute(
            "INSERT INTO task_dependencies (task_id, depends_on, position) VALUES (?, ?, ?)",
            params![task.id, dep, position as i64],
        )?;
    }

    Ok(())
}

fn delete_task(conn: &Connection, id: &str) -> Result<bool> {
    conn.execute("DELETE FROM task_dependencies WHERE task_id = ?", params![id])?;
    let n = conn.execute("DELETE FROM tasks WHERE id = ?", params![id])?;
    Ok(n > 0)
}

fn created_at_of(conn: &Connection, id: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row("SELECT created_at FROM tasks WHERE id = ?", params![id], |row| row.get(0))
        .optional()?;
    Ok(raw.map(|s| parse_timestamp(&s)))
}

fn load_dependencies(conn: &Connection, task: &mut Task) -> Result<()> {
    let mut stmt =
        conn.prepare("SELECT depends_on FROM task_dependencies WHERE task_id = ? ORDER BY position")?;
    task.dependencies = stmt
        .query_map(params![task.id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(())
}

fn query_tasks(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut tasks = stmt
        .query_map(args, row_to_task)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    for task in &mut tasks {
        load_dependencies(conn, task)?;
    }
    Ok(tasks)
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a text column into `T`, reporting bad values as conversion failures.
fn parse_column<T: FromStr<Err = String>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Convert a database row to a Task (dependencies loaded separately).
fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let due_date_str: Option<String> = row.get(4)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Task {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_date: due_date_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        priority: parse_column::<Priority>(row, 5)?,
        status: parse_column::<Status>(row, 6)?,
        parent_id: row.get(7)?,
        dependencies: vec![],
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

impl TaskStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        let task = conn.query_row(&sql, params![id], row_to_task).optional()?;

        match task {
            Some(mut task) => {
                load_dependencies(&conn, &mut task)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let status = filter.status.map(|s| s.as_str());

        let mut sql = format!("SELECT {} FROM tasks WHERE owner_id = ?", TASK_COLUMNS);
        let mut args: Vec<&dyn rusqlite::ToSql> = vec![&filter.owner_id];
        match &filter.parent {
            ParentFilter::Any => {}
            ParentFilter::TopLevel => sql.push_str(" AND parent_id IS NULL"),
            ParentFilter::ChildOf(id) => {
                sql.push_str(" AND parent_id = ?");
                args.push(id);
            }
        }
        if let Some(status) = &status {
            sql.push_str(" AND status = ?");
            args.push(status);
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        query_tasks(&conn, &sql, &args)
    }

    fn find_by_dependency(&self, owner_id: &str, task_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM tasks
            WHERE owner_id = ?1
            AND id IN (SELECT task_id FROM task_dependencies WHERE depends_on = ?2)
            ORDER BY created_at ASC, rowid ASC
            "#,
            TASK_COLUMNS
        );
        query_tasks(&conn, &sql, &[&owner_id, &task_id])
    }

    fn create(&self, task: &Task) -> Result<Task> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if created_at_of(&tx, &task.id)?.is_some() {
            bail!("task already exists: {}", task.id);
        }

        let now = Utc::now();
        let stored = Task {
            created_at: now,
            updated_at: now,
            ..task.clone()
        };
        write_task(&tx, &stored).context("Failed to insert task")?;
        tx.commit()?;

        Ok(stored)
    }

    fn update(&self, task: &Task) -> Result<Task> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let stored = update_in(&tx, task, Utc::now())?;
        tx.commit()?;
        Ok(stored)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existed = delete_task(&tx, id)?;
        tx.commit()?;
        Ok(existed)
    }

    fn delete_many(&self, filter: &TaskFilter) -> Result<usize> {
        let ids: Vec<String> = self.find(filter)?.into_iter().map(|t| t.id).collect();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in &ids {
            if delete_task(&tx, id)? {
                removed += 1;
            }
        }
        tx.commit()?;

        Ok(removed)
    }

    fn commit(&self, changes: &ChangeSet) -> Result<Vec<Task>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let now = Utc::now();
        let mut updated = Vec::with_capacity(changes.updates.len());
        for task in &changes.updates {
            updated.push(update_in(&tx, task, now)?);
        }
        for id in &changes.deletes {
            delete_task(&tx, id)?;
        }

        // Dropping the transaction on any error above rolls everything back.
        tx.commit().context("Failed to commit change set")?;
        Ok(updated)
    }
}

fn update_in(tx: &Transaction<'_>, task: &Task, now: DateTime<Utc>) -> Result<Task> {
    let Some(created_at) = created_at_of(tx, &task.id)? else {
        bail!("cannot update missing task: {}", task.id);
    };
    let stored = Task {
        created_at,
        updated_at: now,
        ..task.clone()
    };
    write_task(tx, &stored).context("Failed to update task")?;
    Ok(stored)
}
