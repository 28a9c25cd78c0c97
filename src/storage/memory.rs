//! In-memory task store.

use super::{ChangeSet, TaskFilter, TaskStore};
use crate::types::Task;
use chrono::Utc;
use eyre::{Result, bail, eyre};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<String, (u64, Task)>,
    next_seq: u64,
}

impl Inner {
    fn sorted(&self, mut pred: impl FnMut(&Task) -> bool) -> Vec<Task> {
        let mut hits: Vec<&(u64, Task)> = self.tasks.values().filter(|(_, t)| pred(t)).collect();
        hits.sort_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, t)| t.clone()).collect()
    }
}

/// Task store held entirely in memory.
///
/// Preserves insertion order for queries. [`MemoryStore::set_unavailable`]
/// makes every call fail, which is how tests simulate an outage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored tasks across all owners.
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("memory store is unavailable");
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.check_available()?;
        self.inner.read().map_err(|_| eyre!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.check_available()?;
        self.inner.write().map_err(|_| eyre!("memory store lock poisoned"))
    }
}

impl TaskStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.read()?.tasks.get(id).map(|(_, t)| t.clone()))
    }

    fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.read()?.sorted(|t| filter.matches(t)))
    }

    fn find_by_dependency(&self, owner_id: &str, task_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .read()?
            .sorted(|t| t.owner_id == owner_id && t.depends_on(task_id)))
    }

    fn create(&self, task: &Task) -> Result<Task> {
        let mut inner = self.write()?;
        if inner.tasks.contains_key(&task.id) {
            bail!("task already exists: {}", task.id);
        }
        let now = Utc::now();
        let stored = Task {
            created_at: now,
            updated_at: now,
            ..task.clone()
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tasks.insert(stored.id.clone(), (seq, stored.clone()));
        Ok(stored)
    }

    fn update(&self, task: &Task) -> Result<Task> {
        let mut inner = self.write()?;
        let Some((_, existing)) = inner.tasks.get_mut(&task.id) else {
            bail!("cannot update missing task: {}", task.id);
        };
        *existing = Task {
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..task.clone()
        };
        Ok(existing.clone())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.tasks.remove(id).is_some())
    }

    fn delete_many(&self, filter: &TaskFilter) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.tasks.len();
        inner.tasks.retain(|_, (_, t)| !filter.matches(t));
        Ok(before - inner.tasks.len())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<Vec<Task>> {
        let mut inner = self.write()?;

        // Validate the whole batch before touching anything.
        for task in &changes.updates {
            if !inner.tasks.contains_key(&task.id) {
                bail!("cannot update missing task: {}", task.id);
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(changes.updates.len());
        for task in &changes.updates {
            if let Some((_, existing)) = inner.tasks.get_mut(&task.id) {
                *existing = Task {
                    created_at: existing.created_at,
                    updated_at: now,
                    ..task.clone()
                };
                updated.push(existing.clone());
            }
        }
        for id in &changes.deletes {
            inner.tasks.remove(id);
        }

        Ok(updated)
    }
}
