use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::engine::CLOSE_ALL;
use crate::error::TaskError;

use super::Task;

#[derive(Debug)]
struct Entry {
    generation: u64,
    task: Weak<Task>,
}

/// Running tasks by id. Tracks which tasks are active without owning them.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as running under `generation`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` while a live task holds the id.
    pub fn register(&self, id: &str, generation: u64, task: Weak<Task>) -> Result<(), TaskError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(id)
            && existing.task.strong_count() > 0
        {
            return Err(TaskError::AlreadyRunning { id: id.to_owned() });
        }
        entries.insert(id.to_owned(), Entry { generation, task });
        Ok(())
    }

    /// Removes `id` if it is still registered under `generation`.
    pub fn unregister(&self, id: &str, generation: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(id) {
            Some(entry) if entry.generation == generation => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Arc<Task>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|entry| entry.task.upgrade())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lookup(id).is_some()
    }

    /// Stops every worker of a running task.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when no live task is registered under `id`.
    pub fn stop(&self, id: &str) -> Result<(), TaskError> {
        let task = self
            .lookup(id)
            .ok_or_else(|| TaskError::NotRunning { id: id.to_owned() })?;
        task.stop(CLOSE_ALL);
        Ok(())
    }

    #[must_use]
    pub fn running_ids(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.task.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }
}
