//! In-process state store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{StateStore, validate_transition};
use crate::error::{Error, Result};
use crate::model::{State, Task, TaskId};

/// `StateStore` held in a mutex-guarded map. Ids start at 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    tasks: BTreeMap<TaskId, Task>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Every mutation is a single insert or field assignment.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create(&self, task_type: i32, value: i32) -> Result<TaskId> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = TaskId(inner.next_id);
        let now = Utc::now();
        inner.tasks.insert(
            id,
            Task {
                id,
                task_type,
                value,
                state: State::Received,
                creation_time: now,
                last_update_time: now,
            },
        );
        Ok(id)
    }

    async fn transition(&self, id: TaskId, to: State) -> Result<()> {
        let mut inner = self.lock();
        let task = inner.tasks.get_mut(&id).ok_or(Error::NotFound(id))?;
        validate_transition(id, task.state, to)?;
        task.state = to;
        task.last_update_time = Utc::now().max(task.last_update_time);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        self.lock().tasks.get(&id).cloned().ok_or(Error::NotFound(id))
    }

    async fn list_by_state(&self, state: State) -> Result<Vec<Task>> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| t.state == state)
            .cloned()
            .collect())
    }
}
