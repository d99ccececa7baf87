//! Task state store: the narrow persistence contract the pipeline runs against.
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! single-process runs, and [`crate::db::Db`] backed by Postgres.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::model::{State, Task, TaskId};

/// Persists task records and enforces forward-only transitions.
///
/// Implementations serialize writes per task; writes to different tasks may
/// run in parallel.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a new task in `received` and return its id.
    async fn create(&self, task_type: i32, value: i32) -> Result<TaskId>;

    /// Move a task to `to`. Fails with [`Error::InvalidTransition`] unless the
    /// task is currently in `to`'s predecessor; a rejected transition leaves
    /// the record untouched.
    async fn transition(&self, id: TaskId, to: State) -> Result<()>;

    async fn get(&self, id: TaskId) -> Result<Task>;

    async fn list_by_state(&self, state: State) -> Result<Vec<Task>>;
}

/// Validate a transition against the current state.
pub(crate) fn validate_transition(id: TaskId, from: State, to: State) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { id, from, to })
    }
}

/// Tasks left in `received` or `processing` whose last update is older than
/// `older_than`. These are the rows a failed dispatch or a failed `done`
/// write leaves behind; reconciling them is an operator's job.
///
/// A threshold that puts the cutoff outside the representable time range is
/// an [`Error::Config`].
pub async fn stranded(store: &dyn StateStore, older_than: chrono::Duration) -> Result<Vec<Task>> {
    let cutoff = Utc::now().checked_sub_signed(older_than).ok_or_else(|| {
        Error::Config(format!("stranded threshold out of range: {older_than}"))
    })?;
    let mut tasks = Vec::new();
    for state in [State::Received, State::Processing] {
        tasks.extend(
            store
                .list_by_state(state)
                .await?
                .into_iter()
                .filter(|t| t.last_update_time <= cutoff),
        );
    }
    tasks.sort_by_key(|t| t.id);
    Ok(tasks)
}
