//! Task queries: create, conditional state transition, lookups.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{State, Task, TaskId};
use crate::store::StateStore;

const GET_TASK: &str = "SELECT id, type, value, state, creation_time, last_update_time
     FROM tasks WHERE id = $1";

const LIST_BY_STATE: &str = "SELECT id, type, value, state, creation_time, last_update_time
     FROM tasks WHERE state = $1 ORDER BY id";

#[async_trait]
impl StateStore for super::Db {
    async fn create(&self, task_type: i32, value: i32) -> Result<TaskId> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO tasks (type, value, state) VALUES ($1, $2, 'received') RETURNING id",
        )
        .bind(task_type)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        Ok(TaskId(id))
    }

    /// Single-row conditional update: the row only moves if it is still in
    /// the predecessor state, so two concurrent writers cannot both win.
    async fn transition(&self, id: TaskId, to: State) -> Result<()> {
        let Some(from) = to.predecessor() else {
            // Nothing transitions into the initial state; report what's there.
            let current = self.get(id).await?;
            return Err(Error::InvalidTransition {
                id,
                from: current.state,
                to,
            });
        };

        let rows_affected = sqlx::query(
            "UPDATE tasks SET state = $1, last_update_time = GREATEST(now(), last_update_time)
             WHERE id = $2 AND state = $3",
        )
        .bind(to.as_str())
        .bind(id.0)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Either the row is missing (get reports NotFound) or it is in
            // some other state.
            let current = self.get(id).await?;
            return Err(Error::InvalidTransition {
                id,
                from: current.state,
                to,
            });
        }

        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as(GET_TASK)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(Error::NotFound(id))?.try_into_task()
    }

    async fn list_by_state(&self, state: State) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(LIST_BY_STATE)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    #[sqlx(rename = "type")]
    task_type: i32,
    value: i32,
    state: String,
    creation_time: chrono::DateTime<chrono::Utc>,
    last_update_time: chrono::DateTime<chrono::Utc>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            task_type: self.task_type,
            value: self.value,
            state: self.state.parse()?,
            creation_time: self.creation_time,
            last_update_time: self.last_update_time,
        })
    }
}
