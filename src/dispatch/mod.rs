//! Dispatch channel: the synchronous call that hands a task to the worker.
//!
//! From the caller's side a send is one request/response round trip. The
//! caller picks the timeout; dropping an in-flight send cancels a worker-side
//! rate-limiter wait but not work that has already started.

mod http;
mod local;

pub use http::HttpDispatch;
pub use local::LocalDispatch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Stage, Task, TaskId};

/// What the generator sends to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: i32,
    pub value: i32,
}

impl From<&Task> for TaskRequest {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            value: task.value,
        }
    }
}

/// The worker's reply to a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub id: TaskId,
    pub status: AckStatus,
}

impl Ack {
    pub fn processed(id: TaskId) -> Self {
        Self {
            id,
            status: AckStatus::Processed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Processed,
}

/// Error body returned by the worker when processing fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    pub error: String,
    pub stage: Option<Stage>,
}

/// Hands one task to the worker and waits for its outcome.
#[async_trait]
pub trait DispatchChannel: Send + Sync {
    async fn send(&self, request: TaskRequest) -> Result<Ack>;
}
