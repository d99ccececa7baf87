//! Error types for taskline.
//!
//! Every failure on the task path carries the task id and the [`Stage`] it
//! happened at, so callers can tell a store failure on create apart from a
//! cancelled rate-limiter wait or a stranded `processing` row.

use thiserror::Error;

use crate::model::{Stage, State, TaskId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid state transition for task {id}: {from} -> {to}")]
    InvalidTransition { id: TaskId, from: State, to: State },

    #[error("rate limiter wait cancelled")]
    Cancelled,

    #[error("dispatch of task {id} failed: {reason}")]
    Dispatch { id: TaskId, reason: String },

    #[error("failed to create task (type {task_type}, value {value}): {source}")]
    Create {
        task_type: i32,
        value: i32,
        #[source]
        source: Box<Error>,
    },

    #[error("task {id} failed at {stage}: {source}")]
    Stage {
        id: TaskId,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap `self` as a failure of task `id` at `stage`.
    pub fn at(self, id: TaskId, stage: Stage) -> Self {
        Error::Stage {
            id,
            stage,
            source: Box::new(self),
        }
    }

    /// The pipeline stage this error was reported at, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::Create { .. } => Some(Stage::Create),
            _ => None,
        }
    }

    /// The innermost error, with stage wrappers peeled off.
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } | Error::Create { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
