//! Core data model.
//!
//! A task is a unit of work with a type, a value (which doubles as its
//! simulated work duration) and a strictly forward lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the store on creation. Never changes.
    pub id: TaskId,

    /// Task category, used for per-type accounting.
    pub task_type: i32,

    /// Task payload. Also the simulated work duration in time units.
    pub value: i32,

    /// Current lifecycle state.
    pub state: State,

    pub creation_time: DateTime<Utc>,

    /// Moves forward on, and only on, a successful transition.
    pub last_update_time: DateTime<Utc>,
}

/// Newtype for store-assigned task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(TaskId)
            .map_err(|e| Error::Other(format!("bad task id {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
///
/// Transitions are strictly forward: `Received -> Processing -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Created by the generator, not yet picked up.
    Received,
    /// Worker holds a rate-limiter token and is doing the work.
    Processing,
    /// Terminal.
    Done,
}

impl State {
    pub const ALL: [State; 3] = [State::Received, State::Processing, State::Done];

    /// The only state a task may be in before entering `self`.
    /// `None` for the initial state, which is only ever set by create.
    pub fn predecessor(self) -> Option<State> {
        match self {
            State::Received => None,
            State::Processing => Some(State::Received),
            State::Done => Some(State::Processing),
        }
    }

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        to.predecessor() == Some(self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Received => "received",
            State::Processing => "processing",
            State::Done => "done",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(State::Received),
            "processing" => Ok(State::Processing),
            "done" => Ok(State::Done),
            other => Err(Error::Other(format!("unknown task state: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline step at which a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Generator: persisting the new task.
    Create,
    /// Generator: handing the task to the worker.
    Dispatch,
    /// Worker: waiting for a rate-limiter token.
    RateLimit,
    /// Worker: `received -> processing`.
    MarkProcessing,
    /// Worker: `processing -> done`. Failing here strands the task.
    MarkDone,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Create => "create",
            Stage::Dispatch => "dispatch",
            Stage::RateLimit => "rate_limit",
            Stage::MarkProcessing => "mark_processing",
            Stage::MarkDone => "mark_done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
