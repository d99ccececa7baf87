//! Task span helpers.
//!
//! One span per task per side of the pipeline, with state transitions
//! recorded as events inside it.

use tracing::Span;

use crate::model::TaskId;

/// Start a span for one task on the given side ("produce" or "process").
///
/// The `task.state` field is declared empty and is filled in by
/// [`record_state_transition`].
pub fn start_task_span(role: &str, id: TaskId, task_type: i32) -> Span {
    tracing::info_span!(
        "task",
        "task.role" = role,
        "task.id" = %id,
        "task.type" = task_type,
        "task.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("task.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
