//! Worker side: the per-task lifecycle and its HTTP front end.
//!
//! [`TaskProcessor::process`] runs one dispatched task through
//! `received -> processing -> done`:
//!
//! 1. wait for a rate-limiter token (cancellable; the task stays `received`)
//! 2. mark `processing`
//! 3. simulated work, a sleep proportional to the task value (not cancellable)
//! 4. mark `done` (a failure here strands the task in `processing`)
//! 5. fold the value into the per-type totals
//!
//! Each failure is reported with the [`Stage`] it happened at. Nothing is
//! retried.

pub mod server;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry::KeyValue;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

use crate::dispatch::TaskRequest;
use crate::error::{Error, Result};
use crate::limiter::RateLimiter;
use crate::model::{Stage, State, TaskId};
use crate::store::StateStore;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_state_transition, start_task_span};

/// Maps a task value to its simulated work duration.
pub type WorkDuration = Arc<dyn Fn(i32) -> Duration + Send + Sync>;

/// `ms_per_value` milliseconds per unit of value. Negative values take no time.
pub fn work_per_value(ms_per_value: u64) -> WorkDuration {
    Arc::new(move |value| {
        let units = u64::try_from(value).unwrap_or(0);
        Duration::from_millis(units.saturating_mul(ms_per_value))
    })
}

/// Result of a task that reached `done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub id: TaskId,
    pub task_type: i32,
    pub value: i32,
    /// Totals for this task's type, including this task.
    pub total_for_type: TypeTotal,
}

pub struct TaskProcessor {
    store: Arc<dyn StateStore>,
    limiter: Arc<RateLimiter>,
    totals: Arc<TypeTotals>,
    work_duration: WorkDuration,
}

impl TaskProcessor {
    /// One millisecond of work per unit of value, fresh totals.
    pub fn new(store: Arc<dyn StateStore>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            store,
            limiter,
            totals: Arc::new(TypeTotals::default()),
            work_duration: work_per_value(1),
        }
    }

    pub fn with_totals(mut self, totals: Arc<TypeTotals>) -> Self {
        self.totals = totals;
        self
    }

    pub fn with_work_duration(mut self, work_duration: WorkDuration) -> Self {
        self.work_duration = work_duration;
        self
    }

    pub fn totals(&self) -> &Arc<TypeTotals> {
        &self.totals
    }

    /// Run one task through its lifecycle.
    pub async fn process(&self, request: TaskRequest, cancel: &CancellationToken) -> Result<Processed> {
        let id = request.id;
        let span = start_task_span("process", id, request.task_type);

        async {
            if let Err(e) = self.limiter.wait(cancel).await {
                return Err(self.fail(id, Stage::RateLimit, e));
            }
            info!(
                task_id = %id,
                task_type = request.task_type,
                task_value = request.value,
                "processing task"
            );

            self.store
                .transition(id, State::Processing)
                .await
                .map_err(|e| self.fail(id, Stage::MarkProcessing, e))?;
            record_state_transition(&span, "received", "processing");
            record_transition_metric(State::Received, State::Processing);

            let in_processing = metrics::tasks_in_processing();
            in_processing.add(1, &[]);

            let delay = (self.work_duration)(request.value);
            tokio::time::sleep(delay).await;
            metrics::work_duration_ms().record(delay.as_secs_f64() * 1000.0, &[]);

            let marked_done = self.store.transition(id, State::Done).await;
            in_processing.add(-1, &[]);
            if let Err(e) = marked_done {
                warn!(task_id = %id, "task stranded in processing");
                return Err(self.fail(id, Stage::MarkDone, e));
            }
            record_state_transition(&span, "processing", "done");
            record_transition_metric(State::Processing, State::Done);

            let total = self.totals.record(request.task_type, request.value);

            let type_label = [KeyValue::new("task_type", i64::from(request.task_type))];
            metrics::tasks_processed().add(1, &[]);
            metrics::tasks_by_type().add(1, &type_label);
            metrics::task_values_by_type()
                .add(u64::try_from(request.value).unwrap_or(0), &type_label);

            info!(
                task_id = %id,
                task_type = request.task_type,
                task_value = request.value,
                total_value_for_type = total.sum,
                "task processed"
            );

            Ok(Processed {
                id,
                task_type: request.task_type,
                value: request.value,
                total_for_type: total,
            })
        }
        .instrument(span.clone())
        .await
    }

    /// Run `process` on its own tokio task so the work outlives the caller.
    ///
    /// The rate-limiter wait is cancelled when `parent` is cancelled or when
    /// the returned future is dropped (the caller gave up on the call). Once
    /// the task is `processing` it runs to completion regardless.
    pub async fn process_detached(
        self: &Arc<Self>,
        request: TaskRequest,
        parent: &CancellationToken,
    ) -> Result<Processed> {
        let cancel = parent.child_token();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let processor = Arc::clone(self);

        tokio::spawn(async move { processor.process(request, &cancel).await })
            .await
            .map_err(|e| Error::Other(format!("processing task {} aborted: {e}", request.id)))?
    }

    fn fail(&self, id: TaskId, stage: Stage, err: Error) -> Error {
        metrics::task_processing_failures().add(1, &[KeyValue::new("stage", stage.as_str())]);
        error!(task_id = %id, %stage, error = %err, "task processing failed");
        err.at(id, stage)
    }
}

fn record_transition_metric(from: State, to: State) {
    metrics::state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

// ---------------------------------------------------------------------------
// Per-type totals
// ---------------------------------------------------------------------------

/// Count and running value sum for one task type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeTotal {
    pub count: u64,
    pub sum: i64,
}

/// Per-type aggregates over processed tasks, shared across concurrent completions.
#[derive(Debug, Default)]
pub struct TypeTotals {
    inner: Mutex<BTreeMap<i32, TypeTotal>>,
}

impl TypeTotals {
    /// Fold one processed task in and return the updated total for its type.
    pub fn record(&self, task_type: i32, value: i32) -> TypeTotal {
        let mut inner = self.lock();
        let total = inner.entry(task_type).or_default();
        total.count += 1;
        total.sum += i64::from(value);
        *total
    }

    pub fn get(&self, task_type: i32) -> Option<TypeTotal> {
        self.lock().get(&task_type).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<i32, TypeTotal> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<i32, TypeTotal>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
