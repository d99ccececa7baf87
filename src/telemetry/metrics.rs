//! Metric instrument factories for taskline.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"taskline"` meter and are write-only:
//! nothing in the pipeline reads them back.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};

fn meter() -> Meter {
    opentelemetry::global::meter("taskline")
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Counter: tasks created by the generator.
pub fn tasks_produced() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.produced")
        .with_description("Number of tasks created by the generator")
        .build()
}

/// Counter: generator-side failures.
/// Labels: `stage` ("create" | "dispatch").
pub fn task_production_failures() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.production_failures")
        .with_description("Number of tasks that failed to be created or dispatched")
        .build()
}

/// Counter: ticks skipped because the backlog was full.
pub fn admissions_refused() -> Counter<u64> {
    meter()
        .u64_counter("taskline.admission.refused")
        .with_description("Generator ticks skipped by admission control")
        .build()
}

/// Gauge: tasks admitted but not yet through dispatch.
pub fn backlog_size() -> Gauge<u64> {
    meter()
        .u64_gauge("taskline.admission.backlog")
        .with_description("Current number of admitted, not yet dispatched tasks")
        .build()
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

/// Counter: tasks that reached `done`.
pub fn tasks_processed() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.processed")
        .with_description("Number of tasks processed to completion")
        .build()
}

/// Counter: worker-side failures.
/// Labels: `stage` ("rate_limit" | "mark_processing" | "mark_done").
pub fn task_processing_failures() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.processing_failures")
        .with_description("Number of tasks that failed during processing")
        .build()
}

/// UpDownCounter: tasks currently between `processing` and `done`.
pub fn tasks_in_processing() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("taskline.tasks.in_processing")
        .with_description("Number of tasks currently being processed")
        .build()
}

/// Counter: processed tasks per type.
/// Labels: `task_type`.
pub fn tasks_by_type() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.by_type")
        .with_description("Number of tasks processed by task type")
        .build()
}

/// Counter: sum of processed task values per type.
/// Labels: `task_type`.
pub fn task_values_by_type() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.values_by_type")
        .with_description("Sum of task values processed by task type")
        .build()
}

/// Counter: task state transitions.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("taskline.tasks.state_transitions")
        .with_description("Number of task state transitions")
        .build()
}

/// Histogram: simulated work duration in milliseconds.
pub fn work_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskline.tasks.work_duration_ms")
        .with_description("Simulated work duration in milliseconds")
        .with_unit("ms")
        .build()
}
