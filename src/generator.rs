//! Task generator: admission, creation and asynchronous dispatch on a ticker.
//!
//! Each tick takes an admission permit or skips. An admitted tick draws a
//! type and value, persists the task and spawns its dispatch into a
//! [`JoinSet`]. The spawned future owns the permit, so the slot comes back
//! exactly when that dispatch resolves, success or failure. The run loop
//! picks completions up alongside ticks for logging, metrics and the backlog
//! gauge; it never waits on a reply before the next tick.

use std::sync::Arc;

use opentelemetry::KeyValue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

use crate::admission::AdmissionController;
use crate::config::GeneratorConfig;
use crate::dispatch::{Ack, DispatchChannel, TaskRequest};
use crate::error::{Error, Result};
use crate::model::{Stage, TaskId};
use crate::store::StateStore;
use crate::telemetry::metrics;
use crate::telemetry::task::start_task_span;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Backlog full; nothing was created.
    Refused { backlog: usize },
    /// Task created and its dispatch is in flight.
    Dispatched(TaskId),
}

/// A resolved dispatch.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub request: TaskRequest,
    pub result: Result<Ack>,
}

impl DispatchOutcome {
    /// The worker-side stage a failed dispatch reported, if the worker got
    /// far enough to report one. `None` for transport errors and timeouts.
    pub fn worker_stage(&self) -> Option<Stage> {
        match &self.result {
            Err(Error::Stage {
                stage: Stage::Dispatch,
                source,
                ..
            }) => source.stage(),
            _ => None,
        }
    }
}

/// Running counts for one generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorReport {
    pub created: u64,
    pub refused: u64,
    pub create_failures: u64,
    pub dispatched: u64,
    pub dispatch_failures: u64,
}

pub struct TaskGenerator {
    store: Arc<dyn StateStore>,
    channel: Arc<dyn DispatchChannel>,
    admission: Arc<AdmissionController>,
    config: GeneratorConfig,
    rng: StdRng,
    in_flight: JoinSet<DispatchOutcome>,
    report: GeneratorReport,
}

impl TaskGenerator {
    pub fn new(
        store: Arc<dyn StateStore>,
        channel: Arc<dyn DispatchChannel>,
        admission: Arc<AdmissionController>,
        config: GeneratorConfig,
    ) -> Result<Self> {
        if config.max_type <= 0 || config.max_value <= 0 {
            return Err(Error::Config(format!(
                "generator ranges must be non-empty (max_type={}, max_value={})",
                config.max_type, config.max_value
            )));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            store,
            channel,
            admission,
            config,
            rng,
            in_flight: JoinSet::new(),
            report: GeneratorReport::default(),
        })
    }

    pub fn report(&self) -> GeneratorReport {
        self.report
    }

    /// Dispatches not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// One generation cycle.
    ///
    /// Admission refusal is `Ok(Refused)`. A failed create releases the slot
    /// at once and is returned as an error carrying [`Stage::Create`].
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let Some(permit) = self.admission.try_acquire() else {
            let backlog = self.admission.observe();
            self.report.refused += 1;
            metrics::admissions_refused().add(1, &[]);
            warn!(backlog, "max backlog reached, skipping tick");
            return Ok(TickOutcome::Refused { backlog });
        };

        let task_type = self.rng.gen_range(0..self.config.max_type);
        let value = self.rng.gen_range(0..self.config.max_value);

        let id = match self.store.create(task_type, value).await {
            Ok(id) => id,
            Err(e) => {
                drop(permit);
                self.report_backlog();
                self.report.create_failures += 1;
                metrics::task_production_failures()
                    .add(1, &[KeyValue::new("stage", Stage::Create.as_str())]);
                error!(task_type, task_value = value, error = %e, "failed to create task");
                return Err(Error::Create {
                    task_type,
                    value,
                    source: Box::new(e),
                });
            }
        };

        self.report.created += 1;
        metrics::tasks_produced().add(1, &[]);
        self.report_backlog();
        info!(
            task_id = %id,
            task_type,
            task_value = value,
            backlog = self.admission.observe(),
            "task created"
        );

        let request = TaskRequest {
            id,
            task_type,
            value,
        };
        let channel = Arc::clone(&self.channel);
        let timeout = self.config.dispatch_timeout();
        let span = start_task_span("produce", id, task_type);

        self.in_flight.spawn(
            async move {
                let result = match tokio::time::timeout(timeout, channel.send(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Dispatch {
                        id,
                        reason: format!("no reply within {timeout:?}"),
                    }),
                };
                // The slot is released here, on every outcome.
                drop(permit);
                DispatchOutcome {
                    request,
                    result: result.map_err(|e| e.at(id, Stage::Dispatch)),
                }
            }
            .instrument(span),
        );

        Ok(TickOutcome::Dispatched(id))
    }

    /// Wait for the next dispatch to resolve. `None` once nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<DispatchOutcome> {
        while let Some(joined) = self.in_flight.join_next().await {
            if let Some(outcome) = self.complete(joined) {
                return Some(outcome);
            }
        }
        None
    }

    /// Wait for every in-flight dispatch to resolve.
    pub async fn drain(&mut self) {
        while self.next_completion().await.is_some() {}
    }

    /// Tick until `shutdown` fires or `limit` tasks have been created, then
    /// drain in-flight dispatches and return the final counts.
    pub async fn run(mut self, shutdown: CancellationToken, limit: Option<u64>) -> GeneratorReport {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_us = self.config.interval_us,
            max_backlog = self.admission.max_backlog(),
            "generator started"
        );

        loop {
            if limit.is_some_and(|n| self.report.created >= n) {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("generator shutting down");
                    break;
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.complete(joined);
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(_) => {}
                        // Already logged and counted by tick.
                        Err(Error::Create { .. }) => {}
                        Err(e) => warn!(error = %e, "tick failed"),
                    }
                }
            }
        }

        info!(in_flight = self.in_flight.len(), "draining in-flight dispatches");
        self.drain().await;

        let report = self.report;
        info!(
            created = report.created,
            refused = report.refused,
            create_failures = report.create_failures,
            dispatched = report.dispatched,
            dispatch_failures = report.dispatch_failures,
            "generator stopped"
        );
        report
    }

    fn complete(&mut self, joined: std::result::Result<DispatchOutcome, JoinError>) -> Option<DispatchOutcome> {
        self.report_backlog();
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // The permit was released while the dispatch future unwound.
                self.report.dispatch_failures += 1;
                metrics::task_production_failures()
                    .add(1, &[KeyValue::new("stage", Stage::Dispatch.as_str())]);
                error!(error = %e, "dispatch task panicked");
                return None;
            }
        };

        let id = outcome.request.id;
        match &outcome.result {
            Ok(_) => {
                self.report.dispatched += 1;
                info!(
                    task_id = %id,
                    backlog = self.admission.observe(),
                    "task processed, backlog released"
                );
            }
            Err(e) => {
                self.report.dispatch_failures += 1;
                metrics::task_production_failures()
                    .add(1, &[KeyValue::new("stage", Stage::Dispatch.as_str())]);
                error!(
                    task_id = %id,
                    task_type = outcome.request.task_type,
                    task_value = outcome.request.value,
                    stage = %Stage::Dispatch,
                    worker_stage = outcome.worker_stage().map(Stage::as_str),
                    error = %e,
                    "failed to send task, task may be stranded"
                );
            }
        }
        Some(outcome)
    }

    fn report_backlog(&self) {
        metrics::backlog_size().record(self.admission.observe() as u64, &[]);
    }
}
