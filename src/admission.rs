//! Admission control for the generator.
//!
//! A bounded in-flight counter with a drop policy: when the backlog is full,
//! [`AdmissionController::try_admit`] refuses immediately and the caller skips
//! the cycle. Nothing queues and nothing blocks.
//!
//! Every admitted slot must be released exactly once, whatever the outcome of
//! the dispatch. [`AdmissionPermit`] ties the release to `Drop` so a failed
//! create, a failed dispatch, a timeout and a panic all give the slot back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

/// Bounds the number of tasks outstanding between admission and dispatch completion.
#[derive(Debug)]
pub struct AdmissionController {
    max_backlog: usize,
    backlog: AtomicUsize,
}

impl AdmissionController {
    pub fn new(max_backlog: usize) -> Self {
        Self {
            max_backlog,
            backlog: AtomicUsize::new(0),
        }
    }

    /// Take a slot iff the backlog is below the limit. Never waits.
    pub fn try_admit(&self) -> bool {
        self.backlog
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_backlog).then_some(n + 1)
            })
            .is_ok()
    }

    /// Give a slot back. Releasing with nothing admitted is a no-op.
    pub fn release(&self) {
        if self
            .backlog
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
        {
            warn!("admission release with empty backlog ignored");
        }
    }

    /// Current backlog, for reporting.
    pub fn observe(&self) -> usize {
        self.backlog.load(Ordering::Acquire)
    }

    pub fn max_backlog(&self) -> usize {
        self.max_backlog
    }

    /// Admit and wrap the slot in a permit that releases on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        self.try_admit().then(|| AdmissionPermit {
            controller: Arc::clone(self),
        })
    }
}

/// One admitted slot. Dropping it releases the slot.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release();
    }
}
