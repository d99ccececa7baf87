//! In-process dispatch straight into a [`TaskProcessor`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Ack, DispatchChannel, TaskRequest};
use crate::error::Result;
use crate::worker::TaskProcessor;

/// Sends tasks to a processor living in the same process.
///
/// Each send runs on its own tokio task, as a request would on a server, so
/// a caller that times out does not tear down work already under way.
pub struct LocalDispatch {
    processor: Arc<TaskProcessor>,
    shutdown: CancellationToken,
}

impl LocalDispatch {
    /// `shutdown` cancels every pending rate-limiter wait when fired.
    pub fn new(processor: Arc<TaskProcessor>, shutdown: CancellationToken) -> Self {
        Self { processor, shutdown }
    }
}

#[async_trait]
impl DispatchChannel for LocalDispatch {
    async fn send(&self, request: TaskRequest) -> Result<Ack> {
        let processed = self
            .processor
            .process_detached(request, &self.shutdown)
            .await?;
        Ok(Ack::processed(processed.id))
    }
}
