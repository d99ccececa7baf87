//! HTTP dispatch client for a remote worker (see [`crate::worker::server`]).

use async_trait::async_trait;
use tracing::debug;

use super::{Ack, DispatchChannel, RemoteError, TaskRequest};
use crate::error::{Error, Result};

/// POSTs tasks as JSON to `{base_url}/tasks`.
#[derive(Debug, Clone)]
pub struct HttpDispatch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDispatch {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/tasks", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DispatchChannel for HttpDispatch {
    async fn send(&self, request: TaskRequest) -> Result<Ack> {
        let id = request.id;
        debug!(task_id = %id, endpoint = %self.endpoint, "sending task");

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Dispatch {
                id,
                reason: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        if status.is_success() {
            return resp.json::<Ack>().await.map_err(|e| Error::Dispatch {
                id,
                reason: format!("bad worker reply: {e}"),
            });
        }

        // A failure the worker pinned to a stage comes back wrapped in it.
        match resp.json::<RemoteError>().await {
            Ok(RemoteError {
                error,
                stage: Some(stage),
            }) => Err(Error::Dispatch {
                id,
                reason: format!("worker returned {status} at {stage}: {error}"),
            }
            .at(id, stage)),
            Ok(RemoteError { error, stage: None }) => Err(Error::Dispatch {
                id,
                reason: format!("worker returned {status}: {error}"),
            }),
            Err(_) => Err(Error::Dispatch {
                id,
                reason: format!("worker returned {status}"),
            }),
        }
    }
}
