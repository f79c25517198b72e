use async_trait::async_trait;
use tracing::warn;

use crate::types::GenerateAssetPayload;

/// Outbound call to the content-generation agent. `createJob` and the Asset
/// Worker both dispatch through this trait rather than reaching for an HTTP
/// client directly, so tests can substitute a fake without a network.
#[async_trait]
pub trait ContentAgentDispatcher: Send + Sync {
    async fn generate_asset(&self, payload: &GenerateAssetPayload) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("content agent returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Fires the RPC at a content-agent HTTP endpoint. Dispatch is best-effort
/// (§4.8.1): a failure here does not roll back job creation — the asset
/// simply waits in `queued`/`generating` until the Asset Worker or Timeout
/// Sweeper notices and retries it.
pub struct HttpContentAgentDispatcher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpContentAgentDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ContentAgentDispatcher for HttpContentAgentDispatcher {
    async fn generate_asset(&self, payload: &GenerateAssetPayload) -> Result<(), DispatchError> {
        let resp = self.client.post(&self.endpoint).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Dispatcher used when no content-agent endpoint is configured (local dev,
/// or an `asset_generation` job type that a caller intends to drive manually).
/// Logs and succeeds — the job still advances through the queue.
pub struct NoopDispatcher;

#[async_trait]
impl ContentAgentDispatcher for NoopDispatcher {
    async fn generate_asset(&self, payload: &GenerateAssetPayload) -> Result<(), DispatchError> {
        warn!(job_id = %payload.job_id, asset_type = %payload.asset_type, "no content-agent dispatcher configured, dropping dispatch");
        Ok(())
    }
}

/// Best-effort fire: log and swallow dispatch failures rather than surfacing
/// them to the `createJob` caller (§4.8.1 — "best-effort, fire-and-forget").
pub async fn dispatch_best_effort(dispatcher: &dyn ContentAgentDispatcher, payload: &GenerateAssetPayload) {
    if let Err(e) = dispatcher.generate_asset(payload).await {
        warn!(job_id = %payload.job_id, asset_type = %payload.asset_type, error = %e, "content agent dispatch failed, leaving job queued for the worker");
    }
}
