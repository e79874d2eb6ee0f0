use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shared::{
    domain::PlanId,
    error::RequestError,
    protocol::{ConfirmSelectionRequest, ErrorBody},
};
use tracing::{debug, warn};
use url::Url;

use crate::builder::PlanRequest;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);

/// A decoded 2xx response body, not yet checked for shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }
}

#[async_trait]
pub trait PlanTransport: Send + Sync {
    async fn send(
        &self,
        request: &PlanRequest,
        endpoint: &Url,
        timeout: Duration,
    ) -> Result<RawResponse, RequestError>;

    async fn confirm_selection(
        &self,
        plan_id: &PlanId,
        endpoint: &Url,
        timeout: Duration,
    ) -> Result<RawResponse, RequestError>;
}

/// Races `exchange` against a timer. On expiry the exchange future is dropped,
/// which aborts whatever I/O it still had pending. The timer is dropped with
/// it on every path.
pub async fn send_with_deadline<T, F>(timeout: Duration, exchange: F) -> Result<T, RequestError>
where
    F: Future<Output = Result<T, RequestError>>,
{
    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "plan request deadline elapsed");
            Err(RequestError::Timeout)
        }
    }
}

pub struct HttpTransport {
    http: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    async fn post_json<B>(
        &self,
        endpoint: &Url,
        body: &B,
        timeout: Duration,
    ) -> Result<RawResponse, RequestError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let exchange = async {
            debug!(%endpoint, "posting plan request");
            let response = self
                .http
                .post(endpoint.clone())
                .json(body)
                .timeout(timeout)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = response.status();
            let bytes = if status.is_success() {
                response.bytes().await.map_err(map_reqwest_error)?
            } else {
                // The status already arrived; an unreadable body only loses the message.
                response.bytes().await.unwrap_or_default()
            };
            decode_response(status.as_u16(), &bytes)
        };
        send_with_deadline(timeout, exchange).await
    }
}

#[async_trait]
impl PlanTransport for HttpTransport {
    async fn send(
        &self,
        request: &PlanRequest,
        endpoint: &Url,
        timeout: Duration,
    ) -> Result<RawResponse, RequestError> {
        self.post_json(endpoint, request, timeout).await
    }

    async fn confirm_selection(
        &self,
        plan_id: &PlanId,
        endpoint: &Url,
        timeout: Duration,
    ) -> Result<RawResponse, RequestError> {
        let body = ConfirmSelectionRequest {
            plan_id: plan_id.clone(),
        };
        self.post_json(endpoint, &body, timeout).await
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        return RequestError::Timeout;
    }
    warn!(error = %err, "plan request transport failure");
    RequestError::Network(err.to_string())
}

/// Maps a status and body onto the error taxonomy. Non-2xx bodies are mined
/// for an `error`/`message` string; 2xx bodies must be JSON.
pub fn decode_response(status: u16, bytes: &[u8]) -> Result<RawResponse, RequestError> {
    if !(200..300).contains(&status) {
        let message = ErrorBody::message_or_generic(bytes);
        warn!(status, %message, "plan service returned an error status");
        return Err(RequestError::Server { status, message });
    }

    let body = serde_json::from_slice(bytes).map_err(|err| {
        RequestError::malformed(format!("response body is not valid JSON: {err}"))
    })?;
    Ok(RawResponse { status, body })
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
