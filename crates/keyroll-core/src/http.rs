//! HTTP plumbing shared by the directory and mail clients.

use crate::error::RemoteError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 512;

/// Backoff for transient remote failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Ceiling applied to server-requested `Retry-After` delays
    pub max_retry_after_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            max_retry_after_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after_secs {
            let requested = seconds.saturating_mul(1_000);
            return Duration::from_millis(requested.min(self.max_retry_after_ms));
        }

        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

pub fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn truncate_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}

pub async fn response_to_error(response: Response, operation: &'static str) -> RemoteError {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();

    RemoteError::Status {
        operation,
        status,
        message: truncate_body(body),
        retry_after_secs: retry_after,
    }
}

/// Default client for remote APIs.
pub fn build_http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("keyroll/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Append path segments to a base URL, percent-encoding each one.
pub fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// HTTP client with the retry policy applied to every call.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(http: Client, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    /// Send the request built by `build`, retrying transient failures.
    ///
    /// `build` is invoked once per attempt. Non-success statuses become
    /// [`RemoteError::Status`].
    pub async fn send<F>(&self, operation: &'static str, build: F) -> Result<Response, RemoteError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match build(&self.http).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => response_to_error(response, operation).await,
                Err(source) => RemoteError::Transport { operation, source },
            };

            if attempt > self.retry.max_retries || !error.is_retryable() {
                return Err(error);
            }

            let delay = self.retry.delay_for(attempt, error.retry_after());
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying remote call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`ApiClient::send`], decoding the JSON body.
    pub async fn send_json<T, F>(&self, operation: &'static str, build: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(operation, build).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode {
                operation,
                message: e.to_string(),
            })
    }
}
