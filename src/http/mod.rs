//! Shared request executor for providers that speak plain REST.
//!
//! Every call gets a hard per-attempt timeout, and transient failures (transport errors, 429, most 5xx)
//! are retried with capped exponential backoff before the error reaches the caller.

pub(crate) mod errors;

use anyhow::{Context, Result};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_MAX, DEFAULT_RETRY_WAIT_MAX_SECS,
    DEFAULT_RETRY_WAIT_MIN_SECS,
};
use errors::{describe_request_error, is_retryable};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid {method} request for '{url}': {message}")]
    InvalidRequest {
        method: Method,
        url: String,
        message: String,
    },

    #[error("{message} (after {attempts} attempt(s))")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status code {status} from '{url}': {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("failed to encode request body for '{url}'")]
    Encode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode response from '{url}'")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_MAX,
            min_wait: Duration::from_secs(DEFAULT_RETRY_WAIT_MIN_SECS),
            max_wait: Duration::from_secs(DEFAULT_RETRY_WAIT_MAX_SECS),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (zero based). A server-provided hint wins but is still capped.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_wait);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            true
        }
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::NOT_IMPLEMENTED => false,
        other => other.is_server_error(),
    }
}

fn retry_after(status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn build_headers(method: &Method, url: &str, headers: &[(&str, &str)]) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = |message: String| HttpError::InvalidRequest {
            method: method.clone(),
            url: url.to_string(),
            message,
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| invalid(format!("bad header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| invalid(format!("bad value for header '{name}': {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[derive(Debug, Clone)]
pub struct RetryClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryClient {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .build()
            .context("Failed to initialize HTTP client")?;
        Ok(Self { client, policy })
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, HttpError> {
        let header_map = build_headers(&method, url, headers)?;
        let timeout_secs = self.policy.timeout.as_secs();
        let mut attempt: u32 = 0;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(header_map.clone());
            if let Some(body) = body {
                request = request.body(body.to_vec());
            }
            debug!(
                method = %method,
                url = %url,
                attempt = attempt + 1,
                request_body_len = body.map_or(0, <[u8]>::len),
                "sending http request"
            );

            let outcome = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let hint = retry_after(status, response.headers());
                    response
                        .bytes()
                        .await
                        .map(|bytes| (status, hint, bytes.to_vec()))
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok((status, hint, bytes)) => {
                    if status.is_success() {
                        info!(
                            method = %method,
                            url = %url,
                            status = status.as_u16(),
                            response_body_len = bytes.len(),
                            "http request completed"
                        );
                        return Ok(bytes);
                    }

                    if should_retry_status(status) && attempt < self.policy.max_retries {
                        let wait = self.policy.backoff(attempt, hint);
                        warn!(
                            url = %url,
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            "retryable status, backing off"
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }

                    let body = String::from_utf8_lossy(&bytes).into_owned();
                    warn!(
                        method = %method,
                        url = %url,
                        status = status.as_u16(),
                        response_body_len = body.len(),
                        "http request returned non-success status"
                    );
                    return Err(HttpError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                        body,
                    });
                }
                Err(err) => {
                    if is_retryable(&err) && attempt < self.policy.max_retries {
                        let wait = self.policy.backoff(attempt, None);
                        warn!(
                            url = %url,
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            error = %err,
                            "transport error, backing off"
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }

                    warn!(method = %method, url = %url, error = %err, "http request failed");
                    return Err(HttpError::Transport {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        message: describe_request_error(&err, url, timeout_secs),
                        source: err,
                    });
                }
            }
        }
    }

    pub async fn get_json<T>(&self, url: &str, headers: &[(&str, &str)]) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let bytes = self.request(Method::GET, url, None, headers).await?;
        decode(url, &bytes)
    }

    pub async fn post_json<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|source| HttpError::Encode {
            url: url.to_string(),
            source,
        })?;
        let mut all_headers: Vec<(&str, &str)> = headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
            .copied()
            .collect();
        all_headers.push((CONTENT_TYPE.as_str(), "application/json"));

        let bytes = self
            .request(Method::POST, url, Some(&payload), &all_headers)
            .await?;
        decode(url, &bytes)
    }
}

fn decode<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(bytes).map_err(|source| {
        warn!(url = %url, error = %source, "response body is not the expected JSON");
        HttpError::Decode {
            url: url.to_string(),
            source,
        }
    })
}
