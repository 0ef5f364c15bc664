//! Single-endpoint check execution.
//!
//! One `check` spans every retry: attempt, and on failure wait
//! `retry_base_delay * attempt_number` before trying again, up to the
//! configured attempt cap. The first success wins; exhaustion yields a
//! failed [`ProbeResult`] carrying the sentinel response time and the last
//! attempt's error.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::MonitorConfig;
use crate::probes::ProbeResult;
use crate::registry::{EndpointSpec, Expectation};

#[derive(Error, Debug)]
enum ProbeError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("could not read response body: {0}")]
    Body(String),
    #[error("response did not match expectation")]
    Expectation,
}

/// Issues HTTP checks against endpoints.
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    client: reqwest::Client,
    config: MonitorConfig,
}

impl ProbeExecutor {
    pub fn new(config: MonitorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.check_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Run a full check (all retries) against one endpoint.
    #[instrument(skip(self, spec), fields(endpoint = %spec.id()))]
    pub async fn check(&self, spec: &EndpointSpec) -> ProbeResult {
        let mut last_error = String::new();

        for attempt in 1..=self.config.retries {
            match self.attempt(spec).await {
                Ok(elapsed_ms) => {
                    debug!(attempt, elapsed_ms, "check succeeded");
                    return ProbeResult::success(spec.id(), elapsed_ms, attempt - 1);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "check attempt failed");
                    last_error = e.to_string();
                    if attempt < self.config.retries {
                        tokio::time::sleep(self.config.retry_base_delay * attempt).await;
                    }
                }
            }
        }

        ProbeResult::failure(
            spec.id(),
            self.config.failure_response_time_ms,
            self.config.retries - 1,
            last_error,
        )
    }

    /// One attempt: request, status check, expectation check. Latency covers
    /// the request through body download, matching what a client would see.
    async fn attempt(&self, spec: &EndpointSpec) -> Result<u64, ProbeError> {
        let started = Instant::now();

        let mut request = match &spec.body {
            Some(body) => self.client.post(&spec.url).json(body),
            None => self.client.get(&spec.url),
        };
        if let Some(headers) = &spec.headers {
            request = request.headers(build_headers(headers)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Body(e.to_string()))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(expected) = &spec.expected_response {
            if !matches_expectation(expected, &body) {
                return Err(ProbeError::Expectation);
            }
        }

        Ok(elapsed_ms)
    }
}

fn build_headers(headers: &std::collections::HashMap<String, String>) -> Result<HeaderMap, ProbeError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ProbeError::Transport(format!("invalid header name {key}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProbeError::Transport(format!("invalid header value for {key}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn matches_expectation(expected: &Expectation, body: &str) -> bool {
    match expected {
        Expectation::Substring(needle) => body.to_lowercase().contains(&needle.to_lowercase()),
        Expectation::Shape(shape) => match serde_json::from_str::<Value>(body) {
            Ok(actual) => value_contains(&Value::Object(shape.clone()), &actual),
            Err(_) => false,
        },
    }
}

/// Structural containment: every key in `expected` must exist in `actual`,
/// recursing into nested objects. Scalar values only assert presence, and an
/// expected array only requires the actual array to be non-empty.
fn value_contains(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => exp
            .iter()
            .all(|(key, exp_value)| act.get(key).is_some_and(|act_value| value_contains(exp_value, act_value))),
        (Value::Array(_), Value::Array(act)) => !act.is_empty(),
        (Value::Object(_), _) | (Value::Array(_), _) => false,
        _ => true,
    }
}
