//! Probe result types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::EndpointId;

/// Outcome of one completed check (all retries included).
///
/// A failed check is still a *result*, not an error: it carries the sentinel
/// response time and the last attempt's error text.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub endpoint: EndpointId,
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    /// Measured latency for successes; the configured sentinel for failures
    pub response_time_ms: u64,
    /// Retries consumed before the final outcome (0 means first try decided)
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn success(endpoint: EndpointId, response_time_ms: u64, retries: u32) -> Self {
        Self {
            endpoint,
            checked_at: Utc::now(),
            success: true,
            response_time_ms,
            retries,
            error: None,
        }
    }

    pub fn failure(endpoint: EndpointId, sentinel_ms: u64, retries: u32, error: String) -> Self {
        Self {
            endpoint,
            checked_at: Utc::now(),
            success: false,
            response_time_ms: sentinel_ms,
            retries,
            error: Some(error),
        }
    }
}
