//! Alert event types and payload construction.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::time::Duration;

use crate::registry::EndpointId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Down,
    Recovered,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Down => "service.down",
            AlertKind::Recovered => "service.recovered",
        }
    }
}

/// One confirmed state transition, ready for delivery.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub endpoint: EndpointId,
    pub kind: AlertKind,
    /// Last probe error, set for down events
    pub error: Option<String>,
    /// Total outage length, set for recovery events
    pub downtime: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn down(endpoint: EndpointId, error: Option<String>) -> Self {
        Self {
            endpoint,
            kind: AlertKind::Down,
            error,
            downtime: None,
            timestamp: Utc::now(),
        }
    }

    pub fn recovered(endpoint: EndpointId, downtime: Duration) -> Self {
        Self {
            endpoint,
            kind: AlertKind::Recovered,
            error: None,
            downtime: Some(downtime),
            timestamp: Utc::now(),
        }
    }

    /// One-line human-readable summary, used for log output.
    pub fn status_line(&self) -> String {
        match self.kind {
            AlertKind::Down => format!(
                "DOWN: {} ({}) at {}{}",
                self.endpoint.name,
                self.endpoint.group,
                self.endpoint.url,
                self.error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default(),
            ),
            AlertKind::Recovered => format!(
                "RECOVERED: {} ({}) after {}",
                self.endpoint.name,
                self.endpoint.group,
                self.downtime.map(format_duration).unwrap_or_else(|| "unknown".to_string()),
            ),
        }
    }

    /// Webhook body.
    pub fn payload(&self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "timestamp": self.timestamp.to_rfc3339(),
            "service": {
                "name": self.endpoint.name,
                "group": self.endpoint.group,
                "url": self.endpoint.url,
            },
            "error": self.error,
            "downtime_seconds": self.downtime.map(|d| d.as_secs()),
            "message": self.status_line(),
        })
    }
}

/// Render a duration as whole units, largest two only ("2d 4h", "1h 5m",
/// "3m"). Sub-minute outages show as "0m".
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
