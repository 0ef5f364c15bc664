//! Prometheus range-query client.
//!
//! The aggregator only needs `(timestamp, up)` samples per label set, so the
//! backend sits behind the small [`SampleSource`] trait and report building
//! stays testable without a live Prometheus.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::config::PrometheusConfig;
use crate::errors::{Error, Result};

/// One availability observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub up: bool,
}

/// One series from a range query: a label set plus `(unix_ts, value)` pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct RangeSeries {
    pub metric: HashMap<String, String>,
    pub values: Vec<(f64, String)>,
}

impl RangeSeries {
    pub fn label(&self, name: &str) -> &str {
        self.metric.get(name).map(String::as_str).unwrap_or("")
    }

    /// Decode the raw value pairs. A value parses as up when it is a number
    /// >= 1; unparsable values count as down.
    pub fn samples(&self) -> Vec<Sample> {
        self.values
            .iter()
            .map(|(ts, value)| Sample {
                timestamp: DateTime::from_timestamp(*ts as i64, 0).unwrap_or(DateTime::<Utc>::MIN_UTC),
                up: value.parse::<f64>().map(|v| v >= 1.0).unwrap_or(false),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    status: String,
    #[serde(default)]
    data: Option<RangeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeData {
    #[serde(rename = "resultType")]
    #[allow(dead_code)]
    result_type: String,
    result: Vec<RangeSeries>,
}

/// Where historical samples come from.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn query_range(
        &self,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<RangeSeries>>;
}

/// `SampleSource` backed by a real Prometheus `/api/v1/query_range`.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.query_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }
}

#[async_trait]
impl SampleSource for PrometheusClient {
    async fn query_range(
        &self,
        metric: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<RangeSeries>> {
        // Append to the configured path so sub-path deployments
        // (e.g. http://host/prom) keep their prefix
        let mut url = self.base_url.clone();
        let path = format!("{}/api/v1/query_range", url.path().trim_end_matches('/'));
        url.set_path(&path);

        let response = self
            .client
            .get(url)
            .query(&[
                ("query", metric.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", step.as_secs().to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream {
                reason: format!("range query failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(Error::Upstream {
                reason: format!("range query returned {}", response.status()),
            });
        }

        let body: RangeResponse = response.json().await.map_err(|e| Error::Upstream {
            reason: format!("cannot decode range response: {e}"),
        })?;

        if body.status != "success" {
            return Err(Error::Upstream {
                reason: format!(
                    "range query status {}: {}",
                    body.status,
                    body.error.as_deref().unwrap_or("no detail")
                ),
            });
        }

        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }
}
