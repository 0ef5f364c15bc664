//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` but can be specified
//! via the `-f` flag or the `UPCTL_CONFIG` environment variable.
//!
//! Sources are merged in the following order (later overrides earlier):
//!
//! 1. **YAML config file** - base configuration (default: `config.yaml`)
//! 2. **Environment variables** - variables prefixed with `UPCTL_`
//!
//! Nested values use double underscores, e.g. `UPCTL_MONITOR__INTERVAL=30s`
//! sets `monitor.interval`. Durations accept humantime strings (`500ms`,
//! `10s`, `5m`).
//!
//! The probing tunables (interval, retry cap, backoff base, grace period,
//! batch size, ...) all live here and are injected into the components at
//! startup; nothing reads configuration after construction.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "UPCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the monitor.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation,
/// so an empty config file yields a runnable (if endpoint-less) monitor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Path to the endpoint definitions file (JSON)
    pub endpoints_file: String,
    /// Probing loop configuration
    pub monitor: MonitorConfig,
    /// Outbound alert webhook configuration
    pub alerts: AlertsConfig,
    /// External metrics backend used for historical range queries
    pub prometheus: PrometheusConfig,
    /// Uptime report tuning
    pub uptime: UptimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
            endpoints_file: "endpoints.json".to_string(),
            monitor: MonitorConfig::default(),
            alerts: AlertsConfig::default(),
            prometheus: PrometheusConfig::default(),
            uptime: UptimeConfig::default(),
        }
    }
}

/// Probing loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// How often a full probe cycle starts
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Attempts per check before an endpoint is considered down
    pub retries: u32,
    /// Backoff base; attempt N waits `retry_base_delay * N` before retrying
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    /// Per-attempt HTTP timeout
    #[serde(with = "humantime_serde")]
    pub check_timeout: Duration,
    /// Hard wall-clock ceiling for one endpoint's check, spanning all retries
    #[serde(with = "humantime_serde")]
    pub check_deadline: Duration,
    /// Endpoints checked concurrently within one batch
    pub batch_size: usize,
    /// Pause between consecutive batches
    #[serde(with = "humantime_serde")]
    pub batch_pause: Duration,
    /// How long an endpoint must stay failing before a DOWN alert fires
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// Sentinel response time recorded for failed checks, so failures stay
    /// visible in the response-time series
    pub failure_response_time_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retries: 3,
            retry_base_delay: Duration::from_secs(2),
            check_timeout: Duration::from_secs(10),
            check_deadline: Duration::from_secs(120),
            batch_size: 3,
            batch_pause: Duration::from_millis(500),
            grace_period: Duration::from_secs(5 * 60),
            failure_response_time_ms: 10_000,
        }
    }
}

/// Outbound alert webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    /// Webhook URL notified on confirmed state transitions.
    /// When unset, alerts are logged but not delivered anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<Url>,
    /// Delivery timeout per notification
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Alert channel capacity; events beyond this are dropped with a warning
    pub channel_capacity: usize,
    /// Maximum in-flight webhook deliveries
    pub max_concurrent_sends: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(10),
            channel_capacity: 64,
            max_concurrent_sends: 8,
        }
    }
}

/// External metrics backend (Prometheus) used by the uptime aggregator.
///
/// The monitor never writes here - Prometheus scrapes `/metrics` on its own
/// schedule. This section only configures the *read* path for historical
/// range queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Base URL of the Prometheus server
    pub url: Url,
    /// Timeout for range queries
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
    /// Metric queried for historical availability samples
    pub metric: String,
    /// Resolution step for range queries
    #[serde(with = "humantime_serde")]
    pub step: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:9090").expect("default prometheus url is valid"),
            query_timeout: Duration::from_secs(5),
            metric: "service_up".to_string(),
            step: Duration::from_secs(300),
        }
    }
}

/// Uptime report tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UptimeConfig {
    /// A bucket with at least this many minutes of downtime is classified
    /// DOWN; anything above zero but below it is PARTIAL
    pub downtime_threshold_minutes: f64,
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            downtime_threshold_minutes: 9.0,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("UPCTL_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.monitor.batch_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: monitor.batch_size must be at least 1".to_string(),
            });
        }

        if self.monitor.retries == 0 {
            return Err(Error::Internal {
                operation: "Config validation: monitor.retries must be at least 1".to_string(),
            });
        }

        if self.monitor.check_deadline < self.monitor.check_timeout {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: monitor.check_deadline ({:?}) cannot be shorter than a single attempt timeout ({:?})",
                    self.monitor.check_deadline, self.monitor.check_timeout
                ),
            });
        }

        if self.uptime.downtime_threshold_minutes <= 0.0 {
            return Err(Error::Internal {
                operation: "Config validation: uptime.downtime_threshold_minutes must be positive".to_string(),
            });
        }

        if self.endpoints_file.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: endpoints_file must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
