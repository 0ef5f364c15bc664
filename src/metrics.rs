//! Prometheus metrics for probe outcomes.
//!
//! The sink owns its [`Registry`] rather than registering into the process
//! global default, so tests can build as many sinks as they like and the
//! exposition endpoint serves exactly what this monitor produced.

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::probes::ProbeResult;

const LABELS: &[&str] = &["service_name", "group", "url"];

/// Holds the gauges every probe result is written to.
pub struct MetricsSink {
    registry: Registry,
    /// 1 when the last check succeeded, 0 when it failed
    availability: GaugeVec,
    /// Latency of the last check in milliseconds; carries the configured
    /// sentinel value for failed checks
    response_time: GaugeVec,
    checks_total: IntCounterVec,
}

impl MetricsSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let availability = GaugeVec::new(
            Opts::new("service_up", "Whether the service's last check succeeded (1) or failed (0)"),
            LABELS,
        )?;
        let response_time = GaugeVec::new(
            Opts::new(
                "service_response_time_ms",
                "Response time of the service's last check in milliseconds",
            ),
            LABELS,
        )?;
        let checks_total = IntCounterVec::new(
            Opts::new("probe_checks_total", "Completed probe checks by outcome"),
            &["service_name", "outcome"],
        )?;

        registry.register(Box::new(availability.clone()))?;
        registry.register(Box::new(response_time.clone()))?;
        registry.register(Box::new(checks_total.clone()))?;

        Ok(Self {
            registry,
            availability,
            response_time,
            checks_total,
        })
    }

    /// Overwrite both gauges for the result's endpoint. Failures are written
    /// too: availability 0 plus the sentinel response time keep down services
    /// visible in the time series instead of going stale.
    pub fn record(&self, result: &ProbeResult) {
        let labels = [
            result.endpoint.name.as_str(),
            result.endpoint.group.as_str(),
            result.endpoint.url.as_str(),
        ];
        self.availability
            .with_label_values(&labels)
            .set(if result.success { 1.0 } else { 0.0 });
        self.response_time
            .with_label_values(&labels)
            .set(result.response_time_ms as f64);
        self.checks_total
            .with_label_values(&[
                result.endpoint.name.as_str(),
                if result.success { "success" } else { "failure" },
            ])
            .inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
