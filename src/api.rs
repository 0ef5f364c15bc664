//! HTTP surface: metrics exposition, liveness and the status/uptime APIs.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::errors::Result;
use crate::state::ServiceStatus;
use crate::uptime::{BucketKind, UptimeReport, build_report, report::window_start};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/uptime", get(uptime))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Prometheus text exposition, scraped by the external Prometheus server.
async fn metrics(State(state): State<AppState>) -> Result<Response> {
    let body = state.sink.export()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

/// Live per-endpoint phase snapshot.
async fn status(State(state): State<AppState>) -> Json<Vec<ServiceStatus>> {
    Json(state.tracker.snapshot().await)
}

#[derive(Debug, Deserialize)]
struct UptimeParams {
    bucket: Option<String>,
    count: Option<usize>,
}

/// Aggregated uptime report reconstructed from Prometheus range data.
async fn uptime(
    State(state): State<AppState>,
    Query(params): Query<UptimeParams>,
) -> Result<Json<UptimeReport>> {
    let kind: BucketKind = params.bucket.as_deref().unwrap_or("day").parse()?;
    let count = params.count.unwrap_or_else(|| kind.default_count()).clamp(1, 366);

    let now = Utc::now();
    let start = window_start(kind, count, now);
    let series = state
        .samples
        .query_range(&state.config.prometheus.metric, start, now, state.config.prometheus.step)
        .await?;

    Ok(Json(build_report(
        &series,
        kind,
        count,
        now,
        state.config.uptime.downtime_threshold_minutes,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertSender;
    use crate::config::Config;
    use crate::metrics::MetricsSink;
    use crate::probes::ProbeResult;
    use crate::registry::EndpointId;
    use crate::state::StateTracker;
    use crate::uptime::{RangeSeries, SampleSource};
    use async_trait::async_trait;
    use axum_test::TestServer;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedSamples(Vec<RangeSeries>);

    #[async_trait]
    impl SampleSource for FixedSamples {
        async fn query_range(
            &self,
            _metric: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _step: Duration,
        ) -> Result<Vec<RangeSeries>> {
            Ok(self.0.clone())
        }
    }

    fn endpoint() -> EndpointId {
        EndpointId {
            name: "rpc-1".to_string(),
            group: "RPC".to_string(),
            url: "https://rpc1.example.com".to_string(),
        }
    }

    async fn server_with(series: Vec<RangeSeries>) -> (TestServer, AppState) {
        let (alerts, _rx) = AlertSender::channelled(16);
        let state = AppState {
            config: Arc::new(Config::default()),
            sink: Arc::new(MetricsSink::new().unwrap()),
            tracker: Arc::new(StateTracker::new(alerts, Duration::from_secs(300))),
            samples: Arc::new(FixedSamples(series)),
        };
        (TestServer::new(router(state.clone())).unwrap(), state)
    }

    #[tokio::test]
    async fn healthz_responds() {
        let (server, _) = server_with(vec![]).await;
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("ok");
    }

    #[tokio::test]
    async fn metrics_exposes_recorded_results() {
        let (server, state) = server_with(vec![]).await;
        state.sink.record(&ProbeResult::success(endpoint(), 120, 0));

        let response = server.get("/metrics").await;
        response.assert_status_ok();
        assert!(response.text().contains("service_up"));
        assert!(response.text().contains(r#"service_name="rpc-1""#));
    }

    #[tokio::test]
    async fn status_reflects_tracker() {
        let (server, state) = server_with(vec![]).await;
        state
            .tracker
            .record(&ProbeResult::failure(endpoint(), 10_000, 2, "503".to_string()))
            .await;

        let response = server.get("/api/v1/status").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body[0]["phase"], "DOWN_PENDING");
        assert_eq!(body[0]["endpoint"]["name"], "rpc-1");
    }

    #[tokio::test]
    async fn uptime_builds_report_from_samples() {
        let series = RangeSeries {
            metric: HashMap::from([
                ("service_name".to_string(), "rpc-1".to_string()),
                ("group".to_string(), "RPC".to_string()),
                ("url".to_string(), "https://rpc1.example.com".to_string()),
            ]),
            values: vec![(Utc::now().timestamp() as f64, "1".to_string())],
        };

        let (server, _) = server_with(vec![series]).await;
        let response = server.get("/api/v1/uptime").add_query_param("bucket", "day").await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["bucket"], "day");
        assert_eq!(body["services"][0]["name"], "rpc-1");
        assert_eq!(body["services"][0]["buckets"].as_array().unwrap().len(), 30);
    }

    #[tokio::test]
    async fn unknown_bucket_is_a_bad_request() {
        let (server, _) = server_with(vec![]).await;
        let response = server.get("/api/v1/uptime").add_query_param("bucket", "fortnight").await;
        response.assert_status_bad_request();
    }
}
