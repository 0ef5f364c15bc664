//! upctl: a self-hostable uptime monitor.
//!
//! Probes a fleet of HTTP endpoints on a fixed interval, exposes the latest
//! outcomes as Prometheus gauges, confirms outages through a grace-period
//! state machine with webhook alerting, and reconstructs historical uptime
//! from Prometheus range data on demand.

use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod alerts;
pub mod api;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod probes;
pub mod registry;
pub mod state;
pub mod telemetry;
pub mod uptime;

use crate::alerts::AlertDispatcher;
use crate::config::Config;
use crate::errors::Result;
use crate::metrics::MetricsSink;
use crate::probes::{ProbeExecutor, ProbeScheduler};
use crate::registry::EndpointRegistry;
use crate::state::StateTracker;
use crate::uptime::{PrometheusClient, SampleSource};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sink: Arc<MetricsSink>,
    pub tracker: Arc<StateTracker>,
    pub samples: Arc<dyn SampleSource>,
}

/// Owns the background probe loop and the HTTP server.
pub struct Application {
    state: AppState,
    shutdown: CancellationToken,
}

impl Application {
    /// Wire every component together and start the probe loop.
    ///
    /// Must run inside a tokio runtime: the alert dispatcher and the
    /// scheduler are spawned here.
    pub fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(EndpointRegistry::load(&config.endpoints_file)?);
        info!(endpoints = registry.len(), file = %config.endpoints_file, "endpoint registry loaded");

        let shutdown = CancellationToken::new();

        let alerts = AlertDispatcher::spawn(&config.alerts, shutdown.child_token())
            .context("failed to build alert webhook client")?;
        let sink = Arc::new(MetricsSink::new()?);
        let tracker = Arc::new(StateTracker::new(alerts, config.monitor.grace_period));
        let executor =
            ProbeExecutor::new(config.monitor.clone()).context("failed to build probe http client")?;
        let samples: Arc<dyn SampleSource> = Arc::new(
            PrometheusClient::new(&config.prometheus).context("failed to build prometheus client")?,
        );

        let scheduler = ProbeScheduler::new(
            registry,
            executor,
            sink.clone(),
            tracker.clone(),
            config.monitor.clone(),
        );
        let scheduler_shutdown = shutdown.child_token();
        tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

        Ok(Self {
            state: AppState {
                config: Arc::new(config),
                sink,
                tracker,
                samples,
            },
            shutdown,
        })
    }

    /// Serve the HTTP surface until the shutdown future resolves, then stop
    /// the background tasks.
    pub async fn serve<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(addr = %addr, "http server listening");

        let token = self.shutdown.clone();
        axum::serve(listener, api::router(self.state))
            .with_graceful_shutdown(async move {
                shutdown_signal.await;
                token.cancel();
            })
            .await
            .context("http server error")?;

        info!("shutdown complete");
        Ok(())
    }
}
