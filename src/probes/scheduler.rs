//! Probe cycle scheduling.
//!
//! A cycle walks the registry in fixed-size batches: every endpoint in a
//! batch is checked concurrently, then the scheduler pauses briefly before
//! the next batch to avoid bursting the whole fleet at once. Cycles start
//! immediately and then on a fixed interval; a cycle that overruns its slot
//! skips the missed ticks instead of stacking them up.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::metrics::MetricsSink;
use crate::probes::{ProbeExecutor, ProbeResult};
use crate::registry::{EndpointId, EndpointRegistry, EndpointSpec};
use crate::state::StateTracker;

pub struct ProbeScheduler {
    registry: Arc<EndpointRegistry>,
    executor: ProbeExecutor,
    sink: Arc<MetricsSink>,
    tracker: Arc<StateTracker>,
    config: MonitorConfig,
    /// Endpoints with a check currently in progress; a new cycle skips them
    /// rather than piling a second check on a slow endpoint
    in_flight: DashMap<EndpointId, ()>,
}

impl ProbeScheduler {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        executor: ProbeExecutor,
        sink: Arc<MetricsSink>,
        tracker: Arc<StateTracker>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            sink,
            tracker,
            config,
            in_flight: DashMap::new(),
        }
    }

    /// Run cycles until shutdown. The first cycle starts immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            endpoints = self.registry.len(),
            interval = ?self.config.interval,
            "probe scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("probe scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// One pass over every registered endpoint.
    pub async fn run_cycle(&self) {
        let started = std::time::Instant::now();

        for (index, batch) in self.registry.endpoints().chunks(self.config.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_pause).await;
            }
            futures::future::join_all(batch.iter().map(|spec| self.check_one(spec))).await;
        }

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "probe cycle finished");
    }

    async fn check_one(&self, spec: &EndpointSpec) {
        let id = spec.id();

        // In-flight guard: at most one concurrent check per endpoint
        match self.in_flight.entry(id.clone()) {
            dashmap::Entry::Occupied(_) => {
                debug!(endpoint = %id, "check already in flight, skipping");
                return;
            }
            dashmap::Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let result = match tokio::time::timeout(self.config.check_deadline, self.executor.check(spec)).await {
            Ok(result) => result,
            Err(_) => ProbeResult::failure(
                id.clone(),
                self.config.failure_response_time_ms,
                self.config.retries - 1,
                format!("check exceeded deadline of {:?}", self.config.check_deadline),
            ),
        };

        if result.success {
            debug!(endpoint = %id, response_time_ms = result.response_time_ms, "check succeeded");
        } else {
            warn!(
                endpoint = %id,
                retries = result.retries,
                error = result.error.as_deref().unwrap_or("unknown"),
                "check failed"
            );
        }

        self.sink.record(&result);
        self.tracker.record(&result).await;
        self.in_flight.remove(&id);
    }
}
