//! Per-endpoint availability state machine.
//!
//! Probe outcomes drive a three-phase machine per endpoint: `Up`,
//! `DownPending` (failing, inside the grace window) and `DownConfirmed`. A
//! first failure arms a cancellable grace timer; recovery before it fires
//! silences the blip entirely. Once the timer fires the outage is confirmed
//! and exactly one down alert goes out; the matching recovery alert carries
//! the measured outage length. Each outage episode therefore produces at
//! most one alert pair.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{AlertEvent, AlertSender};
use crate::probes::ProbeResult;
use crate::registry::EndpointId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServicePhase {
    Up,
    DownPending,
    DownConfirmed,
}

#[derive(Debug)]
struct ServiceState {
    phase: ServicePhase,
    last_change_at: DateTime<Utc>,
    /// Set when the outage is confirmed; recovery measures downtime from here
    down_started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    grace_timer: Option<JoinHandle<()>>,
}

impl ServiceState {
    fn new() -> Self {
        Self {
            phase: ServicePhase::Up,
            last_change_at: Utc::now(),
            down_started_at: None,
            last_error: None,
            grace_timer: None,
        }
    }
}

/// Point-in-time view of one endpoint, served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub endpoint: EndpointId,
    pub phase: ServicePhase,
    pub since: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Tracks every endpoint's phase and emits alerts on confirmed transitions.
pub struct StateTracker {
    states: DashMap<EndpointId, Arc<Mutex<ServiceState>>>,
    alerts: AlertSender,
    grace_period: Duration,
}

impl StateTracker {
    pub fn new(alerts: AlertSender, grace_period: Duration) -> Self {
        Self {
            states: DashMap::new(),
            alerts,
            grace_period,
        }
    }

    /// Feed one probe outcome through the state machine.
    ///
    /// The grace timer locks the same per-endpoint mutex before inspecting
    /// the phase, so a recovery racing the timer resolves to whichever side
    /// takes the lock first and never double-fires.
    pub async fn record(&self, result: &ProbeResult) {
        let cell = self
            .states
            .entry(result.endpoint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ServiceState::new())))
            .clone();
        let mut state = cell.lock().await;

        match (state.phase, result.success) {
            (ServicePhase::Up, true) => {
                state.last_error = None;
            }
            (ServicePhase::Up, false) => {
                debug!(endpoint = %result.endpoint, "endpoint failing, grace timer armed");
                state.phase = ServicePhase::DownPending;
                state.last_change_at = result.checked_at;
                state.last_error = result.error.clone();
                state.grace_timer = Some(self.arm_grace_timer(&result.endpoint, cell.clone()));
            }
            (ServicePhase::DownPending, false) | (ServicePhase::DownConfirmed, false) => {
                state.last_error = result.error.clone();
            }
            (ServicePhase::DownPending, true) => {
                debug!(endpoint = %result.endpoint, "endpoint recovered within grace period");
                if let Some(timer) = state.grace_timer.take() {
                    timer.abort();
                }
                state.phase = ServicePhase::Up;
                state.last_change_at = result.checked_at;
                state.last_error = None;
            }
            (ServicePhase::DownConfirmed, true) => {
                let downtime = state
                    .down_started_at
                    .map(|started| (Utc::now() - started).to_std().unwrap_or(Duration::ZERO))
                    .unwrap_or(Duration::ZERO);
                info!(endpoint = %result.endpoint, downtime_secs = downtime.as_secs(), "endpoint recovered");
                state.phase = ServicePhase::Up;
                state.last_change_at = result.checked_at;
                state.down_started_at = None;
                state.last_error = None;
                self.alerts.send(AlertEvent::recovered(result.endpoint.clone(), downtime));
            }
        }
    }

    /// Spawn the timer that confirms an outage once the grace period passes
    /// without a recovery.
    fn arm_grace_timer(&self, endpoint: &EndpointId, cell: Arc<Mutex<ServiceState>>) -> JoinHandle<()> {
        let endpoint = endpoint.clone();
        let alerts = self.alerts.clone();
        let grace_period = self.grace_period;

        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;

            let mut state = cell.lock().await;
            if state.phase != ServicePhase::DownPending {
                return;
            }

            warn!(
                endpoint = %endpoint,
                error = state.last_error.as_deref().unwrap_or("unknown"),
                "outage confirmed"
            );
            state.phase = ServicePhase::DownConfirmed;
            state.last_change_at = Utc::now();
            state.down_started_at = Some(Utc::now());
            state.grace_timer = None;
            alerts.send(AlertEvent::down(endpoint, state.last_error.clone()));
        })
    }

    /// Current phase of every tracked endpoint, sorted for stable output.
    pub async fn snapshot(&self) -> Vec<ServiceStatus> {
        let mut statuses = Vec::with_capacity(self.states.len());
        for entry in self.states.iter() {
            let state = entry.value().lock().await;
            statuses.push(ServiceStatus {
                endpoint: entry.key().clone(),
                phase: state.phase,
                since: state.last_change_at,
                last_error: state.last_error.clone(),
            });
        }
        statuses.sort_by(|a, b| {
            (a.endpoint.group.as_str(), a.endpoint.name.as_str())
                .cmp(&(b.endpoint.group.as_str(), b.endpoint.name.as_str()))
        });
        statuses
    }
}
