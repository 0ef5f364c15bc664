//! Fire-and-forget webhook delivery.
//!
//! State transitions are pushed onto a bounded channel; a background sender
//! task drains it and POSTs each event's payload to the configured webhook.
//! Delivery is best-effort: failures are logged and never retried, and a
//! full channel drops the event rather than blocking the probe path.

use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::alerts::AlertEvent;
use crate::config::AlertsConfig;

/// Cheap cloneable handle used by the state tracker to emit alerts.
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: Option<mpsc::Sender<AlertEvent>>,
}

impl AlertSender {
    /// A sender with no webhook configured. Alerts are logged and dropped,
    /// so the state machine behaves identically in dev setups.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A sender backed by a plain channel, so tests can observe emitted
    /// events without a webhook server.
    #[cfg(test)]
    pub(crate) fn channelled(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn send(&self, event: AlertEvent) {
        match &self.tx {
            None => {
                info!(alert = %event.status_line(), "no alert webhook configured, logging only");
            }
            Some(tx) => {
                if let Err(e) = tx.try_send(event) {
                    warn!(error = %e, "alert channel full, dropping event");
                }
            }
        }
    }
}

/// Owns the background sender task.
pub struct AlertDispatcher;

impl AlertDispatcher {
    /// Spawn the sender task and return the handle used to emit events.
    /// Without a webhook URL no task is spawned and a disabled sender is
    /// returned.
    pub fn spawn(config: &AlertsConfig, shutdown: CancellationToken) -> Result<AlertSender, reqwest::Error> {
        let Some(url) = config.webhook_url.clone() else {
            return Ok(AlertSender::disabled());
        };

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        tokio::spawn(run_sender(client, url, rx, shutdown, config.max_concurrent_sends));

        Ok(AlertSender { tx: Some(tx) })
    }
}

async fn run_sender(
    client: reqwest::Client,
    url: Url,
    mut rx: mpsc::Receiver<AlertEvent>,
    shutdown: CancellationToken,
    max_concurrent: usize,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("alert sender shutting down");
                break;
            }
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
                let client = client.clone();
                let url = url.clone();
                tokio::spawn(async move {
                    deliver(&client, &url, &event).await;
                    drop(permit);
                });
            }
        }
    }
}

async fn deliver(client: &reqwest::Client, url: &Url, event: &AlertEvent) {
    match client.post(url.clone()).json(&event.payload()).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(alert = %event.status_line(), "alert delivered");
        }
        Ok(response) => {
            warn!(
                alert = %event.status_line(),
                status = %response.status(),
                "alert webhook rejected event, not retrying"
            );
        }
        Err(e) => {
            warn!(
                alert = %event.status_line(),
                error = %e,
                "alert webhook delivery failed, not retrying"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EndpointId;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint() -> EndpointId {
        EndpointId {
            name: "rpc-1".to_string(),
            group: "RPC".to_string(),
            url: "https://rpc1.example.com".to_string(),
        }
    }

    fn config_for(server: &MockServer) -> AlertsConfig {
        AlertsConfig {
            webhook_url: Some(Url::parse(&server.uri()).unwrap()),
            timeout: Duration::from_secs(1),
            channel_capacity: 8,
            max_concurrent_sends: 2,
        }
    }

    #[tokio::test]
    async fn delivers_event_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "type": "service.down" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let shutdown = CancellationToken::new();
        let sender = AlertDispatcher::spawn(&config_for(&server), shutdown.clone()).unwrap();
        sender.send(AlertEvent::down(endpoint(), Some("boom".to_string())));

        // Give the background task time to deliver before verification
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
    }

    #[tokio::test]
    async fn failed_delivery_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let shutdown = CancellationToken::new();
        let sender = AlertDispatcher::spawn(&config_for(&server), shutdown.clone()).unwrap();
        sender.send(AlertEvent::recovered(endpoint(), Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
    }

    #[tokio::test]
    async fn disabled_sender_swallows_events() {
        let sender = AlertSender::disabled();
        sender.send(AlertEvent::down(endpoint(), None));
    }
}
