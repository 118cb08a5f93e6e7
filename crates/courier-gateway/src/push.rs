//! Mobile push delivery through an external gateway.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, error, info, warn};

use courier_db::Database;
use courier_types::events::NotificationEvent;

use crate::sink::NotificationSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The gateway no longer knows the device token.
    RegistrationInvalid,
    Failed(String),
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> PushOutcome;
}

/// Posts FCM v1 style messages to a configured endpoint.
pub struct HttpPushGateway {
    client: reqwest::Client,
    endpoint: String,
    key: String,
}

impl HttpPushGateway {
    pub fn new(endpoint: String, key: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint, key }
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> PushOutcome {
        let message = json!({
            "message": {
                "token": device_token,
                "notification": { "title": title, "body": body },
                "data": data,
            }
        });

        let response = match self.client.post(&self.endpoint).bearer_auth(&self.key).json(&message).send().await {
            Ok(response) => response,
            Err(e) => return PushOutcome::Failed(e.to_string()),
        };

        match response.status() {
            status if status.is_success() => PushOutcome::Delivered,
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => PushOutcome::RegistrationInvalid,
            status => PushOutcome::Failed(format!("gateway returned {status}")),
        }
    }
}

/// Sends a push to every valid device registered by the other active
/// tokens of the channel.
pub struct PushNotifier {
    db: Arc<Database>,
    gateway: Arc<dyn PushGateway>,
    title: String,
}

impl PushNotifier {
    pub fn new(db: Arc<Database>, gateway: Arc<dyn PushGateway>, title: String) -> Self {
        Self { db, gateway, title }
    }
}

#[async_trait]
impl NotificationSink for PushNotifier {
    async fn notify(&self, source_token: i64, event: &NotificationEvent) {
        let db = self.db.clone();
        let channel = event.channel;
        let targets = match tokio::task::spawn_blocking(move || db.push_targets(channel, source_token)).await {
            Ok(Ok(targets)) => targets,
            Ok(Err(e)) => {
                warn!("Could not load push targets for channel {channel}: {e}");
                return;
            }
            Err(e) => {
                error!("Push target lookup panicked: {e}");
                return;
            }
        };
        if targets.is_empty() {
            return;
        }

        let data = HashMap::from([
            ("channel_id".to_string(), event.channel_id.clone()),
            ("sequence".to_string(), event.sequence.to_string()),
            ("received".to_string(), event.received.to_rfc3339()),
        ]);

        let outcomes = join_all(targets.iter().map(|target| {
            self.gateway.send(&target.device_token, &self.title, &event.notification, &data)
        }))
        .await;

        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                PushOutcome::Delivered => debug!("Push delivered to registration {}", target.id),
                PushOutcome::RegistrationInvalid => {
                    info!("Push registration {} rejected by gateway, marking invalid", target.id);
                    let db = self.db.clone();
                    let device = target.device_token.clone();
                    match tokio::task::spawn_blocking(move || db.mark_push_invalid(&device)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Could not invalidate push registration {}: {e}", target.id),
                        Err(e) => error!("Push invalidation panicked: {e}"),
                    }
                }
                PushOutcome::Failed(reason) => {
                    warn!("Push to registration {} failed: {reason}", target.id)
                }
            }
        }
    }
}
