use std::sync::Arc;

use async_trait::async_trait;
use courier_types::events::NotificationEvent;
use futures_util::future::join_all;

/// Something that tells clients a message arrived. Implementations log
/// their own failures; notifying never fails the caller.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `source_token` is the author, who must not be notified.
    async fn notify(&self, source_token: i64, event: &NotificationEvent);
}

/// Runs every sink concurrently.
pub async fn notify_all(sinks: &[Arc<dyn NotificationSink>], source_token: i64, event: &NotificationEvent) {
    join_all(sinks.iter().map(|sink| sink.notify(source_token, event))).await;
}
