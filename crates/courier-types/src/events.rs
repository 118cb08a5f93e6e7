use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted after a message has been persisted. Sent as JSON to live
/// subscribers and summarized into push notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Internal channel id, used for routing. Never serialized.
    #[serde(skip)]
    pub channel: i64,
    /// Externally addressable channel id.
    pub channel_id: String,
    pub sequence: i64,
    pub received: DateTime<Utc>,
    /// Human readable notification text, e.g. "New message arrived".
    pub notification: String,
}

impl NotificationEvent {
    pub fn to_json(&self) -> String {
        // Plain struct of strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
