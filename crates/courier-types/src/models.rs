use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Description given to the token minted alongside every new channel.
pub const OWNER_TOKEN_DESCRIPTION: &str = "Owner";

/// Retention window of a channel. Both bounds are optional; when both are
/// set `min_age_days` must not exceed `max_age_days`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub min_age_days: Option<u32>,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub auto_prune: bool,
}

impl Retention {
    pub fn is_valid(&self) -> bool {
        match (self.min_age_days, self.max_age_days) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }

    /// Earliest instant at which a message received at `received_at` may be deleted.
    pub fn deletable_after(&self, received_at: DateTime<Utc>) -> DateTime<Utc> {
        match self.min_age_days {
            Some(days) => received_at + Duration::days(days as i64),
            None => received_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub external_id: String,
    pub owner: i64,
    pub public_read: bool,
    pub public_write: bool,
    pub locked: bool,
    pub sequenced: bool,
    pub retention: Retention,
    /// Highest sequence written to the channel, 0 when empty.
    pub head_sequence: i64,
    /// Currently active tokens.
    pub tokens: Vec<AccessToken>,
}

/// Input for channel creation. `locked` always starts false.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewChannel {
    pub public_read: bool,
    pub public_write: bool,
    pub sequenced: bool,
    pub retention: Retention,
}

/// The only channel fields that may change after creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelAmendment {
    pub public_read: bool,
    pub public_write: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    pub account: i64,
    pub channel: i64,
    pub secret: String,
    pub description: String,
    pub can_read: bool,
    pub can_write: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// A token is active until its `valid_to` instant has passed.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.valid_to.is_none_or(|valid_to| valid_to > now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewToken {
    pub description: String,
    pub can_read: bool,
    pub can_write: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRegistration {
    pub id: i64,
    pub token: i64,
    pub device_token: String,
    pub is_valid: bool,
}

/// A persisted message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub channel: i64,
    pub from_token: i64,
    pub sequence: i64,
    pub received_at: DateTime<Utc>,
    pub content_type: String,
    pub payload: Vec<u8>,
}

/// Per-recipient delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStatus {
    pub message: i64,
    pub token: i64,
    pub is_read: bool,
    pub is_deleted: bool,
}

/// Result of listing a token's messages.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    pub messages: Vec<Message>,
    /// Highest sequence the token has read. Only present on sequenced channels.
    pub cursor: Option<i64>,
}
