use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::{AccessToken, Channel, Message, Retention};

// -- Errors --

#[derive(Debug, Serialize)]
pub struct ProblemResponse {
    pub code: u16,
    pub kind: ErrorKind,
    pub description: String,
}

impl ProblemResponse {
    pub fn new(kind: ErrorKind) -> Self {
        Self { code: kind.code(), kind, description: kind.description().to_string() }
    }
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    #[serde(default)]
    pub public_read: bool,
    #[serde(default)]
    pub public_write: bool,
    #[serde(default)]
    pub sequenced: bool,
    #[serde(default)]
    pub retention: Retention,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmendChannelRequest {
    pub public_read: bool,
    pub public_write: bool,
    pub locked: bool,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub id: String,
    pub href: String,
    pub public_read: bool,
    pub public_write: bool,
    pub locked: bool,
    pub sequenced: bool,
    pub head_sequence: i64,
    pub retention: Retention,
    pub access_tokens: Vec<TokenResponse>,
}

impl ChannelResponse {
    pub fn new(channel: Channel, href: String) -> Self {
        Self {
            id: channel.external_id,
            href,
            public_read: channel.public_read,
            public_write: channel.public_write,
            locked: channel.locked,
            sequenced: channel.sequenced,
            head_sequence: channel.head_sequence,
            retention: channel.retention,
            access_tokens: channel.tokens.into_iter().map(TokenResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub channels: Vec<ChannelResponse>,
}

// -- Tokens --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub description: String,
    pub can_read: bool,
    pub can_write: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub token: String,
    pub description: String,
    pub can_read: bool,
    pub can_write: bool,
}

impl From<AccessToken> for TokenResponse {
    fn from(token: AccessToken) -> Self {
        Self {
            id: token.id.to_string(),
            token: token.secret,
            description: token.description,
            can_read: token.can_read,
            can_write: token.can_write,
        }
    }
}

// -- Messages --

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub sequence: i64,
    pub received: DateTime<Utc>,
    pub content_type: String,
    /// Base64 encoded payload.
    pub payload: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            sequence: message.sequence,
            received: message.received_at,
            content_type: message.content_type,
            payload: B64.encode(&message.payload),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkMessageRequest {
    pub read: bool,
}

// -- Push notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushRegistrationRequest {
    pub token: String,
}
