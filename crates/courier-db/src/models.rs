//! Row mapping between SQLite rows and `courier_types` models.

use chrono::{DateTime, Utc};
use courier_types::models::{AccessToken, Channel, Message, PushRegistration, Retention};
use rusqlite::Row;

pub(crate) const TOKEN_COLUMNS: &str =
    "t.id, t.account_id, t.channel_id, t.token, t.description, t.can_read, t.can_write, t.valid_from, t.valid_to";

pub(crate) const CHANNEL_COLUMNS: &str = "c.id, c.owner, c.external_id, c.public_read, c.public_write, c.locked, \
     c.sequenced, c.min_age_days, c.max_age_days, c.auto_prune, \
     (SELECT COALESCE(MAX(m.seq), 0) FROM messages m WHERE m.channel_id = c.id)";

pub(crate) const MESSAGE_COLUMNS: &str =
    "m.id, m.channel_id, m.from_token, m.seq, m.received_at, m.content_type, m.payload";

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn token_from_row(row: &Row) -> rusqlite::Result<AccessToken> {
    Ok(AccessToken {
        id: row.get(0)?,
        account: row.get(1)?,
        channel: row.get(2)?,
        secret: row.get(3)?,
        description: row.get(4)?,
        can_read: row.get(5)?,
        can_write: row.get(6)?,
        valid_from: from_millis(row.get(7)?),
        valid_to: row.get::<_, Option<i64>>(8)?.map(from_millis),
    })
}

/// Maps a `CHANNEL_COLUMNS` row. Tokens are loaded separately.
pub(crate) fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        owner: row.get(1)?,
        external_id: row.get(2)?,
        public_read: row.get(3)?,
        public_write: row.get(4)?,
        locked: row.get(5)?,
        sequenced: row.get(6)?,
        retention: Retention {
            min_age_days: row.get(7)?,
            max_age_days: row.get(8)?,
            auto_prune: row.get(9)?,
        },
        head_sequence: row.get(10)?,
        tokens: Vec::new(),
    })
}

pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        channel: row.get(1)?,
        from_token: row.get(2)?,
        sequence: row.get(3)?,
        received_at: from_millis(row.get(4)?),
        content_type: row.get(5)?,
        payload: row.get(6)?,
    })
}

pub(crate) fn push_from_row(row: &Row) -> rusqlite::Result<PushRegistration> {
    Ok(PushRegistration {
        id: row.get(0)?,
        token: row.get(1)?,
        device_token: row.get(2)?,
        is_valid: row.get(3)?,
    })
}
