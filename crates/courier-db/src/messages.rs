//! Message sequencing, per-recipient read state and retention.

use std::thread;
use std::time::Duration;

use courier_types::models::{Message, MessageList, MessageStatus, Retention};
use rusqlite::{ErrorCode, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::models::{MESSAGE_COLUMNS, from_millis, message_from_row, to_millis};
use crate::{Database, Error, Result};

const MAX_BUSY_RETRIES: u32 = 10;
const BUSY_BACKOFF: Duration = Duration::from_millis(25);
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Outcome of one write transaction.
#[derive(Debug)]
pub enum WriteAttempt {
    Written(Message),
    /// Another writer took the sequence number first; the attempt was rolled back.
    Conflict,
}

/// True when `err` is the unique violation on `messages(channel_id, seq)`.
pub fn is_sequence_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains("messages.channel_id, messages.seq")
        }
        _ => false,
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

impl Database {
    /// Appends a message to `channel`, assigning the next sequence number and
    /// a status row for every token active on the channel right now.
    pub fn write_message(&self, channel: i64, author: i64, content_type: &str, payload: &[u8]) -> Result<Message> {
        if content_type.trim().is_empty() {
            return Err(Error::Validation("content type is required".into()));
        }
        if payload.is_empty() {
            return Err(Error::Validation("payload is empty".into()));
        }
        let limit = self.config().max_message_size;
        if payload.len() > limit {
            return Err(Error::PayloadTooLarge { size: payload.len(), limit });
        }

        let mut busy = 0;
        loop {
            match self.try_write_message(channel, author, content_type, payload) {
                Ok(WriteAttempt::Written(message)) => {
                    debug!("Message {} written to channel {channel} as seq {}", message.id, message.sequence);
                    return Ok(message);
                }
                Ok(WriteAttempt::Conflict) => {
                    debug!("Sequence conflict on channel {channel}, retrying");
                }
                Err(Error::Database(e)) if is_busy(&e) && busy < MAX_BUSY_RETRIES => {
                    busy += 1;
                    debug!("Database busy writing to channel {channel} (attempt {busy})");
                    thread::sleep(BUSY_BACKOFF * busy);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_write_message(
        &self,
        channel: i64,
        author: i64,
        content_type: &str,
        payload: &[u8],
    ) -> Result<WriteAttempt> {
        let now = to_millis(self.now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let (locked, sequenced): (bool, bool) = tx
                .query_row(
                    "SELECT locked, sequenced FROM channels WHERE id = ?1",
                    params![channel],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?
                .ok_or(Error::NotFound("channel"))?;
            if locked {
                return Err(Error::ChannelLocked);
            }
            if sequenced {
                let backlog: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM message_status
                     WHERE token_id = ?1 AND is_read = 0 AND is_deleted = 0",
                    params![author],
                    |r| r.get(0),
                )?;
                if backlog > 0 {
                    return Err(Error::SequencingFailure);
                }
            }

            let inserted = tx.query_row(
                "INSERT INTO messages (channel_id, from_token, seq, received_at, content_type, payload)
                 SELECT ?1, ?2, COALESCE(MAX(seq), 0) + 1, ?3, ?4, ?5 FROM messages WHERE channel_id = ?1
                 RETURNING id, channel_id, from_token, seq, received_at, content_type, payload",
                params![channel, author, now, content_type, payload],
                message_from_row,
            );
            let message = match inserted {
                Ok(message) => message,
                Err(e) if is_sequence_conflict(&e) => return Ok(WriteAttempt::Conflict),
                Err(e) => return Err(e.into()),
            };

            tx.execute(
                "INSERT INTO message_status (message_id, token_id, is_read, is_deleted)
                 SELECT ?1, id, id = ?2, 0 FROM access_tokens
                 WHERE channel_id = ?3 AND (valid_to IS NULL OR valid_to > ?4)",
                params![message.id, author, channel, now],
            )?;
            tx.commit()?;
            Ok(WriteAttempt::Written(message))
        })
    }

    /// Messages visible to `token` in sequence order. The cursor is only
    /// reported on sequenced channels.
    pub fn list_messages(&self, token: i64, only_unread: bool) -> Result<MessageList> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let sequenced: bool = tx
                .query_row(
                    "SELECT c.sequenced FROM access_tokens t
                     JOIN channels c ON c.id = t.channel_id
                     WHERE t.id = ?1",
                    params![token],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or(Error::NotFound("token"))?;

            let messages = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     JOIN message_status s ON s.message_id = m.id
                     WHERE s.token_id = ?1 AND s.is_deleted = 0 AND (?2 = 0 OR s.is_read = 0)
                     ORDER BY m.seq"
                ))?;
                stmt.query_map(params![token, only_unread], message_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };

            let cursor = if sequenced {
                Some(tx.query_row(
                    "SELECT COALESCE(MAX(m.seq), 0) FROM messages m
                     JOIN message_status s ON s.message_id = m.id
                     WHERE s.token_id = ?1 AND s.is_read = 1 AND s.is_deleted = 0",
                    params![token],
                    |r| r.get(0),
                )?)
            } else {
                None
            };

            tx.finish()?;
            Ok(MessageList { messages, cursor })
        })
    }

    /// Highest sequence on a sequenced channel written by someone other than
    /// `token` and still visible to at least one recipient. Zero otherwise.
    pub fn head_sequence(&self, token: i64, channel: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(MAX(m.seq), 0) FROM messages m
                 JOIN channels c ON c.id = m.channel_id
                 WHERE c.external_id = ?1 AND c.sequenced = 1 AND m.from_token != ?2
                   AND EXISTS (SELECT 1 FROM message_status s WHERE s.message_id = m.id AND s.is_deleted = 0)",
                params![channel, token],
                |r| r.get(0),
            )?)
        })
    }

    pub fn get_message(&self, channel: &str, seq: i64) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages m
                         JOIN channels c ON c.id = m.channel_id
                         WHERE c.external_id = ?1 AND m.seq = ?2
                           AND EXISTS (SELECT 1 FROM message_status s
                                       WHERE s.message_id = m.id AND s.is_deleted = 0)"
                    ),
                    params![channel, seq],
                    message_from_row,
                )
                .optional()?)
        })
    }

    /// Status rows of a message, ordered by token.
    pub fn message_statuses(&self, message: i64) -> Result<Vec<MessageStatus>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, token_id, is_read, is_deleted FROM message_status
                 WHERE message_id = ?1 ORDER BY token_id",
            )?;
            let statuses = stmt
                .query_map(params![message], |r| {
                    Ok(MessageStatus {
                        message: r.get(0)?,
                        token: r.get(1)?,
                        is_read: r.get(2)?,
                        is_deleted: r.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(statuses)
        })
    }

    /// Sets the read flag of `token`'s row for `seq`, and of every older row
    /// when `include_older` is set. Returns the number of rows touched.
    pub fn mark_messages(
        &self,
        channel: &str,
        token: i64,
        seq: i64,
        include_older: bool,
        is_read: bool,
    ) -> Result<usize> {
        let updated = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM message_status s
                     JOIN messages m ON m.id = s.message_id
                     JOIN channels c ON c.id = m.channel_id
                     WHERE s.token_id = ?1 AND c.external_id = ?2 AND m.seq = ?3",
                    params![token, channel, seq],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(Error::NotFound("message"));
            }

            let updated = tx.execute(
                "UPDATE message_status SET is_read = ?1
                 WHERE token_id = ?2 AND message_id IN (
                     SELECT m.id FROM messages m
                     JOIN channels c ON c.id = m.channel_id
                     WHERE c.external_id = ?3 AND (m.seq = ?4 OR (?5 AND m.seq < ?4))
                 )",
                params![is_read, token, channel, seq, include_older],
            )?;
            tx.commit()?;
            Ok(updated)
        })?;

        debug!("Token {token} marked {updated} message(s) read={is_read} up to seq {seq}");
        Ok(updated)
    }

    /// Hides a message from every recipient once its minimum retention age has passed.
    pub fn delete_message(&self, channel: &str, seq: i64) -> Result<()> {
        let now = self.now();
        let message = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (message, received_at, min_age_days): (i64, i64, Option<u32>) = tx
                .query_row(
                    "SELECT m.id, m.received_at, c.min_age_days FROM messages m
                     JOIN channels c ON c.id = m.channel_id
                     WHERE c.external_id = ?1 AND m.seq = ?2
                       AND EXISTS (SELECT 1 FROM message_status s
                                   WHERE s.message_id = m.id AND s.is_deleted = 0)",
                    params![channel, seq],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?
                .ok_or(Error::NotFound("message"))?;

            let retention = Retention { min_age_days, ..Retention::default() };
            if now < retention.deletable_after(from_millis(received_at)) {
                return Err(Error::RetentionNotExpired);
            }

            tx.execute("UPDATE message_status SET is_deleted = 1 WHERE message_id = ?1", params![message])?;
            tx.commit()?;
            Ok(message)
        })?;

        info!("Message {message} (seq {seq}) deleted");
        Ok(())
    }

    /// Physically removes messages on auto-pruning channels that are either
    /// deleted for every recipient or older than the channel's maximum age.
    /// The newest message of a channel is kept so sequence numbers are never reused.
    pub fn prune_messages(&self) -> Result<usize> {
        let now = to_millis(self.now());
        let pruned = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let ids = {
                let mut stmt = tx.prepare(
                    "SELECT m.id FROM messages m
                     JOIN channels c ON c.id = m.channel_id
                     WHERE c.auto_prune = 1
                       AND m.seq < (SELECT MAX(seq) FROM messages WHERE channel_id = m.channel_id)
                       AND (
                           NOT EXISTS (SELECT 1 FROM message_status s
                                       WHERE s.message_id = m.id AND s.is_deleted = 0)
                           OR (c.max_age_days IS NOT NULL AND m.received_at <= ?1 - c.max_age_days * ?2)
                       )",
                )?;
                stmt.query_map(params![now, DAY_MILLIS], |r| r.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };

            for id in &ids {
                tx.execute("DELETE FROM message_status WHERE message_id = ?1", params![id])?;
                tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(ids.len())
        })?;

        if pruned > 0 {
            info!("Pruned {pruned} message(s)");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use courier_types::models::{ChannelAmendment, NewChannel, NewToken, Retention};
    use parking_lot::Mutex;
    use rusqlite::params;
    use tempfile::TempDir;

    use super::*;
    use crate::test_util::{account, temp_db};
    use crate::{Clock, DbConfig, ManualClock};

    fn rw() -> NewToken {
        NewToken { description: "peer".into(), can_read: true, can_write: true }
    }

    #[test]
    fn validation_runs_before_storage() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner = channel.tokens[0].id;

        assert!(matches!(db.write_message(channel.id, owner, "", b"x"), Err(Error::Validation(_))));
        assert!(matches!(db.write_message(channel.id, owner, "text/plain", b""), Err(Error::Validation(_))));
        let big = vec![0u8; db.config().max_message_size + 1];
        assert!(matches!(
            db.write_message(channel.id, owner, "application/octet-stream", &big),
            Err(Error::PayloadTooLarge { .. })
        ));
        assert!(db.list_messages(owner, false).unwrap().messages.is_empty());
    }

    #[test]
    fn sequences_start_at_one_and_increase() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let other = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner = channel.tokens[0].id;

        let seqs: Vec<_> = (0..3)
            .map(|i| db.write_message(channel.id, owner, "text/plain", format!("m{i}").as_bytes()).unwrap())
            .map(|m| m.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let first_other = db.write_message(other.id, other.tokens[0].id, "text/plain", b"x").unwrap();
        assert_eq!(first_other.sequence, 1);
        assert_eq!(db.get_channel(channel.id).unwrap().unwrap().head_sequence, 3);
    }

    #[test]
    fn locked_channel_rejects_writes() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        db.amend_channel(
            &channel.external_id,
            ChannelAmendment { public_read: false, public_write: false, locked: true },
        )
        .unwrap();

        let result = db.write_message(channel.id, channel.tokens[0].id, "text/plain", b"x");
        assert!(matches!(result, Err(Error::ChannelLocked)));
    }

    #[test]
    fn missing_channel_is_not_found() {
        let (_dir, db, _clock) = temp_db();
        assert!(matches!(db.write_message(42, 1, "text/plain", b"x"), Err(Error::NotFound("channel"))));
        assert!(matches!(db.list_messages(42, false), Err(Error::NotFound("token"))));
    }

    #[test]
    fn duplicate_sequence_is_classified_as_conflict() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let message = db.write_message(channel.id, channel.tokens[0].id, "text/plain", b"x").unwrap();

        let err = db
            .with_conn_mut(|conn| {
                Ok(conn
                    .execute(
                        "INSERT INTO messages (channel_id, from_token, seq, received_at, content_type, payload)
                         VALUES (?1, ?2, ?3, 0, 'text/plain', x'00')",
                        params![channel.id, message.from_token, message.sequence],
                    )
                    .unwrap_err())
            })
            .unwrap();
        assert!(is_sequence_conflict(&err));

        let other = db
            .with_conn_mut(|conn| {
                Ok(conn
                    .execute(
                        "INSERT INTO channels (owner, external_id, public_read, public_write, sequenced)
                         VALUES (?1, ?2, 0, 0, 0)",
                        params![alice, channel.external_id],
                    )
                    .unwrap_err())
            })
            .unwrap();
        assert!(!is_sequence_conflict(&other));
    }

    /// Clock that moves forward by `step` every time it is read.
    struct SteppingClock {
        inner: ManualClock,
        step: Mutex<TimeDelta>,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let now = self.inner.now();
            self.inner.advance(*self.step.lock());
            now
        }
    }

    #[test]
    fn sequence_conflict_is_retried_with_the_next_sequence() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(SteppingClock { inner: ManualClock::new(start), step: Mutex::new(TimeDelta::zero()) });
        let dir = TempDir::new().unwrap();
        let db = Database::open_with_clock(&dir.path().join("conflict.db"), DbConfig::default(), clock.clone())
            .unwrap();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner = channel.tokens[0].id;
        db.write_message(channel.id, owner, "text/plain", b"one").unwrap();

        // The first attempt stamped at `contested` finds its sequence already taken.
        let contested = start + TimeDelta::seconds(1);
        clock.inner.set(contested);
        *clock.step.lock() = TimeDelta::seconds(1);
        db.with_conn_mut(|conn| {
            conn.execute_batch(&format!(
                "CREATE TRIGGER take_sequence BEFORE INSERT ON messages
                 WHEN NEW.received_at = {}
                 BEGIN
                     INSERT INTO messages (channel_id, from_token, seq, received_at, content_type, payload)
                     VALUES (NEW.channel_id, NEW.from_token, NEW.seq, NEW.received_at + 1, NEW.content_type, NEW.payload);
                 END;",
                to_millis(contested)
            ))?;
            Ok(())
        })
        .unwrap();

        let second = db.write_message(channel.id, owner, "text/plain", b"two").unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.received_at, contested + TimeDelta::seconds(1));

        let seqs: Vec<i64> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT seq FROM messages WHERE channel_id = ?1 ORDER BY seq")?;
                Ok(stmt.query_map(params![channel.id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .unwrap();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(db.message_statuses(second.id).unwrap().len(), 1);
    }

    #[test]
    fn cursor_only_on_sequenced_channels() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let plain = db.create_channel(alice, NewChannel::default()).unwrap();
        let sequenced = db.create_channel(alice, NewChannel { sequenced: true, ..NewChannel::default() }).unwrap();

        assert_eq!(db.list_messages(plain.tokens[0].id, false).unwrap().cursor, None);
        assert_eq!(db.list_messages(sequenced.tokens[0].id, false).unwrap().cursor, Some(0));

        db.write_message(sequenced.id, sequenced.tokens[0].id, "text/plain", b"a").unwrap();
        assert_eq!(db.list_messages(sequenced.tokens[0].id, false).unwrap().cursor, Some(1));
    }

    #[test]
    fn mark_read_single_and_older() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner = channel.tokens[0].id;
        let reader = db.create_token(alice, &channel.external_id, rw()).unwrap();
        for i in 0..4 {
            db.write_message(channel.id, owner, "text/plain", format!("{i}").as_bytes()).unwrap();
        }

        assert_eq!(db.list_messages(reader.id, true).unwrap().messages.len(), 4);
        assert_eq!(db.mark_messages(&channel.external_id, reader.id, 2, false, true).unwrap(), 1);
        let unread: Vec<_> =
            db.list_messages(reader.id, true).unwrap().messages.into_iter().map(|m| m.sequence).collect();
        assert_eq!(unread, vec![1, 3, 4]);

        assert_eq!(db.mark_messages(&channel.external_id, reader.id, 3, true, true).unwrap(), 3);
        assert_eq!(db.mark_messages(&channel.external_id, reader.id, 3, true, true).unwrap(), 3);
        let unread: Vec<_> =
            db.list_messages(reader.id, true).unwrap().messages.into_iter().map(|m| m.sequence).collect();
        assert_eq!(unread, vec![4]);

        db.mark_messages(&channel.external_id, reader.id, 1, false, false).unwrap();
        assert_eq!(db.list_messages(reader.id, true).unwrap().messages.len(), 2);
        assert_eq!(db.list_messages(reader.id, false).unwrap().messages.len(), 4);

        assert!(matches!(
            db.mark_messages(&channel.external_id, reader.id, 99, false, true),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn head_sequence_ignores_own_messages() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel { sequenced: true, ..NewChannel::default() }).unwrap();
        let owner = channel.tokens[0].id;
        let peer = db.create_token(alice, &channel.external_id, rw()).unwrap();

        db.write_message(channel.id, owner, "text/plain", b"1").unwrap();
        assert_eq!(db.head_sequence(peer.id, &channel.external_id).unwrap(), 1);
        assert_eq!(db.head_sequence(owner, &channel.external_id).unwrap(), 0);

        let plain = db.create_channel(alice, NewChannel::default()).unwrap();
        db.write_message(plain.id, plain.tokens[0].id, "text/plain", b"1").unwrap();
        assert_eq!(db.head_sequence(0, &plain.external_id).unwrap(), 0);
    }

    #[test]
    fn delete_respects_minimum_age() {
        let (_dir, db, clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db
            .create_channel(
                alice,
                NewChannel {
                    retention: Retention { min_age_days: Some(2), max_age_days: None, auto_prune: false },
                    ..NewChannel::default()
                },
            )
            .unwrap();
        let owner = channel.tokens[0].id;
        let message = db.write_message(channel.id, owner, "text/plain", b"x").unwrap();

        clock.advance(TimeDelta::days(2) - TimeDelta::seconds(1));
        assert!(matches!(db.delete_message(&channel.external_id, 1), Err(Error::RetentionNotExpired)));
        assert!(db.get_message(&channel.external_id, 1).unwrap().is_some());

        clock.advance(TimeDelta::seconds(1));
        db.delete_message(&channel.external_id, 1).unwrap();
        assert!(db.get_message(&channel.external_id, 1).unwrap().is_none());
        assert!(db.list_messages(owner, false).unwrap().messages.is_empty());
        assert!(db.message_statuses(message.id).unwrap().iter().all(|s| s.is_deleted));

        assert!(matches!(db.delete_message(&channel.external_id, 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn prune_keeps_head_and_live_messages() {
        let (_dir, db, clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db
            .create_channel(
                alice,
                NewChannel {
                    retention: Retention { min_age_days: None, max_age_days: Some(7), auto_prune: true },
                    ..NewChannel::default()
                },
            )
            .unwrap();
        let manual = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner = channel.tokens[0].id;

        db.write_message(channel.id, owner, "text/plain", b"1").unwrap();
        db.write_message(channel.id, owner, "text/plain", b"2").unwrap();
        db.write_message(manual.id, manual.tokens[0].id, "text/plain", b"1").unwrap();
        db.write_message(manual.id, manual.tokens[0].id, "text/plain", b"2").unwrap();
        db.delete_message(&manual.external_id, 1).unwrap();

        clock.advance(TimeDelta::days(1));
        db.write_message(channel.id, owner, "text/plain", b"3").unwrap();
        db.delete_message(&channel.external_id, 2).unwrap();

        // seq 2 is deleted everywhere; the manual channel never prunes
        assert_eq!(db.prune_messages().unwrap(), 1);

        clock.advance(TimeDelta::days(7));
        // seq 1 is past max age; seq 3 is the head
        assert_eq!(db.prune_messages().unwrap(), 1);
        assert_eq!(db.prune_messages().unwrap(), 0);

        let next = db.write_message(channel.id, owner, "text/plain", b"4").unwrap();
        assert_eq!(next.sequence, 4);
    }
}
