use courier_crypto::secrets::{generate_channel_id, generate_secret};
use courier_types::models::{
    AccessToken, Channel, ChannelAmendment, NewChannel, NewToken, OWNER_TOKEN_DESCRIPTION,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

use crate::cache::CacheKey;
use crate::models::{CHANNEL_COLUMNS, TOKEN_COLUMNS, channel_from_row, to_millis, token_from_row};
use crate::tokens::insert_token;
use crate::{Database, Error, Result};

impl Database {
    /// Creates a channel together with its Owner token in one transaction.
    pub fn create_channel(&self, owner: i64, new: NewChannel) -> Result<Channel> {
        if !new.retention.is_valid() {
            return Err(Error::RetentionInvalid);
        }

        let external_id = generate_channel_id();
        let secret = generate_secret(self.config().token_size);
        let now = self.now();

        let channel = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id: i64 = tx.query_row(
                "INSERT INTO channels
                    (owner, external_id, public_read, public_write, locked, sequenced,
                     min_age_days, max_age_days, auto_prune)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8)
                 RETURNING id",
                params![
                    owner,
                    external_id,
                    new.public_read,
                    new.public_write,
                    new.sequenced,
                    new.retention.min_age_days,
                    new.retention.max_age_days,
                    new.retention.auto_prune,
                ],
                |r| r.get(0),
            )?;
            let owner_token = insert_token(
                &tx,
                owner,
                id,
                &secret,
                &NewToken {
                    description: OWNER_TOKEN_DESCRIPTION.to_string(),
                    can_read: true,
                    can_write: true,
                },
                now,
            )?;
            tx.commit()?;

            Ok(Channel {
                id,
                external_id: external_id.clone(),
                owner,
                public_read: new.public_read,
                public_write: new.public_write,
                locked: false,
                sequenced: new.sequenced,
                retention: new.retention,
                head_sequence: 0,
                tokens: vec![owner_token],
            })
        })?;

        info!("Channel {} created for account {owner}", channel.id);
        Ok(channel)
    }

    pub fn get_channel(&self, id: i64) -> Result<Option<Channel>> {
        let now = to_millis(self.now());
        self.with_conn(|conn| query_channel(conn, "c.id = ?1", params![id], now))
    }

    pub fn get_channel_by_external_id(&self, external_id: &str) -> Result<Option<Channel>> {
        let now = to_millis(self.now());
        self.with_conn(|conn| query_channel(conn, "c.external_id = ?1", params![external_id], now))
    }

    pub fn list_channels(&self, owner: i64) -> Result<Vec<Channel>> {
        let now = to_millis(self.now());
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.owner = ?1 ORDER BY c.id"))?;
            let mut channels = stmt
                .query_map(params![owner], channel_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for channel in &mut channels {
                channel.tokens = active_tokens(conn, channel.id, now)?;
            }
            Ok(channels)
        })
    }

    /// Updates the read/write/lock flags. Sequencing and retention are fixed at creation.
    pub fn amend_channel(&self, external_id: &str, amendment: ChannelAmendment) -> Result<Channel> {
        let now = to_millis(self.now());
        let channel = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx.execute(
                "UPDATE channels SET public_read = ?1, public_write = ?2, locked = ?3 WHERE external_id = ?4",
                params![amendment.public_read, amendment.public_write, amendment.locked, external_id],
            )?;
            if updated == 0 {
                return Err(Error::NotFound("channel"));
            }
            let channel = query_channel(&tx, "c.external_id = ?1", params![external_id], now)?
                .ok_or(Error::NotFound("channel"))?;
            tx.commit()?;
            Ok(channel)
        })?;

        for token in &channel.tokens {
            self.cache().invalidate(&CacheKey::Secret(token.secret.clone()));
        }

        info!(
            "Channel {} amended (public_read={}, public_write={}, locked={})",
            channel.id, channel.public_read, channel.public_write, channel.locked
        );
        Ok(channel)
    }

    /// Removes a channel and everything hanging off it, then evicts the cache
    /// entries that referenced it.
    pub fn delete_channel(&self, external_id: &str) -> Result<()> {
        let (channel_id, owner, tokens) = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (channel_id, owner): (i64, i64) = tx
                .query_row(
                    "SELECT id, owner FROM channels WHERE external_id = ?1",
                    params![external_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?
                .ok_or(Error::NotFound("channel"))?;

            let tokens = {
                let mut stmt =
                    tx.prepare(&format!("SELECT {TOKEN_COLUMNS} FROM access_tokens t WHERE t.channel_id = ?1"))?;
                stmt.query_map(params![channel_id], token_from_row)?
                    .collect::<rusqlite::Result<Vec<AccessToken>>>()?
            };

            tx.execute(
                "DELETE FROM message_status
                 WHERE message_id IN (SELECT id FROM messages WHERE channel_id = ?1)",
                params![channel_id],
            )?;
            tx.execute("DELETE FROM messages WHERE channel_id = ?1", params![channel_id])?;
            tx.execute(
                "DELETE FROM push_registrations
                 WHERE token_id IN (SELECT id FROM access_tokens WHERE channel_id = ?1)",
                params![channel_id],
            )?;
            tx.execute("DELETE FROM access_tokens WHERE channel_id = ?1", params![channel_id])?;
            tx.execute("DELETE FROM channels WHERE id = ?1", params![channel_id])?;
            tx.commit()?;
            Ok((channel_id, owner, tokens))
        })?;

        for token in &tokens {
            self.evict_token(token, external_id);
        }
        self.cache()
            .invalidate(&CacheKey::ChannelOwner { account: owner, channel: external_id.to_string() });

        info!("Channel {channel_id} deleted ({} tokens)", tokens.len());
        Ok(())
    }
}

fn query_channel(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
    now: i64,
) -> Result<Option<Channel>> {
    let channel = conn
        .query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE {filter}"),
            params,
            channel_from_row,
        )
        .optional()?;

    match channel {
        Some(mut channel) => {
            channel.tokens = active_tokens(conn, channel.id, now)?;
            Ok(Some(channel))
        }
        None => Ok(None),
    }
}

fn active_tokens(conn: &Connection, channel_id: i64, now: i64) -> Result<Vec<AccessToken>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOKEN_COLUMNS} FROM access_tokens t
         WHERE t.channel_id = ?1 AND (t.valid_to IS NULL OR t.valid_to > ?2)
         ORDER BY t.id"
    ))?;
    let tokens = stmt
        .query_map(params![channel_id, now], token_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use courier_types::models::{ChannelAmendment, NewChannel, NewToken, Retention};

    use crate::Error;
    use crate::cache::CacheKey;
    use crate::test_util::{account, temp_db};

    fn sequenced_with_retention() -> NewChannel {
        NewChannel {
            public_read: true,
            public_write: false,
            sequenced: true,
            retention: Retention { min_age_days: Some(1), max_age_days: Some(30), auto_prune: true },
        }
    }

    #[test]
    fn create_mints_owner_token() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, sequenced_with_retention()).unwrap();

        assert_eq!(channel.tokens.len(), 1);
        let owner = &channel.tokens[0];
        assert_eq!(owner.description, "Owner");
        assert!(owner.can_read && owner.can_write);
        assert_eq!(owner.account, alice);
        assert!(!channel.locked);

        let loaded = db.get_channel_by_external_id(&channel.external_id).unwrap().unwrap();
        assert_eq!(loaded, channel);
        assert_eq!(db.get_channel(channel.id).unwrap(), Some(channel));
    }

    #[test]
    fn invalid_retention_is_rejected() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let new = NewChannel {
            retention: Retention { min_age_days: Some(10), max_age_days: Some(2), auto_prune: false },
            ..NewChannel::default()
        };

        assert!(matches!(db.create_channel(alice, new), Err(Error::RetentionInvalid)));
        assert!(db.list_channels(alice).unwrap().is_empty());
    }

    #[test]
    fn list_is_scoped_to_owner() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        let a1 = db.create_channel(alice, NewChannel::default()).unwrap();
        let a2 = db.create_channel(alice, NewChannel::default()).unwrap();
        db.create_channel(bob, NewChannel::default()).unwrap();

        let ids: Vec<_> = db.list_channels(alice).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a1.id, a2.id]);
    }

    #[test]
    fn amend_changes_only_flags() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, sequenced_with_retention()).unwrap();

        let amended = db
            .amend_channel(
                &channel.external_id,
                ChannelAmendment { public_read: false, public_write: true, locked: true },
            )
            .unwrap();

        assert!(!amended.public_read);
        assert!(amended.public_write);
        assert!(amended.locked);
        assert_eq!(amended.sequenced, channel.sequenced);
        assert_eq!(amended.retention, channel.retention);
    }

    #[test]
    fn amend_missing_channel_is_not_found() {
        let (_dir, db, _clock) = temp_db();
        let result = db.amend_channel("missing", ChannelAmendment::default());
        assert!(matches!(result, Err(Error::NotFound("channel"))));
    }

    #[test]
    fn amend_evicts_token_secrets() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let secret = channel.tokens[0].secret.clone();

        db.resolve_token(&secret).unwrap();
        assert!(db.cache().contains(&CacheKey::Secret(secret.clone()), db.now()));

        db.amend_channel(&channel.external_id, ChannelAmendment::default()).unwrap();
        assert!(!db.cache().contains(&CacheKey::Secret(secret), db.now()));
    }

    #[test]
    fn delete_cascades_and_evicts() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner_token = channel.tokens[0].clone();
        let reader = db
            .create_token(
                alice,
                &channel.external_id,
                NewToken { description: "reader".into(), can_read: true, can_write: false },
            )
            .unwrap();
        db.write_message(channel.id, owner_token.id, "text/plain", b"hello").unwrap();
        db.register_push(reader.id, "device-1").unwrap();

        assert!(db.is_channel_owner(alice, &channel.external_id).unwrap());
        assert!(db.resolve_token(&reader.secret).unwrap().is_some());
        assert!(db.is_token_authorized(None, &channel.external_id, reader.id).unwrap());

        db.delete_channel(&channel.external_id).unwrap();

        let now = db.now();
        let cache = db.cache();
        assert!(!cache.contains(
            &CacheKey::ChannelOwner { account: alice, channel: channel.external_id.clone() },
            now
        ));
        assert!(!cache.contains(&CacheKey::Secret(reader.secret.clone()), now));
        assert!(!cache.contains(
            &CacheKey::TokenOnChannel { channel: channel.external_id.clone(), token: reader.id },
            now
        ));

        assert!(db.get_channel(channel.id).unwrap().is_none());
        assert!(!db.is_channel_owner(alice, &channel.external_id).unwrap());
        assert!(db.resolve_token(&reader.secret).unwrap().is_none());
        assert!(db.push_registrations(reader.id).unwrap().is_empty());

        let leftovers: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM messages) + (SELECT COUNT(*) FROM message_status)",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(leftovers, 0);

        assert!(matches!(db.delete_channel(&channel.external_id), Err(Error::NotFound(_))));
    }
}
