//! Read-through authorization lookups backed by [`AuthCache`](crate::AuthCache).

use courier_crypto::credentials::{credential_digest, credential_identity, hash_credential, verify_credential};
use courier_types::models::AccessToken;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

use crate::cache::{CacheKey, CachedValue};
use crate::models::{TOKEN_COLUMNS, to_millis, token_from_row};
use crate::{Database, Error, Result};

impl Database {
    /// Creates `name` if it does not exist yet and attaches the credential to it.
    /// Attaching a credential the account already has is a no-op. The user part of
    /// a credential names one account only.
    pub fn create_account(&self, name: &str, scheme: &str, credential: &str) -> Result<i64> {
        let identity = credential_identity(credential);
        let hash = hash_credential(credential).map_err(|e| Error::Credential(e.to_string()))?;
        let now = to_millis(self.now());

        let account_id = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO accounts (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                params![name, now],
            )?;
            let account_id: i64 =
                tx.query_row("SELECT id FROM accounts WHERE name = ?1", params![name], |r| r.get(0))?;

            let existing = stored_credentials(&tx, scheme, identity)?;
            if !identity.is_empty() && existing.iter().any(|(owner, _)| *owner != account_id) {
                return Err(Error::Validation(format!("{scheme} identity {identity} belongs to another account")));
            }
            if existing.iter().any(|(owner, stored)| *owner == account_id && verify_credential(credential, stored)) {
                tx.commit()?;
                return Ok(account_id);
            }

            tx.execute(
                "INSERT INTO account_credentials (account_id, scheme, identity, credential) VALUES (?1, ?2, ?3, ?4)",
                params![account_id, scheme, identity, hash],
            )?;
            tx.commit()?;
            Ok(account_id)
        })?;

        info!("Credential ({scheme}) attached to account {name} ({account_id})");
        Ok(account_id)
    }

    /// Resolves an account from a raw credential, e.g. the `user:password` pair of a
    /// Basic header.
    pub fn authenticate(&self, scheme: &str, credential: &str) -> Result<Option<i64>> {
        let key = CacheKey::Credential { scheme: scheme.to_string(), digest: credential_digest(credential) };
        if let Some(CachedValue::Account(id)) = self.cache().get(&key, self.now()) {
            return Ok(Some(id));
        }

        let generation = self.cache().generation();
        let candidates = self.with_conn(|conn| stored_credentials(conn, scheme, credential_identity(credential)))?;
        let account = candidates
            .into_iter()
            .find(|(_, stored)| verify_credential(credential, stored))
            .map(|(account, _)| account);

        if let Some(id) = account {
            self.cache().insert(key, CachedValue::Account(id), generation, self.now());
        }
        Ok(account)
    }

    pub fn is_channel_owner(&self, account: i64, channel: &str) -> Result<bool> {
        let key = CacheKey::ChannelOwner { account, channel: channel.to_string() };
        if self.cache().get(&key, self.now()).is_some() {
            return Ok(true);
        }

        let generation = self.cache().generation();
        let owned = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM channels WHERE owner = ?1 AND external_id = ?2",
                    params![account, channel],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })?;

        if owned {
            self.cache().insert(key, CachedValue::Granted, generation, self.now());
        }
        Ok(owned)
    }

    /// Whether `token` is an active token of `channel`. With an account, the token
    /// must also belong to that account.
    pub fn is_token_authorized(&self, account: Option<i64>, channel: &str, token: i64) -> Result<bool> {
        let key = match account {
            Some(account) => CacheKey::TokenOwner { account, channel: channel.to_string(), token },
            None => CacheKey::TokenOnChannel { channel: channel.to_string(), token },
        };
        let now = self.now();
        if self.cache().get(&key, now).is_some() {
            return Ok(true);
        }

        let generation = self.cache().generation();
        let granted = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM access_tokens t
                     JOIN channels c ON c.id = t.channel_id
                     WHERE t.id = ?1 AND c.external_id = ?2
                       AND (?3 IS NULL OR t.account_id = ?3)
                       AND (t.valid_to IS NULL OR t.valid_to > ?4)",
                    params![token, channel, account, to_millis(now)],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })?;

        if granted {
            self.cache().insert(key, CachedValue::Granted, generation, now);
        }
        Ok(granted)
    }

    /// Looks up an active token by its bearer secret.
    pub fn resolve_token(&self, secret: &str) -> Result<Option<AccessToken>> {
        let key = CacheKey::Secret(secret.to_string());
        let now = self.now();
        if let Some(CachedValue::Token(token)) = self.cache().get(&key, now) {
            return Ok(token.is_active(now).then_some(token));
        }

        let generation = self.cache().generation();
        let token = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {TOKEN_COLUMNS} FROM access_tokens t WHERE t.token = ?1"),
                    params![secret],
                    token_from_row,
                )
                .optional()?)
        })?;

        match token {
            Some(token) if token.is_active(now) => {
                self.cache().insert(key, CachedValue::Token(token.clone()), generation, now);
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }

    /// Drops every cache entry that could vouch for `token`.
    pub(crate) fn evict_token(&self, token: &AccessToken, channel: &str) {
        let cache = self.cache();
        cache.invalidate(&CacheKey::Secret(token.secret.clone()));
        cache.invalidate(&CacheKey::TokenOwner {
            account: token.account,
            channel: channel.to_string(),
            token: token.id,
        });
        cache.invalidate(&CacheKey::TokenOnChannel { channel: channel.to_string(), token: token.id });
    }
}

/// `(account, phc hash)` pairs stored for a scheme and identity.
fn stored_credentials(conn: &Connection, scheme: &str, identity: &str) -> Result<Vec<(i64, String)>> {
    let mut stmt =
        conn.prepare("SELECT account_id, credential FROM account_credentials WHERE scheme = ?1 AND identity = ?2")?;
    let rows = stmt
        .query_map(params![scheme, identity], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use courier_types::models::{NewChannel, NewToken};

    use crate::Error;
    use crate::cache::CacheKey;
    use crate::test_util::{account, temp_db};

    #[test]
    fn authenticate_verifies_the_stored_hash() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");

        assert_eq!(db.authenticate("Basic", "alice:secret").unwrap(), Some(alice));
        assert_eq!(db.authenticate("Basic", "alice:wrong").unwrap(), None);
        assert_eq!(db.authenticate("Basic", "mallory:secret").unwrap(), None);
        assert_eq!(db.authenticate("Bearer", "alice:secret").unwrap(), None);
    }

    #[test]
    fn bootstrap_attaches_second_credential() {
        let (_dir, db, _clock) = temp_db();
        let first = db.create_account("alice", "Basic", "alice:one").unwrap();
        let second = db.create_account("alice", "Basic", "alice:two").unwrap();
        let again = db.create_account("alice", "Basic", "alice:two").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, again);
        assert_eq!(db.authenticate("Basic", "alice:one").unwrap(), Some(first));
        assert_eq!(db.authenticate("Basic", "alice:two").unwrap(), Some(first));

        let stored: Vec<(String, String)> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT identity, credential FROM account_credentials ORDER BY id")?;
                Ok(stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .unwrap();
        assert_eq!(stored.len(), 2);
        for (identity, credential) in stored {
            assert_eq!(identity, "alice");
            assert!(credential.starts_with("$argon2id$"));
            assert!(!credential.contains("one") && !credential.contains("two"));
        }
    }

    #[test]
    fn identity_cannot_move_to_another_account() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");

        assert!(matches!(db.create_account("bob", "Basic", "alice:other"), Err(Error::Validation(_))));
        assert_eq!(db.authenticate("Basic", "alice:other").unwrap(), None);
        assert_eq!(db.authenticate("Basic", "alice:secret").unwrap(), Some(alice));
        let bobs: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM accounts WHERE name = 'bob'", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(bobs, 0);
    }

    #[test]
    fn misses_are_not_cached() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");

        assert!(!db.is_channel_owner(alice, "nope").unwrap());
        assert!(db.cache().is_empty());
    }

    #[test]
    fn ownership_and_token_checks() {
        let (_dir, db, _clock) = temp_db();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let owner_token = channel.tokens[0].id;

        assert!(db.is_channel_owner(alice, &channel.external_id).unwrap());
        assert!(!db.is_channel_owner(bob, &channel.external_id).unwrap());
        assert!(db.is_token_authorized(Some(alice), &channel.external_id, owner_token).unwrap());
        assert!(!db.is_token_authorized(Some(bob), &channel.external_id, owner_token).unwrap());
        assert!(db.is_token_authorized(None, &channel.external_id, owner_token).unwrap());
        assert!(!db.is_token_authorized(None, "other", owner_token).unwrap());
    }

    #[test]
    fn revoked_token_is_rejected_while_cache_is_warm() {
        let (_dir, db, clock) = temp_db();
        let alice = account(&db, "alice");
        let channel = db.create_channel(alice, NewChannel::default()).unwrap();
        let token = db
            .create_token(
                alice,
                &channel.external_id,
                NewToken { description: "reader".into(), can_read: true, can_write: false },
            )
            .unwrap();

        assert!(db.resolve_token(&token.secret).unwrap().is_some());
        assert!(db.is_token_authorized(None, &channel.external_id, token.id).unwrap());
        assert!(db.cache().contains(&CacheKey::Secret(token.secret.clone()), db.now()));

        assert!(db.revoke_token(token.id).unwrap());
        clock.advance(TimeDelta::seconds(1));

        assert!(db.resolve_token(&token.secret).unwrap().is_none());
        assert!(!db.is_token_authorized(None, &channel.external_id, token.id).unwrap());
        assert!(!db.is_token_authorized(Some(alice), &channel.external_id, token.id).unwrap());
    }
}
