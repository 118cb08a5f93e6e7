use chrono::{DateTime, Utc};
use courier_crypto::secrets::generate_secret;
use courier_types::models::{AccessToken, NewToken};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

use crate::models::{TOKEN_COLUMNS, from_millis, to_millis, token_from_row};
use crate::{Database, Error, Result};

pub(crate) fn insert_token(
    conn: &Connection,
    account: i64,
    channel: i64,
    secret: &str,
    new: &NewToken,
    now: DateTime<Utc>,
) -> rusqlite::Result<AccessToken> {
    let id: i64 = conn.query_row(
        "INSERT INTO access_tokens
            (account_id, channel_id, token, description, can_read, can_write, valid_from)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id",
        params![account, channel, secret, new.description, new.can_read, new.can_write, to_millis(now)],
        |r| r.get(0),
    )?;

    Ok(AccessToken {
        id,
        account,
        channel,
        secret: secret.to_string(),
        description: new.description.clone(),
        can_read: new.can_read,
        can_write: new.can_write,
        valid_from: from_millis(to_millis(now)),
        valid_to: None,
    })
}

impl Database {
    pub fn create_token(&self, account: i64, channel: &str, new: NewToken) -> Result<AccessToken> {
        let secret = generate_secret(self.config().token_size);
        let now = self.now();

        let token = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let channel_id: i64 = tx
                .query_row("SELECT id FROM channels WHERE external_id = ?1", params![channel], |r| r.get(0))
                .optional()?
                .ok_or(Error::NotFound("channel"))?;
            let token = insert_token(&tx, account, channel_id, &secret, &new, now)?;
            tx.commit()?;
            Ok(token)
        })?;

        info!(
            "Token {} issued on channel {} (read={}, write={})",
            token.id, token.channel, token.can_read, token.can_write
        );
        Ok(token)
    }

    /// Returns the token if it is active and belongs to `channel`.
    pub fn get_token(&self, channel: &str, token: i64) -> Result<Option<AccessToken>> {
        let now = to_millis(self.now());
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {TOKEN_COLUMNS} FROM access_tokens t
                         JOIN channels c ON c.id = t.channel_id
                         WHERE c.external_id = ?1 AND t.id = ?2
                           AND (t.valid_to IS NULL OR t.valid_to > ?3)"
                    ),
                    params![channel, token, now],
                    token_from_row,
                )
                .optional()?)
        })
    }

    /// Active tokens of `channel`, optionally only the one holding `secret`.
    pub fn list_tokens(&self, channel: &str, secret: Option<&str>) -> Result<Vec<AccessToken>> {
        let now = to_millis(self.now());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TOKEN_COLUMNS} FROM access_tokens t
                 JOIN channels c ON c.id = t.channel_id
                 WHERE c.external_id = ?1
                   AND (?2 IS NULL OR t.token = ?2)
                   AND (t.valid_to IS NULL OR t.valid_to > ?3)
                 ORDER BY t.id"
            ))?;
            let tokens = stmt
                .query_map(params![channel, secret, now], token_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tokens)
        })
    }

    /// Ends a token's validity now. Returns false if it was already revoked or unknown.
    pub fn revoke_token(&self, token: i64) -> Result<bool> {
        let now = to_millis(self.now());
        let revoked = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row = tx
                .query_row(
                    &format!(
                        "SELECT {TOKEN_COLUMNS}, c.external_id FROM access_tokens t
                         JOIN channels c ON c.id = t.channel_id
                         WHERE t.id = ?1"
                    ),
                    params![token],
                    |r| Ok((token_from_row(r)?, r.get::<_, String>(9)?)),
                )
                .optional()?;
            let changed = tx.execute(
                "UPDATE access_tokens SET valid_to = ?1 WHERE id = ?2 AND valid_to IS NULL",
                params![now, token],
            )?;
            tx.commit()?;
            Ok(row.map(|row| (row, changed > 0)))
        })?;

        let Some(((token, channel), changed)) = revoked else {
            return Ok(false);
        };
        self.evict_token(&token, &channel);

        if changed {
            info!("Token {} revoked on channel {}", token.id, token.channel);
        }
        Ok(changed)
    }
}
