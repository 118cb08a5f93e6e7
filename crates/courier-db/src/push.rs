use courier_types::models::PushRegistration;
use rusqlite::params;
use tracing::{info, warn};

use crate::models::{push_from_row, to_millis};
use crate::{Database, Result};

impl Database {
    /// Registers a device for push notifications on behalf of `token`.
    /// Registering an existing pair is a no-op.
    pub fn register_push(&self, token: i64, device_token: &str) -> Result<()> {
        let inserted = self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "INSERT INTO push_registrations (token_id, device_token, is_valid) VALUES (?1, ?2, 1)
                 ON CONFLICT(token_id, device_token) DO NOTHING",
                params![token, device_token],
            )?)
        })?;
        if inserted > 0 {
            info!("Push registration added for token {token}");
        }
        Ok(())
    }

    /// Replaces a rotated device token on every registration held by `account`'s
    /// tokens and marks it valid again.
    pub fn update_push(&self, account: i64, old_device_token: &str, new_device_token: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE OR IGNORE push_registrations SET device_token = ?1, is_valid = 1
                 WHERE device_token = ?2
                   AND token_id IN (SELECT id FROM access_tokens WHERE account_id = ?3)",
                params![new_device_token, old_device_token, account],
            )?)
        })
    }

    /// Removes a device from `account`'s tokens, optionally only those of one channel.
    pub fn delete_push(&self, account: i64, device_token: &str, channel: Option<&str>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "DELETE FROM push_registrations
                 WHERE device_token = ?1
                   AND token_id IN (
                       SELECT t.id FROM access_tokens t
                       JOIN channels c ON c.id = t.channel_id
                       WHERE t.account_id = ?2 AND (?3 IS NULL OR c.external_id = ?3)
                   )",
                params![device_token, account, channel],
            )?)
        })
    }

    pub fn mark_push_invalid(&self, device_token: &str) -> Result<()> {
        let changed = self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE push_registrations SET is_valid = 0 WHERE device_token = ?1",
                params![device_token],
            )?)
        })?;
        if changed > 0 {
            warn!("Push registration marked invalid ({changed} row(s))");
        }
        Ok(())
    }

    /// Valid registrations of every active token on `channel` except `exclude_token`.
    pub fn push_targets(&self, channel: i64, exclude_token: i64) -> Result<Vec<PushRegistration>> {
        let now = to_millis(self.now());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.token_id, p.device_token, p.is_valid FROM push_registrations p
                 JOIN access_tokens t ON t.id = p.token_id
                 WHERE t.channel_id = ?1 AND t.id != ?2 AND p.is_valid = 1
                   AND (t.valid_to IS NULL OR t.valid_to > ?3)
                 ORDER BY p.id",
            )?;
            let targets = stmt
                .query_map(params![channel, exclude_token, now], push_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(targets)
        })
    }

    pub fn push_registrations(&self, token: i64) -> Result<Vec<PushRegistration>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, token_id, device_token, is_valid FROM push_registrations
                 WHERE token_id = ?1 ORDER BY id",
            )?;
            let registrations = stmt
                .query_map(params![token], push_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(registrations)
        })
    }
}
