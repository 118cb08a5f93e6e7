use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE accounts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE account_credentials (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id  INTEGER NOT NULL REFERENCES accounts(id),
                scheme      TEXT NOT NULL,
                identity    TEXT NOT NULL,
                credential  TEXT NOT NULL
            );

            CREATE INDEX idx_account_credentials_identity ON account_credentials(scheme, identity);

            CREATE TABLE channels (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                owner         INTEGER NOT NULL REFERENCES accounts(id),
                external_id   TEXT NOT NULL UNIQUE,
                public_read   INTEGER NOT NULL,
                public_write  INTEGER NOT NULL,
                locked        INTEGER NOT NULL DEFAULT 0,
                sequenced     INTEGER NOT NULL,
                min_age_days  INTEGER,
                max_age_days  INTEGER,
                auto_prune    INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_channels_owner ON channels(owner);

            CREATE TABLE access_tokens (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id   INTEGER NOT NULL REFERENCES accounts(id),
                channel_id   INTEGER NOT NULL REFERENCES channels(id),
                token        TEXT NOT NULL UNIQUE,
                description  TEXT NOT NULL,
                can_read     INTEGER NOT NULL,
                can_write    INTEGER NOT NULL,
                valid_from   INTEGER NOT NULL,
                valid_to     INTEGER
            );

            CREATE INDEX idx_access_tokens_channel ON access_tokens(channel_id);

            CREATE TABLE push_registrations (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                token_id      INTEGER NOT NULL REFERENCES access_tokens(id),
                device_token  TEXT NOT NULL,
                is_valid      INTEGER NOT NULL DEFAULT 1,
                UNIQUE(token_id, device_token)
            );

            CREATE TABLE messages (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id    INTEGER NOT NULL REFERENCES channels(id),
                from_token    INTEGER NOT NULL REFERENCES access_tokens(id),
                seq           INTEGER NOT NULL,
                received_at   INTEGER NOT NULL,
                content_type  TEXT NOT NULL,
                payload       BLOB NOT NULL,
                UNIQUE(channel_id, seq)
            );

            CREATE TABLE message_status (
                message_id  INTEGER NOT NULL REFERENCES messages(id),
                token_id    INTEGER NOT NULL REFERENCES access_tokens(id),
                is_read     INTEGER NOT NULL,
                is_deleted  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (message_id, token_id)
            );

            CREATE INDEX idx_message_status_token
                ON message_status(token_id, is_read, is_deleted);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
