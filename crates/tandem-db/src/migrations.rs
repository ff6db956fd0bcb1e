use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

fn schema_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Identities and the conversation directory.
pub fn relational(conn: &Connection) -> Result<(), StoreError> {
    let version = schema_version(conn)?;

    if version < 1 {
        info!("Relational store: running migration v1 (identities, conversations)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE identities (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                subject         TEXT NOT NULL UNIQUE,
                display_name    TEXT NOT NULL,
                avatar_url      TEXT,
                created_at      INTEGER NOT NULL
            );

            -- One row per unordered pair: the pair is stored smaller id first
            -- and the UNIQUE index is what settles concurrent find-or-create.
            CREATE TABLE conversations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_low    INTEGER NOT NULL REFERENCES identities(id),
                user_high   INTEGER NOT NULL REFERENCES identities(id),
                created_at  INTEGER NOT NULL,
                CHECK (user_low < user_high),
                UNIQUE (user_low, user_high)
            );

            CREATE INDEX idx_conversations_high
                ON conversations(user_high);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    Ok(())
}

/// Message log and unread counters.
pub fn log(conn: &Connection) -> Result<(), StoreError> {
    let version = schema_version(conn)?;

    if version < 1 {
        info!("Log store: running migration v1 (messages, unread_counters)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                seq             INTEGER NOT NULL,
                sender_id       INTEGER NOT NULL,
                body            TEXT NOT NULL,
                client_token    TEXT,
                created_at      INTEGER NOT NULL,
                UNIQUE (conversation_id, seq),
                UNIQUE (conversation_id, sender_id, client_token)
            );

            CREATE TABLE unread_counters (
                user_id         INTEGER NOT NULL,
                conversation_id INTEGER NOT NULL,
                count           INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
                PRIMARY KEY (user_id, conversation_id)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    Ok(())
}
