use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use tracing::debug;

use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::{Conversation, Identity, PublicProfile};

use crate::models::{ConversationRow, IdentityRow, PeerConversationRow};
use crate::{Database, StoreError, violates};

impl Database {
    // -- Identities --

    /// Insert the identity for `subject` unless it already exists.
    /// Returns the stored identity and whether this call created it.
    pub fn create_identity(
        &self,
        subject: &str,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<(Identity, bool), StoreError> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO identities (subject, display_name, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(subject) DO NOTHING",
                params![subject, display_name, avatar_url, Utc::now().timestamp_millis()],
            )?;
            let row = query_identity_by_subject(conn, subject)?
                .ok_or_else(|| StoreError::MissingReference(format!("identity {}", subject)))?;
            Ok((row.into_model(), inserted == 1))
        })
    }

    pub fn identity_by_subject(&self, subject: &str) -> Result<Option<Identity>, StoreError> {
        self.with_conn(|conn| query_identity_by_subject(conn, subject))
            .map(|row| row.map(IdentityRow::into_model))
    }

    pub fn identity_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, subject, display_name, avatar_url, created_at
                     FROM identities WHERE id = ?1",
                    [id.0],
                    map_identity,
                )
                .optional()?;
            Ok(row.map(IdentityRow::into_model))
        })
    }

    // -- Conversations --

    /// Find the conversation for the unordered pair {a, b}, creating it if
    /// needed. Returns the conversation and whether this call created it.
    ///
    /// Losing an insert race to another writer (another process on the same
    /// file, or a caller that slipped in between our read and write) shows up
    /// as a UNIQUE violation; the winner's row is re-read and returned.
    pub fn find_or_create_conversation(
        &self,
        a: IdentityId,
        b: IdentityId,
    ) -> Result<(Conversation, bool), StoreError> {
        let (low, high) = Conversation::canonical_pair(a, b);

        if let Some(row) = self.with_conn(|conn| query_conversation_by_pair(conn, low, high))? {
            return Ok((row.into_model(), false));
        }

        self.with_conn_mut(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO conversations (user_low, user_high, created_at)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, user_low, user_high, created_at",
                params![low.0, high.0, Utc::now().timestamp_millis()],
                map_conversation,
            );

            match inserted {
                Ok(row) => Ok((row.into_model(), true)),
                Err(e) if violates(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    debug!("Conversation {}:{} created concurrently, re-reading", low, high);
                    let row = query_conversation_by_pair(conn, low, high)?.ok_or_else(|| {
                        StoreError::Unavailable(format!(
                            "conversation {}:{} missing after unique violation",
                            low, high
                        ))
                    })?;
                    Ok((row.into_model(), false))
                }
                Err(e) if violates(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Err(
                    StoreError::MissingReference(format!("identity {} or {}", low, high)),
                ),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn conversation_by_id(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_low, user_high, created_at FROM conversations WHERE id = ?1",
                    [id.0],
                    map_conversation,
                )
                .optional()?;
            Ok(row.map(ConversationRow::into_model))
        })
    }

    /// All conversations `identity` takes part in, newest first, each joined
    /// with the other participant's public profile.
    pub fn conversations_for(
        &self,
        identity: IdentityId,
    ) -> Result<Vec<(Conversation, PublicProfile)>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_low, c.user_high, c.created_at,
                        p.id, p.display_name, p.avatar_url
                 FROM conversations c
                 JOIN identities p
                   ON p.id = CASE WHEN c.user_low = ?1 THEN c.user_high ELSE c.user_low END
                 WHERE c.user_low = ?1 OR c.user_high = ?1
                 ORDER BY c.created_at DESC, c.id DESC",
            )?;

            let rows = stmt
                .query_map([identity.0], |row| {
                    Ok(PeerConversationRow {
                        conversation: map_conversation(row)?,
                        peer_id: row.get(4)?,
                        peer_display_name: row.get(5)?,
                        peer_avatar_url: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(PeerConversationRow::into_parts).collect())
        })
    }
}

fn map_identity(row: &Row<'_>) -> rusqlite::Result<IdentityRow> {
    Ok(IdentityRow {
        id: row.get(0)?,
        subject: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_low: row.get(1)?,
        user_high: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_identity_by_subject(
    conn: &Connection,
    subject: &str,
) -> Result<Option<IdentityRow>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, subject, display_name, avatar_url, created_at
             FROM identities WHERE subject = ?1",
            [subject],
            map_identity,
        )
        .optional()?;
    Ok(row)
}

fn query_conversation_by_pair(
    conn: &Connection,
    low: IdentityId,
    high: IdentityId,
) -> Result<Option<ConversationRow>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, user_low, user_high, created_at
             FROM conversations WHERE user_low = ?1 AND user_high = ?2",
            [low.0, high.0],
            map_conversation,
        )
        .optional()?;
    Ok(row)
}
