use chrono::Utc;
use rusqlite::{OptionalExtension, Row, ffi, params};
use tracing::debug;

use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::{Message, UnreadCount};

use crate::models::{MessageRow, UnreadRow};
use crate::{LogStore, StoreError, violates};

/// Result of an append. `created` is false when a retried append carried a
/// client token that was already stored; `message` is then the original.
#[derive(Debug, Clone)]
pub struct Appended {
    pub message: Message,
    pub created: bool,
}

impl LogStore {
    // -- Messages --

    /// Append a message to a conversation's log.
    ///
    /// `seq` is computed inside the INSERT itself, so two appends can never
    /// observe the same previous maximum. `created_at` is clamped to the
    /// latest stored value, keeping (created_at, seq) non-decreasing even if
    /// the server clock steps backwards.
    pub fn append_message(
        &self,
        conversation_id: ConversationId,
        sender_id: IdentityId,
        body: &str,
        client_token: Option<&str>,
    ) -> Result<Appended, StoreError> {
        self.with_conn_mut(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO messages (conversation_id, seq, sender_id, body, client_token, created_at)
                 SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3, ?4, MAX(?5, COALESCE(MAX(created_at), 0))
                 FROM messages WHERE conversation_id = ?1
                 RETURNING id, conversation_id, seq, sender_id, body, created_at",
                params![
                    conversation_id.0,
                    sender_id.0,
                    body,
                    client_token,
                    Utc::now().timestamp_millis()
                ],
                map_message,
            );

            match inserted {
                Ok(row) => Ok(Appended {
                    message: row.into_model(),
                    created: true,
                }),
                Err(e) if client_token.is_some() && violates(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    let existing = conn
                        .query_row(
                            "SELECT id, conversation_id, seq, sender_id, body, created_at
                             FROM messages
                             WHERE conversation_id = ?1 AND sender_id = ?2 AND client_token = ?3",
                            params![conversation_id.0, sender_id.0, client_token],
                            map_message,
                        )
                        .optional()?;
                    match existing {
                        Some(row) => {
                            debug!(
                                "Duplicate append in conversation {} (seq {}), returning original",
                                conversation_id, row.seq
                            );
                            Ok(Appended {
                                message: row.into_model(),
                                created: false,
                            })
                        }
                        None => Err(e.into()),
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Messages of a conversation in `seq` order. `after_seq` is exclusive;
    /// with no `limit` the whole remaining log is returned.
    pub fn messages(
        &self,
        conversation_id: ConversationId,
        after_seq: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, seq, sender_id, body, created_at
                 FROM messages
                 WHERE conversation_id = ?1 AND seq > ?2
                 ORDER BY seq ASC
                 LIMIT ?3",
            )?;

            // SQLite treats a negative LIMIT as "no limit".
            let limit = limit.map_or(-1, i64::from);
            let rows = stmt
                .query_map(
                    params![conversation_id.0, after_seq.unwrap_or(0), limit],
                    map_message,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(MessageRow::into_model).collect())
        })
    }

    // -- Unread counters --

    /// Atomically add one to the counter and return the new value.
    pub fn increment_unread(
        &self,
        user_id: IdentityId,
        conversation_id: ConversationId,
    ) -> Result<u64, StoreError> {
        self.with_conn_mut(|conn| {
            let count: i64 = conn.query_row(
                "INSERT INTO unread_counters (user_id, conversation_id, count)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT(user_id, conversation_id) DO UPDATE SET count = count + 1
                 RETURNING count",
                params![user_id.0, conversation_id.0],
                |r| r.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    /// Set the counter to zero. Resetting a missing or zero counter is a no-op.
    pub fn reset_unread(
        &self,
        user_id: IdentityId,
        conversation_id: ConversationId,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE unread_counters SET count = 0 WHERE user_id = ?1 AND conversation_id = ?2",
                params![user_id.0, conversation_id.0],
            )?;
            Ok(())
        })
    }

    pub fn unread_count(
        &self,
        user_id: IdentityId,
        conversation_id: ConversationId,
    ) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM unread_counters WHERE user_id = ?1 AND conversation_id = ?2",
                    params![user_id.0, conversation_id.0],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0).max(0) as u64)
        })
    }

    /// Every non-zero counter of `user_id`.
    pub fn unread_for(&self, user_id: IdentityId) -> Result<Vec<UnreadCount>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, count FROM unread_counters
                 WHERE user_id = ?1 AND count > 0
                 ORDER BY conversation_id",
            )?;
            let rows = stmt
                .query_map([user_id.0], |row| {
                    Ok(UnreadRow {
                        conversation_id: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(UnreadRow::into_model).collect())
        })
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        seq: row.get(2)?,
        sender_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::StoreConfig;
    use crate::test_support::temp_path;

    const CONV: ConversationId = ConversationId(7);
    const U1: IdentityId = IdentityId(10);
    const U2: IdentityId = IdentityId(20);

    fn store(tag: &str) -> LogStore {
        LogStore::open(&temp_path(tag), StoreConfig::default()).unwrap()
    }

    #[test]
    fn seq_starts_at_one_per_conversation() {
        let log = store("seq");
        let first = log.append_message(CONV, U1, "hi", None).unwrap();
        let second = log.append_message(CONV, U2, "hey", None).unwrap();
        let other = log.append_message(ConversationId(8), U1, "elsewhere", None).unwrap();

        assert_eq!(first.message.seq, 1);
        assert_eq!(second.message.seq, 2);
        assert_eq!(other.message.seq, 1);
        assert!(second.message.created_at >= first.message.created_at);
    }

    #[test]
    fn concurrent_appends_get_distinct_increasing_seq() {
        let path = temp_path("concurrent");
        let log = Arc::new(LogStore::open(&path, StoreConfig::default()).unwrap());
        // A second handle on the same file stands in for another server process.
        let other = Arc::new(LogStore::open(&path, StoreConfig::default()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = if t % 2 == 0 { log.clone() } else { other.clone() };
                thread::spawn(move || {
                    for i in 0..25 {
                        let sender = if t % 2 == 0 { U1 } else { U2 };
                        log.append_message(CONV, sender, &format!("{}-{}", t, i), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let messages = log.messages(CONV, None, None).unwrap();
        assert_eq!(messages.len(), 200);
        for (i, m) in messages.iter().enumerate() {
            assert_eq!(m.seq, i as i64 + 1);
        }
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn retried_append_with_token_returns_original() {
        let log = store("token");
        let first = log.append_message(CONV, U1, "hi", Some("tok-1")).unwrap();
        let retry = log.append_message(CONV, U1, "hi", Some("tok-1")).unwrap();

        assert!(first.created);
        assert!(!retry.created);
        assert_eq!(first.message, retry.message);

        // Same token from the other participant is a different send.
        let theirs = log.append_message(CONV, U2, "hi", Some("tok-1")).unwrap();
        assert!(theirs.created);

        // Untokened appends are never deduplicated.
        log.append_message(CONV, U1, "hi", None).unwrap();
        log.append_message(CONV, U1, "hi", None).unwrap();
        assert_eq!(log.messages(CONV, None, None).unwrap().len(), 4);
    }

    #[test]
    fn messages_paginate_by_seq() {
        let log = store("page");
        for text in ["a", "b", "c", "d", "e"] {
            log.append_message(CONV, U1, text, None).unwrap();
        }

        let page: Vec<_> = log
            .messages(CONV, Some(2), Some(2))
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(page, vec!["c", "d"]);
        assert!(log.messages(CONV, Some(5), None).unwrap().is_empty());
    }

    #[test]
    fn unread_counts_resets_and_resumes() {
        let log = store("unread");
        assert_eq!(log.unread_count(U2, CONV).unwrap(), 0);

        for expected in 1..=3 {
            assert_eq!(log.increment_unread(U2, CONV).unwrap(), expected);
        }
        assert_eq!(log.unread_count(U2, CONV).unwrap(), 3);

        log.reset_unread(U2, CONV).unwrap();
        log.reset_unread(U2, CONV).unwrap();
        assert_eq!(log.unread_count(U2, CONV).unwrap(), 0);
        assert!(log.unread_for(U2).unwrap().is_empty());

        assert_eq!(log.increment_unread(U2, CONV).unwrap(), 1);
        assert_eq!(
            log.unread_for(U2).unwrap(),
            vec![UnreadCount { conversation_id: CONV, count: 1 }]
        );
        // Counters are per recipient.
        assert_eq!(log.unread_count(U1, CONV).unwrap(), 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let path = temp_path("increments");
        let a = Arc::new(LogStore::open(&path, StoreConfig::default()).unwrap());
        let b = Arc::new(LogStore::open(&path, StoreConfig::default()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = if t % 2 == 0 { a.clone() } else { b.clone() };
                thread::spawn(move || {
                    for _ in 0..50 {
                        log.increment_unread(U2, CONV).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(a.unread_count(U2, CONV).unwrap(), 400);
    }
}
